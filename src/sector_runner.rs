//! Per-sector driver: loads points, normalizes, builds the context, seeds
//! the initial population, runs the optimizer across the waypoint-count
//! range, and emits results.
//!
//! Grounded on `original_source/cpp/src/Sector_Runner.cpp`/`route_finder.cpp`.
//! `run` returns a `Result` instead of the original's try/catch-then-
//! `exit(1)`: a failing sector logs and returns, the spawning thread does
//! not terminate the process, and other sector threads continue.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::{Arc, Mutex};

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::context::{Context, FitnessContext};
use crate::db::{normalize, DatabasePoint, PointDatabase, Sector};
use crate::error::{PolytraceError, Result};
use crate::exit_condition::ExitCondition;
use crate::geometry::{Point, Rect};
use crate::optimizer;
use crate::projection::Projector;
use crate::result_sink::ResultSink;
use crate::route::{Route, RouteShape};
#[cfg(feature = "parallel")]
use crate::seed::seeded_population_parallel;
use crate::seed::seeded_population;
use crate::stats::StatsAggregator;
use crate::worker_pool::WorkerPool;

/// Fixed tolerance the early-exit controller uses to decide "no
/// improvement". Not exposed on the command line, which only configures
/// `exit_repeats` (`max_matches`).
const EXIT_EPS: f64 = 1e-4;

/// Quadtree bounds margin (normalized-space units) added around the
/// observed point cloud and endpoints so boundary points never fail the
/// root-bounds insert check.
const QUADTREE_MARGIN: f64 = 10.0;

/// One row of the population CSV: `dna` is the canonical phenotype encoding
/// and round-trips byte-for-byte, never re-derived from decoded vertices.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PopulationRow {
    num_waypoints: usize,
    population: usize,
    dna: String,
    max_x: u64,
    max_y: u64,
    start_point_lat: f64,
    start_point_lon: f64,
    end_point_lat: f64,
    end_point_lon: f64,
    fitness: f64,
}

/// Runs one sector to completion: loads its points, builds a read-only
/// context, and searches every waypoint count in `[min, max]`.
pub fn run(
    db: &dyn PointDatabase,
    sector: &Sector,
    run_config: &RunConfig,
    projector: &dyn Projector,
    stats: &Arc<StatsAggregator>,
    result_sink: &Arc<Mutex<dyn ResultSink + Send>>,
) -> Result<()> {
    log::info!("starting sector runner for sector {}", sector.name);

    let mut points = db.load_points(Some(&sector.name), None)?;
    if points.is_empty() {
        return Err(PolytraceError::Database {
            message: format!("no points found for sector {}", sector.name),
        });
    }
    let grid_zone = points[0].grid_zone;

    let bounds = normalize(&mut points, None).expect("non-empty point list normalizes");
    log::debug!(
        "sector {}: normalized bounds min=({}, {}) max=({}, {})",
        sector.name,
        bounds.min_x,
        bounds.min_y,
        bounds.max_x,
        bounds.max_y
    );

    let start_utm = projector.to_utm(Point::new(run_config.start_lat_lon.0, run_config.start_lat_lon.1));
    let end_utm = projector.to_utm(Point::new(run_config.end_lat_lon.0, run_config.end_lat_lon.1));
    let start_point = Point::new(start_utm.x - bounds.min_x, start_utm.y - bounds.min_y);
    let end_point = Point::new(end_utm.x - bounds.min_x, end_utm.y - bounds.min_y);

    let max_x = (bounds.max_x - bounds.min_x + 1.0).max(1.0);
    let max_y = (bounds.max_y - bounds.min_y + 1.0).max(1.0);

    let normalized_points: Vec<Point> = points.iter().map(|p| Point::new(p.x_norm, p.y_norm)).collect();

    let root_bounds = quadtree_root_bounds(&normalized_points, start_point, end_point, max_x, max_y);
    let context: Arc<dyn FitnessContext> = Arc::new(Context::build(
        normalized_points.clone(),
        start_point,
        end_point,
        root_bounds,
        run_config.density_step_distance,
        run_config.quadtree_max_objects,
        run_config.quadtree_max_levels,
    )?);

    let pool = WorkerPool::new(run_config.threads);
    let mut exit_condition = ExitCondition::new(run_config.exit_repeats, EXIT_EPS);
    let population_path = run_config
        .input_population
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("population.csv"));

    let loaded_population = if run_config.input_population.is_some() {
        load_population_file(&population_path)?
    } else {
        HashMap::new()
    };

    let seed_dataset: Option<Vec<Point>> = match run_config.seed_dataset_id {
        Some(dataset_id) => {
            let mut dataset_points = db.load_points(Some(&sector.name), Some(dataset_id))?;
            normalize(&mut dataset_points, Some((bounds.min_x, bounds.min_y)));
            Some(dataset_points.iter().map(|p| Point::new(p.x_norm, p.y_norm)).collect())
        }
        None => None,
    };

    let mut rng = rand::thread_rng();
    let mut final_population_rows: Vec<PopulationRow> = Vec::new();

    for num_waypoints in run_config.min_waypoints..=run_config.max_waypoints {
        let shape = RouteShape::new(num_waypoints, max_x as u64, max_y as u64, start_point, end_point);

        let initial_population: Vec<Route> = if let Some(rows) = loaded_population.get(&num_waypoints) {
            rows.iter()
                .map(|row| Route::from_dna(shape, row.dna.clone()))
                .collect::<Result<Vec<_>>>()?
        } else if let Some(dataset) = &seed_dataset {
            #[cfg(feature = "parallel")]
            {
                seeded_population_parallel(shape, dataset, run_config.population_size)
            }
            #[cfg(not(feature = "parallel"))]
            {
                seeded_population(shape, dataset, run_config.population_size, &mut rng)
            }
        } else {
            (0..run_config.population_size)
                .map(|_| Route::random(shape, &mut rng))
                .collect()
        };

        log::debug!(
            "sector {}: built initial population of {} for {} waypoints",
            sector.name,
            initial_population.len(),
            num_waypoints
        );

        let sector_id = sector.name.clone();
        let result_sink = Arc::clone(result_sink);
        let bounds_copy = bounds;

        let final_population = optimizer::run(
            initial_population,
            &run_config.ga_config,
            Arc::clone(&context),
            &pool,
            &mut exit_condition,
            stats.as_ref(),
            &sector_id,
            num_waypoints,
            &mut rng,
            |iteration, best| {
                let polyline = best.decode(true);
                let fitness = best.fitness().unwrap_or(f64::INFINITY);
                let mut sink = result_sink.lock().unwrap();
                if let Err(err) = sink.update(
                    &sector_id,
                    num_waypoints,
                    iteration,
                    fitness,
                    best.dna(),
                    &polyline,
                    bounds_copy,
                    grid_zone,
                    projector,
                ) {
                    log::error!("sector {}: result sink write failed: {}", sector_id, err);
                }
            },
        );

        for route in &final_population {
            final_population_rows.push(PopulationRow {
                num_waypoints,
                population: final_population.len(),
                dna: route.dna().to_string(),
                max_x: shape.max_x,
                max_y: shape.max_y,
                start_point_lat: run_config.start_lat_lon.0,
                start_point_lon: run_config.start_lat_lon.1,
                end_point_lat: run_config.end_lat_lon.0,
                end_point_lon: run_config.end_lat_lon.1,
                fitness: route.fitness().unwrap_or(f64::INFINITY),
            });
        }
    }

    if let Err(err) = append_population_file(&population_path, &final_population_rows) {
        log::error!("sector {}: failed to append population file: {}", sector.name, err);
    }

    log::info!("finished sector runner for sector {}", sector.name);
    Ok(())
}

fn quadtree_root_bounds(points: &[Point], start: Point, end: Point, max_x: f64, max_y: f64) -> Rect {
    let mut min_x = start.x.min(end.x).min(0.0);
    let mut min_y = start.y.min(end.y).min(0.0);
    let mut max_x_bound = start.x.max(end.x).max(max_x);
    let mut max_y_bound = start.y.max(end.y).max(max_y);

    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x_bound = max_x_bound.max(p.x);
        max_y_bound = max_y_bound.max(p.y);
    }

    let mut rect = Rect::from_corners(
        Point::new(min_x, min_y),
        Point::new(max_x_bound, max_y_bound),
    );
    rect.expand(QUADTREE_MARGIN);
    rect
}

fn load_population_file(path: &std::path::Path) -> Result<HashMap<usize, Vec<PopulationRow>>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut by_waypoints: HashMap<usize, Vec<PopulationRow>> = HashMap::new();
    for record in reader.deserialize() {
        let row: PopulationRow = record?;
        by_waypoints.entry(row.num_waypoints).or_default().push(row);
    }
    Ok(by_waypoints)
}

fn append_population_file(path: &std::path::Path, rows: &[PopulationRow]) -> Result<()> {
    let write_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if write_header {
        writeln!(
            file,
            "num_waypoints,population,dna,max_x,max_y,start_point_lat,start_point_lon,end_point_lat,end_point_lon,fitness"
        )?;
    }
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{}",
            row.num_waypoints,
            row.population,
            row.dna,
            row.max_x,
            row.max_y,
            row.start_point_lat,
            row.start_point_lon,
            row.end_point_lat,
            row.end_point_lon,
            row.fitness
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn population_file_round_trips_through_append_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("population.csv");

        let rows = vec![PopulationRow {
            num_waypoints: 3,
            population: 1,
            dna: "010203040506".to_string(),
            max_x: 99,
            max_y: 99,
            start_point_lat: 1.0,
            start_point_lon: 2.0,
            end_point_lat: 3.0,
            end_point_lon: 4.0,
            fitness: 12.5,
        }];
        append_population_file(&path, &rows).unwrap();

        let loaded = load_population_file(&path).unwrap();
        let loaded_rows = &loaded[&3];
        assert_eq!(loaded_rows.len(), 1);
        assert_eq!(loaded_rows[0].dna, "010203040506");
        assert_eq!(loaded_rows[0].fitness, 12.5);
    }

    #[test]
    fn quadtree_root_bounds_contains_every_point_and_endpoint() {
        let points = vec![Point::new(5.0, 5.0), Point::new(-2.0, 20.0)];
        let start = Point::new(0.0, 0.0);
        let end = Point::new(10.0, 10.0);
        let rect = quadtree_root_bounds(&points, start, end, 12.0, 12.0);
        assert!(rect.contains_point(start));
        assert!(rect.contains_point(end));
        for p in &points {
            assert!(rect.contains_point(*p));
        }
    }
}
