//! CLI parsing and the derived run configuration.
//!
//! Replaces the original `Options.cpp`'s hand-rolled `deque<string>`
//! parsing loop with `clap`'s derive API; `GaConfig`/`RunConfig` are plain
//! structs built from the parsed `Cli`, with no separate file-based config
//! format.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{PolytraceError, Result};
use crate::optimizer::GaConfig;

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "polytrace", about = "Evolutionary polyline route discovery over recorded GPS samples")]
pub struct Cli {
    /// Point database location.
    #[arg(short = 'd', long = "db")]
    pub database_path: PathBuf,

    /// Start coordinate latitude.
    #[arg(long = "start-lat")]
    pub start_lat: f64,
    /// Start coordinate longitude.
    #[arg(long = "start-lon")]
    pub start_lon: f64,
    /// End coordinate latitude.
    #[arg(long = "end-lat")]
    pub end_lat: f64,
    /// End coordinate longitude.
    #[arg(long = "end-lon")]
    pub end_lon: f64,

    /// Limit the run to one sector.
    #[arg(long = "sector")]
    pub sector: Option<String>,

    /// EPSG code used for lat/lon <-> UTM projection.
    #[arg(long = "epsg", default_value_t = 32613)]
    pub epsg_code: u32,

    /// Population size (P).
    #[arg(long = "population", default_value_t = 2000)]
    pub population_size: usize,

    /// Minimum waypoint count (K range lower bound).
    #[arg(long = "min-waypoints", default_value_t = 8)]
    pub min_waypoints: usize,
    /// Maximum waypoint count (K range upper bound).
    #[arg(long = "max-waypoints", default_value_t = 14)]
    pub max_waypoints: usize,

    /// Per-K generation cap.
    #[arg(long = "max-iterations", default_value_t = 500)]
    pub max_iterations: usize,

    /// Early-exit consecutive-match count. Defaults to 10% of `max_iterations`.
    #[arg(long = "exit-repeats")]
    pub exit_repeats: Option<usize>,

    /// Preservation rate (rho_p).
    #[arg(long = "preservation-rate", default_value_t = 0.05)]
    pub preservation_rate: f64,
    /// Selection rate (rho_s).
    #[arg(long = "selection-rate", default_value_t = 0.4)]
    pub selection_rate: f64,
    /// Mutation rate (rho_m).
    #[arg(long = "mutation-rate", default_value_t = 0.8)]
    pub mutation_rate: f64,
    /// Random-vertex rate. Accepted for external-interface parity with the
    /// original's `Options::random_vert_rate`; the duplicate-repair
    /// probability stays a fixed 1/3 rather than being driven by this flag,
    /// since the original itself never wired this field into its GA either.
    #[arg(long = "random-vertex-rate", default_value_t = 0.05)]
    pub random_vertex_rate: f64,

    /// Worker pool thread count.
    #[arg(long = "threads", default_value_t = 10)]
    pub threads: usize,

    /// Base path for `<path>.iteration.csv` / `<path>.duplicates.csv`.
    #[arg(long = "stats-path", default_value = "./ga_run_stats")]
    pub stats_path: String,

    /// Resume from a prior final population CSV.
    #[arg(long = "input-population")]
    pub input_population: Option<PathBuf>,

    /// Seed the initial population from a historical dataset id (-1 = off).
    #[arg(long = "seed-dataset", default_value_t = -1)]
    pub seed_dataset_id: i64,

    /// Quadtree bulk-load tuning: max objects stored per node before it splits.
    #[arg(long = "quadtree-max-objects", default_value_t = 8)]
    pub quadtree_max_objects: usize,
    /// Quadtree bulk-load tuning: max recursion depth.
    #[arg(long = "quadtree-max-levels", default_value_t = 8)]
    pub quadtree_max_levels: usize,

    /// March length for the density-score spatial-coverage scan.
    #[arg(long = "density-step-distance", default_value_t = 10.0)]
    pub density_step_distance: f64,
}

/// Fully validated, derived run configuration handed to the top-level
/// orchestration.
pub struct RunConfig {
    pub database_path: PathBuf,
    pub start_lat_lon: (f64, f64),
    pub end_lat_lon: (f64, f64),
    pub sector_filter: Option<String>,
    pub epsg_code: u32,
    pub population_size: usize,
    pub min_waypoints: usize,
    pub max_waypoints: usize,
    pub exit_repeats: usize,
    pub ga_config: GaConfig,
    pub random_vertex_rate: f64,
    pub threads: usize,
    pub stats_path: String,
    pub input_population: Option<PathBuf>,
    pub seed_dataset_id: Option<i64>,
    pub quadtree_max_objects: usize,
    pub quadtree_max_levels: usize,
    pub density_step_distance: f64,
}

impl RunConfig {
    /// Validates and derives a `RunConfig` from parsed CLI arguments. Any
    /// out-of-range rate or nonexistent database path is a `ConfigError`.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if !cli.database_path.exists() {
            return Err(PolytraceError::Config {
                message: format!("database path does not exist: {}", cli.database_path.display()),
            });
        }

        for (name, rate) in [
            ("preservation-rate", cli.preservation_rate),
            ("selection-rate", cli.selection_rate),
            ("mutation-rate", cli.mutation_rate),
            ("random-vertex-rate", cli.random_vertex_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(PolytraceError::Config {
                    message: format!("{} must be in [0, 1], got {}", name, rate),
                });
            }
        }

        if cli.min_waypoints == 0 || cli.min_waypoints > cli.max_waypoints {
            return Err(PolytraceError::Config {
                message: format!(
                    "min-waypoints ({}) must be >= 1 and <= max-waypoints ({})",
                    cli.min_waypoints, cli.max_waypoints
                ),
            });
        }

        if cli.population_size == 0 {
            return Err(PolytraceError::Config {
                message: "population must be greater than zero".to_string(),
            });
        }

        if cli.threads == 0 {
            return Err(PolytraceError::Config {
                message: "threads must be greater than zero".to_string(),
            });
        }

        let exit_repeats = cli
            .exit_repeats
            .unwrap_or_else(|| ((0.1 * cli.max_iterations as f64) as usize).max(1));

        Ok(RunConfig {
            database_path: cli.database_path,
            start_lat_lon: (cli.start_lat, cli.start_lon),
            end_lat_lon: (cli.end_lat, cli.end_lon),
            sector_filter: cli.sector,
            epsg_code: cli.epsg_code,
            population_size: cli.population_size,
            min_waypoints: cli.min_waypoints,
            max_waypoints: cli.max_waypoints,
            exit_repeats,
            ga_config: GaConfig {
                preservation_rate: cli.preservation_rate,
                selection_rate: cli.selection_rate,
                mutation_rate: cli.mutation_rate,
                max_iterations: cli.max_iterations,
            },
            random_vertex_rate: cli.random_vertex_rate,
            threads: cli.threads,
            stats_path: cli.stats_path,
            input_population: cli.input_population,
            seed_dataset_id: if cli.seed_dataset_id >= 0 {
                Some(cli.seed_dataset_id)
            } else {
                None
            },
            quadtree_max_objects: cli.quadtree_max_objects,
            quadtree_max_levels: cli.quadtree_max_levels,
            density_step_distance: cli.density_step_distance,
        })
    }
}
