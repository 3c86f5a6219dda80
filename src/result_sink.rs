//! Result sink: CSV/KML materialization of best routes, de-normalized and
//! re-projected back to lat/lon.
//!
//! Grounded on `original_source/cpp/src/Write_Worker.hpp`/`.cpp` and
//! `KML_Writer.hpp`/`.cpp`: the master vertex list is a nested map keyed by
//! sector, then waypoint count, then iteration, and both output files are
//! rewritten in full on every update.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;

use crate::db::NormalizationBounds;
use crate::error::Result;
use crate::geometry::Point;
use crate::projection::Projector;

/// One re-projected vertex of a best route, ready for CSV/KML emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultPoint {
    pub grid_zone: i32,
    pub easting: f64,
    pub northing: f64,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone)]
struct RouteResult {
    fitness: f64,
    dna: String,
    points: Vec<ResultPoint>,
}

/// Consumer of per-generation optimizer results. Implementations decide how
/// (and whether) to materialize a sector's current best route.
pub trait ResultSink {
    #[allow(clippy::too_many_arguments)]
    fn update(
        &mut self,
        sector_id: &str,
        num_waypoints: usize,
        iteration: usize,
        fitness: f64,
        dna: &str,
        normalized_polyline: &[Point],
        bounds: NormalizationBounds,
        grid_zone: i32,
        projector: &dyn Projector,
    ) -> Result<()>;
}

/// Rewrites `waypoints.csv` and `waypoints.kml` in full on every [`update`]
/// call. This can be expensive for very large runs; streaming placemarks or
/// gating on iteration cadence would reduce that cost, but full rewrite on
/// every update is what's implemented here.
///
/// [`update`]: ResultSink::update
pub struct CsvKmlResultSink {
    csv_path: String,
    kml_path: String,
    // sector -> num_waypoints -> iteration -> route result
    data: BTreeMap<String, BTreeMap<usize, BTreeMap<usize, RouteResult>>>,
}

impl CsvKmlResultSink {
    pub fn new(csv_path: impl Into<String>, kml_path: impl Into<String>) -> Self {
        CsvKmlResultSink {
            csv_path: csv_path.into(),
            kml_path: kml_path.into(),
            data: BTreeMap::new(),
        }
    }

    fn write_csv(&self) -> Result<()> {
        let mut file = File::create(&self.csv_path)?;
        writeln!(
            file,
            "SectorId,NumWaypoints,Iteration,Fitness,GridZone,Easting,Northing,Latitude,Longitude,DNA"
        )?;
        for (sector_id, by_waypoints) in &self.data {
            for (num_waypoints, by_iteration) in by_waypoints {
                for (iteration, route) in by_iteration {
                    for point in &route.points {
                        writeln!(
                            file,
                            "{},{},{},{},{},{},{},{},{},{}",
                            sector_id,
                            num_waypoints,
                            iteration,
                            route.fitness,
                            point.grid_zone,
                            point.easting,
                            point.northing,
                            point.latitude,
                            point.longitude,
                            route.dna
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    fn write_kml(&self) -> Result<()> {
        let mut file = File::create(&self.kml_path)?;
        writeln!(file, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
        writeln!(file, "<kml xmlns=\"http://www.opengis.net/kml/2.2\">")?;
        writeln!(file, "  <Document>")?;
        writeln!(file, "    <name>Waypoint List</name>")?;
        writeln!(
            file,
            "    <Style id=\"thickLine\"><LineStyle><width>2.5</width></LineStyle></Style>"
        )?;
        for (sector_id, by_waypoints) in &self.data {
            writeln!(file, "    <Folder>")?;
            writeln!(file, "      <name>{}</name>", sector_id)?;
            for (num_waypoints, by_iteration) in by_waypoints {
                for (iteration, route) in by_iteration {
                    writeln!(file, "      <Placemark>")?;
                    writeln!(
                        file,
                        "        <name>{} waypoints={} iteration={}</name>",
                        sector_id, num_waypoints, iteration
                    )?;
                    write!(file, "        <LineString><coordinates>")?;
                    for point in &route.points {
                        write!(file, "{},{},0 ", point.longitude, point.latitude)?;
                    }
                    writeln!(file, "</coordinates></LineString>")?;
                    writeln!(file, "        <styleUrl>#thickLine</styleUrl>")?;
                    writeln!(file, "      </Placemark>")?;
                }
            }
            writeln!(file, "    </Folder>")?;
        }
        writeln!(file, "  </Document>")?;
        writeln!(file, "</kml>")?;
        Ok(())
    }
}

impl ResultSink for CsvKmlResultSink {
    fn update(
        &mut self,
        sector_id: &str,
        num_waypoints: usize,
        iteration: usize,
        fitness: f64,
        dna: &str,
        normalized_polyline: &[Point],
        bounds: NormalizationBounds,
        grid_zone: i32,
        projector: &dyn Projector,
    ) -> Result<()> {
        let points: Vec<ResultPoint> = normalized_polyline
            .iter()
            .map(|p| {
                let easting = p.x + bounds.min_x;
                let northing = p.y + bounds.min_y;
                let lla = projector.to_lat_lon(Point::new(easting, northing));
                ResultPoint {
                    grid_zone,
                    easting,
                    northing,
                    latitude: lla.x,
                    longitude: lla.y,
                }
            })
            .collect();

        self.data
            .entry(sector_id.to_string())
            .or_default()
            .entry(num_waypoints)
            .or_default()
            .insert(
                iteration,
                RouteResult {
                    fitness,
                    dna: dna.to_string(),
                    points,
                },
            );

        self.write_csv()?;
        self.write_kml()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::Projector as _;
    use tempfile::tempdir;

    struct IdentityProjector;
    impl Projector for IdentityProjector {
        fn to_lat_lon(&self, point: Point) -> Point {
            Point::new(point.x / 100_000.0, point.y / 100_000.0)
        }
        fn to_utm(&self, point: Point) -> Point {
            Point::new(point.x * 100_000.0, point.y * 100_000.0)
        }
    }

    #[test]
    fn update_rewrites_both_files_with_headers() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("waypoints.csv");
        let kml_path = dir.path().join("waypoints.kml");
        let mut sink = CsvKmlResultSink::new(
            csv_path.to_str().unwrap().to_string(),
            kml_path.to_str().unwrap().to_string(),
        );

        let bounds = NormalizationBounds {
            min_x: 100.0,
            min_y: 200.0,
            max_x: 900.0,
            max_y: 900.0,
        };
        sink.update(
            "sector-a",
            3,
            0,
            42.5,
            "0102030405",
            &[Point::new(0.0, 0.0), Point::new(10.0, 10.0)],
            bounds,
            13,
            &IdentityProjector,
        )
        .unwrap();

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.starts_with("SectorId,NumWaypoints,Iteration,Fitness,GridZone,Easting,Northing,Latitude,Longitude,DNA"));
        assert!(csv.contains("sector-a,3,0,42.5,13,100,200"));

        let kml = std::fs::read_to_string(&kml_path).unwrap();
        assert!(kml.contains("<kml xmlns=\"http://www.opengis.net/kml/2.2\">"));
        assert!(kml.contains("#thickLine"));
        assert!(kml.contains("sector-a"));
    }

    #[test]
    fn later_update_for_same_key_overwrites_prior_iteration_entry() {
        let dir = tempdir().unwrap();
        let mut sink = CsvKmlResultSink::new(
            dir.path().join("waypoints.csv").to_str().unwrap().to_string(),
            dir.path().join("waypoints.kml").to_str().unwrap().to_string(),
        );
        let bounds = NormalizationBounds {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 10.0,
        };
        sink.update(
            "s",
            3,
            0,
            10.0,
            "a",
            &[Point::new(0.0, 0.0)],
            bounds,
            13,
            &IdentityProjector,
        )
        .unwrap();
        sink.update(
            "s",
            3,
            0,
            5.0,
            "b",
            &[Point::new(0.0, 0.0)],
            bounds,
            13,
            &IdentityProjector,
        )
        .unwrap();
        assert_eq!(sink.data["s"][&3].len(), 1);
        assert_eq!(sink.data["s"][&3][&0].fitness, 5.0);
    }
}
