//! The point database: `DatabasePoint`/`Sector` data model, normalization,
//! and a loader interface backed by SQLite.

use rusqlite::Connection;

use crate::error::Result;

/// A recorded GPS sample, as stored in `point_list`, plus the transient
/// normalized coordinates assigned by [`normalize`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatabasePoint {
    pub index: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub grid_zone: i32,
    pub easting: f64,
    pub northing: f64,
    pub timestamp: String,
    pub sector_id: String,
    pub dataset_id: String,
    pub x_norm: f64,
    pub y_norm: f64,
}

/// A named sector: a start/end `DatabasePoint` pair.
#[derive(Debug, Clone)]
pub struct Sector {
    pub name: String,
    pub start: DatabasePoint,
    pub end: DatabasePoint,
}

/// Result of [`normalize`]: the chosen origin and the observed extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Shifts every point's (easting, northing) by the bounding box minimum
/// (or a caller-supplied origin), assigning `x_norm`/`y_norm` in place.
///
/// Returns `(min_x, min_y, max_x, max_y)` so the result sink can invert the
/// mapping later.
pub fn normalize(
    points: &mut [DatabasePoint],
    origin: Option<(f64, f64)>,
) -> Option<NormalizationBounds> {
    let first = points.first()?;
    let mut min_x = first.easting;
    let mut min_y = first.northing;
    let mut max_x = first.easting;
    let mut max_y = first.northing;

    for p in points.iter() {
        min_x = min_x.min(p.easting);
        min_y = min_y.min(p.northing);
        max_x = max_x.max(p.easting);
        max_y = max_y.max(p.northing);
    }

    if let Some((ox, oy)) = origin {
        min_x = ox;
        min_y = oy;
    }

    for p in points.iter_mut() {
        p.x_norm = p.easting - min_x;
        p.y_norm = p.northing - min_y;
    }

    Some(NormalizationBounds {
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

/// The read-only loader interface the sector runner depends on. Allows the
/// SQLite-backed implementation to be swapped for a fixture in tests.
pub trait PointDatabase {
    fn load_sectors(&self) -> Result<Vec<Sector>>;
    fn load_points(&self, sector_id: Option<&str>, dataset_id: Option<i64>) -> Result<Vec<DatabasePoint>>;
}

/// SQLite-backed point database matching the `sector_list`,
/// `sector_point_list`, and `point_list` schema.
pub struct SqlitePointDatabase {
    connection: Connection,
}

impl SqlitePointDatabase {
    pub fn open(path: &str) -> Result<Self> {
        let connection = Connection::open(path)?;
        log::info!("opened point database {}", path);
        Ok(SqlitePointDatabase { connection })
    }
}

impl PointDatabase for SqlitePointDatabase {
    fn load_sectors(&self) -> Result<Vec<Sector>> {
        let mut stmt = self.connection.prepare(
            "SELECT sectorId, startLatitude, startLongitude, startEasting, startNorthing, \
             stopLatitude, stopLongitude, stopEasting, stopNorthing FROM sector_point_list",
        )?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let start = DatabasePoint {
                index: 0,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                grid_zone: 0,
                easting: row.get(3)?,
                northing: row.get(4)?,
                timestamp: String::new(),
                sector_id: name.clone(),
                dataset_id: String::new(),
                x_norm: 0.0,
                y_norm: 0.0,
            };
            let end = DatabasePoint {
                index: 0,
                latitude: row.get(5)?,
                longitude: row.get(6)?,
                grid_zone: 0,
                easting: row.get(7)?,
                northing: row.get(8)?,
                timestamp: String::new(),
                sector_id: name.clone(),
                dataset_id: String::new(),
                x_norm: 0.0,
                y_norm: 0.0,
            };
            Ok(Sector { name, start, end })
        })?;

        let mut sectors = Vec::new();
        for row in rows {
            sectors.push(row?);
        }
        Ok(sectors)
    }

    fn load_points(&self, sector_id: Option<&str>, dataset_id: Option<i64>) -> Result<Vec<DatabasePoint>> {
        let mut sql = "SELECT \"index\", latitude, longitude, gridZone, easting, northing, \
                        timestamp, sectorId, datasetId FROM point_list"
            .to_string();
        let mut clauses = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(sector_id) = sector_id {
            clauses.push("sectorId = ?".to_string());
            params.push(Box::new(sector_id.to_string()));
        }
        if let Some(dataset_id) = dataset_id {
            clauses.push("datasetId = ?".to_string());
            params.push(Box::new(dataset_id.to_string()));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY timestamp");

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = self.connection.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok(DatabasePoint {
                index: row.get(0)?,
                latitude: row.get(1)?,
                longitude: row.get(2)?,
                grid_zone: row.get(3)?,
                easting: row.get(4)?,
                northing: row.get(5)?,
                timestamp: row.get(6)?,
                sector_id: row.get(7)?,
                dataset_id: row.get(8)?,
                x_norm: 0.0,
                y_norm: 0.0,
            })
        })?;

        let mut points = Vec::new();
        for row in rows {
            points.push(row?);
        }
        log::debug!("loaded {} points ({})", points.len(), sql);
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point(easting: f64, northing: f64) -> DatabasePoint {
        DatabasePoint {
            index: 0,
            latitude: 0.0,
            longitude: 0.0,
            grid_zone: 13,
            easting,
            northing,
            timestamp: "0".to_string(),
            sector_id: "s".to_string(),
            dataset_id: "0".to_string(),
            x_norm: 0.0,
            y_norm: 0.0,
        }
    }

    #[test]
    fn normalize_shifts_bounding_box_minimum_to_origin() {
        let mut points = vec![sample_point(100.0, 200.0), sample_point(150.0, 250.0)];
        let bounds = normalize(&mut points, None).unwrap();
        assert_eq!(bounds.min_x, 100.0);
        assert_eq!(bounds.min_y, 200.0);
        assert_eq!(points[0].x_norm, 0.0);
        assert_eq!(points[0].y_norm, 0.0);
        assert_eq!(points[1].x_norm, 50.0);
        assert_eq!(points[1].y_norm, 50.0);
    }

    #[test]
    fn normalize_honors_a_supplied_origin() {
        let mut points = vec![sample_point(100.0, 200.0)];
        let bounds = normalize(&mut points, Some((90.0, 190.0))).unwrap();
        assert_eq!(bounds.min_x, 90.0);
        assert_eq!(points[0].x_norm, 10.0);
        assert_eq!(points[0].y_norm, 10.0);
    }

    #[test]
    fn normalize_of_empty_slice_is_none() {
        let mut points: Vec<DatabasePoint> = vec![];
        assert!(normalize(&mut points, None).is_none());
    }

    #[test]
    fn sqlite_loader_round_trips_a_fixture_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fixture.sqlite3");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE sector_point_list (
                sectorId TEXT, startLatitude REAL, startLongitude REAL,
                startEasting REAL, startNorthing REAL,
                stopLatitude REAL, stopLongitude REAL,
                stopEasting REAL, stopNorthing REAL
            );
            INSERT INTO sector_point_list VALUES ('alpha', 1.0, 2.0, 100.0, 200.0, 3.0, 4.0, 300.0, 400.0);

            CREATE TABLE point_list (
                \"index\" INTEGER, latitude REAL, longitude REAL, gridZone INTEGER,
                easting REAL, northing REAL, timestamp TEXT, sectorId TEXT, datasetId TEXT
            );
            INSERT INTO point_list VALUES (0, 1.1, 2.1, 13, 110.0, 210.0, '1', 'alpha', '0');
            INSERT INTO point_list VALUES (1, 1.2, 2.2, 13, 120.0, 220.0, '2', 'alpha', '0');
            ",
        )
        .unwrap();
        drop(conn);

        let db = SqlitePointDatabase::open(db_path.to_str().unwrap()).unwrap();
        let sectors = db.load_sectors().unwrap();
        assert_eq!(sectors.len(), 1);
        assert_eq!(sectors[0].name, "alpha");

        let points = db.load_points(Some("alpha"), None).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].sector_id, "alpha");
    }
}
