//! Geodesic projection: UTM↔lat/lon conversion behind a small `Projector`
//! interface, matching the source's `OGRCoordinateTransformation` wrapper
//! but implemented against the pure-Rust `utm` crate instead of GDAL.

use crate::error::PolytraceError;
use crate::geometry::Point;

/// Direction-specific coordinate transform. Implementations are expected to
/// be safe to call concurrently (blocking, no shared mutable state).
pub trait Projector: Send + Sync {
    /// `(easting, northing)` in the configured UTM zone -> `(latitude, longitude)`.
    fn to_lat_lon(&self, point: Point) -> Point;
    /// `(latitude, longitude)` -> `(easting, northing)` in the configured UTM zone.
    fn to_utm(&self, point: Point) -> Point;
}

/// A `Projector` for one EPSG UTM zone code (e.g. 32613 = UTM zone 13N,
/// WGS84).
pub struct UtmProjector {
    zone: u8,
    northern: bool,
    epsg_code: u32,
}

impl UtmProjector {
    pub fn new(epsg_code: u32) -> crate::error::Result<Self> {
        let (zone, northern) = epsg_to_utm_zone(epsg_code)?;
        Ok(UtmProjector {
            zone,
            northern,
            epsg_code,
        })
    }

    pub fn epsg_code(&self) -> u32 {
        self.epsg_code
    }
}

impl Projector for UtmProjector {
    fn to_lat_lon(&self, point: Point) -> Point {
        match utm::wsg84_utm_to_lat_lon(point.x, point.y, self.zone, self.northern) {
            Ok((lat, lon)) => Point::new(lat, lon),
            Err(message) => {
                log::error!(
                    "projection failed for ({}, {}) in zone {}: {}",
                    point.x,
                    point.y,
                    self.zone,
                    message
                );
                point
            }
        }
    }

    fn to_utm(&self, point: Point) -> Point {
        let (northing, easting, _meridian_convergence) = utm::to_utm_wgs84(point.x, point.y, self.zone);
        Point::new(easting, northing)
    }
}

/// EPSG code -> (UTM zone number, northern hemisphere). Covers the WGS84
/// UTM ranges: 326xx (north), 327xx (south).
fn epsg_to_utm_zone(epsg_code: u32) -> crate::error::Result<(u8, bool)> {
    if (32601..=32660).contains(&epsg_code) {
        Ok(((epsg_code - 32600) as u8, true))
    } else if (32701..=32760).contains(&epsg_code) {
        Ok(((epsg_code - 32700) as u8, false))
    } else {
        Err(PolytraceError::Config {
            message: format!("unsupported EPSG code for UTM projection: {}", epsg_code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn epsg_code_resolves_to_expected_zone_and_hemisphere() {
        let (zone, north) = epsg_to_utm_zone(32613).unwrap();
        assert_eq!(zone, 13);
        assert!(north);

        let (zone, north) = epsg_to_utm_zone(32733).unwrap();
        assert_eq!(zone, 33);
        assert!(!north);
    }

    #[test]
    fn unsupported_epsg_code_is_a_config_error() {
        let result = epsg_to_utm_zone(4326);
        assert!(matches!(result, Err(PolytraceError::Config { .. })));
    }

    #[test]
    fn dd_to_utm_to_dd_round_trips_within_tolerance() {
        let projector = UtmProjector::new(32613).unwrap();
        let original = Point::new(39.7392, -104.9903);
        let utm = projector.to_utm(original);
        let back = projector.to_lat_lon(utm);
        assert_abs_diff_eq!(back.x, original.x, epsilon = 1e-3);
        assert_abs_diff_eq!(back.y, original.y, epsilon = 1e-3);
    }
}
