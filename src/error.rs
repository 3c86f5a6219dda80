//! Unified error handling for polytrace.
//!
//! One error enum covers every fallible boundary described in the error
//! handling design: CLI/config validation, the point database, dna
//! encoding, the quadtree, coordinate projection, and file I/O.

use std::fmt;

use crate::geometry::Point;

/// Unified error type for polytrace operations.
#[derive(Debug, Clone)]
pub enum PolytraceError {
    /// Invalid or missing CLI argument, out-of-range rate, nonexistent
    /// database path.
    Config { message: String },
    /// Point database open or query failure.
    Database { message: String },
    /// Route dna has the wrong length or a non-digit character.
    Encoding { message: String },
    /// Quadtree insertion fell outside the root bounds.
    OutOfBounds { point: Point },
    /// Coordinate transform failed; the offending point passes through
    /// unchanged at the call site.
    Projection { message: String },
    /// Stats/population/KML file could not be opened or written.
    Io { message: String },
}

impl fmt::Display for PolytraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolytraceError::Config { message } => write!(f, "configuration error: {}", message),
            PolytraceError::Database { message } => write!(f, "database error: {}", message),
            PolytraceError::Encoding { message } => write!(f, "encoding error: {}", message),
            PolytraceError::OutOfBounds { point } => {
                write!(f, "point ({}, {}) is outside the spatial index bounds", point.x, point.y)
            }
            PolytraceError::Projection { message } => write!(f, "projection error: {}", message),
            PolytraceError::Io { message } => write!(f, "I/O error: {}", message),
        }
    }
}

impl std::error::Error for PolytraceError {}

impl From<rusqlite::Error> for PolytraceError {
    fn from(err: rusqlite::Error) -> Self {
        PolytraceError::Database {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for PolytraceError {
    fn from(err: std::io::Error) -> Self {
        PolytraceError::Io {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for PolytraceError {
    fn from(err: csv::Error) -> Self {
        PolytraceError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type alias for polytrace operations.
pub type Result<T> = std::result::Result<T, PolytraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_offending_point() {
        let err = PolytraceError::OutOfBounds {
            point: Point::new(3.0, 4.0),
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains('4'));
    }

    #[test]
    fn database_error_wraps_rusqlite() {
        let sqlite_err = rusqlite::Error::QueryReturnedNoRows;
        let err: PolytraceError = sqlite_err.into();
        assert!(matches!(err, PolytraceError::Database { .. }));
    }
}
