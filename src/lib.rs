//! # polytrace
//!
//! Evolutionary polyline route discovery over clouds of recorded GPS
//! samples.
//!
//! Given a large collection of georeferenced points partitioned into named
//! sectors, each with a fixed start and end coordinate, this crate searches
//! — per sector and per target waypoint count K — for an ordered sequence
//! of K intermediate vertices that best fits the underlying observed
//! traces. Fitness rewards routes that stay close to observed points,
//! maximize coverage density along each segment, and minimize total
//! length.
//!
//! The core is a generational genetic optimizer ([`optimizer`]) over a
//! fixed-width decimal-digit-string route phenotype ([`route`]), scored by
//! a geometric fitness function ([`fitness`]) backed by a bulk-loaded
//! quadtree ([`quadtree`]). [`sector_runner`] coordinates one such search
//! per sector, loading points from [`db`], projecting coordinates through
//! [`projection`], and emitting results through [`result_sink`].

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod exit_condition;
pub mod fitness;
pub mod geometry;
pub mod optimizer;
pub mod projection;
pub mod quadtree;
pub mod result_sink;
pub mod route;
pub mod sector_runner;
pub mod seed;
pub mod stats;
pub mod worker_pool;

pub use error::{PolytraceError, Result};
