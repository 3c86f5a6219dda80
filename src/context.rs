//! Per-sector immutable context shared by every fitness evaluation for that
//! sector.
//!
//! The source threads an opaque context pointer through the optimizer; here
//! that becomes a small capability trait implemented by one concrete,
//! read-only struct built once per sector run.

use crate::error::Result;
use crate::geometry::{Point, Rect};
use crate::quadtree::QuadTree;

/// Read-only view a fitness evaluator needs of its sector: the observed
/// point cloud, a spatial index over it, and the density-scan step size.
///
/// `Send + Sync` so the optimizer can share one context across every
/// worker-pool fitness job for a generation.
pub trait FitnessContext: Send + Sync {
    fn points(&self) -> &[Point];
    fn index(&self) -> &QuadTree;
    fn step_distance(&self) -> f64;
    fn start(&self) -> Point;
    fn end(&self) -> Point;
}

/// Concrete per-sector context: normalized point cloud, bulk-built spatial
/// index, endpoints, and the density march step. Built once per sector run
/// and never mutated afterward.
pub struct Context {
    points: Vec<Point>,
    index: QuadTree,
    start: Point,
    end: Point,
    density_step_distance: f64,
}

impl Context {
    /// `max_objects`/`max_levels` tune the quadtree; `bounds` should
    /// comfortably contain every point in `points`.
    pub fn build(
        points: Vec<Point>,
        start: Point,
        end: Point,
        bounds: Rect,
        density_step_distance: f64,
        max_objects: usize,
        max_levels: usize,
    ) -> Result<Self> {
        let mut index = QuadTree::new(bounds, max_objects, max_levels);
        for (id, point) in points.iter().enumerate() {
            index.insert(id, *point)?;
        }
        Ok(Context {
            points,
            index,
            start,
            end,
            density_step_distance,
        })
    }
}

impl FitnessContext for Context {
    fn points(&self) -> &[Point] {
        &self.points
    }

    fn index(&self) -> &QuadTree {
        &self.index
    }

    fn step_distance(&self) -> f64 {
        self.density_step_distance
    }

    fn start(&self) -> Point {
        self.start
    }

    fn end(&self) -> Point {
        self.end
    }
}
