//! Combined point-score + length-score + density-score fitness evaluation
//! over a decoded polyline.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::FitnessContext;
use crate::geometry::{point_segment_distance, Point};
use crate::route::Route;

/// Evaluates routes against a context, tracking the running minimum
/// polyline length the length-score normalizes against.
///
/// The source tracks this minimum as a process-wide global; this
/// implementation instead scopes it to one sector run, owned by whichever
/// `SectorRunner` constructs the evaluator, seeded from the first polyline
/// evaluated. `point_score` and `density_score` only read the shared
/// context, so every field a concurrent `update` call touches is this one
/// atomic — callers share a single evaluator across a worker pool without
/// serializing the rest of the scoring work behind a lock.
pub struct FitnessEvaluator {
    min_length_bits: AtomicU64,
}

impl Default for FitnessEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl FitnessEvaluator {
    pub fn new() -> Self {
        FitnessEvaluator {
            min_length_bits: AtomicU64::new(f64::INFINITY.to_bits()),
        }
    }

    /// Updates `route`'s cached fitness. Returns immediately without
    /// recomputing when `check_cache` is true and the cache is valid.
    pub fn update(&self, route: &mut Route, context: &dyn FitnessContext, check_cache: bool) {
        if check_cache && route.fitness().is_some() {
            return;
        }
        let polyline = route.decode(true);
        let fitness = self.evaluate(&polyline, context);
        route.set_fitness(fitness);
    }

    fn evaluate(&self, polyline: &[Point], context: &dyn FitnessContext) -> f64 {
        self.point_score(polyline, context)
            + self.length_score(polyline)
            + self.density_score(polyline, context)
    }

    /// Sum, over every context point, of its distance to the nearest
    /// polyline segment, normalized by point count.
    fn point_score(&self, polyline: &[Point], context: &dyn FitnessContext) -> f64 {
        let points = context.points();
        if points.is_empty() {
            return 0.0;
        }
        let total: f64 = points
            .iter()
            .map(|p| best_segment_distance(*p, polyline))
            .sum();
        total / points.len() as f64
    }

    /// `100 * length / min_length_seen`, seeding `min_length_seen` from the
    /// first polyline this evaluator ever scores.
    fn length_score(&self, polyline: &[Point]) -> f64 {
        let length = polyline_length(polyline);
        let min_length = self.record_length(length);
        if min_length <= 0.0 {
            return 0.0;
        }
        100.0 * length / min_length
    }

    /// Folds `length` into the running minimum with a lock-free
    /// compare-and-swap loop, returning the minimum after the update.
    fn record_length(&self, length: f64) -> f64 {
        let mut current_bits = self.min_length_bits.load(Ordering::Relaxed);
        loop {
            let current = f64::from_bits(current_bits);
            let candidate = current.min(length);
            if candidate == current {
                return current;
            }
            match self.min_length_bits.compare_exchange_weak(
                current_bits,
                candidate.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => current_bits = actual,
            }
        }
    }

    /// March along every segment in `step_distance` increments; at each
    /// step query the spatial index for coverage within `step_distance`.
    fn density_score(&self, polyline: &[Point], context: &dyn FitnessContext) -> f64 {
        let step_distance = context.step_distance();
        if step_distance <= 0.0 {
            return 0.0;
        }
        let mut total_steps: u64 = 0;
        let mut steps_with_points: u64 = 0;

        for window in polyline.windows(2) {
            let (a, b) = (window[0], window[1]);
            let segment_length = Point::distance(a, b);
            if segment_length <= 0.0 {
                continue;
            }
            let num_steps = (segment_length / step_distance).ceil().max(1.0) as u64;
            for step in 0..=num_steps {
                let t = (step as f64 / num_steps as f64).min(1.0);
                let position = Point::lerp(a, b, t);
                total_steps += 1;
                if !context.index().search(position, step_distance).is_empty() {
                    steps_with_points += 1;
                }
            }
        }

        if steps_with_points == 0 {
            return 100.0 * total_steps as f64;
        }
        100.0 * (total_steps as f64 / steps_with_points as f64)
    }
}

fn best_segment_distance(point: Point, polyline: &[Point]) -> f64 {
    polyline
        .windows(2)
        .map(|w| point_segment_distance(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

fn polyline_length(polyline: &[Point]) -> f64 {
    polyline
        .windows(2)
        .map(|w| Point::distance(w[0], w[1]))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::geometry::Rect;
    use crate::route::RouteShape;

    fn ctx_with_points(points: Vec<Point>) -> Context {
        Context::build(
            points,
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Rect::new(Point::new(-5.0, -5.0), 30.0, 30.0),
            1.0,
            5,
            5,
        )
        .unwrap()
    }

    #[test]
    fn degenerate_empty_context_yields_finite_score() {
        let ctx = ctx_with_points(vec![]);
        let shape = RouteShape::new(0, 10, 10, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let mut route = Route::from_dna(shape, String::new()).unwrap();
        let eval = FitnessEvaluator::new();
        eval.update(&mut route, &ctx, false);
        assert!(route.fitness().unwrap().is_finite());
    }

    #[test]
    fn update_skips_recompute_when_cache_is_valid() {
        let ctx = ctx_with_points(vec![Point::new(5.0, 0.0)]);
        let shape = RouteShape::new(0, 10, 10, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let mut route = Route::from_dna(shape, String::new()).unwrap();
        let eval = FitnessEvaluator::new();
        eval.update(&mut route, &ctx, false);
        route.set_fitness(1234.5);
        eval.update(&mut route, &ctx, true);
        assert_eq!(route.fitness(), Some(1234.5));
    }

    #[test]
    fn first_evaluation_seeds_min_length_so_length_score_is_100() {
        let ctx = ctx_with_points(vec![Point::new(5.0, 0.0)]);
        let shape = RouteShape::new(0, 10, 10, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let mut route = Route::from_dna(shape, String::new()).unwrap();
        let eval = FitnessEvaluator::new();
        let score = eval.length_score(&route.decode(true));
        assert!((score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn density_score_denominator_is_seeded_at_one_not_zero() {
        let ctx = ctx_with_points(vec![]);
        let shape = RouteShape::new(0, 10, 10, Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        let route = Route::from_dna(shape, String::new()).unwrap();
        let eval = FitnessEvaluator::new();
        let score = eval.density_score(&route.decode(true), &ctx);
        assert!(score.is_finite());
        assert!(score > 0.0);
    }

    #[test]
    fn record_length_converges_to_the_true_minimum_under_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let eval = Arc::new(FitnessEvaluator::new());
        let lengths: Vec<f64> = (1..=50).map(|n| n as f64).collect();
        let handles: Vec<_> = lengths
            .into_iter()
            .map(|length| {
                let eval = Arc::clone(&eval);
                thread::spawn(move || eval.record_length(length))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(eval.record_length(f64::INFINITY), 1.0);
    }
}
