//! Generational genetic optimizer: crossover, mutation, duplicate repair,
//! and a two-pass fitness evaluation dispatched across a worker pool.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use rand::Rng;

use crate::context::FitnessContext;
use crate::exit_condition::ExitCondition;
use crate::fitness::FitnessEvaluator;
use crate::route::Route;
use crate::stats::StatsAggregator;
use crate::worker_pool::WorkerPool;

/// Population-shape-independent GA tuning: preservation/selection/mutation
/// rates and the generation budget. Thread count lives on the `WorkerPool`
/// the caller constructs separately.
#[derive(Debug, Clone, Copy)]
pub struct GaConfig {
    pub preservation_rate: f64,
    pub selection_rate: f64,
    pub mutation_rate: f64,
    pub max_iterations: usize,
}

impl Default for GaConfig {
    fn default() -> Self {
        GaConfig {
            preservation_rate: 0.05,
            selection_rate: 0.4,
            mutation_rate: 0.8,
            max_iterations: 500,
        }
    }
}

/// Probability a duplicate slot is fully randomized rather than having its
/// vertex order shuffled from a donor.
const RANDOMIZE_PROBABILITY: f64 = 1.0 / 3.0;

/// Runs the generation loop to completion or early exit, returning the
/// final population sorted ascending by fitness (best first).
///
/// `result_emit` is invoked once per generation with `(iteration, best)`,
/// mirroring the original's `Write_Worker` callback, generalized here as a
/// plain closure argument rather than a stored callback field.
#[allow(clippy::too_many_arguments)]
pub fn run(
    mut population: Vec<Route>,
    config: &GaConfig,
    context: Arc<dyn FitnessContext>,
    pool: &WorkerPool,
    exit_condition: &mut ExitCondition,
    stats: &StatsAggregator,
    sector_id: &str,
    num_waypoints: usize,
    rng: &mut impl Rng,
    mut result_emit: impl FnMut(usize, &Route),
) -> Vec<Route> {
    let population_size = population.len();
    let preservation_size = (config.preservation_rate * population_size as f64) as usize;
    let preservation_size = preservation_size.max(1).min(population_size);
    let selection_size = ((config.selection_rate * population_size as f64) as usize)
        .min(population_size.saturating_sub(preservation_size));
    let mutation_size = (config.mutation_rate * population_size as f64) as usize;
    let selection_stop = preservation_size + selection_size;

    log::debug!(
        "selection_size: {}, preservation_size: {}, mutation_size: {}",
        selection_size,
        preservation_size,
        mutation_size
    );

    let evaluator = Arc::new(FitnessEvaluator::new());

    for iteration in 0..config.max_iterations {
        log::debug!("starting iteration {} of {}", iteration, config.max_iterations);
        let iteration_start = Instant::now();

        // 1. Crossover fills [selection_stop, population_size).
        for slot in selection_stop..population_size {
            let (idx1, idx2) = distinct_parent_indices(selection_stop, rng);
            population[slot] = Route::crossover(&population[idx1], &population[idx2], rng);
        }

        // 2. Mutation: P_mut slots uniform in [preservation_size, population_size).
        for _ in 0..mutation_size {
            let target = rng.gen_range(preservation_size..population_size);
            population[target].mutate(rng);
        }

        // 3. Fitness pass A: no cache.
        evaluate_population(&mut population, &context, &evaluator, pool, false);

        // 4. Deduplication.
        let duplicate_count = repair_duplicates(&mut population, selection_stop, rng);
        stats.report_duplicate_entry(sector_id, num_waypoints, iteration, duplicate_count);

        // 5. Fitness pass B: cache permitted (repaired slots recompute; the
        // rest short-circuit on their still-valid cached fitness).
        evaluate_population(&mut population, &context, &evaluator, pool, true);

        // 6. Sort ascending by fitness.
        population.sort_by(|a, b| {
            a.fitness()
                .unwrap_or(f64::INFINITY)
                .partial_cmp(&b.fitness().unwrap_or(f64::INFINITY))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = &population[0];
        let best_fitness = best.fitness().unwrap_or(f64::INFINITY);
        let iteration_time_sec = iteration_start.elapsed().as_secs_f64();

        log::debug!(
            "iteration {}, current best matches: {}",
            iteration,
            print_population_list(&population, 10)
        );
        stats.report_iteration_complete(sector_id, num_waypoints, iteration, best_fitness, iteration_time_sec);
        result_emit(iteration, best);

        // 8. Early-exit check.
        if exit_condition.check_exit(best_fitness) {
            break;
        }
    }

    population
}

/// Picks two distinct indices uniform in `[0, bound)`, resampling the
/// second draw on collision: two independent uniform samples, not a
/// derangement.
fn distinct_parent_indices(bound: usize, rng: &mut impl Rng) -> (usize, usize) {
    let idx1 = rng.gen_range(0..bound.max(1));
    let mut idx2 = rng.gen_range(0..bound.max(1));
    while idx2 == idx1 && bound > 1 {
        idx2 = rng.gen_range(0..bound);
    }
    (idx1, idx2)
}

/// Dispatches `Update(check_cache)` for every population slot to the
/// worker pool and barrier-waits for completion.
///
/// Each slot's route is locked only for the duration of its own update;
/// the evaluator is shared without a lock since its scoring methods only
/// read the shared context and fold the running minimum length through an
/// atomic, so the pool's threads score routes concurrently rather than
/// queueing behind a single shared lock.
fn evaluate_population(
    population: &mut Vec<Route>,
    context: &Arc<dyn FitnessContext>,
    evaluator: &Arc<FitnessEvaluator>,
    pool: &WorkerPool,
    check_cache: bool,
) {
    let slots: Vec<Mutex<Route>> = std::mem::take(population).into_iter().map(Mutex::new).collect();
    let slots = Arc::new(slots);

    let jobs = (0..slots.len()).map(|idx| {
        let slots = Arc::clone(&slots);
        let context = Arc::clone(context);
        let evaluator = Arc::clone(evaluator);
        move || {
            let mut route = slots[idx].lock().unwrap();
            evaluator.update(&mut route, context.as_ref(), check_cache);
        }
    });
    pool.scoped_run(jobs);

    let slots = Arc::try_unwrap(slots)
        .unwrap_or_else(|_| panic!("fitness pass left outstanding references to the population"));
    *population = slots.into_iter().map(|m| m.into_inner().unwrap()).collect();
}

/// Stable-sorts a dna-keyed view of the population to bring exact-dna
/// duplicates adjacent, then repairs every duplicate slot in place: with
/// probability 1/3 a full randomize, otherwise a vertex-order shuffle
/// seeded from a uniformly chosen donor in `[0, selection_stop)`.
fn repair_duplicates(population: &mut [Route], selection_stop: usize, rng: &mut impl Rng) -> usize {
    let mut order: Vec<usize> = (0..population.len()).collect();
    order.sort_by(|&a, &b| population[a].dna().cmp(population[b].dna()));

    let mut duplicates = Vec::new();
    for window in order.windows(2) {
        let (prev, cur) = (window[0], window[1]);
        if population[prev].dna() == population[cur].dna() {
            duplicates.push(cur);
        }
    }

    let count = duplicates.len();
    for idx in duplicates {
        if rng.gen_bool(RANDOMIZE_PROBABILITY) {
            population[idx].randomize(rng);
        } else {
            let donor_idx = rng.gen_range(0..selection_stop.max(1));
            let donor = population[donor_idx].clone();
            population[idx].randomize_vertices(&donor, rng);
        }
    }
    count
}

fn print_population_list(population: &[Route], limit: usize) -> String {
    population
        .iter()
        .take(limit)
        .map(|route| format!("{:.3}", route.fitness().unwrap_or(f64::INFINITY)))
        .collect::<Vec<_>>()
        .join(", ")
}
