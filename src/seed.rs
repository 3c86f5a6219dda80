//! Seeded initial population: a mix of an evenly-strided sample, random
//! subsets of the historical dataset, and fully random entries, all
//! re-encoded through the phenotype encoder for the search in progress.

use rand::seq::index::sample;
use rand::Rng;

use crate::geometry::Point;
use crate::route::{Route, RouteShape};

/// Fraction of the population drawn from random (distinct-index) subsets
/// of the historical dataset before the remainder falls back to fully
/// random entries.
const SEED_RATIO: f64 = 0.5;

/// Builds a population of `population_size` routes of `num_vertices`
/// intermediate waypoints (`shape.num_vertices` must already equal it) from
/// `dataset`, a historical point cloud for this sector already normalized
/// into the same coordinate frame as `shape`.
///
/// Entry 0 is an evenly strided sample; the next `⌊SEED_RATIO·P⌋ - 1`
/// entries are random distinct-index subsets of `dataset`, sorted by
/// index; the remainder are fully random routes.
pub fn seeded_population(
    shape: RouteShape,
    dataset: &[Point],
    population_size: usize,
    rng: &mut impl Rng,
) -> Vec<Route> {
    let k = shape.num_vertices;
    let random_subset_count = ((SEED_RATIO * population_size as f64) as usize).saturating_sub(1);

    let mut population = Vec::with_capacity(population_size);

    if dataset.is_empty() || k == 0 {
        for _ in 0..population_size {
            population.push(Route::random(shape, rng));
        }
        return population;
    }

    population.push(encode(shape, &evenly_strided_sample(dataset, k)));

    for _ in 0..random_subset_count.min(population_size.saturating_sub(1)) {
        population.push(encode(shape, &random_subset(dataset, k, rng)));
    }

    while population.len() < population_size {
        population.push(Route::random(shape, rng));
    }

    population
}

/// Data-parallel variant of [`seeded_population`]: the random-subset and
/// fully-random entries (everything past the single deterministic
/// evenly-strided seed) are independent of each other, so they're built
/// across a rayon thread pool instead of sequentially. Each task seeds its
/// own `thread_rng`, matching rayon's "no shared mutable RNG state" usage
/// elsewhere in the retrieval pack.
#[cfg(feature = "parallel")]
pub fn seeded_population_parallel(shape: RouteShape, dataset: &[Point], population_size: usize) -> Vec<Route> {
    use rayon::prelude::*;

    let k = shape.num_vertices;
    if dataset.is_empty() || k == 0 {
        return (0..population_size)
            .into_par_iter()
            .map(|_| Route::random(shape, &mut rand::thread_rng()))
            .collect();
    }

    let random_subset_count = ((SEED_RATIO * population_size as f64) as usize)
        .saturating_sub(1)
        .min(population_size.saturating_sub(1));
    let random_count = population_size - 1 - random_subset_count;

    let mut population = Vec::with_capacity(population_size);
    population.push(encode(shape, &evenly_strided_sample(dataset, k)));

    let subset_entries: Vec<Route> = (0..random_subset_count)
        .into_par_iter()
        .map(|_| encode(shape, &random_subset(dataset, k, &mut rand::thread_rng())))
        .collect();
    let random_entries: Vec<Route> = (0..random_count)
        .into_par_iter()
        .map(|_| Route::random(shape, &mut rand::thread_rng()))
        .collect();

    population.extend(subset_entries);
    population.extend(random_entries);
    population
}

fn evenly_strided_sample(dataset: &[Point], k: usize) -> Vec<Point> {
    let m = dataset.len();
    (0..k).map(|j| dataset[(j * m) / k.max(1)]).collect()
}

fn random_subset(dataset: &[Point], k: usize, rng: &mut impl Rng) -> Vec<Point> {
    let m = dataset.len();
    let k = k.min(m);
    let mut indices: Vec<usize> = sample(rng, m, k).into_vec();
    indices.sort_unstable();
    indices.into_iter().map(|idx| dataset[idx]).collect()
}

/// Re-encodes `vertices` through the phenotype encoder using `shape`'s
/// digit widths; pads with `Point(0, 0)` if the caller supplied fewer
/// vertices than `shape.num_vertices` (e.g. a dataset smaller than `k`).
fn encode(shape: RouteShape, vertices: &[Point]) -> Route {
    let mut padded = vertices.to_vec();
    padded.resize(shape.num_vertices, Point::new(0.0, 0.0));
    let dna = encode_vertices(&padded, shape);
    Route::from_dna(shape, dna).expect("encoded dna matches shape by construction")
}

fn encode_vertices(vertices: &[Point], shape: RouteShape) -> String {
    let mut dna = String::with_capacity(shape.num_vertices * (shape.dx + shape.dy));
    for v in vertices {
        dna.push_str(&format!(
            "{:0width$}",
            clamp_to_digit_width(v.x, shape.dx),
            width = shape.dx
        ));
        dna.push_str(&format!(
            "{:0width$}",
            clamp_to_digit_width(v.y, shape.dy),
            width = shape.dy
        ));
    }
    dna
}

/// Folds a coordinate into `[0, 10^width)` so a seed dataset whose bounds
/// extend past the current sector's extent still encodes into exactly
/// `width` digits: a coordinate outside that range is a permitted decoded
/// value (the same way an out-of-bounds decoded vertex is tolerated
/// elsewhere), not a reason to panic or widen the dna string.
fn clamp_to_digit_width(coord: f64, width: usize) -> u64 {
    let modulus = 10u64.checked_pow(width as u32).unwrap_or(u64::MAX);
    (coord as u64) % modulus
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn shape(num_vertices: usize) -> RouteShape {
        RouteShape::new(num_vertices, 999, 999, Point::new(0.0, 0.0), Point::new(10.0, 10.0))
    }

    fn dataset() -> Vec<Point> {
        (0..20).map(|i| Point::new(i as f64, (2 * i) as f64)).collect()
    }

    #[test]
    fn population_has_the_requested_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let population = seeded_population(shape(4), &dataset(), 10, &mut rng);
        assert_eq!(population.len(), 10);
    }

    #[test]
    fn first_entry_is_an_evenly_strided_sample() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let data = dataset();
        let population = seeded_population(shape(4), &data, 10, &mut rng);
        let expected = evenly_strided_sample(&data, 4);
        let expected_dna = encode_vertices(&expected, shape(4));
        assert_eq!(population[0].dna(), expected_dna);
    }

    #[test]
    fn empty_dataset_falls_back_to_fully_random() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let population = seeded_population(shape(4), &[], 5, &mut rng);
        assert_eq!(population.len(), 5);
    }

    #[test]
    fn every_route_matches_the_requested_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let population = seeded_population(shape(3), &dataset(), 8, &mut rng);
        for route in &population {
            assert_eq!(route.shape(), shape(3));
            assert_eq!(route.dna().len(), shape(3).num_vertices * (shape(3).dx + shape(3).dy));
        }
    }

    #[test]
    fn seed_coordinates_beyond_the_digit_width_do_not_widen_the_dna() {
        let small_shape = RouteShape::new(1, 2, 2, Point::new(0.0, 0.0), Point::new(99.0, 99.0));
        let far_outside_dataset = vec![Point::new(12345.0, 6.0)];
        let dna = encode_vertices(&far_outside_dataset, small_shape);
        assert_eq!(dna.len(), small_shape.dx + small_shape.dy);
        let route = Route::from_dna(small_shape, dna);
        assert!(route.is_ok());
    }

    #[test]
    fn clamp_to_digit_width_wraps_into_range() {
        assert_eq!(clamp_to_digit_width(12345.0, 2), 45);
        assert_eq!(clamp_to_digit_width(7.0, 2), 7);
        assert_eq!(clamp_to_digit_width(100.0, 2), 0);
    }
}
