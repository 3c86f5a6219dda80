//! Route phenotype: a fixed-width zero-padded decimal-digit-string encoding
//! of N intermediate (x, y) vertices.

use rand::Rng;

use crate::error::{PolytraceError, Result};
use crate::geometry::Point;

/// Shape parameters fixed for an entire population: vertex count, per-axis
/// digit width, and the fixed start/end endpoints every decoded polyline is
/// anchored to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteShape {
    pub num_vertices: usize,
    pub max_x: u64,
    pub max_y: u64,
    pub dx: usize,
    pub dy: usize,
    pub start: Point,
    pub end: Point,
}

impl RouteShape {
    pub fn new(num_vertices: usize, max_x: u64, max_y: u64, start: Point, end: Point) -> Self {
        RouteShape {
            num_vertices,
            max_x,
            max_y,
            dx: digit_width(max_x),
            dy: digit_width(max_y),
            start,
            end,
        }
    }

    fn dna_len(&self) -> usize {
        self.num_vertices * (self.dx + self.dy)
    }
}

/// ⌈log10(max+1)⌉, with a floor of 1 so a zero-extent axis still gets a
/// digit to encode.
fn digit_width(max: u64) -> usize {
    let width = ((max as f64 + 1.0).log10()).ceil() as usize;
    width.max(1)
}

const FITNESS_UNSET: f64 = -1.0;

/// One candidate polyline: shape parameters plus the dna string, with a
/// cached fitness invalidated by any mutating operation.
#[derive(Debug, Clone)]
pub struct Route {
    shape: RouteShape,
    dna: String,
    fitness: f64,
}

impl Route {
    /// Builds a route from an existing dna string. The string's length must
    /// match `shape`'s; every character must be a decimal digit.
    pub fn from_dna(shape: RouteShape, dna: String) -> Result<Self> {
        if dna.len() != shape.dna_len() {
            return Err(PolytraceError::Encoding {
                message: format!(
                    "dna length {} does not match expected length {}",
                    dna.len(),
                    shape.dna_len()
                ),
            });
        }
        if !dna.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PolytraceError::Encoding {
                message: "dna contains a non-digit character".to_string(),
            });
        }
        Ok(Route {
            shape,
            dna,
            fitness: FITNESS_UNSET,
        })
    }

    pub fn shape(&self) -> RouteShape {
        self.shape
    }

    pub fn dna(&self) -> &str {
        &self.dna
    }

    pub fn fitness(&self) -> Option<f64> {
        if self.fitness < 0.0 {
            None
        } else {
            Some(self.fitness)
        }
    }

    pub fn set_fitness(&mut self, fitness: f64) {
        self.fitness = fitness;
    }

    pub fn invalidate_fitness(&mut self) {
        self.fitness = FITNESS_UNSET;
    }

    /// Decodes the dna into intermediate vertices, optionally bracketed by
    /// the shape's fixed start/end endpoints.
    pub fn decode(&self, include_endpoints: bool) -> Vec<Point> {
        let width = self.shape.dx + self.shape.dy;
        let mut vertices = Vec::with_capacity(self.shape.num_vertices + 2);
        if include_endpoints {
            vertices.push(self.shape.start);
        }
        for i in 0..self.shape.num_vertices {
            let base = i * width;
            let x_digits = &self.dna[base..base + self.shape.dx];
            let y_digits = &self.dna[base + self.shape.dx..base + width];
            let x: f64 = x_digits.parse().expect("validated decimal digits");
            let y: f64 = y_digits.parse().expect("validated decimal digits");
            vertices.push(Point::new(x, y));
        }
        if include_endpoints {
            vertices.push(self.shape.end);
        }
        vertices
    }

    /// Samples a fresh route with every digit drawn uniformly from '0'..'9'.
    pub fn random(shape: RouteShape, rng: &mut impl Rng) -> Self {
        let len = shape.dna_len();
        let dna: String = (0..len)
            .map(|_| char::from(b'0' + rng.gen_range(0..10)))
            .collect();
        Route {
            shape,
            dna,
            fitness: FITNESS_UNSET,
        }
    }

    /// Single-point dna splice: a cut position uniform in `[1, len-2]`, with
    /// the prefix taken from `a` and the suffix from `b`. Shape is
    /// inherited from `a`.
    pub fn crossover(a: &Route, b: &Route, rng: &mut impl Rng) -> Self {
        let len = a.dna.len();
        let cut = rng.gen_range(1..len.saturating_sub(1).max(2));
        let dna = format!("{}{}", &a.dna[..cut], &b.dna[cut..]);
        Route {
            shape: a.shape,
            dna,
            fitness: FITNESS_UNSET,
        }
    }

    /// Replaces one uniformly chosen dna digit with a fresh uniform digit.
    pub fn mutate(&mut self, rng: &mut impl Rng) {
        let idx = rng.gen_range(0..self.dna.len());
        let digit = char::from(b'0' + rng.gen_range(0..10));
        let mut bytes = self.dna.into_bytes();
        bytes[idx] = digit as u8;
        self.dna = String::from_utf8(bytes).expect("ascii digits only");
        self.invalidate_fitness();
    }

    /// Replaces the dna with a freshly sampled random route of the same
    /// shape.
    pub fn randomize(&mut self, rng: &mut impl Rng) {
        let fresh = Route::random(self.shape, rng);
        self.dna = fresh.dna;
        self.invalidate_fitness();
    }

    /// Takes `donor`'s decoded intermediate vertices, shuffles their order,
    /// and re-encodes into `self`.
    pub fn randomize_vertices(&mut self, donor: &Route, rng: &mut impl Rng) {
        let mut vertices = donor.decode(false);
        shuffle(&mut vertices, rng);
        self.dna = encode_vertices(&vertices, self.shape);
        self.invalidate_fitness();
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.dna == other.dna
    }
}

impl Eq for Route {}

impl PartialOrd for Route {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.fitness.partial_cmp(&other.fitness)
    }
}

fn encode_vertices(vertices: &[Point], shape: RouteShape) -> String {
    let mut dna = String::with_capacity(shape.dna_len());
    for v in vertices {
        dna.push_str(&format!("{:0width$}", v.x as u64, width = shape.dx));
        dna.push_str(&format!("{:0width$}", v.y as u64, width = shape.dy));
    }
    dna
}

fn shuffle<T>(items: &mut [T], rng: &mut impl Rng) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn shape() -> RouteShape {
        RouteShape::new(3, 999, 999, Point::new(0.0, 0.0), Point::new(10.0, 10.0))
    }

    #[test]
    fn dna_length_matches_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let route = Route::random(shape(), &mut rng);
        assert_eq!(route.dna().len(), 3 * (3 + 3));
    }

    #[test]
    fn decode_round_trips_encoded_vertices() {
        let shape = shape();
        let vertices = vec![
            Point::new(12.0, 34.0),
            Point::new(999.0, 1.0),
            Point::new(0.0, 0.0),
        ];
        let dna = encode_vertices(&vertices, shape);
        let route = Route::from_dna(shape, dna).unwrap();
        let decoded = route.decode(false);
        assert_eq!(decoded.len(), vertices.len());
        for (a, b) in decoded.iter().zip(vertices.iter()) {
            assert_eq!(a.x, b.x);
            assert_eq!(a.y, b.y);
        }
    }

    #[test]
    fn decode_with_endpoints_brackets_start_and_end() {
        let route = Route::random(shape(), &mut ChaCha8Rng::seed_from_u64(2));
        let decoded = route.decode(true);
        assert_eq!(decoded.first().copied().unwrap(), shape().start);
        assert_eq!(decoded.last().copied().unwrap(), shape().end);
        assert_eq!(decoded.len(), shape().num_vertices + 2);
    }

    #[test]
    fn mutate_resets_cached_fitness() {
        let mut route = Route::random(shape(), &mut ChaCha8Rng::seed_from_u64(3));
        route.set_fitness(42.0);
        route.mutate(&mut ChaCha8Rng::seed_from_u64(4));
        assert_eq!(route.fitness(), None);
    }

    #[test]
    fn crossover_inherits_shape_from_first_parent() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let a = Route::random(shape(), &mut rng);
        let b = Route::random(shape(), &mut rng);
        let child = Route::crossover(&a, &b, &mut rng);
        assert_eq!(child.shape(), a.shape());
        assert_eq!(child.dna().len(), a.dna().len());
    }

    #[test]
    fn from_dna_rejects_wrong_length() {
        let result = Route::from_dna(shape(), "123".to_string());
        assert!(matches!(result, Err(PolytraceError::Encoding { .. })));
    }

    #[test]
    fn from_dna_rejects_non_digit_characters() {
        let bad = "1a3456".to_string() + &"0".repeat(shape().dna_len() - 6);
        let result = Route::from_dna(shape(), bad);
        assert!(matches!(result, Err(PolytraceError::Encoding { .. })));
    }

    #[test]
    fn digit_width_has_a_floor_of_one() {
        assert_eq!(digit_width(0), 1);
        assert_eq!(digit_width(9), 1);
        assert_eq!(digit_width(10), 2);
        assert_eq!(digit_width(999), 3);
    }
}
