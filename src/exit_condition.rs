//! Early-exit controller: stops a generation loop once the best fitness
//! stops improving for `max_matches` consecutive generations.

/// Tracks consecutive near-equal fitness readings within `eps`.
pub struct ExitCondition {
    current_fitness: f64,
    counter: usize,
    max_matches: usize,
    eps: f64,
}

impl ExitCondition {
    pub fn new(max_matches: usize, eps: f64) -> Self {
        ExitCondition {
            current_fitness: f64::MAX,
            counter: 0,
            max_matches,
            eps,
        }
    }

    pub fn max_matches(&self) -> usize {
        self.max_matches
    }

    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Feeds a new best fitness; returns true once `max_matches` consecutive
    /// calls land within `eps` of each other.
    pub fn check_exit(&mut self, fitness: f64) -> bool {
        if (fitness - self.current_fitness).abs() < self.eps {
            self.counter += 1;
            log::debug!("no improvement in {} iterations", self.counter);
            if self.counter >= self.max_matches {
                log::info!("reached max fitness match count, exiting");
                return true;
            }
        } else {
            if self.current_fitness < fitness {
                log::warn!(
                    "updating fitness with a worse value: current {}, new {}",
                    self.current_fitness,
                    fitness
                );
            }
            self.current_fitness = fitness;
            self.counter = 0;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_true_on_exactly_the_max_matches_th_repeat() {
        let mut exit = ExitCondition::new(3, 0.001);
        assert!(!exit.check_exit(10.0));
        assert!(!exit.check_exit(10.0000001));
        assert!(!exit.check_exit(10.0000001));
        assert!(exit.check_exit(10.0000001));
    }

    #[test]
    fn improving_fitness_resets_the_counter() {
        let mut exit = ExitCondition::new(2, 0.001);
        assert!(!exit.check_exit(10.0));
        assert!(!exit.check_exit(10.0000001));
        assert!(!exit.check_exit(5.0));
        assert!(!exit.check_exit(5.0000001));
    }

    #[test]
    fn worsening_fitness_still_updates_state() {
        let mut exit = ExitCondition::new(5, 0.001);
        assert!(!exit.check_exit(1.0));
        assert!(!exit.check_exit(2.0));
        assert_eq!(exit.counter, 0);
    }
}
