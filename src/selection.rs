use crate::error::GaError;
use crate::individual::Individual;
use crate::operator::PopulationOperator;
use crate::param::Param;
use crate::population::Population;
use log::debug;
use rand::{Rng, RngCore};

/// Tournament selection down to a fixed population size.
///
/// With `keep_best` the best-ever individual is placed first in the new list.
/// With a dynamic pressure the tournament fraction ramps linearly towards 1.0
/// across `max_generations`.
pub struct TournamentSelection {
    size: usize,
    fraction: f64,
    keep_best: bool,
    dynamic_pressure: bool,
    max_generations: usize,
}

impl TournamentSelection {
    pub fn new(size: usize, fraction: f64, keep_best: bool) -> TournamentSelection {
        TournamentSelection {
            size,
            fraction,
            keep_best,
            dynamic_pressure: false,
            max_generations: 0,
        }
    }

    pub fn with_dynamic_pressure(mut self, max_generations: usize) -> TournamentSelection {
        self.dynamic_pressure = true;
        self.max_generations = max_generations;
        self
    }

    pub fn from_param(param: &Param) -> TournamentSelection {
        let selection = TournamentSelection::new(
            param.ga.population_size,
            param.selection.tournament_fraction,
            param.selection.keep_best,
        );
        if param.selection.dynamic_selection_pressure {
            selection.with_dynamic_pressure(param.ga.max_generations)
        } else {
            selection
        }
    }

    /// Tournament fraction used at `generation`
    pub fn fraction_at(&self, generation: usize) -> f64 {
        if self.dynamic_pressure && self.max_generations > 0 {
            let progress = (generation as f64 / self.max_generations as f64).min(1.0);
            self.fraction + (1.0 - self.fraction) * progress
        } else {
            self.fraction
        }
    }

    /// Winner of one tournament of `k` draws with replacement. The first
    /// drawn individual wins ties.
    fn tournament<'a>(individuals: &'a [Individual], k: usize, rng: &mut dyn RngCore) -> &'a Individual {
        let mut winner = &individuals[rng.gen_range(0..individuals.len())];
        for _ in 1..k {
            let challenger = &individuals[rng.gen_range(0..individuals.len())];
            if challenger.main_fitness() > winner.main_fitness() {
                winner = challenger;
            }
        }
        winner
    }
}

impl PopulationOperator for TournamentSelection {
    fn name(&self) -> &str {
        "tournament selection"
    }

    fn operate(&mut self, mut pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        if pop.is_empty() {
            return Err(GaError::EmptyPopulation {
                operator: self.name().to_string(),
            });
        }

        let fraction = self.fraction_at(pop.generation());
        let k = ((pop.len() as f64 * fraction).round() as usize).max(1);
        debug!("Tournament of size {} (fraction {:.3}) among {} individuals", k, fraction, pop.len());

        let mut selected: Vec<Individual> = Vec::with_capacity(self.size);
        if self.keep_best {
            if let Some(best) = pop.best_ever() {
                selected.push(best.clone());
            }
        }
        while selected.len() < self.size {
            selected.push(Self::tournament(&pop.individuals, k, rng).clone());
        }

        pop.replace(selected);
        Ok(pop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::Performance;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn scored(value: f64) -> Individual {
        let mut i = Individual::test_with_flags(&[true, true]);
        i.fitness = Some(Performance::new("r2", value, 1.0));
        i
    }

    fn population() -> Population {
        let mut pop = Population::from_individuals((0..10).map(|i| scored(i as f64 / 10.0)).collect());
        pop.update_evaluation();
        pop
    }

    /// Replays fixed 64-bit outputs
    struct ScriptedRng {
        values: Vec<u64>,
        next: usize,
    }

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            self.next_u64() as u32
        }

        fn next_u64(&mut self) -> u64 {
            let v = self.values[self.next % self.values.len()];
            self.next += 1;
            v
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for chunk in dest.chunks_mut(8) {
                let bytes = self.next_u64().to_le_bytes();
                chunk.copy_from_slice(&bytes[..chunk.len()]);
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    // with two candidates, 1 draws index 0 and 2^63 + 1 draws index 1
    const FIRST: u64 = 1;
    const SECOND: u64 = (1 << 63) + 1;

    #[test]
    fn first_drawn_wins_ties() {
        let mut a = Individual::test_with_flags(&[true, false]);
        a.fitness = Some(Performance::new("r2", 0.5, 1.0));
        let mut b = Individual::test_with_flags(&[false, true]);
        b.fitness = Some(Performance::new("r2", 0.5, 1.0));
        let individuals = vec![a, b];

        let mut rng = ScriptedRng { values: vec![SECOND, FIRST], next: 0 };
        let winner = TournamentSelection::tournament(&individuals, 2, &mut rng);
        assert_eq!(winner.view.flags(), vec![false, true]);

        let mut rng = ScriptedRng { values: vec![FIRST, SECOND], next: 0 };
        let winner = TournamentSelection::tournament(&individuals, 2, &mut rng);
        assert_eq!(winner.view.flags(), vec![true, false]);
    }

    #[test]
    fn strictly_better_challenger_wins() {
        let mut a = Individual::test_with_flags(&[true, false]);
        a.fitness = Some(Performance::new("r2", 0.2, 1.0));
        let mut b = Individual::test_with_flags(&[false, true]);
        b.fitness = Some(Performance::new("r2", 0.7, 1.0));
        let individuals = vec![a, b];

        let mut rng = ScriptedRng { values: vec![FIRST, SECOND], next: 0 };
        let winner = TournamentSelection::tournament(&individuals, 2, &mut rng);
        assert_eq!(winner.main_fitness(), 0.7);
    }

    #[test]
    fn selection_restores_target_size() {
        let mut op = TournamentSelection::new(4, 0.25, false);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let pop = op.operate(population(), &mut rng).unwrap();
        assert_eq!(pop.len(), 4);
        assert!(pop.individuals.iter().all(|i| i.is_evaluated()));
    }

    #[test]
    fn elitism_keeps_best_ever_first() {
        let mut op = TournamentSelection::new(3, 0.1, true);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let pop = op.operate(population(), &mut rng).unwrap();
        assert_eq!(pop.individuals[0].main_fitness(), 0.9);
    }

    #[test]
    fn large_tournaments_favour_fit_individuals() {
        let mut op = TournamentSelection::new(5, 1.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let pop = op.operate(population(), &mut rng).unwrap();
        let mean: f64 = pop.individuals.iter().map(|i| i.main_fitness()).sum::<f64>() / 5.0;
        assert!(mean > 0.6, "mean selected fitness {}", mean);
    }

    #[test]
    fn selection_is_deterministic() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        let a = TournamentSelection::new(6, 0.3, false).operate(population(), &mut rng1).unwrap();
        let b = TournamentSelection::new(6, 0.3, false).operate(population(), &mut rng2).unwrap();
        let fa: Vec<f64> = a.individuals.iter().map(|i| i.main_fitness()).collect();
        let fb: Vec<f64> = b.individuals.iter().map(|i| i.main_fitness()).collect();
        assert_eq!(fa, fb);
    }

    #[test]
    fn pressure_ramps_to_one() {
        let op = TournamentSelection::new(4, 0.2, false).with_dynamic_pressure(10);
        assert_eq!(op.fraction_at(0), 0.2);
        assert!((op.fraction_at(5) - 0.6).abs() < 1e-12);
        assert_eq!(op.fraction_at(10), 1.0);
        assert_eq!(op.fraction_at(20), 1.0);
    }

    #[test]
    fn empty_population_is_fatal() {
        let mut op = TournamentSelection::new(4, 0.2, false);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let res = op.operate(Population::new(), &mut rng);
        assert!(matches!(res, Err(GaError::EmptyPopulation { .. })));
    }
}
