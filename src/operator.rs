//! Operator capabilities shared by every search step.

use crate::error::GaError;
use crate::individual::Individual;
use crate::population::Population;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// A search step transforming a whole population.
///
/// The population is handed over by value and the transformed one returned.
pub trait PopulationOperator: Send {
    fn name(&self) -> &str;

    fn operate(&mut self, pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError>;

    fn active_in(&self, _generation: usize) -> bool {
        true
    }
}

/// A step transforming individuals independently of each other.
///
/// Returns every individual that should replace the input in the next list;
/// the input is dropped unless returned.
pub trait IndividualOperator: Send + Sync {
    fn name(&self) -> &str;

    fn operate_individual(&self, individual: &Individual, generation: usize, rng: &mut dyn RngCore) -> Vec<Individual>;
}

/// Random stream dedicated to one individual of a generation
pub fn fork_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(stream);
    rng
}

/// Applies `f` to every individual, each with its own forked stream, and
/// concatenates the results in input order.
///
/// One base seed is drawn from `rng` so the outcome is the same whether the
/// work runs in parallel or not.
pub fn map_individuals<F>(individuals: &[Individual], parallel: bool, rng: &mut dyn RngCore, f: F) -> Vec<Individual>
where
    F: Fn(&Individual, &mut ChaCha8Rng) -> Vec<Individual> + Sync,
{
    let seed = rng.next_u64();
    let results: Vec<Vec<Individual>> = if parallel {
        individuals
            .par_iter()
            .enumerate()
            .map(|(i, individual)| f(individual, &mut fork_rng(seed, i as u64)))
            .collect()
    } else {
        individuals
            .iter()
            .enumerate()
            .map(|(i, individual)| f(individual, &mut fork_rng(seed, i as u64)))
            .collect()
    };
    results.into_iter().flatten().collect()
}

/// Runs an [`IndividualOperator`] over a population, replacing its list
pub struct PerIndividual<O> {
    operator: O,
    parallel: bool,
}

impl<O: IndividualOperator> PerIndividual<O> {
    pub fn new(operator: O, parallel: bool) -> PerIndividual<O> {
        PerIndividual { operator, parallel }
    }
}

impl<O: IndividualOperator> PopulationOperator for PerIndividual<O> {
    fn name(&self) -> &str {
        self.operator.name()
    }

    fn operate(&mut self, mut pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        let generation = pop.generation();
        let operator = &self.operator;
        let individuals = map_individuals(&pop.individuals, self.parallel, rng, |individual, rng| {
            operator.operate_individual(individual, generation, rng)
        });
        pop.replace(individuals);
        Ok(pop)
    }
}

/// Restricts an operator to every `period`-th generation
pub struct PeriodicOperator {
    inner: Box<dyn PopulationOperator>,
    period: usize,
}

impl PeriodicOperator {
    pub fn new(inner: Box<dyn PopulationOperator>, period: usize) -> PeriodicOperator {
        PeriodicOperator { inner, period }
    }
}

impl PopulationOperator for PeriodicOperator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn operate(&mut self, pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        self.inner.operate(pop, rng)
    }

    fn active_in(&self, generation: usize) -> bool {
        self.period > 0 && generation % self.period == 0 && self.inner.active_in(generation)
    }
}
