use crate::individual::Individual;
use crate::performance::Performance;
use std::fmt;

/// Current generation of individuals plus run-level best tracking
#[derive(Clone)]
pub struct Population {
    pub individuals: Vec<Individual>,
    generation: usize,
    last_improvement: usize,
    best_ever: Option<Individual>,
    current_best: Option<usize>,
}

impl Population {
    pub fn new() -> Population {
        Population {
            individuals: Vec::new(),
            generation: 0,
            last_improvement: 0,
            best_ever: None,
            current_best: None,
        }
    }

    pub fn from_individuals(individuals: Vec<Individual>) -> Population {
        Population {
            individuals,
            ..Population::new()
        }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn next_generation(&mut self) {
        self.generation += 1;
    }

    pub fn generations_without_improvement(&self) -> usize {
        self.generation - self.last_improvement
    }

    pub fn best_ever(&self) -> Option<&Individual> {
        self.best_ever.as_ref()
    }

    pub fn best_ever_fitness(&self) -> Option<&Performance> {
        self.best_ever.as_ref().and_then(|i| i.fitness.as_ref())
    }

    /// Best individual of the current list, as found by the last `update_evaluation`
    pub fn current_best(&self) -> Option<&Individual> {
        self.current_best.and_then(|i| self.individuals.get(i))
    }

    pub fn current_best_fitness(&self) -> Option<&Performance> {
        self.current_best().and_then(|i| i.fitness.as_ref())
    }

    /// Swaps in a new individual list. The current-best reference is
    /// invalidated until the next `update_evaluation`.
    pub fn replace(&mut self, individuals: Vec<Individual>) {
        self.individuals = individuals;
        self.current_best = None;
    }

    pub fn add(&mut self, individual: Individual) {
        self.individuals.push(individual);
    }

    /// Recomputes the current best and replaces the best-ever snapshot when
    /// strictly beaten. Individuals without score are ignored.
    pub fn update_evaluation(&mut self) {
        self.current_best = None;
        let mut best_fitness: Option<&Performance> = None;
        for (i, individual) in self.individuals.iter().enumerate() {
            if let Some(fitness) = &individual.fitness {
                if best_fitness.map_or(true, |b| fitness > b) {
                    best_fitness = Some(fitness);
                    self.current_best = Some(i);
                }
            }
        }

        if let Some(idx) = self.current_best {
            let candidate = &self.individuals[idx];
            let improved = match self.best_ever_fitness() {
                None => true,
                Some(best) => candidate.fitness.as_ref().map_or(false, |f| f > best),
            };
            if improved {
                self.best_ever = Some(candidate.clone());
                self.last_improvement = self.generation;
            }
        }
    }

    pub fn unevaluated_count(&self) -> usize {
        self.individuals.iter().filter(|i| !i.is_evaluated()).count()
    }

    /// Mean used-feature count
    pub fn mean_feature_count(&self) -> f64 {
        if self.individuals.is_empty() {
            return 0.0;
        }
        self.individuals.iter().map(|i| i.view.used_count()).sum::<usize>() as f64 / self.individuals.len() as f64
    }

    /// Mean set weight over all used slots of all individuals, 1.0 when none is set
    pub fn average_weight(&self) -> f64 {
        let weights: Vec<f64> = self
            .individuals
            .iter()
            .flat_map(|i| i.view.used().map(|s| s.weight))
            .filter(|w| !w.is_nan())
            .collect();
        if weights.is_empty() {
            1.0
        } else {
            weights.iter().sum::<f64>() / weights.len() as f64
        }
    }
}

impl Default for Population {
    fn default() -> Self {
        Population::new()
    }
}

impl fmt::Debug for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Population: generation {} | {} individuals | best ever {}",
            self.generation,
            self.individuals.len(),
            self.best_ever_fitness()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string())
        )?;
        for (i, individual) in self.individuals.iter().enumerate().take(10) {
            writeln!(f, "#{} {}", i + 1, individual.display())?;
        }
        Ok(())
    }
}
