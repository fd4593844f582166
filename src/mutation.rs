//! Mutation operators.
//!
//! Every mutation re-emits the untouched parent next to its mutated child, so
//! a generation can double in size before selection. A child that fails to
//! build, or would end up without features or outside the feature-count
//! bounds, is dropped and only the parent survives.

use crate::data::{Column, Dataset};
use crate::error::{GaError, GenerationError};
use crate::fourier::FourierSynthesis;
use crate::generator::{Applicability, GeneratorInstance, GeneratorLibrary};
use crate::individual::Individual;
use crate::operator::{map_individuals, IndividualOperator, PopulationOperator};
use crate::param::{MutationKind, Param};
use crate::population::Population;
use log::{debug, warn};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::RngCore;
use std::sync::Arc;

/// Mutation probability, `1/n` when configured negative
pub fn effective_probability(p: f64, n: usize) -> f64 {
    if p < 0.0 {
        1.0 / n.max(1) as f64
    } else {
        p.min(1.0)
    }
}

/// |w| with unset or non-finite weights read as 1.0
fn magnitude(weight: f64) -> f64 {
    if weight.is_finite() {
        weight.abs()
    } else {
        1.0
    }
}

/// Removal probabilities inversely proportional to the normalised weights:
/// `p * (mean|w| / |w_i|) * factor`, clamped to [0, 1]
pub fn inverse_weight_probabilities(weights: &[f64], p: f64, factor: f64) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let mean = weights.iter().map(|w| magnitude(*w)).sum::<f64>() / weights.len() as f64;
    weights
        .iter()
        .map(|w| {
            let w = magnitude(*w);
            if w == 0.0 {
                1.0
            } else {
                (p * (mean / w) * factor).clamp(0.0, 1.0)
            }
        })
        .collect()
}

/// Removal probabilities from weight ranks: the feature of rank `r` (0 =
/// lightest) among `n` gets `p * 2(n - r)/(n + 1) * factor`, clamped to [0, 1].
/// Before clamping the mean over all features is `p * factor`.
pub fn rank_probabilities(weights: &[f64], p: f64, factor: f64) -> Vec<f64> {
    let n = weights.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| magnitude(weights[a]).total_cmp(&magnitude(weights[b])));
    let mut probabilities = vec![0.0; n];
    for (rank, &i) in order.iter().enumerate() {
        probabilities[i] = (p * 2.0 * (n - rank) as f64 / (n + 1) as f64 * factor).clamp(0.0, 1.0);
    }
    probabilities
}

/// Flips enable flags, each with probability p
pub struct SelectionMutation {
    p: f64,
    min_features: usize,
    max_features: usize,
}

impl SelectionMutation {
    pub fn new(p: f64, min_features: usize, max_features: usize) -> SelectionMutation {
        SelectionMutation {
            p,
            min_features,
            max_features,
        }
    }
}

impl IndividualOperator for SelectionMutation {
    fn name(&self) -> &str {
        "selection mutation"
    }

    fn operate_individual(&self, individual: &Individual, generation: usize, rng: &mut dyn RngCore) -> Vec<Individual> {
        let n = individual.view.len();
        let p = effective_probability(self.p, n);
        let mut child = individual.child(generation);
        let mut changed = false;
        for i in 0..n {
            if rng.gen_bool(p) {
                let used = child.view.slots[i].used;
                child.view.set_used(i, !used);
                changed = true;
            }
        }

        if !changed {
            return vec![individual.clone()];
        }
        if !child.is_viable() {
            warn!("Selection mutation would leave no feature, individual kept unchanged");
            return vec![individual.clone()];
        }
        if !child.has_feature_count(self.min_features, self.max_features) {
            debug!("Mutated child has {} features, dropped", child.view.used_count());
            return vec![individual.clone()];
        }
        vec![individual.clone(), child]
    }
}

/// Population-wide information used by the directed variant
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationStats {
    /// One entry per original feature: 1 + number of individuals using it
    pub usage: Vec<f64>,
    pub average_weight: f64,
}

impl PopulationStats {
    pub fn compute(pop: &Population, originals: &[Arc<Column>]) -> PopulationStats {
        let usage = originals
            .iter()
            .map(|column| {
                let users = pop
                    .individuals
                    .iter()
                    .filter(|i| i.view.used().any(|s| s.column.name() == column.name()))
                    .count();
                1.0 + users as f64
            })
            .collect();
        PopulationStats {
            usage,
            average_weight: pop.average_weight(),
        }
    }
}

/// Feature-constructing mutation: add an original feature, add a generated
/// feature, remove features.
///
/// The basic variant gates each action with p/4 and draws uniformly. The
/// directed variant gates with p, draws original features by population usage
/// and generator inputs by weight, and removes by weight rank. With a
/// [`FourierSynthesis`] every added feature also yields sinusoids of the
/// label's dominant frequencies along it.
pub struct GeneratingMutation {
    library: GeneratorLibrary,
    originals: Vec<Arc<Column>>,
    p: f64,
    mode: Applicability,
    excluded: Vec<String>,
    min_features: usize,
    max_features: usize,
    directed: bool,
    fourier: Option<FourierSynthesis>,
    parallel: bool,
}

impl GeneratingMutation {
    pub fn new(library: GeneratorLibrary, data: &Dataset, p: f64) -> GeneratingMutation {
        GeneratingMutation {
            library,
            originals: data.columns.iter().filter(|c| c.feature.construction.is_simple()).cloned().collect(),
            p,
            mode: Applicability::Restrictive,
            excluded: Vec::new(),
            min_features: 1,
            max_features: 0,
            directed: false,
            fourier: None,
            parallel: false,
        }
    }

    pub fn directed(mut self) -> GeneratingMutation {
        self.directed = true;
        self
    }

    pub fn with_fourier(mut self, fourier: Option<FourierSynthesis>) -> GeneratingMutation {
        self.fourier = fourier;
        self
    }

    pub fn with_mode(mut self, mode: Applicability) -> GeneratingMutation {
        self.mode = mode;
        self
    }

    pub fn with_excluded(mut self, excluded: Vec<String>) -> GeneratingMutation {
        self.excluded = excluded;
        self
    }

    pub fn with_bounds(mut self, min_features: usize, max_features: usize) -> GeneratingMutation {
        self.min_features = min_features;
        self.max_features = max_features;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> GeneratingMutation {
        self.parallel = parallel;
        self
    }

    /// Mutation configured by `mutation.kind` (generating, directed or fourier)
    pub fn from_param(data: &Dataset, param: &Param) -> GeneratingMutation {
        let mode = if param.mutation.restrictive_selection {
            Applicability::Restrictive
        } else {
            Applicability::Permissive
        };
        let mutation = GeneratingMutation::new(GeneratorLibrary::from_param(&param.generators), data, param.mutation.p_mutation)
            .with_mode(mode)
            .with_excluded(param.mutation.excluded_functions.clone())
            .with_bounds(param.ga.min_features, param.ga.max_features)
            .parallel(param.mutation.parallel);
        match param.mutation.kind {
            MutationKind::directed => mutation.directed(),
            MutationKind::fourier => mutation.with_fourier(FourierSynthesis::from_param(&param.fourier)),
            _ => mutation,
        }
    }

    /// Adds the columns built by `instance`, returning the slots that were not
    /// already used
    fn add_synthesized(
        child: &mut Individual,
        instance: &dyn GeneratorInstance,
        weight: f64,
    ) -> Result<Vec<usize>, GenerationError> {
        let mut added = Vec::new();
        for column in instance.synthesize(&child.view)? {
            let was_used = child
                .view
                .position(column.name())
                .map_or(false, |i| child.view.slots[i].used);
            let idx = child.view.add(Arc::new(column), weight);
            if !was_used {
                added.push(idx);
            }
        }
        Ok(added)
    }

    /// Builds the mutated child, `None` when nothing changed or the child is
    /// outside the feature-count bounds.
    pub fn mutate_individual(
        &self,
        individual: &Individual,
        generation: usize,
        stats: Option<&PopulationStats>,
        rng: &mut dyn RngCore,
    ) -> Result<Option<Individual>, GenerationError> {
        let p = effective_probability(self.p, individual.view.used_count());
        let gate = if self.directed { p } else { p / 4.0 };
        let mut child = individual.child(generation);
        let mut added: Vec<usize> = Vec::new();
        let mut changed = false;

        if rng.gen_bool(gate) && !self.originals.is_empty() {
            let (pick, weight) = match stats {
                Some(stats) => {
                    let pick = match WeightedIndex::new(&stats.usage) {
                        Ok(dist) => dist.sample(rng),
                        Err(_) => rng.gen_range(0..self.originals.len()),
                    };
                    (pick, stats.average_weight)
                }
                None => (rng.gen_range(0..self.originals.len()), f64::NAN),
            };
            let column = &self.originals[pick];
            let already_used = child
                .view
                .position(column.name())
                .map_or(false, |i| child.view.slots[i].used);
            if !already_used {
                added.push(child.view.add(Arc::clone(column), weight));
            }
        }

        if rng.gen_bool(gate) {
            let candidates: Vec<Arc<Column>> = child.view.used().map(|s| Arc::clone(&s.column)).collect();
            let weights: Option<Vec<f64>> = if self.directed {
                Some(child.view.used().map(|s| s.weight).collect())
            } else {
                None
            };
            match self.library.choose(&candidates, weights.as_deref(), &self.excluded, self.mode, rng) {
                Ok(instance) => added.extend(Self::add_synthesized(&mut child, instance.as_ref(), f64::NAN)?),
                Err(GenerationError::NotApplicable(reason)) => debug!("No generator applicable: {}", reason),
                Err(e) => return Err(e),
            }
        }

        if let Some(fourier) = &self.fourier {
            let label = Arc::clone(&child.view.label);
            let sources: Vec<Arc<Column>> = added.iter().map(|&i| Arc::clone(&child.view.slots[i].column)).collect();
            for column in sources {
                for instance in fourier.instances(&column, &label, rng) {
                    added.extend(Self::add_synthesized(&mut child, &instance, f64::NAN)?);
                }
            }
        }
        changed |= !added.is_empty();

        if rng.gen_bool(gate) {
            let factor = added.len().max(1) as f64;
            let candidates: Vec<usize> = child.view.used_indices().into_iter().filter(|i| !added.contains(i)).collect();
            let probabilities = if self.directed {
                let all: Vec<f64> = child.view.slots.iter().map(|s| s.weight).collect();
                let ranked = rank_probabilities(&all, p, factor);
                candidates.iter().map(|&i| ranked[i]).collect()
            } else {
                let weights: Vec<f64> = candidates.iter().map(|&i| child.view.slots[i].weight).collect();
                inverse_weight_probabilities(&weights, p, factor)
            };
            for (&i, &q) in candidates.iter().zip(&probabilities) {
                if rng.gen_bool(q) {
                    child.view.set_used(i, false);
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(None);
        }
        if !child.is_viable() {
            return Err(GenerationError::EmptyView);
        }
        if !child.has_feature_count(self.min_features, self.max_features) {
            debug!("Mutated child has {} features, dropped", child.view.used_count());
            return Ok(None);
        }
        Ok(Some(child))
    }
}

impl PopulationOperator for GeneratingMutation {
    fn name(&self) -> &str {
        match (self.directed, self.fourier.is_some()) {
            (true, _) => "directed generating mutation",
            (false, true) => "fourier generating mutation",
            (false, false) => "generating mutation",
        }
    }

    fn operate(&mut self, mut pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        let generation = pop.generation();
        let stats = if self.directed {
            Some(PopulationStats::compute(&pop, &self.originals))
        } else {
            None
        };
        let this = &*self;
        let individuals = map_individuals(&pop.individuals, self.parallel, rng, |individual, rng| {
            match this.mutate_individual(individual, generation, stats.as_ref(), rng) {
                Ok(Some(child)) => vec![individual.clone(), child],
                Ok(None) => vec![individual.clone()],
                Err(e) => {
                    warn!("{}: {}, individual kept unchanged", this.name(), e);
                    vec![individual.clone()]
                }
            }
        });
        pop.replace(individuals);
        Ok(pop)
    }
}

/// Adds sinusoids of the label's dominant frequencies along one randomly
/// chosen used feature
pub struct FourierBoost {
    synthesis: FourierSynthesis,
    min_features: usize,
    max_features: usize,
}

impl FourierBoost {
    pub fn new(synthesis: FourierSynthesis, min_features: usize, max_features: usize) -> FourierBoost {
        FourierBoost {
            synthesis,
            min_features,
            max_features,
        }
    }

    fn boost(&self, individual: &Individual, generation: usize, rng: &mut dyn RngCore) -> Result<Option<Individual>, GenerationError> {
        let numeric: Vec<Arc<Column>> = individual
            .view
            .used()
            .filter(|s| s.column.feature.is_numeric())
            .map(|s| Arc::clone(&s.column))
            .collect();
        let Some(source) = numeric.choose(rng) else {
            return Ok(None);
        };

        let mut child = individual.child(generation);
        let mut added = 0;
        for instance in self.synthesis.instances(source, &individual.view.label, rng) {
            added += GeneratingMutation::add_synthesized(&mut child, &instance, f64::NAN)?.len();
        }
        if added == 0 || !child.has_feature_count(self.min_features, self.max_features) {
            return Ok(None);
        }
        Ok(Some(child))
    }
}

impl IndividualOperator for FourierBoost {
    fn name(&self) -> &str {
        "fourier boost"
    }

    fn operate_individual(&self, individual: &Individual, generation: usize, rng: &mut dyn RngCore) -> Vec<Individual> {
        match self.boost(individual, generation, rng) {
            Ok(Some(child)) => vec![individual.clone(), child],
            Ok(None) => vec![individual.clone()],
            Err(e) => {
                warn!("fourier boost: {}, individual kept unchanged", e);
                vec![individual.clone()]
            }
        }
    }
}
