//! Crossover operators.
//!
//! Both variants pair up clones of the current individuals and add the
//! children to the population; a later selection step culls it back to size.
//! [`SelectionCrossover`] swaps enable flags between parents of equal length.
//! [`UnbalancedCrossover`] exchanges the features themselves, so children may
//! hold a different number of features than their parents.

use crate::error::GaError;
use crate::individual::Individual;
use crate::operator::PopulationOperator;
use crate::param::{CrossoverType, Param};
use crate::population::Population;
use crate::view::{FeatureView, Slot};
use log::debug;
use rand::seq::index::sample;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Positions to exchange between two parents of `length` features
///
/// * `one_point` - everything past a cut drawn uniformly in `[1, length-1]`
/// * `uniform` - each position independently with probability 0.5
/// * `shuffle` - `m` distinct positions, `m` uniform in `[1, length]`
pub fn crossover_positions(kind: CrossoverType, length: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    match kind {
        CrossoverType::one_point => {
            if length < 2 {
                return Vec::new();
            }
            let cut = rng.gen_range(1..length);
            (cut..length).collect()
        }
        CrossoverType::uniform => (0..length).filter(|_| rng.gen_bool(0.5)).collect(),
        CrossoverType::shuffle => {
            if length == 0 {
                return Vec::new();
            }
            let m = rng.gen_range(1..=length);
            let mut positions = sample(rng, length, m).into_vec();
            positions.sort_unstable();
            positions
        }
    }
}

/// Swaps the enable flags of `a` and `b` at the given positions
pub fn swap_flags(a: &mut FeatureView, b: &mut FeatureView, positions: &[usize]) {
    for &i in positions {
        let used = a.slots[i].used;
        a.slots[i].used = b.slots[i].used;
        b.slots[i].used = used;
    }
}

/// Whether both views hold the same features at the same positions
fn aligned(a: &FeatureView, b: &FeatureView) -> bool {
    a.len() == b.len()
        && a.slots
            .iter()
            .zip(&b.slots)
            .all(|(x, y)| x.column.name() == y.column.name())
}

/// Pairs of pool indices, drawn from a shuffled pool. With an odd pool the
/// last individual sits this generation out.
fn mating_pairs(size: usize, rng: &mut dyn RngCore) -> Vec<(usize, usize)> {
    let mut pool: Vec<usize> = (0..size).collect();
    pool.shuffle(rng);
    pool.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

/// Fixed-length crossover over enable flags
pub struct SelectionCrossover {
    kind: CrossoverType,
    p: f64,
    min_features: usize,
    max_features: usize,
}

impl SelectionCrossover {
    pub fn new(kind: CrossoverType, p: f64, min_features: usize, max_features: usize) -> SelectionCrossover {
        SelectionCrossover {
            kind,
            p,
            min_features,
            max_features,
        }
    }

    pub fn from_param(param: &Param) -> SelectionCrossover {
        SelectionCrossover::new(
            param.crossover.crossover_type,
            param.crossover.p_crossover,
            param.ga.min_features,
            param.ga.max_features,
        )
    }
}

impl PopulationOperator for SelectionCrossover {
    fn name(&self) -> &str {
        "crossover"
    }

    fn operate(&mut self, mut pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        let generation = pop.generation();
        let mut children = Vec::new();

        for (i, j) in mating_pairs(pop.len(), rng) {
            if !rng.gen_bool(self.p) {
                continue;
            }
            let (a, b) = (&pop.individuals[i], &pop.individuals[j]);
            if !aligned(&a.view, &b.view) {
                debug!("Parents of {} and {} features are not aligned, no crossover", a.view.len(), b.view.len());
                continue;
            }

            let positions = crossover_positions(self.kind, a.view.len(), rng);
            if positions.is_empty() {
                continue;
            }
            let mut child_a = a.child(generation);
            let mut child_b = b.child(generation);
            swap_flags(&mut child_a.view, &mut child_b.view, &positions);

            children.extend(
                [child_a, child_b]
                    .into_iter()
                    .filter(|c| c.has_feature_count(self.min_features, self.max_features)),
            );
        }

        debug!("Crossover added {} children", children.len());
        for child in children {
            pop.add(child);
        }
        Ok(pop)
    }
}

/// Variable-length crossover exchanging whole features
pub struct UnbalancedCrossover {
    kind: CrossoverType,
    p: f64,
    min_features: usize,
    max_features: usize,
}

impl UnbalancedCrossover {
    pub fn new(kind: CrossoverType, p: f64, min_features: usize, max_features: usize) -> UnbalancedCrossover {
        UnbalancedCrossover {
            kind,
            p,
            min_features,
            max_features,
        }
    }

    pub fn from_param(param: &Param) -> UnbalancedCrossover {
        UnbalancedCrossover::new(
            param.crossover.crossover_type,
            param.crossover.p_crossover,
            param.ga.min_features,
            param.ga.max_features,
        )
    }

    /// Splits the slots of both parents into the slot lists of two children
    fn exchange(&self, a: &[Slot], b: &[Slot], rng: &mut dyn RngCore) -> (Vec<Slot>, Vec<Slot>) {
        match self.kind {
            CrossoverType::one_point => {
                // each parent is cut at its own position
                let cut_a = if a.len() >= 2 { rng.gen_range(1..a.len()) } else { a.len() };
                let cut_b = if b.len() >= 2 { rng.gen_range(1..b.len()) } else { b.len() };
                let first = a[..cut_a].iter().chain(&b[cut_b..]).cloned().collect();
                let second = b[..cut_b].iter().chain(&a[cut_a..]).cloned().collect();
                (first, second)
            }
            CrossoverType::uniform => {
                let (mut first, mut second) = (Vec::new(), Vec::new());
                for slot in a {
                    if rng.gen_bool(0.5) {
                        second.push(slot.clone());
                    } else {
                        first.push(slot.clone());
                    }
                }
                for slot in b {
                    if rng.gen_bool(0.5) {
                        first.push(slot.clone());
                    } else {
                        second.push(slot.clone());
                    }
                }
                (first, second)
            }
            CrossoverType::shuffle => {
                let (mut first, mut second) = (a.to_vec(), b.to_vec());
                let shortest = a.len().min(b.len());
                if shortest == 0 {
                    return (first, second);
                }
                let m = rng.gen_range(1..=shortest);
                let positions_a = sample(rng, a.len(), m).into_vec();
                let positions_b = sample(rng, b.len(), m).into_vec();
                for (&i, &j) in positions_a.iter().zip(&positions_b) {
                    std::mem::swap(&mut first[i], &mut second[j]);
                }
                (first, second)
            }
        }
    }
}

/// View over `slots`, merging slots that name the same feature
fn assemble(template: &FeatureView, slots: Vec<Slot>) -> FeatureView {
    let mut view = FeatureView {
        slots: Vec::with_capacity(slots.len()),
        label: template.label.clone(),
        label_name: template.label_name.clone(),
    };
    for slot in slots {
        match view.position(slot.column.name()) {
            Some(i) => {
                let existing = &mut view.slots[i];
                existing.used |= slot.used;
                if existing.weight.is_nan() {
                    existing.weight = slot.weight;
                }
            }
            None => view.slots.push(slot),
        }
    }
    view
}

impl PopulationOperator for UnbalancedCrossover {
    fn name(&self) -> &str {
        "unbalanced crossover"
    }

    fn operate(&mut self, mut pop: Population, rng: &mut dyn RngCore) -> Result<Population, GaError> {
        let generation = pop.generation();
        let mut children = Vec::new();

        for (i, j) in mating_pairs(pop.len(), rng) {
            if !rng.gen_bool(self.p) {
                continue;
            }
            let (a, b) = (&pop.individuals[i], &pop.individuals[j]);
            let (first, second) = self.exchange(&a.view.slots, &b.view.slots, rng);

            for (parent, slots) in [(a, first), (b, second)] {
                let mut child = parent.child(generation);
                child.view = assemble(&parent.view, slots);
                if child.has_feature_count(self.min_features, self.max_features) {
                    children.push(child);
                }
            }
        }

        debug!("Unbalanced crossover added {} children", children.len());
        for child in children {
            pop.add(child);
        }
        Ok(pop)
    }
}
