use crate::data::Dataset;
use crate::individual::Individual;
use crate::operator::IndividualOperator;
use crate::param;
use log::{debug, warn};
use rand::{Rng, RngCore};
use std::collections::BTreeMap;

/// Drops features with a zero weight and constant 0/1 indicator columns
pub struct RemoveUselessAttributes;

impl RemoveUselessAttributes {
    /// Slots of used features carrying no information
    pub fn useless(individual: &Individual) -> Vec<usize> {
        individual
            .view
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.used)
            .filter(|(_, s)| {
                let constant_indicator = s.column.min == s.column.max && (s.column.min == 0.0 || s.column.min == 1.0);
                s.weight == 0.0 || constant_indicator
            })
            .map(|(i, _)| i)
            .collect()
    }
}

impl IndividualOperator for RemoveUselessAttributes {
    fn name(&self) -> &str {
        "remove useless attributes"
    }

    fn operate_individual(&self, individual: &Individual, generation: usize, _rng: &mut dyn RngCore) -> Vec<Individual> {
        let useless = Self::useless(individual);
        if useless.is_empty() {
            return vec![individual.clone()];
        }
        let mut child = individual.child(generation);
        child.view.remove(&useless);
        if !child.is_viable() {
            warn!("Removing {} useless features would leave none, individual kept unchanged", useless.len());
            return vec![individual.clone()];
        }
        debug!("Removed {} useless features", useless.len());
        vec![child]
    }
}

/// Removes constructed features that compute the same values as a simpler one.
///
/// Equivalence is tested on a small synthetic sample where every original
/// feature is drawn uniformly from its observed range ([-1, 1] when
/// degenerate). Of two equivalent features the one with the longer
/// construction is removed; identical constructions are equivalent without
/// sampling.
pub struct EquivalentAttributeRemoval {
    samples: usize,
    epsilon: f64,
    ranges: BTreeMap<String, (f64, f64)>,
}

impl EquivalentAttributeRemoval {
    pub fn new(samples: usize, epsilon: f64, ranges: BTreeMap<String, (f64, f64)>) -> EquivalentAttributeRemoval {
        EquivalentAttributeRemoval {
            samples,
            epsilon,
            ranges,
        }
    }

    /// Ranges taken from the original features of `data`
    pub fn from_data(data: &Dataset, param: &param::Redundancy) -> EquivalentAttributeRemoval {
        let ranges = data
            .columns
            .iter()
            .filter(|c| c.feature.construction.is_simple())
            .map(|c| (c.name().to_string(), (c.min, c.max)))
            .collect();
        EquivalentAttributeRemoval::new(param.equivalence_samples, param.equivalence_epsilon, ranges)
    }

    fn synthetic_base(&self, rng: &mut dyn RngCore) -> BTreeMap<String, Vec<f64>> {
        self.ranges
            .iter()
            .map(|(name, &(min, max))| {
                let (low, high) = if min.is_finite() && max.is_finite() && min < max {
                    (min, max)
                } else {
                    (-1.0, 1.0)
                };
                let values = (0..self.samples).map(|_| rng.gen_range(low..=high)).collect();
                (name.clone(), values)
            })
            .collect()
    }

    fn equivalent(&self, a: &[f64], b: &[f64]) -> bool {
        a.iter().zip(b).all(|(x, y)| {
            if x.is_nan() || y.is_nan() {
                x.is_nan() && y.is_nan()
            } else {
                x == y || (x - y).abs() <= self.epsilon
            }
        })
    }

    /// Slots marked for removal. Marks are collected over the full pairwise
    /// scan before anything is removed. A feature that cannot be sampled is
    /// equivalent to nothing but its identical constructions.
    pub fn marked(&self, individual: &Individual, rng: &mut dyn RngCore) -> Vec<usize> {
        let used = individual.view.used_indices();
        let constructions: Vec<String> = used
            .iter()
            .map(|&i| individual.view.slots[i].column.feature.construction_string())
            .collect();

        let mut base: Option<BTreeMap<String, Vec<f64>>> = None;
        // None: not sampled yet, Some(None): sampling failed
        let mut sampled: Vec<Option<Option<Vec<f64>>>> = vec![None; used.len()];
        let mut marks: Vec<usize> = Vec::new();

        for a in 0..used.len() {
            for b in a + 1..used.len() {
                let equivalent = if constructions[a] == constructions[b] {
                    true
                } else {
                    let base = base.get_or_insert_with(|| self.synthetic_base(rng));
                    for k in [a, b] {
                        if sampled[k].is_none() {
                            let expr = &individual.view.slots[used[k]].column.feature.construction;
                            let values = match expr.evaluate(base, self.samples) {
                                Ok(values) => Some(values),
                                Err(e) => {
                                    warn!("Cannot sample {} for equivalence: {}", constructions[k], e);
                                    None
                                }
                            };
                            sampled[k] = Some(values);
                        }
                    }
                    match (&sampled[a], &sampled[b]) {
                        (Some(Some(va)), Some(Some(vb))) => self.equivalent(va, vb),
                        _ => false,
                    }
                };
                if equivalent {
                    let longer = if constructions[a].len() > constructions[b].len() { used[a] } else { used[b] };
                    if !marks.contains(&longer) {
                        marks.push(longer);
                    }
                }
            }
        }
        marks.sort_unstable();
        marks
    }
}

impl IndividualOperator for EquivalentAttributeRemoval {
    fn name(&self) -> &str {
        "equivalent attribute removal"
    }

    fn operate_individual(&self, individual: &Individual, generation: usize, rng: &mut dyn RngCore) -> Vec<Individual> {
        let marks = self.marked(individual, rng);
        if marks.is_empty() {
            return vec![individual.clone()];
        }
        let mut child = individual.child(generation);
        child.view.remove(&marks);
        if !child.is_viable() {
            warn!("Equivalence removal would leave no feature, individual kept unchanged");
            return vec![individual.clone()];
        }
        debug!("Removed {} equivalent features", marks.len());
        vec![child]
    }
}
