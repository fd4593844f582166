use crate::data::Dataset;
use crate::performance::Performance;
use crate::view::FeatureView;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// One candidate solution: a weighted feature view and its cached score
#[derive(Clone, PartialEq)]
pub struct Individual {
    /// Features, enabled flags and weights
    pub view: FeatureView,
    /// Score given by the oracle, `None` until evaluated
    pub fitness: Option<Performance>,
    /// Crowding distance for multi-objective selection schemes
    pub crowding_distance: Option<f64>,
    /// Generation that led to the emergence of the individual
    pub epoch: usize,
}

impl Individual {
    pub fn new(view: FeatureView) -> Individual {
        Individual {
            view,
            fitness: None,
            crowding_distance: None,
            epoch: 0,
        }
    }

    /// Individual using every feature of the dataset
    pub fn from_dataset(data: &Dataset) -> Individual {
        Individual::new(FeatureView::new(data))
    }

    /// Unevaluated copy meant to be modified
    ///
    /// # Examples
    ///
    /// ```
    /// # use genfeat::data::Dataset;
    /// # use genfeat::individual::Individual;
    /// # use genfeat::performance::Performance;
    /// let data = Dataset::from_columns(vec![("a", vec![1.0])], "y", vec![0.0]).unwrap();
    /// let mut parent = Individual::from_dataset(&data);
    /// parent.fitness = Some(Performance::new("r2", 0.5, 1.0));
    /// let child = parent.child(3);
    /// assert!(child.fitness.is_none());
    /// assert_eq!(child.epoch, 3);
    /// ```
    pub fn child(&self, epoch: usize) -> Individual {
        Individual {
            view: self.view.clone(),
            fitness: None,
            crowding_distance: None,
            epoch,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }

    /// A viable individual uses at least one feature
    pub fn is_viable(&self) -> bool {
        self.view.used_count() > 0
    }

    /// Whether the used-feature count lies within `[min, max]` (`max` 0 = unbounded).
    /// An empty individual never qualifies.
    pub fn has_feature_count(&self, min: usize, max: usize) -> bool {
        let k = self.view.used_count();
        k >= min.max(1) && (max == 0 || k <= max)
    }

    /// Main criterion of the cached score, -inf when not evaluated
    pub fn main_fitness(&self) -> f64 {
        self.fitness.as_ref().map(|p| p.main()).unwrap_or(f64::NEG_INFINITY)
    }

    /// Hash of the used construction expressions, independent of slot order
    pub fn compute_hash(&self) -> u64 {
        let mut constructions: Vec<String> = self
            .view
            .used()
            .map(|s| s.column.feature.construction_string())
            .collect();
        constructions.sort();
        let mut hasher = DefaultHasher::new();
        constructions.hash(&mut hasher);
        hasher.finish()
    }

    pub fn display(&self) -> String {
        let features: Vec<String> = self
            .view
            .used()
            .map(|s| {
                if s.weight.is_nan() {
                    s.column.name().to_string()
                } else {
                    format!("{}[{:.3}]", s.column.name(), s.weight)
                }
            })
            .collect();
        let fitness = match &self.fitness {
            Some(p) => p.to_string(),
            None => "not evaluated".to_string(),
        };
        format!("{} | k={} | {}", fitness, features.len(), features.join(", "))
    }
}

impl fmt::Debug for Individual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}
