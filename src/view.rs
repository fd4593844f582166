use crate::data::{Column, Dataset};
use std::sync::Arc;

/// One feature slot of a [`FeatureView`]
#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub column: Arc<Column>,
    pub used: bool,
    /// NaN while unset
    pub weight: f64,
}

/// Weighted feature-subset view over a dataset.
///
/// Each view owns its slot list: columns are shared, flags and weights are
/// not, so cloning a view and editing the clone never affects the original.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureView {
    pub slots: Vec<Slot>,
    pub label: Arc<Vec<f64>>,
    pub label_name: String,
}

impl FeatureView {
    /// View over every column of the dataset, all used, weights unset
    pub fn new(data: &Dataset) -> FeatureView {
        FeatureView {
            slots: data
                .columns
                .iter()
                .map(|c| Slot {
                    column: Arc::clone(c),
                    used: true,
                    weight: f64::NAN,
                })
                .collect(),
            label: Arc::clone(&data.label),
            label_name: data.label_name.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.label.len()
    }

    pub fn used_count(&self) -> usize {
        self.slots.iter().filter(|s| s.used).count()
    }

    pub fn used(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| s.used)
    }

    pub fn used_indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.used)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn flags(&self) -> Vec<bool> {
        self.slots.iter().map(|s| s.used).collect()
    }

    pub fn set_used(&mut self, idx: usize, used: bool) {
        self.slots[idx].used = used;
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.column.name() == name)
    }

    /// Appends a column, or re-enables it if a column with the same name is
    /// already part of the view. Returns the slot index.
    pub fn add(&mut self, column: Arc<Column>, weight: f64) -> usize {
        if let Some(idx) = self.position(column.name()) {
            self.slots[idx].used = true;
            if self.slots[idx].weight.is_nan() {
                self.slots[idx].weight = weight;
            }
            return idx;
        }
        self.slots.push(Slot {
            column,
            used: true,
            weight,
        });
        self.slots.len() - 1
    }

    /// Physically drops the given slots from this view only
    pub fn remove(&mut self, indices: &[usize]) {
        let mut idx = 0;
        self.slots.retain(|_| {
            let keep = !indices.contains(&idx);
            idx += 1;
            keep
        });
    }

    /// Mean of the set weights of used features, 1.0 when none is set
    pub fn average_weight(&self) -> f64 {
        let set: Vec<f64> = self.used().map(|s| s.weight).filter(|w| !w.is_nan()).collect();
        if set.is_empty() {
            1.0
        } else {
            set.iter().sum::<f64>() / set.len() as f64
        }
    }

    /// Assigns weights to the used slots, in used order
    pub fn set_used_weights(&mut self, weights: &[f64]) {
        for (slot, w) in self.slots.iter_mut().filter(|s| s.used).zip(weights) {
            slot.weight = *w;
        }
    }

    /// Dataset restricted to used features, sharing column data
    pub fn to_dataset(&self) -> Dataset {
        Dataset {
            columns: self.used().map(|s| Arc::clone(&s.column)).collect(),
            label: Arc::clone(&self.label),
            label_name: self.label_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Feature, ValueKind};

    fn data() -> Dataset {
        Dataset::from_columns(
            vec![("a", vec![1.0, 2.0]), ("b", vec![3.0, 4.0]), ("c", vec![5.0, 6.0])],
            "y",
            vec![0.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn clones_are_independent() {
        let view = FeatureView::new(&data());
        let mut other = view.clone();
        other.set_used(0, false);
        other.slots[1].weight = 0.3;
        other.remove(&[2]);
        assert_eq!(view.used_count(), 3);
        assert!(view.slots[1].weight.is_nan());
        assert_eq!(view.len(), 3);
        assert_eq!(other.len(), 2);
        assert!(Arc::ptr_eq(&view.slots[1].column, &other.slots[1].column));
    }

    #[test]
    fn to_dataset_keeps_used_only() {
        let mut view = FeatureView::new(&data());
        view.set_used(1, false);
        assert_eq!(view.to_dataset().feature_names(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(view.used_indices(), vec![0, 2]);
    }

    #[test]
    fn add_reenables_existing_column() {
        let d = data();
        let mut view = FeatureView::new(&d);
        view.set_used(2, false);
        let idx = view.add(Arc::clone(&d.columns[2]), 0.5);
        assert_eq!(idx, 2);
        assert_eq!(view.len(), 3);
        assert_eq!(view.slots[2].weight, 0.5);

        let new = Arc::new(Column::new(Feature::original("d", ValueKind::Numeric), vec![0.0, 0.0]));
        assert_eq!(view.add(new, f64::NAN), 3);
    }

    #[test]
    fn average_weight_skips_unset() {
        let mut view = FeatureView::new(&data());
        assert_eq!(view.average_weight(), 1.0);
        view.slots[0].weight = 0.2;
        view.slots[1].weight = 0.6;
        assert!((view.average_weight() - 0.4).abs() < 1e-12);
    }
}
