use crate::utils;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Row indices of a k-fold split: each validation fold and its complementary training set.
#[derive(Clone, Debug, PartialEq)]
pub struct CV {
    pub validation_folds: Vec<Vec<usize>>,
    pub training_sets: Vec<Vec<usize>>,
}

impl CV {
    /// Splits `rows` samples into `folds` balanced random folds. The same
    /// `seed` always yields the same split.
    pub fn new(rows: usize, folds: usize, seed: u64) -> CV {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let folds = folds.clamp(1, rows.max(1));
        let validation_folds: Vec<Vec<usize>> = utils::split_into_balanced_random_chunks((0..rows).collect(), folds, &mut rng)
            .into_iter()
            .map(|mut f| {
                f.sort_unstable();
                f
            })
            .collect();

        let mut training_sets = Vec::new();
        for i in 0..validation_folds.len() {
            let mut train: Vec<usize> = Vec::new();
            for (j, fold) in validation_folds.iter().enumerate() {
                if j == i {
                    continue;
                }
                train.extend_from_slice(fold);
            }
            train.sort_unstable();
            training_sets.push(train);
        }

        CV {
            validation_folds,
            training_sets,
        }
    }

    pub fn len(&self) -> usize {
        self.validation_folds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validation_folds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_partition_rows() {
        let cv = CV::new(23, 5, 42);
        assert_eq!(cv.len(), 5);
        let mut all: Vec<usize> = cv.validation_folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
        for (valid, train) in cv.validation_folds.iter().zip(&cv.training_sets) {
            assert_eq!(valid.len() + train.len(), 23);
            assert!(valid.len() == 4 || valid.len() == 5);
            assert!(valid.iter().all(|v| !train.contains(v)));
        }
    }

    #[test]
    fn split_is_deterministic() {
        assert_eq!(CV::new(40, 4, 7), CV::new(40, 4, 7));
        assert_ne!(CV::new(40, 4, 7), CV::new(40, 4, 8));
    }

    #[test]
    fn fold_count_is_capped_by_rows() {
        assert_eq!(CV::new(3, 10, 1).len(), 3);
    }
}
