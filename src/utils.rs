use crate::population::Population;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// a function used essentially in CV that split randomly a Vec<T> into p Vec<T> of approximatively the same size
pub fn split_into_balanced_random_chunks<T: std::clone::Clone>(vec: Vec<T>, p: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<T>> {
    // Step 1: Shuffle the original vector
    let mut shuffled = vec;
    shuffled.shuffle(rng);

    // Step 2: Determine sizes for balanced chunks
    let n = shuffled.len();
    let base_size = n / p; // Minimum size for each chunk
    let extra_elements = n % p; // Remaining elements to distribute

    // Step 3: Create chunks with balanced sizes
    let mut chunks = Vec::new();
    let mut start = 0;

    for i in 0..p {
        let chunk_size = base_size + if i < extra_elements { 1 } else { 0 }; // Add one extra element to the first `extra_elements` chunks
        let end = start + chunk_size;
        chunks.push(shuffled[start..end].to_vec());
        start = end;
    }

    chunks
}

/// Mean and (population) standard deviation of finite values
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return (0.0, 0.0);
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Solves `a x = b` in place by Gaussian elimination with partial pivoting.
/// Returns `None` when the system is singular.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Scales weights so that their absolute values sum to `total`. All-zero
/// input is returned unchanged.
pub fn normalize_weights(weights: &mut [f64], total: f64) {
    let sum: f64 = weights.iter().map(|w| w.abs()).sum();
    if sum > 0.0 {
        for w in weights.iter_mut() {
            *w = *w / sum * total;
        }
    }
}

/// One-line summary of a generation
pub fn display_generation(pop: &Population, colorful: bool) -> String {
    let best = pop
        .best_ever_fitness()
        .map(|p| format!("{:.4}", p.value))
        .unwrap_or_else(|| "-".to_string());
    let current = pop
        .current_best_fitness()
        .map(|p| format!("{:.4}", p.value))
        .unwrap_or_else(|| "-".to_string());
    let k = pop.best_ever().map(|i| i.view.used_count()).unwrap_or(0);
    if colorful {
        format!(
            "#{:<4} | \x1b[1;93mbest {}\x1b[0m (k={}) | current {} | n={} | mean k {:.1} | stale {}",
            pop.generation(),
            best,
            k,
            current,
            pop.len(),
            pop.mean_feature_count(),
            pop.generations_without_improvement()
        )
    } else {
        format!(
            "#{:<4} | best {} (k={}) | current {} | n={} | mean k {:.1} | stale {}",
            pop.generation(),
            best,
            k,
            current,
            pop.len(),
            pop.mean_feature_count(),
            pop.generations_without_improvement()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn balanced_chunks_cover_everything() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let chunks = split_into_balanced_random_chunks((0..10).collect::<Vec<usize>>(), 3, &mut rng);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![4, 3, 3]);
        let mut all: Vec<usize> = chunks.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn mean_and_std_skip_nan() {
        let (m, s) = mean_and_std(&[1.0, f64::NAN, 3.0]);
        assert_eq!(m, 2.0);
        assert_eq!(s, 1.0);
    }

    #[test]
    fn solves_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve_linear_system(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
        assert!(solve_linear_system(vec![vec![1.0, 2.0], vec![2.0, 4.0]], vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn normalization_keeps_sign_and_total() {
        let mut w = vec![1.0, -1.0, 2.0];
        normalize_weights(&mut w, 1.0);
        assert_eq!(w, vec![0.25, -0.25, 0.5]);
        let mut zeros = vec![0.0, 0.0];
        normalize_weights(&mut zeros, 1.0);
        assert_eq!(zeros, vec![0.0, 0.0]);
    }
}
