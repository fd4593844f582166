use crate::cv::CV;
use crate::data::Dataset;
use crate::error::OracleError;
use crate::param;
use crate::performance::Performance;
use crate::utils::{mean_and_std, solve_linear_system};
use log::debug;

/// External evaluator scoring a dataset restricted to the used features.
///
/// Implementations must return the same score for the same dataset within a
/// run: the engine caches scores and never asks twice for one individual.
pub trait FitnessOracle: Send + Sync {
    fn evaluate(&self, data: &Dataset) -> Result<Performance, OracleError>;

    /// Score plus optional per-feature weights, one per column of `data`
    fn evaluate_weighted(&self, data: &Dataset) -> Result<(Performance, Option<Vec<f64>>), OracleError> {
        Ok((self.evaluate(data)?, None))
    }

    /// Whether concurrent calls are safe. Evaluations are serialized otherwise.
    fn is_reentrant(&self) -> bool {
        false
    }
}

/// Oracle backed by a closure
pub struct FnOracle<F> {
    function: F,
    reentrant: bool,
}

impl<F> FnOracle<F>
where
    F: Fn(&Dataset) -> Result<Performance, OracleError> + Send + Sync,
{
    pub fn new(function: F) -> FnOracle<F> {
        FnOracle {
            function,
            reentrant: false,
        }
    }

    pub fn reentrant(mut self) -> FnOracle<F> {
        self.reentrant = true;
        self
    }
}

impl<F> FitnessOracle for FnOracle<F>
where
    F: Fn(&Dataset) -> Result<Performance, OracleError> + Send + Sync,
{
    fn evaluate(&self, data: &Dataset) -> Result<Performance, OracleError> {
        (self.function)(data)
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

/// Cross-validated ridge regression of the label on the used features.
///
/// Main criterion is the pooled out-of-fold R² (maximum 1.0). Features are
/// standardised on each training fold, missing values replaced by the fold
/// mean. Weights are the absolute standardised coefficients of a fit on all
/// rows.
pub struct RidgeOracle {
    folds: usize,
    ridge: f64,
    seed: u64,
}

impl RidgeOracle {
    pub fn new(folds: usize, ridge: f64, seed: u64) -> RidgeOracle {
        RidgeOracle { folds, ridge, seed }
    }

    pub fn from_param(param: &param::Oracle, seed: u64) -> RidgeOracle {
        RidgeOracle::new(param.folds, param.ridge, seed)
    }
}

struct RidgeFit {
    means: Vec<f64>,
    stds: Vec<f64>,
    intercept: f64,
    coefficients: Vec<f64>,
}

impl RidgeFit {
    fn standardized(&self, data: &Dataset, j: usize, row: usize) -> f64 {
        let v = data.columns[j].values[row];
        let v = if v.is_finite() { v } else { self.means[j] };
        if self.stds[j] > 0.0 {
            (v - self.means[j]) / self.stds[j]
        } else {
            0.0
        }
    }

    fn predict(&self, data: &Dataset, row: usize) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .enumerate()
                .map(|(j, b)| b * self.standardized(data, j, row))
                .sum::<f64>()
    }
}

impl RidgeOracle {
    fn fit(&self, data: &Dataset, rows: &[usize]) -> Result<RidgeFit, OracleError> {
        let p = data.len();
        let mut means = Vec::with_capacity(p);
        let mut stds = Vec::with_capacity(p);
        for column in &data.columns {
            let values: Vec<f64> = rows.iter().map(|&r| column.values[r]).collect();
            let (m, s) = mean_and_std(&values);
            means.push(m);
            stds.push(s);
        }
        let label: Vec<f64> = rows.iter().map(|&r| data.label[r]).collect();
        let (intercept, _) = mean_and_std(&label);

        let mut fit = RidgeFit {
            means,
            stds,
            intercept,
            coefficients: vec![0.0; p],
        };

        let x: Vec<Vec<f64>> = rows
            .iter()
            .map(|&r| (0..p).map(|j| fit.standardized(data, j, r)).collect())
            .collect();

        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        for (row, target) in x.iter().zip(&label) {
            let centered = if target.is_finite() { target - intercept } else { 0.0 };
            for a in 0..p {
                xty[a] += row[a] * centered;
                for b in a..p {
                    xtx[a][b] += row[a] * row[b];
                }
            }
        }
        let lambda = self.ridge.max(1e-9) * rows.len().max(1) as f64;
        for a in 0..p {
            for b in 0..a {
                xtx[a][b] = xtx[b][a];
            }
            xtx[a][a] += lambda;
        }

        fit.coefficients = solve_linear_system(xtx, xty).ok_or(OracleError::Singular)?;
        Ok(fit)
    }
}

impl FitnessOracle for RidgeOracle {
    fn evaluate(&self, data: &Dataset) -> Result<Performance, OracleError> {
        self.evaluate_weighted(data).map(|(p, _)| p)
    }

    fn evaluate_weighted(&self, data: &Dataset) -> Result<(Performance, Option<Vec<f64>>), OracleError> {
        if data.is_empty() {
            return Err(OracleError::NoFeatures);
        }
        if data.rows() < 2 {
            return Err(OracleError::Failed(format!("{} rows are not enough to validate", data.rows())));
        }

        let cv = CV::new(data.rows(), self.folds, self.seed);
        let mut sse = 0.0;
        let mut sst = 0.0;
        for (train, valid) in cv.training_sets.iter().zip(&cv.validation_folds) {
            let fit = self.fit(data, train)?;
            for &row in valid {
                let target = data.label[row];
                if !target.is_finite() {
                    continue;
                }
                sse += (target - fit.predict(data, row)).powi(2);
                sst += (target - fit.intercept).powi(2);
            }
        }
        let r2 = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };
        let rows = data.rows() as f64;

        let all: Vec<usize> = (0..data.rows()).collect();
        let full = self.fit(data, &all)?;
        let weights = full.coefficients.iter().map(|b| b.abs()).collect();

        debug!("ridge oracle: {} features, r2 {:.4}", data.len(), r2);
        Ok((
            Performance::new("r2", r2, 1.0).with("rmse", (sse / rows).sqrt()),
            Some(weights),
        ))
    }

    fn is_reentrant(&self) -> bool {
        true
    }
}
