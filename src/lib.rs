pub mod crossover;
pub mod cv;
pub mod data;
pub mod error;
pub mod expression;
pub mod fourier;
pub mod ga;
pub mod generator;
pub mod individual;
pub mod mutation;
pub mod operator;
pub mod oracle;
pub mod param;
pub mod performance;
pub mod population;
pub mod redundancy;
pub mod selection;
pub mod utils;
pub mod view;

use data::Dataset;
use error::GaError;
use ga::{GaResult, GeneticAlgorithm, RunningFlag};
use oracle::{FitnessOracle, RidgeOracle};
use param::Param;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use log::{debug, info};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Loads the dataset described by `param` and searches it with the built-in
/// ridge oracle
pub fn run(param: &Param, running: Arc<AtomicBool>) -> Result<GaResult, GaError> {
    if !param.data.delimiter.is_ascii() {
        return Err(GaError::Config(format!(
            "delimiter {:?} must be a single ASCII character",
            param.data.delimiter
        )));
    }
    let data = Dataset::load(&param.data.path, &param.data.label, param.data.delimiter as u8)?;
    debug!("{:?}", data);

    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);
    run_on_data(&data, &oracle, param, running)
}

/// Searches `data` with any fitness oracle. The run stops between
/// generations once `running` is cleared.
pub fn run_on_data(
    data: &Dataset,
    oracle: &dyn FitnessOracle,
    param: &Param,
    running: Arc<AtomicBool>,
) -> Result<GaResult, GaError> {
    let start = std::time::Instant::now();
    let mut rng = ChaCha8Rng::seed_from_u64(param.general.seed);
    let mut ga = GeneticAlgorithm::new(data, oracle, param)?;
    let mut progress = RunningFlag::new(running);
    let result = ga.run(data, &mut rng, &mut progress)?;
    info!(
        "{} features kept ({}), total time {:.2}s",
        result.dataset.len(),
        result.fitness,
        start.elapsed().as_secs_f64()
    );
    Ok(result)
}
