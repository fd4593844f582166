/// End-to-end runs of the feature construction search on synthetic data
///
/// Run with: cargo test --test test_ga_e2e -- --nocapture
use genfeat::data::Dataset;
use genfeat::error::{GaError, OracleError};
use genfeat::oracle::{FnOracle, RidgeOracle};
use genfeat::param::{MutationKind, Param};
use genfeat::performance::Performance;
use genfeat::{run, run_on_data};
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn synthetic_columns() -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let a: Vec<f64> = (0..40).map(|i| (i % 7) as f64 + 0.5).collect();
    let b: Vec<f64> = (0..40).map(|i| ((i * 3) % 11) as f64 - 5.0).collect();
    // the last term is unreachable from a and b, so r2 stays below 1
    let y = (0..40).map(|i| a[i] * b[i] + a[i] + ((i * 13) % 5) as f64 * 0.3).collect();
    (a, b, y)
}

fn synthetic_data() -> Dataset {
    let (a, b, y) = synthetic_columns();
    Dataset::from_columns(vec![("a", a), ("b", b)], "y", y).unwrap()
}

/// Generating mutation restricted to sums and products
fn create_params() -> Param {
    let mut param = Param::default();
    param.general.seed = 42;
    param.general.display_colorful = false;
    param.ga.population_size = 5;
    param.ga.max_generations = 3;
    param.ga.early_stopping = false;
    param.mutation.kind = MutationKind::generating;

    let generators = &mut param.generators;
    generators.plus = true;
    generators.mult = true;
    generators.diff = false;
    generators.div = false;
    generators.reciprocal = false;
    generators.square_roots = false;
    generators.power = false;
    generators.exponential = false;
    generators.log = false;
    generators.absolute = false;
    generators.min_max = false;
    generators.sign = false;
    generators.floor_ceil = false;
    generators.trigonometric = false;
    param
}

fn running() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}

#[test]
fn test_ga_runs_exactly_max_generations() {
    let data = synthetic_data();
    let param = create_params();
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let result = run_on_data(&data, &oracle, &param, running()).expect("run should succeed");

    assert_eq!(result.generations, 3);
    assert!(!result.dataset.is_empty(), "best individual must keep at least one feature");
    assert!(result.fitness.value.is_finite());
    assert_eq!(result.fitness.criterion, "r2");
}

#[test]
fn test_ga_best_ever_never_decreases() {
    let data = synthetic_data();
    let mut param = create_params();
    param.ga.max_generations = 8;
    param.ga.population_size = 12;
    param.ga.keep_trace = true;
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let result = run_on_data(&data, &oracle, &param, running()).unwrap();

    assert_eq!(result.trace.len(), 9);
    for pair in result.trace.windows(2) {
        assert!(pair[1] >= pair[0], "best-ever dropped from {} to {}", pair[0], pair[1]);
    }
    assert_eq!(*result.trace.last().unwrap(), result.fitness.value);
}

#[test]
fn test_ga_terminates_with_flat_oracle() {
    let data = synthetic_data();
    let mut param = create_params();
    param.ga.max_generations = 6;
    let oracle = FnOracle::new(|_: &Dataset| Ok(Performance::new("flat", 0.0, 1.0)));

    let result = run_on_data(&data, &oracle, &param, running()).unwrap();
    assert_eq!(result.generations, 6);

    param.ga.early_stopping = true;
    param.ga.generations_without_improval = 2;
    let result = run_on_data(&data, &oracle, &param, running()).unwrap();
    assert_eq!(result.generations, 2);
}

#[test]
fn test_ga_stops_on_cleared_flag() {
    let data = synthetic_data();
    let param = create_params();
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let res = run_on_data(&data, &oracle, &param, Arc::new(AtomicBool::new(false)));
    assert!(matches!(res, Err(GaError::Stopped { generation: 1 })));
}

#[test]
fn test_ga_is_reproducible_with_seed() {
    let data = synthetic_data();
    let mut param = create_params();
    param.ga.max_generations = 5;
    param.ga.population_size = 8;
    param.mutation.kind = MutationKind::directed;
    param.mutation.parallel = true;
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let first = run_on_data(&data, &oracle, &param, running()).unwrap();
    let second = run_on_data(&data, &oracle, &param, running()).unwrap();

    assert_eq!(first.weights, second.weights);
    assert_eq!(first.fitness.value, second.fitness.value);
    assert_eq!(first.dataset.feature_names(), second.dataset.feature_names());
}

#[test]
fn test_ga_weights_are_normalised() {
    let data = synthetic_data();
    let param = create_params();
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let result = run_on_data(&data, &oracle, &param, running()).unwrap();

    let total: f64 = result.weights.iter().map(|(_, w)| w.abs()).sum();
    assert!((total - 1.0).abs() < 1e-9, "weights sum to {}", total);
    for name in result.dataset.feature_names() {
        assert!(result.weights.iter().any(|(n, _)| *n == name));
    }
}

#[test]
fn test_ga_oracle_failure_is_fatal() {
    let data = synthetic_data();
    let param = create_params();
    let oracle = FnOracle::new(|_: &Dataset| Err(OracleError::Failed("backend unavailable".to_string())));

    let res = run_on_data(&data, &oracle, &param, running());
    match res {
        Err(GaError::Operator { operator, source }) => {
            assert_eq!(operator, "evaluation");
            assert!(source.to_string().contains("backend unavailable"));
        }
        Err(e) => panic!("unexpected error {}", e),
        Ok(_) => panic!("run should fail"),
    }
}

#[test]
fn test_ga_rejects_negative_fourier_epsilon() {
    let data = synthetic_data();
    let mut param = create_params();
    param.mutation.kind = MutationKind::fourier;
    param.fourier.search_fourier_peaks = 2;
    param.fourier.epsilon = -0.1;
    let oracle = RidgeOracle::from_param(&param.oracle, param.general.seed);

    let res = run_on_data(&data, &oracle, &param, running());
    assert!(matches!(res, Err(GaError::Config(_))));
}

#[test]
fn test_run_loads_tsv() {
    let (a, b, y) = synthetic_columns();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "a\tb\ty").unwrap();
    for i in 0..a.len() {
        writeln!(file, "{}\t{}\t{}", a[i], b[i], y[i]).unwrap();
    }
    file.flush().unwrap();

    let mut param = create_params();
    param.data.path = file.path().to_string_lossy().to_string();
    param.data.label = "y".to_string();

    let result = run(&param, running()).unwrap();
    assert_eq!(result.generations, 3);
    assert!(result.dataset.feature_names().len() >= 1);
}

#[test]
fn test_run_rejects_missing_label() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "a\tb\n1\t2\n3\t4").unwrap();
    file.flush().unwrap();

    let mut param = create_params();
    param.data.path = file.path().to_string_lossy().to_string();
    param.data.label = "y".to_string();

    assert!(matches!(run(&param, running()), Err(GaError::Data(_))));
}
