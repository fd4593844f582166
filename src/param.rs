use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs::File;
use std::io::BufReader;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum CrossoverType {
    one_point,
    uniform,
    shuffle,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum MutationKind {
    /// Flip enable flags only, no feature construction
    selection,
    /// Add original, add generated, remove, budgeted from p/4
    generating,
    /// Weight-biased choices informed by the whole population
    directed,
    /// Generating mutation plus sinusoidal features from spectral peaks
    fourier,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[allow(non_camel_case_types)]
pub enum AdaptionType {
    uniformly,
    uniformly_without_nu,
    gaussian,
}

// Field definitions and associated default values

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Param {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub data: Data,
    #[serde(default)]
    pub ga: GA,
    #[serde(default)]
    pub selection: Selection,
    #[serde(default)]
    pub crossover: Crossover,
    #[serde(default)]
    pub mutation: Mutation,
    #[serde(default)]
    pub generators: Generators,
    #[serde(default)]
    pub redundancy: Redundancy,
    #[serde(default)]
    pub fourier: Fourier,
    #[serde(default)]
    pub oracle: Oracle,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct General {
    #[serde(default = "seed_default")]
    pub seed: u64,
    #[serde(default = "one_default")]
    pub thread_number: usize,
    #[serde(default = "log_base_default")]
    pub log_base: String,
    #[serde(default = "log_suffix_default")]
    pub log_suffix: String,
    #[serde(default = "log_level_default")]
    pub log_level: String,
    #[serde(default = "true_default")]
    pub display_colorful: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Data {
    #[serde(default = "empty_string")]
    pub path: String,
    #[serde(default = "label_default")]
    pub label: String,
    #[serde(default = "delimiter_default")]
    pub delimiter: char,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GA {
    #[serde(default = "pop_size_default")]
    pub population_size: usize,
    #[serde(default = "max_generations_default")]
    pub max_generations: usize,
    #[serde(default = "false_default")]
    pub early_stopping: bool,
    #[serde(default = "patience_default")]
    pub generations_without_improval: usize,
    #[serde(default = "half_default")]
    pub p_initialize: f64,
    #[serde(default = "infinity_default")]
    pub maximal_fitness: f64,
    #[serde(default = "one_default")]
    pub min_features: usize,
    #[serde(default = "uzero_default")]
    pub max_features: usize,
    #[serde(default = "false_default")]
    pub keep_trace: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Selection {
    #[serde(default = "tournament_fraction_default")]
    pub tournament_fraction: f64,
    #[serde(default = "true_default")]
    pub keep_best: bool,
    #[serde(default = "true_default")]
    pub dynamic_selection_pressure: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Crossover {
    #[serde(default = "crossover_type_default")]
    pub crossover_type: CrossoverType,
    #[serde(default = "half_default")]
    pub p_crossover: f64,
    #[serde(default = "true_default")]
    pub unbalanced: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mutation {
    #[serde(default = "mutation_kind_default")]
    pub kind: MutationKind,
    #[serde(default = "heuristic_default")]
    pub p_mutation: f64,
    #[serde(default = "true_default")]
    pub restrictive_selection: bool,
    #[serde(default = "empty_list")]
    pub excluded_functions: Vec<String>,
    #[serde(default = "true_default")]
    pub parallel: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Generators {
    #[serde(default = "true_default")]
    pub plus: bool,
    #[serde(default = "true_default")]
    pub diff: bool,
    #[serde(default = "true_default")]
    pub mult: bool,
    #[serde(default = "true_default")]
    pub div: bool,
    #[serde(default = "false_default")]
    pub reciprocal: bool,
    #[serde(default = "false_default")]
    pub square_roots: bool,
    #[serde(default = "false_default")]
    pub power: bool,
    #[serde(default = "false_default")]
    pub exponential: bool,
    #[serde(default = "false_default")]
    pub log: bool,
    #[serde(default = "false_default")]
    pub absolute: bool,
    #[serde(default = "false_default")]
    pub min_max: bool,
    #[serde(default = "false_default")]
    pub sign: bool,
    #[serde(default = "false_default")]
    pub floor_ceil: bool,
    #[serde(default = "false_default")]
    pub trigonometric: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Redundancy {
    #[serde(default = "false_default")]
    pub remove_useless: bool,
    #[serde(default = "false_default")]
    pub equivalence_removal: bool,
    #[serde(default = "equivalence_samples_default")]
    pub equivalence_samples: usize,
    #[serde(default = "equivalence_epsilon_default")]
    pub equivalence_epsilon: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Fourier {
    #[serde(default = "uzero_default")]
    pub search_fourier_peaks: usize,
    #[serde(default = "one_default")]
    pub attributes_per_peak: usize,
    #[serde(default = "fourier_epsilon_default")]
    pub epsilon: f64,
    #[serde(default = "adaption_type_default")]
    pub adaption_type: AdaptionType,
    #[serde(default = "uzero_default")]
    pub boost_every: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Oracle {
    #[serde(default = "folds_default")]
    pub folds: usize,
    #[serde(default = "ridge_default")]
    pub ridge: f64,
}

// Default section definitions

impl Default for General {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Data {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for GA {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Selection {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Crossover {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Mutation {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Generators {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Redundancy {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Fourier {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Oracle {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Default for Param {
    fn default() -> Self {
        serde_json::from_value(serde_json::json!({})).unwrap()
    }
}

impl Param {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Generators {
    /// Number of enabled function families
    pub fn enabled_count(&self) -> usize {
        [
            self.plus,
            self.diff,
            self.mult,
            self.div,
            self.reciprocal,
            self.square_roots,
            self.power,
            self.exponential,
            self.log,
            self.absolute,
            self.min_max,
            self.sign,
            self.floor_ceil,
            self.trigonometric,
        ]
        .iter()
        .filter(|e| **e)
        .count()
    }
}

pub fn get(param_file: String) -> Result<Param, Box<dyn Error>> {
    let param_file_reader = File::open(param_file)?;
    let param_reader = BufReader::new(param_file_reader);

    let mut config: Param = serde_yaml::from_reader(param_reader)?;

    validate(&mut config)?;

    Ok(config)
}

pub fn validate(param: &mut Param) -> Result<(), String> {
    if !param.general.log_base.is_empty() {
        param.general.display_colorful = false;
    }

    if param.ga.population_size < 1 {
        return Err("population_size must be at least 1.".to_string());
    }

    if param.ga.max_generations < 1 {
        return Err("max_generations must be at least 1.".to_string());
    }

    if !(param.ga.p_initialize > 0.0 && param.ga.p_initialize <= 1.0) {
        return Err(format!(
            "Invalid p_initialize={:.3}. Must be in range (0, 1].",
            param.ga.p_initialize
        ));
    }

    if param.ga.max_features > 0 && param.ga.min_features > param.ga.max_features {
        return Err(format!(
            "min_features={} is greater than max_features={}.",
            param.ga.min_features, param.ga.max_features
        ));
    }

    if param.ga.early_stopping && param.ga.generations_without_improval == 0 {
        return Err("generations_without_improval must be at least 1 when early_stopping is enabled.".to_string());
    }

    if !(param.selection.tournament_fraction > 0.0 && param.selection.tournament_fraction <= 1.0) {
        return Err(format!(
            "Invalid tournament_fraction={:.3}. Must be in range (0, 1].",
            param.selection.tournament_fraction
        ));
    }

    validate_probability("p_crossover", param.crossover.p_crossover)?;
    if param.mutation.p_mutation >= 0.0 {
        validate_probability("p_mutation", param.mutation.p_mutation)?;
    }

    if param.mutation.kind != MutationKind::selection && param.generators.enabled_count() == 0 {
        return Err("Generating mutation requires at least one enabled generator.".to_string());
    }

    if param.redundancy.equivalence_removal && param.redundancy.equivalence_samples == 0 {
        return Err("equivalence_samples must be at least 1.".to_string());
    }

    if param.redundancy.equivalence_epsilon < 0.0 {
        return Err(format!(
            "Invalid equivalence_epsilon={}. Must be >= 0.",
            param.redundancy.equivalence_epsilon
        ));
    }

    if !(param.fourier.epsilon.is_finite() && param.fourier.epsilon >= 0.0) {
        return Err(format!(
            "Invalid fourier epsilon={}. Must be finite and >= 0.",
            param.fourier.epsilon
        ));
    }

    if param.oracle.folds < 2 {
        return Err("oracle folds must be at least 2.".to_string());
    }

    if param.mutation.kind == MutationKind::fourier && param.fourier.search_fourier_peaks == 0 {
        warn!("fourier mutation selected with search_fourier_peaks=0: no sinusoidal feature will be built.");
    }

    if param.crossover.unbalanced && param.crossover.crossover_type == CrossoverType::one_point {
        warn!("one_point unbalanced crossover cuts each parent at its own position: children lengths will vary.");
    }

    Ok(())
}

fn validate_probability(name: &str, p: f64) -> Result<(), String> {
    if !(0.0..=1.0).contains(&p) {
        return Err(format!("Invalid {}={:.3}. Must be in range [0, 1].", name, p));
    }
    Ok(())
}

// Default value definitions

fn seed_default() -> u64 {
    4815162342
}
fn empty_string() -> String {
    "".to_string()
}
fn empty_list() -> Vec<String> {
    Vec::new()
}
fn label_default() -> String {
    "label".to_string()
}
fn delimiter_default() -> char {
    '\t'
}
fn log_base_default() -> String {
    "".to_string()
}
fn log_suffix_default() -> String {
    "log".to_string()
}
fn log_level_default() -> String {
    "info".to_string()
}
fn false_default() -> bool {
    false
}
fn true_default() -> bool {
    true
}
fn uzero_default() -> usize {
    0
}
fn one_default() -> usize {
    1
}
fn half_default() -> f64 {
    0.5
}
fn infinity_default() -> f64 {
    f64::INFINITY
}
fn heuristic_default() -> f64 {
    -1.0
}
fn pop_size_default() -> usize {
    5
}
fn max_generations_default() -> usize {
    30
}
fn patience_default() -> usize {
    2
}
fn tournament_fraction_default() -> f64 {
    0.25
}
fn crossover_type_default() -> CrossoverType {
    CrossoverType::uniform
}
fn mutation_kind_default() -> MutationKind {
    MutationKind::generating
}
fn equivalence_samples_default() -> usize {
    5
}
fn equivalence_epsilon_default() -> f64 {
    0.05
}
fn fourier_epsilon_default() -> f64 {
    0.1
}
fn adaption_type_default() -> AdaptionType {
    AdaptionType::uniformly
}
fn folds_default() -> usize {
    5
}
fn ridge_default() -> f64 {
    1e-6
}
