use crate::crossover::{SelectionCrossover, UnbalancedCrossover};
use crate::data::Dataset;
use crate::error::{GaError, OracleError};
use crate::fourier::FourierSynthesis;
use crate::individual::Individual;
use crate::mutation::{FourierBoost, GeneratingMutation, SelectionMutation};
use crate::operator::{PerIndividual, PeriodicOperator, PopulationOperator};
use crate::oracle::FitnessOracle;
use crate::param::{self, MutationKind, Param};
use crate::performance::Performance;
use crate::population::Population;
use crate::redundancy::{EquivalentAttributeRemoval, RemoveUselessAttributes};
use crate::selection::TournamentSelection;
use crate::utils::{display_generation, normalize_weights};
use log::{debug, info, warn};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Evaluating,
    Iterating,
    Done,
}

/// Progress report and cooperative cancellation, checked once per generation
pub trait Progress {
    fn set_total_steps(&mut self, total: Option<usize>);
    fn step(&mut self);
    fn check_cancelled(&self, generation: usize) -> Result<(), GaError>;
}

/// Cancellation through a shared flag cleared by a signal handler
pub struct RunningFlag {
    running: Arc<AtomicBool>,
    total: Option<usize>,
    done: usize,
}

impl RunningFlag {
    pub fn new(running: Arc<AtomicBool>) -> RunningFlag {
        RunningFlag {
            running,
            total: None,
            done: 0,
        }
    }

    pub fn steps(&self) -> usize {
        self.done
    }
}

impl Progress for RunningFlag {
    fn set_total_steps(&mut self, total: Option<usize>) {
        self.total = total;
    }

    fn step(&mut self) {
        self.done += 1;
        match self.total {
            Some(total) => debug!("Step {}/{}", self.done, total),
            None => debug!("Step {}", self.done),
        }
    }

    fn check_cancelled(&self, generation: usize) -> Result<(), GaError> {
        if self.running.load(Ordering::Relaxed) {
            Ok(())
        } else {
            info!("Signal received");
            Err(GaError::Stopped { generation })
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone)]
pub struct GaResult {
    /// Used features of the best-ever individual
    pub dataset: Dataset,
    /// Every feature of the best-ever individual with its normalised weight
    pub weights: Vec<(String, f64)>,
    pub fitness: Performance,
    pub generations: usize,
    pub evaluations: usize,
    pub cache_hits: usize,
    /// Best-ever main fitness per generation, filled when `ga.keep_trace`
    pub trace: Vec<f64>,
}

struct Scored {
    fitness: Performance,
    weights: Option<Vec<(String, f64)>>,
}

type Operators = Vec<Box<dyn PopulationOperator>>;

/// Operators applied before and after evaluation, in order
///
/// # Arguments
///
/// * `data` - The dataset holding the original features.
/// * `param` - Parameters of the run.
///
/// # Returns
///
/// Pre-evaluation operators (crossover, mutation, redundancy passes, periodic
/// Fourier boost) and post-evaluation operators (selection).
pub fn build_operators(data: &Dataset, param: &Param) -> (Operators, Operators) {
    let parallel = param.mutation.parallel;
    let (min, max) = (param.ga.min_features, param.ga.max_features);
    let mut pre: Operators = Vec::new();

    if param.crossover.p_crossover > 0.0 {
        if param.crossover.unbalanced {
            pre.push(Box::new(UnbalancedCrossover::from_param(param)));
        } else {
            pre.push(Box::new(SelectionCrossover::from_param(param)));
        }
    }

    match param.mutation.kind {
        MutationKind::selection => pre.push(Box::new(PerIndividual::new(
            SelectionMutation::new(param.mutation.p_mutation, min, max),
            parallel,
        ))),
        _ => pre.push(Box::new(GeneratingMutation::from_param(data, param))),
    }

    if param.redundancy.remove_useless {
        pre.push(Box::new(PerIndividual::new(RemoveUselessAttributes, parallel)));
    }
    if param.redundancy.equivalence_removal {
        pre.push(Box::new(PerIndividual::new(
            EquivalentAttributeRemoval::from_data(data, &param.redundancy),
            parallel,
        )));
    }
    if param.fourier.boost_every > 0 {
        if let Some(synthesis) = FourierSynthesis::from_param(&param.fourier) {
            let boost = PerIndividual::new(FourierBoost::new(synthesis, min, max), parallel);
            pre.push(Box::new(PeriodicOperator::new(Box::new(boost), param.fourier.boost_every)));
        }
    }

    let post: Operators = vec![Box::new(TournamentSelection::from_param(param))];
    (pre, post)
}

/// Applies one operator and drops the individuals it left without features
fn apply_operator(
    operator: &mut dyn PopulationOperator,
    pop: Population,
    rng: &mut ChaCha8Rng,
) -> Result<Population, GaError> {
    let name = operator.name().to_string();
    let mut pop = operator.operate(pop, rng).map_err(|e| e.in_operator(&name))?;

    let before = pop.len();
    let viable: Vec<Individual> = std::mem::take(&mut pop.individuals)
        .into_iter()
        .filter(|i| i.is_viable())
        .collect();
    if viable.len() < before {
        warn!("{}: dropped {} individuals without features", name, before - viable.len());
    }
    pop.replace(viable);

    if pop.is_empty() {
        return Err(GaError::EmptyPopulation { operator: name });
    }
    debug!("{}: {} individuals", name, pop.len());
    Ok(pop)
}

fn apply_score(individual: &mut Individual, scored: &Scored) {
    individual.fitness = Some(scored.fitness.clone());
    if let Some(weights) = &scored.weights {
        for slot in individual.view.slots.iter_mut().filter(|s| s.used) {
            if let Some((_, w)) = weights.iter().find(|(name, _)| name == slot.column.name()) {
                slot.weight = *w;
            }
        }
    }
}

/// Generational search over feature sets scored by a fitness oracle
pub struct GeneticAlgorithm<'a> {
    param: Param,
    oracle: &'a dyn FitnessOracle,
    pre: Operators,
    post: Operators,
    cache: HashMap<u64, Scored>,
    evaluations: usize,
    cache_hits: usize,
    state: RunState,
    trace: Vec<f64>,
}

impl<'a> GeneticAlgorithm<'a> {
    /// Validates `param` and builds the operators it describes
    pub fn new(data: &Dataset, oracle: &'a dyn FitnessOracle, param: &Param) -> Result<GeneticAlgorithm<'a>, GaError> {
        let mut param = param.clone();
        param::validate(&mut param).map_err(GaError::Config)?;
        if data.is_empty() {
            return Err(GaError::EmptyDataset);
        }
        let (pre, post) = build_operators(data, &param);
        Ok(GeneticAlgorithm::with_operators(oracle, param, pre, post))
    }

    pub fn with_operators(oracle: &'a dyn FitnessOracle, param: Param, pre: Operators, post: Operators) -> GeneticAlgorithm<'a> {
        GeneticAlgorithm {
            param,
            oracle,
            pre,
            post,
            cache: HashMap::new(),
            evaluations: 0,
            cache_hits: 0,
            state: RunState::Init,
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    /// Random individuals over the features of `data`, each enabled with
    /// `p_initialize`, until the population holds only non-empty individuals
    pub fn initial_population(&self, data: &Dataset, rng: &mut ChaCha8Rng) -> Population {
        let size = self.param.ga.population_size;
        let mut individuals = Vec::with_capacity(size);
        while individuals.len() < size {
            let mut individual = Individual::from_dataset(data);
            for i in 0..individual.view.len() {
                individual.view.set_used(i, rng.gen_bool(self.param.ga.p_initialize));
            }
            if individual.is_viable() {
                individuals.push(individual);
            }
        }
        Population::from_individuals(individuals)
    }

    /// Scores every individual lacking a fitness. Identical feature sets are
    /// sent to the oracle once per run.
    pub fn evaluate(&mut self, pop: &mut Population) -> Result<(), GaError> {
        self.state = RunState::Evaluating;

        let mut pending: Vec<(usize, u64)> = Vec::new();
        for (i, individual) in pop.individuals.iter_mut().enumerate() {
            if individual.is_evaluated() {
                continue;
            }
            let hash = individual.compute_hash();
            match self.cache.get(&hash) {
                Some(scored) => {
                    apply_score(individual, scored);
                    self.cache_hits += 1;
                }
                None => pending.push((i, hash)),
            }
        }

        let mut seen = HashSet::new();
        let unique: Vec<(usize, u64)> = pending.iter().copied().filter(|(_, h)| seen.insert(*h)).collect();
        let datasets: Vec<Dataset> = unique.iter().map(|(i, _)| pop.individuals[*i].view.to_dataset()).collect();

        let oracle = self.oracle;
        let results: Vec<Result<(Performance, Option<Vec<f64>>), OracleError>> = if oracle.is_reentrant() {
            datasets.par_iter().map(|d| oracle.evaluate_weighted(d)).collect()
        } else {
            datasets.iter().map(|d| oracle.evaluate_weighted(d)).collect()
        };

        for ((i, hash), result) in unique.iter().zip(results) {
            let (fitness, weights) = result?;
            self.evaluations += 1;
            let names: Vec<String> = pop.individuals[*i].view.used().map(|s| s.column.name().to_string()).collect();
            let weights = weights
                .filter(|w| w.len() == names.len())
                .map(|w| names.into_iter().zip(w).collect());
            self.cache.insert(*hash, Scored { fitness, weights });
        }

        self.cache_hits += pending.len() - unique.len();
        for (i, hash) in pending {
            if let Some(scored) = self.cache.get(&hash) {
                apply_score(&mut pop.individuals[i], scored);
            }
        }
        debug!("{} evaluations, {} cache hits", self.evaluations, self.cache_hits);
        Ok(())
    }

    /// Stop criterion checked before every generation
    pub fn solution_good_enough(&self, pop: &Population) -> bool {
        let ga = &self.param.ga;
        if pop.generation() >= ga.max_generations {
            info!("Reach max generation");
            return true;
        }
        let patience = if ga.early_stopping {
            ga.generations_without_improval
        } else {
            ga.max_generations
        };
        if pop.generations_without_improvement() >= patience {
            info!("No improvement for {} generations", pop.generations_without_improvement());
            return true;
        }
        match pop.best_ever_fitness() {
            Some(best) if best.is_maximal() || best.main() >= ga.maximal_fitness => {
                info!("Maximal fitness reached");
                true
            }
            _ => false,
        }
    }

    fn record(&mut self, pop: &Population) {
        if self.param.ga.keep_trace {
            self.trace.push(pop.best_ever().map(|i| i.main_fitness()).unwrap_or(f64::NEG_INFINITY));
        }
    }

    /// Runs the generational loop on `data` until the stop criterion holds
    ///
    /// # Arguments
    ///
    /// * `data` - The dataset holding the original features and the label.
    /// * `rng` - Random number generator driving every operator.
    /// * `progress` - Per-generation progress and cancellation checkpoint.
    ///
    /// # Returns
    ///
    /// The best-ever feature set with its weights and fitness, or the first
    /// run-fatal error.
    pub fn run(&mut self, data: &Dataset, rng: &mut ChaCha8Rng, progress: &mut dyn Progress) -> Result<GaResult, GaError> {
        let time = Instant::now();
        self.state = RunState::Init;
        if data.is_empty() {
            return Err(GaError::EmptyDataset);
        }

        let mut pop = self.initial_population(data, rng);
        info!(
            "Initial population of {} individuals over {} features",
            pop.len(),
            data.len()
        );
        self.evaluate(&mut pop).map_err(|e| e.in_operator("evaluation"))?;
        pop.update_evaluation();
        self.record(&pop);

        progress.set_total_steps(Some(self.param.ga.max_generations));
        self.state = RunState::Iterating;

        while !self.solution_good_enough(&pop) {
            pop.next_generation();
            let generation = pop.generation();

            for operator in self.pre.iter_mut() {
                if operator.active_in(generation) {
                    pop = apply_operator(operator.as_mut(), pop, rng)?;
                }
            }

            self.evaluate(&mut pop).map_err(|e| e.in_operator("evaluation"))?;
            pop.update_evaluation();
            info!("{}", display_generation(&pop, self.param.general.display_colorful));

            for operator in self.post.iter_mut() {
                if operator.active_in(generation) {
                    pop = apply_operator(operator.as_mut(), pop, rng)?;
                }
            }
            self.record(&pop);

            progress.step();
            progress.check_cancelled(generation)?;
            self.state = RunState::Iterating;
        }

        self.state = RunState::Done;
        info!(
            "Search completed in {:.2}s after {} generations ({} evaluations, {} cache hits)",
            time.elapsed().as_secs_f64(),
            pop.generation(),
            self.evaluations,
            self.cache_hits
        );
        self.result(&pop)
    }

    /// Best-ever individual with unset weights filled with 1.0, unused
    /// features at 0.0 and absolute weights summing to 1.0
    fn result(&self, pop: &Population) -> Result<GaResult, GaError> {
        let best = pop.best_ever().ok_or_else(|| GaError::EmptyPopulation {
            operator: "evaluation".to_string(),
        })?;
        let fitness = best.fitness.clone().ok_or_else(|| GaError::EmptyPopulation {
            operator: "evaluation".to_string(),
        })?;

        let mut values: Vec<f64> = best
            .view
            .slots
            .iter()
            .map(|s| {
                if !s.used {
                    0.0
                } else if s.weight.is_nan() {
                    1.0
                } else {
                    s.weight
                }
            })
            .collect();
        normalize_weights(&mut values, 1.0);
        let weights = best
            .view
            .slots
            .iter()
            .zip(values)
            .map(|(s, w)| (s.column.name().to_string(), w))
            .collect();

        Ok(GaResult {
            dataset: best.view.to_dataset(),
            weights,
            fitness,
            generations: pop.generation(),
            evaluations: self.evaluations,
            cache_hits: self.cache_hits,
            trace: self.trace.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FnOracle;
    use rand::{RngCore, SeedableRng};
    use std::sync::atomic::AtomicUsize;

    fn create_test_data() -> Dataset {
        let a: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..20).map(|i| ((i * 7) % 5) as f64).collect();
        let c: Vec<f64> = (0..20).map(|i| (i as f64 * 0.3).sin()).collect();
        let y: Vec<f64> = a.iter().zip(&b).map(|(x, z)| x + 2.0 * z).collect();
        Dataset::from_columns(vec![("a", a), ("b", b), ("c", c)], "y", y).unwrap()
    }

    fn create_test_params() -> Param {
        let mut param = Param::default();
        param.ga.population_size = 6;
        param.ga.max_generations = 4;
        param.ga.early_stopping = false;
        param.mutation.kind = MutationKind::selection;
        param.redundancy.equivalence_removal = false;
        param.fourier.boost_every = 0;
        param
    }

    fn count_oracle() -> FnOracle<impl Fn(&Dataset) -> Result<Performance, OracleError> + Send + Sync> {
        FnOracle::new(|d: &Dataset| Ok(Performance::new("features", d.len() as f64, 100.0)))
    }

    fn scored_population(values: &[f64], generation_gap: usize) -> Population {
        let mut pop = Population::from_individuals(
            values
                .iter()
                .map(|v| {
                    let mut i = Individual::test_with_flags(&[true]);
                    i.fitness = Some(Performance::new("r2", *v, 1.0));
                    i
                })
                .collect(),
        );
        pop.update_evaluation();
        for _ in 0..generation_gap {
            pop.next_generation();
            pop.update_evaluation();
        }
        pop
    }

    #[test]
    fn initial_population_has_no_empty_individual() {
        let data = create_test_data();
        let oracle = count_oracle();
        let mut param = create_test_params();
        param.ga.p_initialize = 0.1;
        let ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let pop = ga.initial_population(&data, &mut rng);
        assert_eq!(pop.len(), 6);
        assert!(pop.individuals.iter().all(|i| i.is_viable()));
    }

    #[test]
    fn identical_feature_sets_are_evaluated_once() {
        let data = create_test_data();
        let calls = AtomicUsize::new(0);
        let oracle = FnOracle::new(|d: &Dataset| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(Performance::new("features", d.len() as f64, 100.0))
        });
        let ga_param = create_test_params();
        let mut ga = GeneticAlgorithm::new(&data, &oracle, &ga_param).unwrap();

        let individual = Individual::from_dataset(&data);
        let mut pop = Population::from_individuals(vec![individual.clone(), individual.clone()]);
        ga.evaluate(&mut pop).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!((ga.evaluations(), ga.cache_hits()), (1, 1));

        let mut again = Population::from_individuals(vec![individual]);
        ga.evaluate(&mut again).unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(ga.cache_hits(), 2);
        assert_eq!(again.individuals[0].main_fitness(), 3.0);
    }

    #[test]
    fn oracle_weights_are_attached_to_used_features() {
        let data = create_test_data();
        let oracle = crate::oracle::RidgeOracle::new(3, 1e-3, 42);
        let param = create_test_params();
        let mut ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        let mut individual = Individual::from_dataset(&data);
        individual.view.set_used(2, false);
        let mut pop = Population::from_individuals(vec![individual]);
        ga.evaluate(&mut pop).unwrap();
        let slots = &pop.individuals[0].view.slots;
        assert!(slots[0].weight.is_finite() && slots[1].weight.is_finite());
        assert!(slots[2].weight.is_nan());
    }

    #[test]
    fn stop_at_max_generations() {
        let data = create_test_data();
        let oracle = count_oracle();
        let param = create_test_params();
        let ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        assert!(!ga.solution_good_enough(&scored_population(&[0.1, 0.2], 3)));
        assert!(ga.solution_good_enough(&scored_population(&[0.1, 0.2], 4)));
    }

    #[test]
    fn early_stopping_uses_patience() {
        let data = create_test_data();
        let oracle = count_oracle();
        let mut param = create_test_params();
        param.ga.max_generations = 100;
        param.ga.early_stopping = true;
        param.ga.generations_without_improval = 2;
        let ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        assert!(!ga.solution_good_enough(&scored_population(&[0.1], 1)));
        assert!(ga.solution_good_enough(&scored_population(&[0.1], 2)));
    }

    #[test]
    fn maximal_fitness_stops_the_search() {
        let data = create_test_data();
        let oracle = count_oracle();
        let mut param = create_test_params();
        param.ga.max_generations = 100;
        let ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        assert!(ga.solution_good_enough(&scored_population(&[0.3, 1.0], 0)));

        param.ga.maximal_fitness = 0.25;
        let ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        assert!(ga.solution_good_enough(&scored_population(&[0.3], 0)));
        assert!(!ga.solution_good_enough(&scored_population(&[0.2], 0)));
    }

    #[test]
    fn run_reaches_done_with_normalised_weights() {
        let data = create_test_data();
        let oracle = count_oracle();
        let mut param = create_test_params();
        param.ga.keep_trace = true;
        let mut ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut progress = RunningFlag::new(Arc::new(AtomicBool::new(true)));
        let result = ga.run(&data, &mut rng, &mut progress).unwrap();

        assert_eq!(ga.state(), RunState::Done);
        assert_eq!(result.generations, 4);
        assert_eq!(progress.steps(), 4);
        assert_eq!(result.trace.len(), 5);
        assert!(result.trace.windows(2).all(|w| w[1] >= w[0]));
        assert!(!result.dataset.is_empty());
        let total: f64 = result.weights.iter().map(|(_, w)| w.abs()).sum();
        assert!((total - 1.0).abs() < 1e-9);
        for (name, w) in &result.weights {
            assert_eq!(result.dataset.column(name).is_some(), *w != 0.0);
        }
    }

    #[test]
    fn cleared_flag_stops_after_first_generation() {
        let data = create_test_data();
        let oracle = count_oracle();
        let param = create_test_params();
        let mut ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut progress = RunningFlag::new(Arc::new(AtomicBool::new(false)));
        let res = ga.run(&data, &mut rng, &mut progress);
        assert!(matches!(res, Err(GaError::Stopped { generation: 1 })));
    }

    #[test]
    fn oracle_failure_names_evaluation() {
        let data = create_test_data();
        let oracle = FnOracle::new(|_: &Dataset| Err(OracleError::Singular));
        let param = create_test_params();
        let mut ga = GeneticAlgorithm::new(&data, &oracle, &param).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut progress = RunningFlag::new(Arc::new(AtomicBool::new(true)));
        match ga.run(&data, &mut rng, &mut progress) {
            Err(GaError::Operator { operator, .. }) => assert_eq!(operator, "evaluation"),
            other => panic!("unexpected {:?}", other.map(|r| r.fitness)),
        }
    }

    struct Wipe;

    impl PopulationOperator for Wipe {
        fn name(&self) -> &str {
            "wipe"
        }

        fn operate(&mut self, mut pop: Population, _rng: &mut dyn RngCore) -> Result<Population, GaError> {
            for individual in pop.individuals.iter_mut() {
                for i in 0..individual.view.len() {
                    individual.view.set_used(i, false);
                }
            }
            Ok(pop)
        }
    }

    #[test]
    fn emptied_population_is_fatal() {
        let data = create_test_data();
        let oracle = count_oracle();
        let param = create_test_params();
        let mut ga = GeneticAlgorithm::with_operators(&oracle, param, vec![Box::new(Wipe)], Vec::new());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut progress = RunningFlag::new(Arc::new(AtomicBool::new(true)));
        let res = ga.run(&data, &mut rng, &mut progress);
        assert!(matches!(res, Err(GaError::EmptyPopulation { operator }) if operator == "wipe"));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let data = create_test_data();
        let oracle = count_oracle();
        let mut param = create_test_params();
        param.ga.population_size = 0;
        assert!(matches!(
            GeneticAlgorithm::new(&data, &oracle, &param),
            Err(GaError::Config(_))
        ));
        let empty = Dataset::new("y", vec![0.0, 1.0]);
        assert!(matches!(
            GeneticAlgorithm::new(&empty, &oracle, &create_test_params()),
            Err(GaError::EmptyDataset)
        ));
    }

    #[test]
    fn operators_follow_configuration() {
        let data = create_test_data();
        let mut param = create_test_params();
        param.mutation.kind = MutationKind::directed;
        param.crossover.p_crossover = 0.5;
        param.crossover.unbalanced = true;
        param.redundancy.remove_useless = true;
        param.redundancy.equivalence_removal = true;
        param.fourier.search_fourier_peaks = 2;
        param.fourier.boost_every = 3;
        let (pre, post) = build_operators(&data, &param);
        let names: Vec<&str> = pre.iter().map(|o| o.name()).collect();
        assert_eq!(
            names,
            vec![
                "unbalanced crossover",
                "directed generating mutation",
                "remove useless attributes",
                "equivalent attribute removal",
                "fourier boost",
            ]
        );
        assert!(!pre[4].active_in(2) && pre[4].active_in(3));
        assert_eq!(post[0].name(), "tournament selection");
    }
}
