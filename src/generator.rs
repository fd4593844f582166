//! Feature generators: functions that derive new columns from existing ones.
//!
//! A [`FeatureGenerator`] declares its arity and which inputs it accepts; once
//! inputs are chosen it is turned into a [`GeneratorInstance`] that computes
//! the new column(s). [`GeneratorLibrary`] holds the registered generators and
//! picks an applicable one for an individual.

use crate::data::{Column, Feature};
use crate::error::GenerationError;
use crate::expression::{BinaryOp, Expr, UnaryOp};
use crate::param::Generators;
use crate::view::FeatureView;
use log::debug;
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::RngCore;
use std::sync::Arc;

/// How strictly generators judge their inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    /// Reject inputs outside the function's domain or where the function is a no-op
    Restrictive,
    /// Only check value kinds and arity
    Permissive,
}

/// Generator ready to compute new columns from its bound inputs
pub trait GeneratorInstance: Send + Sync {
    /// Name of the underlying function
    fn function(&self) -> &str;

    /// Computes the new column(s). The caller appends them to the view.
    fn synthesize(&self, view: &FeatureView) -> Result<Vec<Column>, GenerationError>;
}

/// A function that can derive new features from compatible inputs
pub trait FeatureGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    fn is_applicable(&self, inputs: &[&Column], mode: Applicability) -> bool;

    fn instantiate(&self, inputs: Vec<Arc<Column>>) -> Result<Box<dyn GeneratorInstance>, GenerationError>;
}

/// Function wrapped by a [`FunctionGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Unary(UnaryOp),
    Binary(BinaryOp),
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Unary(op) => op.name(),
            Function::Binary(op) => op.name(),
        }
    }
}

/// Generator for one of the built-in unary or binary functions
#[derive(Debug, Clone)]
pub struct FunctionGenerator {
    function: Function,
}

impl FunctionGenerator {
    pub fn new(function: Function) -> FunctionGenerator {
        FunctionGenerator { function }
    }
}

fn all_finite_and(column: &Column, predicate: impl Fn(f64) -> bool) -> bool {
    column.values.iter().filter(|v| v.is_finite()).all(|v| predicate(*v))
}

fn is_integer_valued(column: &Column) -> bool {
    all_finite_and(column, |v| v.fract() == 0.0)
}

impl FeatureGenerator for FunctionGenerator {
    fn name(&self) -> &str {
        self.function.name()
    }

    fn arity(&self) -> usize {
        match self.function {
            Function::Unary(_) => 1,
            Function::Binary(_) => 2,
        }
    }

    fn is_applicable(&self, inputs: &[&Column], mode: Applicability) -> bool {
        if inputs.len() != self.arity() || !inputs.iter().all(|c| c.feature.is_numeric()) {
            return false;
        }
        if inputs.iter().any(|c| c.finite_count() == 0) {
            return false;
        }

        match self.function {
            Function::Binary(op) => {
                let identical = inputs[0].feature.construction == inputs[1].feature.construction;
                if identical && matches!(op, BinaryOp::Minus | BinaryOp::Div | BinaryOp::Min | BinaryOp::Max) {
                    return false;
                }
                if mode == Applicability::Permissive {
                    return true;
                }
                match op {
                    BinaryOp::Div => all_finite_and(inputs[1], |v| v != 0.0),
                    BinaryOp::Pow => {
                        all_finite_and(inputs[0], |v| v > 0.0) && inputs[1].max.abs() <= 10.0 && inputs[1].min.abs() <= 10.0
                    }
                    _ => true,
                }
            }
            Function::Unary(op) => {
                if mode == Applicability::Permissive {
                    return true;
                }
                let c = inputs[0];
                match op {
                    UnaryOp::Reciprocal => all_finite_and(c, |v| v != 0.0),
                    UnaryOp::Sqrt => c.min >= 0.0,
                    UnaryOp::Log => c.min > 0.0,
                    UnaryOp::Exp => c.max < 700.0,
                    UnaryOp::Abs => c.min < 0.0,
                    UnaryOp::Sign => !c.is_constant(),
                    UnaryOp::Floor | UnaryOp::Ceil => !is_integer_valued(c),
                    _ => true,
                }
            }
        }
    }

    fn instantiate(&self, inputs: Vec<Arc<Column>>) -> Result<Box<dyn GeneratorInstance>, GenerationError> {
        if inputs.len() != self.arity() {
            return Err(GenerationError::Arity {
                function: self.name().to_string(),
                expected: self.arity(),
                found: inputs.len(),
            });
        }
        Ok(Box::new(FunctionInstance {
            function: self.function,
            inputs,
        }))
    }
}

struct FunctionInstance {
    function: Function,
    inputs: Vec<Arc<Column>>,
}

impl GeneratorInstance for FunctionInstance {
    fn function(&self) -> &str {
        self.function.name()
    }

    fn synthesize(&self, view: &FeatureView) -> Result<Vec<Column>, GenerationError> {
        let rows = view.rows();
        if self.inputs.iter().any(|c| c.values.len() != rows) {
            return Err(GenerationError::Domain {
                function: self.function().to_string(),
                reason: "input length differs from the dataset".to_string(),
            });
        }

        let (construction, values): (Expr, Vec<f64>) = match self.function {
            Function::Unary(op) => {
                let a = &self.inputs[0];
                (
                    Expr::unary(op, a.feature.construction.clone()),
                    a.values.iter().map(|x| op.apply(*x)).collect(),
                )
            }
            Function::Binary(op) => {
                let (a, b) = (&self.inputs[0], &self.inputs[1]);
                (
                    Expr::binary(op, a.feature.construction.clone(), b.feature.construction.clone()),
                    a.values.iter().zip(&b.values).map(|(x, y)| op.apply(*x, *y)).collect(),
                )
            }
        };

        if !values.iter().any(|v| v.is_finite()) {
            return Err(GenerationError::Domain {
                function: self.function().to_string(),
                reason: format!("{} has no finite value", construction),
            });
        }
        Ok(vec![Column::new(Feature::constructed(construction), values)])
    }
}

/// Registered generators and the policy choosing among them
pub struct GeneratorLibrary {
    generators: Vec<Box<dyn FeatureGenerator>>,
}

/// Random draws of inputs tried per generator before moving on
const INPUT_ATTEMPTS: usize = 5;

impl GeneratorLibrary {
    pub fn new(generators: Vec<Box<dyn FeatureGenerator>>) -> GeneratorLibrary {
        GeneratorLibrary { generators }
    }

    /// Library of the built-in functions enabled in the configuration
    pub fn from_param(param: &Generators) -> GeneratorLibrary {
        let mut functions: Vec<Function> = Vec::new();
        let mut enable = |on: bool, fs: &[Function]| {
            if on {
                functions.extend_from_slice(fs);
            }
        };
        enable(param.plus, &[Function::Binary(BinaryOp::Plus)]);
        enable(param.diff, &[Function::Binary(BinaryOp::Minus)]);
        enable(param.mult, &[Function::Binary(BinaryOp::Mult)]);
        enable(param.div, &[Function::Binary(BinaryOp::Div)]);
        enable(param.reciprocal, &[Function::Unary(UnaryOp::Reciprocal)]);
        enable(param.square_roots, &[Function::Unary(UnaryOp::Sqrt)]);
        enable(param.power, &[Function::Binary(BinaryOp::Pow)]);
        enable(param.exponential, &[Function::Unary(UnaryOp::Exp)]);
        enable(param.log, &[Function::Unary(UnaryOp::Log)]);
        enable(param.absolute, &[Function::Unary(UnaryOp::Abs)]);
        enable(param.min_max, &[Function::Binary(BinaryOp::Min), Function::Binary(BinaryOp::Max)]);
        enable(param.sign, &[Function::Unary(UnaryOp::Sign)]);
        enable(param.floor_ceil, &[Function::Unary(UnaryOp::Floor), Function::Unary(UnaryOp::Ceil)]);
        enable(
            param.trigonometric,
            &[
                Function::Unary(UnaryOp::Sin),
                Function::Unary(UnaryOp::Cos),
                Function::Unary(UnaryOp::Tan),
                Function::Unary(UnaryOp::Atan),
            ],
        );

        GeneratorLibrary::new(
            functions
                .into_iter()
                .map(|f| Box::new(FunctionGenerator::new(f)) as Box<dyn FeatureGenerator>)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.generators.iter().map(|g| g.name()).collect()
    }

    /// Picks a generator and inputs among `candidates` and instantiates it.
    ///
    /// Generators named in `excluded` are never considered. Inputs are drawn
    /// uniformly, or proportionally to `weights` (one per candidate, NaN read
    /// as 1.0) when given.
    ///
    /// # Errors
    ///
    /// [`GenerationError::NotApplicable`] when no generator accepts any of the drawn inputs.
    pub fn choose(
        &self,
        candidates: &[Arc<Column>],
        weights: Option<&[f64]>,
        excluded: &[String],
        mode: Applicability,
        rng: &mut dyn RngCore,
    ) -> Result<Box<dyn GeneratorInstance>, GenerationError> {
        let mut order: Vec<usize> = (0..self.generators.len())
            .filter(|&g| !excluded.iter().any(|e| e == self.generators[g].name()))
            .collect();
        order.shuffle(rng);

        let numeric: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].feature.is_numeric())
            .collect();
        if numeric.is_empty() {
            return Err(GenerationError::NotApplicable("no numeric input".to_string()));
        }

        let sampler = match weights {
            Some(w) => {
                let bias: Vec<f64> = numeric
                    .iter()
                    .map(|&i| {
                        let x = w.get(i).copied().unwrap_or(f64::NAN);
                        if x.is_nan() { 1.0 } else { x.abs() + 1e-6 }
                    })
                    .collect();
                WeightedIndex::new(&bias).ok()
            }
            None => None,
        };

        for g in order {
            let generator = &self.generators[g];
            for _ in 0..INPUT_ATTEMPTS {
                let inputs: Vec<Arc<Column>> = (0..generator.arity())
                    .map(|_| {
                        let pick = match &sampler {
                            Some(dist) => dist.sample(rng),
                            None => rng.gen_range(0..numeric.len()),
                        };
                        Arc::clone(&candidates[numeric[pick]])
                    })
                    .collect();
                let refs: Vec<&Column> = inputs.iter().map(|c| c.as_ref()).collect();
                if generator.is_applicable(&refs, mode) {
                    debug!("Generator {} chosen", generator.name());
                    return generator.instantiate(inputs);
                }
            }
        }
        Err(GenerationError::NotApplicable(format!(
            "none of {} generators",
            self.generators.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, ValueKind};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn data() -> Dataset {
        Dataset::from_columns(
            vec![("a", vec![1.0, 2.0, 3.0]), ("b", vec![-1.0, 0.0, 4.0])],
            "y",
            vec![0.0, 1.0, 0.0],
        )
        .unwrap()
    }

    #[test]
    fn sum_generator_builds_named_column() {
        let d = data();
        let view = FeatureView::new(&d);
        let g = FunctionGenerator::new(Function::Binary(BinaryOp::Plus));
        let inst = g.instantiate(vec![Arc::clone(&d.columns[0]), Arc::clone(&d.columns[1])]).unwrap();
        let cols = inst.synthesize(&view).unwrap();
        assert_eq!(cols.len(), 1);
        assert_eq!(cols[0].name(), "(a)+(b)");
        assert_eq!(cols[0].values, vec![0.0, 2.0, 7.0]);
        assert!(!cols[0].feature.construction.is_simple());
    }

    #[test]
    fn arity_is_checked() {
        let d = data();
        let g = FunctionGenerator::new(Function::Binary(BinaryOp::Mult));
        let res = g.instantiate(vec![Arc::clone(&d.columns[0])]);
        assert!(matches!(res, Err(GenerationError::Arity { expected: 2, found: 1, .. })));
    }

    #[test]
    fn restrictive_mode_respects_domains() {
        let d = data();
        let (a, b) = (d.columns[0].as_ref(), d.columns[1].as_ref());
        let log = FunctionGenerator::new(Function::Unary(UnaryOp::Log));
        assert!(log.is_applicable(&[a], Applicability::Restrictive));
        assert!(!log.is_applicable(&[b], Applicability::Restrictive));
        assert!(log.is_applicable(&[b], Applicability::Permissive));

        let div = FunctionGenerator::new(Function::Binary(BinaryOp::Div));
        assert!(!div.is_applicable(&[a, b], Applicability::Restrictive));
        assert!(div.is_applicable(&[b, a], Applicability::Restrictive));
        assert!(!div.is_applicable(&[a, a], Applicability::Permissive));
    }

    #[test]
    fn nominal_inputs_are_rejected() {
        let nominal = Column::new(Feature::original("n", ValueKind::Nominal), vec![0.0, 1.0, 0.0]);
        let abs = FunctionGenerator::new(Function::Unary(UnaryOp::Abs));
        assert!(!abs.is_applicable(&[&nominal], Applicability::Permissive));
    }

    #[test]
    fn all_nan_result_is_a_domain_error() {
        let d = Dataset::from_columns(vec![("a", vec![-1.0, -2.0])], "y", vec![0.0, 0.0]).unwrap();
        let g = FunctionGenerator::new(Function::Unary(UnaryOp::Log));
        let inst = g.instantiate(vec![Arc::clone(&d.columns[0])]).unwrap();
        assert!(matches!(inst.synthesize(&FeatureView::new(&d)), Err(GenerationError::Domain { .. })));
    }

    #[test]
    fn library_honours_exclusions() {
        let mut param = Generators::default();
        param.diff = false;
        param.div = false;
        param.mult = false;
        let lib = GeneratorLibrary::from_param(&param);
        assert_eq!(lib.names(), vec!["+"]);

        let d = data();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let inst = lib
            .choose(&d.columns, None, &[], Applicability::Restrictive, &mut rng)
            .unwrap();
        assert_eq!(inst.function(), "+");

        let res = lib.choose(&d.columns, None, &["+".to_string()], Applicability::Restrictive, &mut rng);
        assert!(matches!(res, Err(GenerationError::NotApplicable(_))));
    }

    #[test]
    fn weighted_choice_prefers_heavy_inputs() {
        let mut param = Generators::default();
        param.plus = false;
        param.diff = false;
        param.mult = false;
        param.div = false;
        param.absolute = true;
        let lib = GeneratorLibrary::from_param(&param);
        let d = Dataset::from_columns(
            vec![("a", vec![-1.0, 2.0]), ("b", vec![-3.0, 4.0])],
            "y",
            vec![0.0, 1.0],
        )
        .unwrap();
        let view = FeatureView::new(&d);
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut on_b = 0;
        for _ in 0..50 {
            let inst = lib
                .choose(&d.columns, Some(&[0.0, 10.0]), &[], Applicability::Restrictive, &mut rng)
                .unwrap();
            if inst.synthesize(&view).unwrap()[0].name() == "abs(b)" {
                on_b += 1;
            }
        }
        assert!(on_b >= 45, "b chosen {} times", on_b);
    }
}
