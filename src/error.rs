use thiserror::Error;

/// Failure local to a single individual's transformation.
///
/// These never abort a run: the operator that hit one keeps the untouched
/// individual and logs a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("generator {0} is not applicable to the selected inputs")]
    NotApplicable(String),
    #[error("{function} expects {expected} inputs, got {found}")]
    Arity {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error("{function} produced no usable values: {reason}")]
    Domain { function: String, reason: String },
    #[error("cannot build synthetic sample: {0}")]
    DegenerateSample(String),
    #[error("transformation would leave no used feature")]
    EmptyView,
}

/// Failure reported by a fitness oracle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OracleError {
    #[error("dataset has no used feature")]
    NoFeatures,
    #[error("normal equations are singular")]
    Singular,
    #[error("evaluation failed: {0}")]
    Failed(String),
}

/// Run-fatal error. Anything of this type stops the generational loop and no
/// partial result is emitted.
#[derive(Debug, Error)]
pub enum GaError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("input dataset has no feature")]
    EmptyDataset,
    #[error("invalid data: {0}")]
    Data(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("fitness evaluation failed: {source}")]
    Oracle {
        #[from]
        source: OracleError,
    },
    #[error("operator {operator} failed: {source}")]
    Operator {
        operator: String,
        #[source]
        source: Box<GaError>,
    },
    #[error("operator {operator} left no viable individual")]
    EmptyPopulation { operator: String },
    #[error("run stopped by the caller at generation {generation}")]
    Stopped { generation: usize },
}

impl GaError {
    pub fn in_operator(self, operator: &str) -> GaError {
        match self {
            // already attributed, or carries its own attribution
            e @ (GaError::Operator { .. } | GaError::EmptyPopulation { .. } | GaError::Stopped { .. }) => e,
            e => GaError::Operator {
                operator: operator.to_string(),
                source: Box::new(e),
            },
        }
    }
}

impl From<csv::Error> for GaError {
    fn from(e: csv::Error) -> Self {
        GaError::Data(e.to_string())
    }
}
