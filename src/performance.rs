use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Score returned by a fitness oracle.
///
/// Only the main criterion takes part in comparisons; the other criteria are
/// carried along for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Performance {
    /// Name of the main criterion
    pub criterion: String,
    /// Value of the main criterion, higher is better
    pub value: f64,
    /// Best value the criterion can take (`f64::INFINITY` when unbounded)
    pub maximum: f64,
    /// Secondary criteria
    #[serde(default)]
    pub others: Vec<(String, f64)>,
}

impl Performance {
    pub fn new(criterion: &str, value: f64, maximum: f64) -> Performance {
        Performance {
            criterion: criterion.to_string(),
            value,
            maximum,
            others: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Performance {
        self.others.push((name.to_string(), value));
        self
    }

    /// Main criterion with NaN mapped below every real score
    pub fn main(&self) -> f64 {
        if self.value.is_nan() {
            f64::NEG_INFINITY
        } else {
            self.value
        }
    }

    /// True once the criterion has reached its theoretical maximum
    pub fn is_maximal(&self) -> bool {
        self.maximum.is_finite() && self.main() >= self.maximum
    }
}

impl PartialEq for Performance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Performance {}

impl PartialOrd for Performance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Performance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.main().total_cmp(&other.main())
    }
}

impl fmt::Display for Performance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.4}", self.criterion, self.value)?;
        for (name, value) in &self.others {
            write!(f, " | {} {:.4}", name, value)?;
        }
        Ok(())
    }
}
