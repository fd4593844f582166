use crate::error::GaError;
use crate::expression::Expr;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Kind of values a feature holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Numeric,
    /// Category indices stored as numbers
    Nominal,
}

/// Column descriptor: immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub kind: ValueKind,
    pub construction: Expr,
}

impl Feature {
    /// An original feature, constructed by identity
    pub fn original(name: &str, kind: ValueKind) -> Feature {
        Feature {
            name: name.to_string(),
            kind,
            construction: Expr::attribute(name),
        }
    }

    /// A derived feature named after its construction expression
    pub fn constructed(construction: Expr) -> Feature {
        Feature {
            name: construction.to_string(),
            kind: ValueKind::Numeric,
            construction,
        }
    }

    pub fn construction_string(&self) -> String {
        self.construction.to_string()
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ValueKind::Numeric
    }
}

/// A feature together with its values and cached statistics.
///
/// Columns are shared by `Arc` between every view that uses them; nothing
/// ever mutates a column after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub feature: Feature,
    pub values: Vec<f64>,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Column {
    pub fn new(feature: Feature, values: Vec<f64>) -> Column {
        let (min, max, mean) = finite_statistics(&values);
        Column {
            feature,
            values,
            min,
            max,
            mean,
        }
    }

    pub fn name(&self) -> &str {
        &self.feature.name
    }

    /// Number of finite values
    pub fn finite_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_finite()).count()
    }

    pub fn is_constant(&self) -> bool {
        self.min == self.max
    }
}

/// Minimum, maximum and mean over finite values, NaN when there are none
pub fn finite_statistics(values: &[f64]) -> (f64, f64, f64) {
    if !values.iter().any(|v| v.is_finite()) {
        return (f64::NAN, f64::NAN, f64::NAN);
    }
    let finite = || values.iter().filter(|v| v.is_finite());
    (
        Statistics::<f64>::min(finite()),
        Statistics::<f64>::max(finite()),
        Statistics::<f64>::mean(finite()),
    )
}

/// Ordered set of columns plus the label, rows aligned by index.
#[derive(Clone, PartialEq)]
pub struct Dataset {
    pub columns: Vec<Arc<Column>>,
    pub label: Arc<Vec<f64>>,
    pub label_name: String,
}

impl Dataset {
    pub fn new(label_name: &str, label: Vec<f64>) -> Dataset {
        Dataset {
            columns: Vec::new(),
            label: Arc::new(label),
            label_name: label_name.to_string(),
        }
    }

    /// Builds a dataset from named numeric columns
    pub fn from_columns(columns: Vec<(&str, Vec<f64>)>, label_name: &str, label: Vec<f64>) -> Result<Dataset, GaError> {
        let mut data = Dataset::new(label_name, label);
        for (name, values) in columns {
            data.add_column(Column::new(Feature::original(name, ValueKind::Numeric), values))?;
        }
        Ok(data)
    }

    pub fn rows(&self) -> usize {
        self.label.len()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn add_column(&mut self, column: Column) -> Result<Arc<Column>, GaError> {
        if column.values.len() != self.rows() {
            return Err(GaError::Data(format!(
                "column {} has {} values for {} rows",
                column.name(),
                column.values.len(),
                self.rows()
            )));
        }
        let column = Arc::new(column);
        self.columns.push(Arc::clone(&column));
        Ok(column)
    }

    pub fn column(&self, name: &str) -> Option<&Arc<Column>> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name().to_string()).collect()
    }

    /// New dataset sharing the selected columns, label untouched
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: indices.iter().map(|&i| Arc::clone(&self.columns[i])).collect(),
            label: Arc::clone(&self.label),
            label_name: self.label_name.clone(),
        }
    }

    /// Loads a delimited text file with samples in rows and a header line.
    ///
    /// Columns whose every non-missing field parses as a number are numeric,
    /// others are nominal and stored as category indices. Empty fields and
    /// `?` are missing values (NaN).
    pub fn load<P: AsRef<Path>>(path: P, label_name: &str, delimiter: u8) -> Result<Dataset, GaError> {
        info!("Loading file {}...", path.as_ref().display());
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let label_idx = headers
            .iter()
            .position(|h| h == label_name)
            .ok_or_else(|| GaError::Data(format!("label column {} not found", label_name)))?;

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            if record.len() != headers.len() {
                return Err(GaError::Data(format!(
                    "line {} has {} fields, expected {}",
                    record.position().map(|p| p.line()).unwrap_or(0),
                    record.len(),
                    headers.len()
                )));
            }
            for (j, field) in record.iter().enumerate() {
                raw[j].push(field.to_string());
            }
        }

        let mut label = Vec::new();
        let mut columns = Vec::new();
        for (j, (name, fields)) in headers.iter().zip(raw).enumerate() {
            let (kind, values) = parse_fields(&fields);
            if j == label_idx {
                if kind == ValueKind::Nominal {
                    warn!("Label {} is nominal: using category indices as targets", name);
                }
                label = values;
            } else {
                columns.push(Column::new(Feature::original(name, kind), values));
            }
        }

        let mut data = Dataset::new(label_name, label);
        for column in columns {
            data.add_column(column)?;
        }
        info!("{} features, {} samples", data.len(), data.rows());
        Ok(data)
    }
}

fn is_missing(field: &str) -> bool {
    field.is_empty() || field == "?"
}

fn parse_fields(fields: &[String]) -> (ValueKind, Vec<f64>) {
    let numeric = fields.iter().all(|f| is_missing(f) || f.parse::<f64>().is_ok());
    if numeric {
        let values = fields
            .iter()
            .map(|f| f.parse::<f64>().unwrap_or(f64::NAN))
            .collect();
        return (ValueKind::Numeric, values);
    }

    let mut categories: HashMap<&str, usize> = HashMap::new();
    let values = fields
        .iter()
        .map(|f| {
            if is_missing(f) {
                f64::NAN
            } else {
                let next = categories.len();
                *categories.entry(f.as_str()).or_insert(next) as f64
            }
        })
        .collect();
    (ValueKind::Nominal, values)
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Features: {}   Samples: {}   Label: {}", self.len(), self.rows(), self.label_name)?;
        // Limit to the first 20 columns
        for column in self.columns.iter().take(20) {
            let row_display: String = column
                .values
                .iter()
                .take(10)
                .map(|v| format!("{:.2}", v))
                .collect::<Vec<_>>()
                .join("\t");
            writeln!(f, "{:<20} {}", column.name(), row_display)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the Display formatter
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn column_statistics_ignore_non_finite_values() {
        let c = Column::new(Feature::original("x", ValueKind::Numeric), vec![3.0, f64::NAN, -1.0, 5.0]);
        assert_eq!(c.min, -1.0);
        assert_eq!(c.max, 5.0);
        assert!((c.mean - 7.0 / 3.0).abs() < 1e-12);
        assert_eq!(c.finite_count(), 3);

        let empty = Column::new(Feature::original("y", ValueKind::Numeric), vec![f64::NAN]);
        assert!(empty.min.is_nan());
    }

    #[test]
    fn select_shares_columns() {
        let data = Dataset::from_columns(vec![("a", vec![1.0, 2.0]), ("b", vec![3.0, 4.0])], "y", vec![0.0, 1.0]).unwrap();
        let sub = data.select(&[1]);
        assert_eq!(sub.feature_names(), vec!["b".to_string()]);
        assert!(Arc::ptr_eq(&sub.columns[0], &data.columns[1]));
        assert!(Arc::ptr_eq(&sub.label, &data.label));
    }

    #[test]
    fn add_column_rejects_wrong_length() {
        let mut data = Dataset::new("y", vec![0.0, 1.0, 2.0]);
        let res = data.add_column(Column::new(Feature::original("a", ValueKind::Numeric), vec![1.0]));
        assert!(matches!(res, Err(GaError::Data(_))));
    }

    #[test]
    fn load_tab_separated_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\tcolor\ty").unwrap();
        writeln!(file, "1.5\tred\t0").unwrap();
        writeln!(file, "?\tblue\t1").unwrap();
        writeln!(file, "2.5\tred\t1").unwrap();
        file.flush().unwrap();

        let data = Dataset::load(file.path(), "y", b'\t').unwrap();
        assert_eq!(data.rows(), 3);
        assert_eq!(data.feature_names(), vec!["a".to_string(), "color".to_string()]);
        assert_eq!(data.columns[0].feature.kind, ValueKind::Numeric);
        assert!(data.columns[0].values[1].is_nan());
        assert_eq!(data.columns[1].feature.kind, ValueKind::Nominal);
        assert_eq!(data.columns[1].values, vec![0.0, 1.0, 0.0]);
        assert_eq!(*data.label, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn missing_label_column_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "a\tb").unwrap();
        writeln!(file, "1\t2").unwrap();
        file.flush().unwrap();
        assert!(matches!(Dataset::load(file.path(), "y", b'\t'), Err(GaError::Data(_))));
    }
}
