//! Declarative schema of the tabular data.
//!
//! The schema is read once per pipeline from a YAML document:
//!
//! ```yaml
//! columns:
//!   - class: category
//!   - aa_000: int64
//!   - ab_000: float64
//! numerical_columns:
//!   - aa_000
//!   - ab_000
//! drop_columns:
//!   - ab_000
//! target_column: class        # optional, defaults to `class`
//! target_mapping:             # optional, defaults to {neg: 0, pos: 1}
//!   neg: 0
//!   pos: 1
//! ```
//!
//! It is validated when loaded, so the pipelines work with named, typed fields only.
use crate::{dataset::Dataset, error::PipelineError};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::Path,
};

/// Kind of values held by a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Floating point values.
    Numeric,
    /// Labels.
    Categorical,
}

impl ColumnKind {
    fn from_dtype(dtype: &str) -> Option<Self> {
        match dtype {
            "int" | "int32" | "int64" | "float" | "float32" | "float64" | "number" => {
                Some(Self::Numeric)
            }
            "category" | "object" | "string" | "str" | "bool" => Some(Self::Categorical),
            _ => None,
        }
    }
}

/// A named column of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Column kind.
    pub kind: ColumnKind,
}

/// Bidirectional mapping between domain labels and class indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetValueMapping {
    labels: BTreeMap<String, usize>,
}

impl Default for TargetValueMapping {
    fn default() -> Self {
        Self {
            labels: BTreeMap::from([("neg".to_string(), 0), ("pos".to_string(), 1)]),
        }
    }
}

impl TargetValueMapping {
    /// Builds a mapping; class indices must be exactly `0..n` with `n >= 2`.
    pub fn new(labels: BTreeMap<String, usize>) -> Result<Self, PipelineError> {
        let mut indices: Vec<usize> = labels.values().copied().collect();
        indices.sort_unstable();
        if labels.len() < 2 || indices.iter().enumerate().any(|(i, &ix)| i != ix) {
            return Err(PipelineError::Configuration(format!(
                "target_mapping must assign the classes 0..n exactly once, got {:?}",
                labels
            )));
        }
        Ok(Self { labels })
    }

    /// Class index of a domain label.
    pub fn encode(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Domain label of a class index.
    pub fn decode(&self, class: usize) -> Option<&str> {
        self.labels
            .iter()
            .find(|(_, &ix)| ix == class)
            .map(|(label, _)| label.as_str())
    }

    /// The number of classes.
    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    columns: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    numerical_columns: Vec<String>,
    #[serde(default)]
    drop_columns: Vec<String>,
    #[serde(default = "default_target_column")]
    target_column: String,
    #[serde(default)]
    target_mapping: Option<BTreeMap<String, usize>>,
}

fn default_target_column() -> String {
    "class".to_string()
}

/// Validated schema.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<ColumnSpec>,
    numerical_columns: Vec<String>,
    drop_columns: Vec<String>,
    target_column: String,
    target_mapping: TargetValueMapping,
}

/// Result of checking a dataset against the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCheck {
    /// Required columns absent from the dataset.
    pub missing_columns: Vec<String>,
    /// Numerical columns absent from the dataset.
    pub missing_numerical_columns: Vec<String>,
    /// Columns of the dataset that the schema does not know.
    pub unexpected_columns: Vec<String>,
}

impl SchemaCheck {
    /// `true` when no required column is missing.
    pub fn is_valid(&self) -> bool {
        self.missing_columns.is_empty() && self.missing_numerical_columns.is_empty()
    }

    /// Converts a failed check into [`PipelineError::Validation`].
    pub fn into_result(self) -> Result<(), PipelineError> {
        if self.is_valid() {
            return Ok(());
        }
        let mut msg = String::new();
        if !self.missing_columns.is_empty() {
            msg += &format!(
                "Dataframe does not contain all columns, missing {:?}. ",
                self.missing_columns
            );
        }
        if !self.missing_numerical_columns.is_empty() {
            msg += &format!(
                "Dataframe does not contain all numerical columns, missing {:?}.",
                self.missing_numerical_columns
            );
        }
        Err(PipelineError::Validation(msg.trim_end().to_string()))
    }
}

impl Schema {
    /// Loads and validates the schema in a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("failed to read the schema {:?}: {}", path, e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses and validates a schema document.
    pub fn from_yaml_str(text: &str) -> Result<Self, PipelineError> {
        let raw: SchemaFile = serde_yaml::from_str(text)
            .map_err(|e| PipelineError::Configuration(format!("invalid schema: {}", e)))?;
        Self::validate(raw)
    }

    fn validate(raw: SchemaFile) -> Result<Self, PipelineError> {
        let config_err = |msg: String| PipelineError::Configuration(msg);
        let mut columns = Vec::with_capacity(raw.columns.len());
        let mut seen = HashSet::new();

        for entry in raw.columns.into_iter() {
            let n_pairs = entry.len();
            let mut pairs = entry.into_iter();
            let (name, dtype) = match (pairs.next(), pairs.next()) {
                (Some(pair), None) => pair,
                _ => {
                    return Err(config_err(format!(
                        "each schema column must be a single `name: dtype` pair, got {} pairs",
                        n_pairs
                    )))
                }
            };
            let kind = ColumnKind::from_dtype(&dtype)
                .ok_or_else(|| config_err(format!("unknown dtype {:?} of {:?}", dtype, name)))?;
            if !seen.insert(name.clone()) {
                return Err(config_err(format!("duplicated column {:?}", name)));
            }
            columns.push(ColumnSpec { name, kind });
        }

        let kind_of = |name: &str| columns.iter().find(|c| c.name == name).map(|c| c.kind);

        for name in raw.numerical_columns.iter() {
            match kind_of(name) {
                Some(ColumnKind::Numeric) => {}
                Some(ColumnKind::Categorical) => {
                    return Err(config_err(format!(
                        "numerical column {:?} is declared as categorical",
                        name
                    )))
                }
                None => {
                    return Err(config_err(format!(
                        "numerical column {:?} is not in columns",
                        name
                    )))
                }
            }
        }
        if kind_of(&raw.target_column).is_none() {
            return Err(config_err(format!(
                "target column {:?} is not in columns",
                raw.target_column
            )));
        }
        for name in raw.drop_columns.iter() {
            if kind_of(name).is_none() {
                return Err(config_err(format!("drop column {:?} is not in columns", name)));
            }
            if *name == raw.target_column {
                return Err(config_err("the target column cannot be dropped".to_string()));
            }
        }

        let target_mapping = match raw.target_mapping {
            Some(labels) => TargetValueMapping::new(labels)?,
            None => TargetValueMapping::default(),
        };

        Ok(Self {
            columns,
            numerical_columns: raw.numerical_columns,
            drop_columns: raw.drop_columns,
            target_column: raw.target_column,
            target_mapping,
        })
    }

    /// All declared columns, in order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Kind of the given column, if declared.
    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|c| c.name == name).map(|c| c.kind)
    }

    /// Declared numerical columns.
    pub fn numerical_columns(&self) -> &[String] {
        &self.numerical_columns
    }

    /// Columns removed from the data before validation and scoring.
    pub fn drop_columns(&self) -> &[String] {
        &self.drop_columns
    }

    /// The target column.
    pub fn target_column(&self) -> &str {
        &self.target_column
    }

    /// Mapping between target labels and class indices.
    pub fn target_mapping(&self) -> &TargetValueMapping {
        &self.target_mapping
    }

    /// Columns consumed by the model: numerical columns that are neither dropped
    /// nor the target, in schema order.
    pub fn feature_columns(&self) -> Vec<String> {
        self.numerical_columns
            .iter()
            .filter(|c| **c != self.target_column && !self.drop_columns.contains(c))
            .cloned()
            .collect()
    }

    /// Columns that must be present once the drop columns have been removed.
    pub fn required_columns(&self, with_target: bool) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| &c.name)
            .filter(|c| !self.drop_columns.contains(c))
            .filter(|c| with_target || **c != self.target_column)
            .cloned()
            .collect()
    }

    /// Checks the columns of a dataset from which the drop columns have been removed.
    pub fn check_columns(&self, dataset: &Dataset, with_target: bool) -> SchemaCheck {
        let missing_columns = self
            .required_columns(with_target)
            .into_iter()
            .filter(|c| !dataset.has_column(c))
            .collect();
        let missing_numerical_columns = self
            .feature_columns()
            .into_iter()
            .filter(|c| !dataset.has_column(c))
            .collect();
        let unexpected_columns = dataset
            .column_names()
            .iter()
            .filter(|c| self.kind_of(c).is_none())
            .cloned()
            .collect();

        SchemaCheck {
            missing_columns,
            missing_numerical_columns,
            unexpected_columns,
        }
    }
}
