//! Base implementation of records.
use crate::error::RecordError;
use chrono::prelude::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;

/// Represents possible types of values that can be stored in a [`Record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    /// A single floating-point value, typically a metric or a duration.
    Scalar(f64),

    /// A timestamp with local timezone.
    DateTime(DateTime<Local>),

    /// A text value, like a stage name or a file path.
    String(String),
}

/// A container for storing key-value pairs of various data types.
///
/// Keys are kept in order, so a serialized record is stable across runs.
///
/// # Examples
///
/// ```rust
/// use vigil_core::record::{Record, RecordValue};
///
/// let mut record = Record::from_scalar("test_f1", 0.5);
/// record.insert("drifted_columns", RecordValue::Scalar(2.0));
/// assert_eq!(record.get_scalar("drifted_columns").unwrap(), 2.0);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f64) -> Self {
        Self(BTreeMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Gets a scalar value from the record.
    pub fn get_scalar(&self, k: &str) -> Result<f64, RecordError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(RecordError::ValueTypeError("Scalar".to_string())),
            None => Err(RecordError::KeyError(k.to_string())),
        }
    }
}
