//! Types and traits for recording pipeline metrics.
//!
//! Every stage of a pipeline emits a [`Record`] (durations, classification metrics,
//! drift counts, ...) that is handed to a [`Recorder`]. The pipelines write their
//! records to `records.yaml` in the run directory with [`YamlRecorder`], so a run can
//! be inspected after the fact together with its stage artifacts.
//!
//! # Basic Usage
//!
//! ```rust
//! use vigil_core::record::{Record, RecordValue};
//!
//! let mut record = Record::from_scalar("train_f1", 0.93);
//! record.insert("stage", RecordValue::String("model_trainer".to_string()));
//! assert_eq!(record.get_scalar("train_f1").unwrap(), 0.93);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod yaml_recorder;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use yaml_recorder::YamlRecorder;
