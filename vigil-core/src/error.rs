//! Errors in the library.
use crate::gate::RejectionReason;
use std::{
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Failures raised by pipeline components.
///
/// Components return [`anyhow::Result`]; a failure that belongs to one of these kinds
/// is raised as a [`PipelineError`] and wrapped with the stage name at the stage
/// boundary. The kind can be recovered with `err.downcast_ref::<PipelineError>()`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Bad or missing schema, configuration or path.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Directory or file I/O failure.
    #[error("storage error at {path:?}: {source}")]
    Storage {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The data does not match the schema.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The candidate model was rejected by the evaluation gate.
    #[error("trained model is not better than the existing model: {0}")]
    Rejected(RejectionReason),

    /// Remote sync or download failure.
    #[error("external service error: {0}")]
    ExternalService(String),

    /// A training run is already in progress on the same pipeline.
    #[error("pipeline already running")]
    AlreadyRunning,

    /// No model in the model store.
    #[error("model not available")]
    ModelNotAvailable,
}

impl PipelineError {
    /// Storage error helper.
    pub fn storage(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Storage {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attaches the accessed path to an [`io::Result`].
pub(crate) trait IoResultExt<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T, PipelineError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: impl AsRef<Path>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::storage(path, e))
    }
}

/// Errors in record lookup.
#[derive(Error, Debug)]
pub enum RecordError {
    /// Record key error.
    #[error("Record key error: {0}")]
    KeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    ValueTypeError(String),
}
