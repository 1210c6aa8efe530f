#![warn(missing_docs)]
//! Pipeline orchestration and model governance for tabular classifiers.
//!
//! A [`TrainingPipeline`] takes a CSV source through ingestion, validation,
//! transformation, training, evaluation and promotion. Every run is kept in its own
//! directory of an [`ArtifactStore`], the data is checked for drift against the last
//! successful run with a [`DriftDetector`], and a candidate model is promoted into the
//! model store only when the [`EvaluationGate`] accepts it. A [`PredictionPipeline`]
//! scores batches with the latest model found by the [`ModelResolver`].
//!
//! Fitting algorithms are plugged in through [`Estimator`], and the remote store
//! through [`RemoteSync`].
//!
//! [`TrainingPipeline`]: pipeline::TrainingPipeline
//! [`PredictionPipeline`]: pipeline::PredictionPipeline
//! [`ArtifactStore`]: artifact::ArtifactStore
//! [`DriftDetector`]: drift::DriftDetector
//! [`EvaluationGate`]: gate::EvaluationGate
//! [`ModelResolver`]: resolver::ModelResolver
//! [`Estimator`]: estimator::Estimator
//! [`RemoteSync`]: sync::RemoteSync
pub mod artifact;
pub mod dataset;
pub mod drift;
pub mod error;
pub mod estimator;
pub mod gate;
pub mod metric;
pub mod pipeline;
pub mod record;
pub mod remote;
pub mod resolver;
pub mod schema;
pub mod sync;
pub mod util;

pub use dataset::{Column, Dataset};
pub use error::PipelineError;
pub use estimator::{Classifier, Estimator, TrainedModel, Transform};
pub use metric::ClassificationMetric;
pub use schema::Schema;
