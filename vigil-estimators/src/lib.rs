#![warn(missing_docs)]
//! Feature transforms and classifiers implementing the estimator traits of
//! `vigil-core`.
//!
//! [`SensorEstimator`] is the estimator used by the `vigil` binary: missing values are
//! imputed with column medians, features are scaled by their interquartile range, and
//! a binary [`LogisticRegression`] is fitted on the result.
//!
//! ```no_run
//! use vigil_core::{
//!     pipeline::{RunningFlag, TrainingPipeline, TrainingPipelineConfig},
//!     sync::NullSync,
//! };
//! use vigil_estimators::SensorEstimator;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TrainingPipelineConfig::load("config/training.yaml")?;
//! let pipeline =
//!     TrainingPipeline::new(config, SensorEstimator::default(), NullSync, RunningFlag::new())?;
//! let report = pipeline.run()?;
//! println!("promoted version {}", report.pusher.model.version);
//! # Ok(())
//! # }
//! ```
mod logistic;
mod robust_scaler;
mod sensor;

pub use logistic::{LogisticRegression, LogisticRegressionConfig};
pub use robust_scaler::RobustScalerImputer;
pub use sensor::{SensorEstimator, SensorEstimatorConfig};
