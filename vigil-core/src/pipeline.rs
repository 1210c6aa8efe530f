//! Training and prediction pipelines.
mod config;
mod guard;
mod prediction;
mod state;
mod training;

pub use config::{PredictionPipelineConfig, TrainingPipelineConfig};
pub use guard::{RunGuard, RunningFlag};
pub use prediction::{
    BatchFetcher, LocalFetcher, PredictionOutcome, PredictionPipeline, PREDICTED_COLUMN,
};
pub use state::PipelineState;
pub use training::{LabelledMatrix, TrainingPipeline};
