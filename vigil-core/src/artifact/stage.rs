use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of the training pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Copy the source data into the feature store and split it.
    DataIngestion,
    /// Check the schema and the drift of the ingested data.
    DataValidation,
    /// Fit the feature transform and transform both splits.
    DataTransformation,
    /// Fit the classifier.
    ModelTrainer,
    /// Decide whether the candidate replaces the deployed model.
    ModelEvaluation,
    /// Promote the accepted model and sync the run.
    ModelPusher,
}

impl Stage {
    /// All stages, in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::DataIngestion,
        Stage::DataValidation,
        Stage::DataTransformation,
        Stage::ModelTrainer,
        Stage::ModelEvaluation,
        Stage::ModelPusher,
    ];

    /// Name of the stage directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::DataIngestion => "data_ingestion",
            Self::DataValidation => "data_validation",
            Self::DataTransformation => "data_transformation",
            Self::ModelTrainer => "model_trainer",
            Self::ModelEvaluation => "model_evaluation",
            Self::ModelPusher => "model_pusher",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
