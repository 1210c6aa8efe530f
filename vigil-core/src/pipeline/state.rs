use crate::artifact::Stage;
use std::fmt;

/// States of the training pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No run in progress.
    Idle,
    /// Data ingestion.
    Ingesting,
    /// Data validation.
    Validating,
    /// Data transformation.
    Transforming,
    /// Model training.
    Training,
    /// Model evaluation.
    Evaluating,
    /// Model promotion.
    Promoting,
    /// The last run succeeded.
    Succeeded,
    /// The last run failed.
    Failed,
}

impl PipelineState {
    /// The state executing the given stage.
    pub fn of_stage(stage: Stage) -> Self {
        match stage {
            Stage::DataIngestion => Self::Ingesting,
            Stage::DataValidation => Self::Validating,
            Stage::DataTransformation => Self::Transforming,
            Stage::ModelTrainer => Self::Training,
            Stage::ModelEvaluation => Self::Evaluating,
            Stage::ModelPusher => Self::Promoting,
        }
    }

    /// The stage executed in this state.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Ingesting => Some(Stage::DataIngestion),
            Self::Validating => Some(Stage::DataValidation),
            Self::Transforming => Some(Stage::DataTransformation),
            Self::Training => Some(Stage::ModelTrainer),
            Self::Evaluating => Some(Stage::ModelEvaluation),
            Self::Promoting => Some(Stage::ModelPusher),
            Self::Idle | Self::Succeeded | Self::Failed => None,
        }
    }

    /// `true` when no run is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle | Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Validating => "validating",
            Self::Transforming => "transforming",
            Self::Training => "training",
            Self::Evaluating => "evaluating",
            Self::Promoting => "promoting",
            Self::Succeeded => "idle (succeeded)",
            Self::Failed => "idle (failed)",
        };
        f.write_str(s)
    }
}
