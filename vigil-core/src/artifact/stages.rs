//! Artifacts produced by the stages of the training pipeline.
use crate::{
    gate::EvaluationVerdict, metric::ClassificationMetric, resolver::ModelVersion,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of the data ingestion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    /// Copy of the source data without the drop columns.
    pub feature_store_path: PathBuf,
    /// Training split.
    pub train_path: PathBuf,
    /// Test split.
    pub test_path: PathBuf,
    /// Rows in the training split.
    pub n_train: usize,
    /// Rows in the test split.
    pub n_test: usize,
}

/// Outcome of the drift check of the validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DriftCheck {
    /// No baseline was available.
    Skipped {
        /// Why the check was skipped.
        reason: String,
    },
    /// The check ran against the training split of a prior run.
    Checked {
        /// Run providing the baseline.
        baseline_run: String,
        /// Path of the drift report.
        report_path: PathBuf,
        /// `true` if any column drifted.
        drift_detected: bool,
        /// Names of the drifted columns.
        drifted_columns: Vec<String>,
    },
}

impl DriftCheck {
    /// `true` if the check ran and found drift.
    pub fn drift_detected(&self) -> bool {
        matches!(self, Self::Checked { drift_detected: true, .. })
    }
}

/// Output of the data validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    /// Validated training split.
    pub valid_train_path: PathBuf,
    /// Validated test split.
    pub valid_test_path: PathBuf,
    /// Columns present in the data but not in the schema.
    pub unexpected_columns: Vec<String>,
    /// Drift check result.
    pub drift: DriftCheck,
}

/// Output of the data transformation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    /// Fitted feature transform.
    pub transform_path: PathBuf,
    /// Transformed training features and labels.
    pub train_array_path: PathBuf,
    /// Transformed test features and labels.
    pub test_array_path: PathBuf,
    /// Feature columns consumed by the transform.
    pub feature_columns: Vec<String>,
}

/// Output of the model trainer stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingArtifact {
    /// The trained model, transform included.
    pub model_path: PathBuf,
    /// Metric on the training split.
    pub train_metric: ClassificationMetric,
    /// Metric on the test split.
    pub test_metric: ClassificationMetric,
}

/// Output of the model evaluation stage. Only accepted candidates produce one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    /// The accepted model.
    pub model_path: PathBuf,
    /// The gate's verdict.
    pub verdict: EvaluationVerdict,
}

/// Output of the model pusher stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherArtifact {
    /// The promoted model in the model store.
    pub model: ModelVersion,
    /// Remote URI of the run directory, if synced.
    pub remote_run_uri: Option<String>,
    /// Remote URI of the model store, if synced.
    pub remote_model_store_uri: Option<String>,
    /// Why pushing the model store failed. The promotion stands regardless.
    #[serde(default)]
    pub model_store_sync_error: Option<String>,
}

/// All artifacts of a successful training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Run identifier.
    pub run_id: String,
    /// Data ingestion.
    pub ingestion: IngestionArtifact,
    /// Data validation.
    pub validation: ValidationArtifact,
    /// Data transformation.
    pub transformation: TransformationArtifact,
    /// Model trainer.
    pub training: TrainingArtifact,
    /// Model evaluation.
    pub evaluation: EvaluationArtifact,
    /// Model pusher.
    pub pusher: PusherArtifact,
    /// Why pushing the finished run directory failed.
    #[serde(default)]
    pub run_sync_error: Option<String>,
}
