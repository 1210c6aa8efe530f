//! Versioned on-disk layout of pipeline runs.
//!
//! Every training run gets its own directory named after its start time, with one
//! subdirectory per [`Stage`]:
//!
//! ```text
//! <artifact_root>/
//!   2024_03_01_12_00_00/
//!     run.yaml
//!     records.yaml
//!     data_ingestion/artifact.yaml
//!     data_validation/artifact.yaml
//!     ...
//!     model_pusher/artifact.yaml
//! ```
//!
//! Each stage writes its artifact once. Prior runs are never deleted, so a run can be
//! inspected and its drift baseline reused by later runs.
mod stage;
mod stages;
mod store;

pub use stage::Stage;
pub use stages::{
    DriftCheck, EvaluationArtifact, IngestionArtifact, PusherArtifact, TrainingArtifact,
    TrainingReport, TransformationArtifact, ValidationArtifact,
};
pub use store::{ArtifactStore, RunManifest, RunRoot, RunStatus};

/// File name of a stage artifact inside the stage directory.
pub const ARTIFACT_FILE_NAME: &str = "artifact.yaml";
