//! Configuration of the `vigil` binary.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};
use vigil_core::{
    pipeline::{PredictionPipelineConfig, TrainingPipelineConfig},
    sync::{LocalMirrorSync, NullSync, RemoteSync},
};
use vigil_estimators::SensorEstimatorConfig;
use vigil_remote_sync::{AwsCliSync, AwsCliSyncConfig};

/// Where runs and models are synced to.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SyncBackend {
    /// Nothing leaves the machine.
    #[default]
    None,

    /// `s3://<bucket>/<key>` is mapped to `<root>/<bucket>/<key>`.
    Mirror {
        /// Root directory of the mirror.
        root: PathBuf,
    },

    /// `aws s3 sync`.
    AwsCli(AwsCliSyncConfig),
}

impl SyncBackend {
    /// Constructs the remote sync.
    pub fn build(&self) -> Box<dyn RemoteSync + Send + Sync> {
        match self {
            Self::None => Box::new(NullSync),
            Self::Mirror { root } => Box::new(LocalMirrorSync::new(root)),
            Self::AwsCli(config) => Box::new(AwsCliSync::new(config.clone())),
        }
    }
}

/// Configuration of the `vigil` binary, usually read from `vigil.yaml`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct VigilConfig {
    /// Training pipeline.
    pub training: TrainingPipelineConfig,

    /// Prediction pipeline.
    pub prediction: PredictionPipelineConfig,

    /// Estimator fitted by the training pipeline.
    pub estimator: SensorEstimatorConfig,

    /// Remote sync.
    pub sync: SyncBackend,
}

impl VigilConfig {
    /// Sets the training pipeline configuration.
    pub fn training(mut self, v: TrainingPipelineConfig) -> Self {
        self.training = v;
        self
    }

    /// Sets the prediction pipeline configuration.
    pub fn prediction(mut self, v: PredictionPipelineConfig) -> Self {
        self.prediction = v;
        self
    }

    /// Sets the estimator configuration.
    pub fn estimator(mut self, v: SensorEstimatorConfig) -> Self {
        self.estimator = v;
        self
    }

    /// Sets the remote sync.
    pub fn sync(mut self, v: SyncBackend) -> Self {
        self.sync = v;
        self
    }

    /// Constructs [`VigilConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`VigilConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
