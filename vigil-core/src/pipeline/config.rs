//! Configuration of the pipelines.
use crate::{
    drift::DEFAULT_THRESHOLD,
    gate::{DEFAULT_EXPECTED_ACCURACY, DEFAULT_OVERFIT_THRESHOLD},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

/// Configuration of [`TrainingPipeline`](super::TrainingPipeline).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct TrainingPipelineConfig {
    /// Root directory of the training runs.
    pub artifact_root: PathBuf,

    /// Root directory of the model store.
    pub model_store: PathBuf,

    /// CSV file read by the ingestion stage.
    pub source_path: PathBuf,

    /// Schema of the data.
    pub schema_path: PathBuf,

    /// Fraction of rows held out for testing.
    pub test_ratio: f64,

    /// Seed of the train/test split.
    pub seed: u64,

    /// Minimum F1 on the training split, exclusive.
    pub expected_accuracy: f64,

    /// Maximum gap between training and test F1, inclusive.
    pub overfit_threshold: f64,

    /// p-value below which a column is drifted.
    pub drift_threshold: f64,

    /// Bucket receiving run artifacts and models.
    pub training_bucket: String,
}

impl Default for TrainingPipelineConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("artifact"),
            model_store: PathBuf::from("saved_models"),
            source_path: PathBuf::from("data/train.csv"),
            schema_path: PathBuf::from("config/schema.yaml"),
            test_ratio: 0.2,
            seed: 42,
            expected_accuracy: DEFAULT_EXPECTED_ACCURACY,
            overfit_threshold: DEFAULT_OVERFIT_THRESHOLD,
            drift_threshold: DEFAULT_THRESHOLD,
            training_bucket: "vigil-training".to_string(),
        }
    }
}

impl TrainingPipelineConfig {
    /// Sets the root directory of the training runs.
    pub fn artifact_root(mut self, v: impl Into<PathBuf>) -> Self {
        self.artifact_root = v.into();
        self
    }

    /// Sets the root directory of the model store.
    pub fn model_store(mut self, v: impl Into<PathBuf>) -> Self {
        self.model_store = v.into();
        self
    }

    /// Sets the source CSV file.
    pub fn source_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.source_path = v.into();
        self
    }

    /// Sets the schema file.
    pub fn schema_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.schema_path = v.into();
        self
    }

    /// Sets the fraction of rows held out for testing.
    pub fn test_ratio(mut self, v: f64) -> Self {
        self.test_ratio = v;
        self
    }

    /// Sets the seed of the train/test split.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the minimum training F1.
    pub fn expected_accuracy(mut self, v: f64) -> Self {
        self.expected_accuracy = v;
        self
    }

    /// Sets the maximum train/test F1 gap.
    pub fn overfit_threshold(mut self, v: f64) -> Self {
        self.overfit_threshold = v;
        self
    }

    /// Sets the drift p-value threshold.
    pub fn drift_threshold(mut self, v: f64) -> Self {
        self.drift_threshold = v;
        self
    }

    /// Sets the training bucket.
    pub fn training_bucket(mut self, v: impl Into<String>) -> Self {
        self.training_bucket = v.into();
        self
    }

    /// Constructs [`TrainingPipelineConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainingPipelineConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Configuration of [`PredictionPipeline`](super::PredictionPipeline).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct PredictionPipelineConfig {
    /// Root directory of the prediction runs.
    pub prediction_root: PathBuf,

    /// Root directory of the training runs, searched for the drift baseline.
    pub artifact_root: PathBuf,

    /// Root directory of the model store.
    pub model_store: PathBuf,

    /// Schema of the data.
    pub schema_path: PathBuf,

    /// p-value below which a column is drifted.
    pub drift_threshold: f64,

    /// Bucket receiving prediction outputs.
    pub prediction_bucket: String,

    /// Bucket holding the model store.
    pub training_bucket: String,
}

impl Default for PredictionPipelineConfig {
    fn default() -> Self {
        Self {
            prediction_root: PathBuf::from("prediction"),
            artifact_root: PathBuf::from("artifact"),
            model_store: PathBuf::from("saved_models"),
            schema_path: PathBuf::from("config/schema.yaml"),
            drift_threshold: DEFAULT_THRESHOLD,
            prediction_bucket: "vigil-prediction".to_string(),
            training_bucket: "vigil-training".to_string(),
        }
    }
}

impl PredictionPipelineConfig {
    /// Sets the root directory of the prediction runs.
    pub fn prediction_root(mut self, v: impl Into<PathBuf>) -> Self {
        self.prediction_root = v.into();
        self
    }

    /// Sets the root directory of the training runs.
    pub fn artifact_root(mut self, v: impl Into<PathBuf>) -> Self {
        self.artifact_root = v.into();
        self
    }

    /// Sets the root directory of the model store.
    pub fn model_store(mut self, v: impl Into<PathBuf>) -> Self {
        self.model_store = v.into();
        self
    }

    /// Sets the schema file.
    pub fn schema_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.schema_path = v.into();
        self
    }

    /// Sets the drift p-value threshold.
    pub fn drift_threshold(mut self, v: f64) -> Self {
        self.drift_threshold = v;
        self
    }

    /// Sets the prediction bucket.
    pub fn prediction_bucket(mut self, v: impl Into<String>) -> Self {
        self.prediction_bucket = v.into();
        self
    }

    /// Sets the training bucket.
    pub fn training_bucket(mut self, v: impl Into<String>) -> Self {
        self.training_bucket = v.into();
        self
    }

    /// Constructs [`PredictionPipelineConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PredictionPipelineConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_training_config() -> Result<()> {
        let config = TrainingPipelineConfig::default()
            .artifact_root("some/artifact")
            .expected_accuracy(0.7)
            .seed(7);

        let dir = TempDir::new("training_config")?;
        let path = dir.path().join("training.yaml");
        config.save(&path)?;
        let config_ = TrainingPipelineConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[test]
    fn missing_fields_take_defaults() -> Result<()> {
        let config: PredictionPipelineConfig =
            serde_yaml::from_str("prediction_bucket: my-bucket\n")?;
        assert_eq!(config.prediction_bucket, "my-bucket");
        assert_eq!(config.drift_threshold, 0.05);
        assert_eq!(config.model_store, PathBuf::from("saved_models"));
        Ok(())
    }
}
