//! The default estimator of the pipelines.
use crate::{LogisticRegression, LogisticRegressionConfig, RobustScalerImputer};
use anyhow::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
use vigil_core::Estimator;

/// Configuration of [`SensorEstimator`].
#[derive(Debug, Default, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct SensorEstimatorConfig {
    /// Classifier configuration.
    pub classifier: LogisticRegressionConfig,
}

impl SensorEstimatorConfig {
    /// Sets the classifier configuration.
    pub fn classifier(mut self, v: LogisticRegressionConfig) -> Self {
        self.classifier = v;
        self
    }

    /// Constructs [`SensorEstimatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SensorEstimatorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Median imputation and robust scaling followed by logistic regression.
#[derive(Debug, Default, Clone)]
pub struct SensorEstimator {
    config: SensorEstimatorConfig,
}

impl SensorEstimator {
    /// Constructs the estimator.
    pub fn build(config: SensorEstimatorConfig) -> Self {
        Self { config }
    }
}

impl Estimator for SensorEstimator {
    type Transform = RobustScalerImputer;
    type Classifier = LogisticRegression;

    fn fit_transform(&self, x: &Array2<f64>) -> Result<RobustScalerImputer> {
        Ok(RobustScalerImputer::fit(x))
    }

    fn fit_classifier(&self, x: &Array2<f64>, y: &[usize]) -> Result<LogisticRegression> {
        LogisticRegression::fit(&self.config.classifier, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempdir::TempDir;
    use vigil_core::{Classifier, TrainedModel, Transform};

    #[test]
    fn test_serde_sensor_estimator_config() -> Result<()> {
        let config = SensorEstimatorConfig::default()
            .classifier(LogisticRegressionConfig::default().epochs(10).balanced(false));
        let dir = TempDir::new("sensor_estimator")?;
        let path = dir.path().join("estimator.yaml");
        config.save(&path)?;
        assert_eq!(SensorEstimatorConfig::load(&path)?, config);
        Ok(())
    }

    #[test]
    fn fitted_model_survives_persistence() -> Result<()> {
        let _ = env_logger::builder().is_test(true).try_init();
        let x = array![
            [100.0, f64::NAN],
            [110.0, 3.0],
            [900.0, 2.0],
            [950.0, 4.0],
            [120.0, 1.0],
            [980.0, f64::NAN],
        ];
        let y = [0, 0, 1, 1, 0, 1];

        let estimator = SensorEstimator::default();
        let transform = estimator.fit_transform(&x)?;
        let xt = transform.transform(&x)?;
        let classifier = estimator.fit_classifier(&xt, &y)?;
        assert_eq!(classifier.predict(&xt), y.to_vec());

        let model = TrainedModel::new(transform, classifier, vec!["a".into(), "b".into()]);
        let dir = TempDir::new("sensor_estimator")?;
        let path = dir.path().join("model.bin");
        model.save(&path)?;
        let loaded = TrainedModel::<RobustScalerImputer, LogisticRegression>::load(&path)?;
        assert_eq!(loaded.predict_matrix(&x)?, y.to_vec());
        Ok(())
    }
}
