#![allow(dead_code)]
use anyhow::Result;
use ndarray::{Array2, Axis};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempdir::TempDir;
use vigil_core::{
    pipeline::{PredictionPipelineConfig, TrainingPipelineConfig},
    Classifier, Estimator, Transform,
};

pub const SCHEMA: &str = "
columns:
  - class: category
  - aa_000: float64
  - ab_000: float64
  - ac_000: float64
  - br_000: float64
numerical_columns:
  - aa_000
  - ab_000
  - ac_000
  - br_000
drop_columns:
  - br_000
";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Replaces missing values with zero.
#[derive(Debug, Serialize, Deserialize)]
pub struct FillMissing;

impl Transform for FillMissing {
    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(x.mapv(|v| if v.is_nan() { 0.0 } else { v }))
    }
}

/// Predicts the positive class when the first feature exceeds a threshold.
#[derive(Debug, Serialize, Deserialize)]
pub struct FirstFeatureThreshold {
    threshold: f64,
}

impl Classifier for FirstFeatureThreshold {
    fn predict(&self, x: &Array2<f64>) -> Vec<usize> {
        x.column(0).iter().map(|&v| (v > self.threshold) as usize).collect()
    }
}

/// Places the threshold halfway between the class means of the first feature.
pub struct ThresholdEstimator;

impl Estimator for ThresholdEstimator {
    type Transform = FillMissing;
    type Classifier = FirstFeatureThreshold;

    fn fit_transform(&self, _x: &Array2<f64>) -> Result<FillMissing> {
        Ok(FillMissing)
    }

    fn fit_classifier(&self, x: &Array2<f64>, y: &[usize]) -> Result<FirstFeatureThreshold> {
        let mean = |class: usize| {
            let vs: Vec<f64> = x
                .axis_iter(Axis(0))
                .zip(y.iter())
                .filter(|(_, c)| **c == class)
                .map(|(row, _)| row[0])
                .collect();
            vs.iter().sum::<f64>() / vs.len().max(1) as f64
        };
        Ok(FirstFeatureThreshold {
            threshold: (mean(0) + mean(1)) / 2.0,
        })
    }
}

/// Uses a fixed threshold on the first feature whatever the data.
pub struct FixedThresholdEstimator(pub f64);

impl Estimator for FixedThresholdEstimator {
    type Transform = FillMissing;
    type Classifier = FirstFeatureThreshold;

    fn fit_transform(&self, _x: &Array2<f64>) -> Result<FillMissing> {
        Ok(FillMissing)
    }

    fn fit_classifier(&self, _x: &Array2<f64>, _y: &[usize]) -> Result<FirstFeatureThreshold> {
        Ok(FirstFeatureThreshold { threshold: self.0 })
    }
}

/// Writes a CSV whose class is separable by `aa_000`.
///
/// `ab_000` is shifted by `ab_shift`; with the same seed, every other column is
/// identical. `with_class` and `with_ab` control the presence of those columns.
pub fn write_source(
    path: &Path,
    n_rows: usize,
    seed: u64,
    ab_shift: f64,
    with_class: bool,
    with_ab: bool,
) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec![];
    if with_class {
        header.push("class");
    }
    header.push("aa_000");
    if with_ab {
        header.push("ab_000");
    }
    header.extend(["ac_000", "br_000"]);
    wtr.write_record(&header)?;

    for _ in 0..n_rows {
        let pos = rng.gen_bool(0.5);
        let aa: f64 = if pos {
            rng.gen_range(60.0..100.0)
        } else {
            rng.gen_range(0.0..40.0)
        };
        let ab: f64 = rng.gen_range(0.0..10.0) + ab_shift;
        let ac: f64 = rng.gen_range(-1.0..1.0);
        let br: f64 = rng.gen_range(0.0..1.0);

        let mut record = vec![];
        if with_class {
            record.push(if pos { "pos" } else { "neg" }.to_string());
        }
        record.push(aa.to_string());
        if with_ab {
            record.push(ab.to_string());
        }
        record.push(ac.to_string());
        record.push(br.to_string());
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Temporary workspace holding the schema, the data and all pipeline outputs.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        init_logger();
        let dir = TempDir::new("vigil")?;
        let schema_path = dir.path().join("config").join("schema.yaml");
        fs::create_dir_all(dir.path().join("config"))?;
        fs::write(&schema_path, SCHEMA)?;
        Ok(Self { dir })
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn source_path(&self) -> PathBuf {
        self.path("data/source.csv")
    }

    pub fn training_config(&self) -> TrainingPipelineConfig {
        TrainingPipelineConfig::default()
            .artifact_root(self.path("artifact"))
            .model_store(self.path("saved_models"))
            .source_path(self.source_path())
            .schema_path(self.path("config/schema.yaml"))
            .training_bucket("train-bucket")
    }

    pub fn prediction_config(&self) -> PredictionPipelineConfig {
        PredictionPipelineConfig::default()
            .prediction_root(self.path("prediction"))
            .artifact_root(self.path("artifact"))
            .model_store(self.path("saved_models"))
            .schema_path(self.path("config/schema.yaml"))
            .prediction_bucket("pred-bucket")
            .training_bucket("train-bucket")
    }
}
