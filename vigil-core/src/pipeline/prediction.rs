//! Prediction pipeline.
use super::PredictionPipelineConfig;
use crate::{
    artifact::{ArtifactStore, DriftCheck, IngestionArtifact, Stage},
    dataset::{Column, Dataset},
    drift::DriftDetector,
    error::{IoResultExt, PipelineError},
    estimator::{Estimator, TrainedModel},
    record::{Record, RecordValue, Recorder, YamlRecorder},
    remote,
    resolver::{ModelResolver, ModelVersion},
    schema::Schema,
    sync::RemoteSync,
    util,
};
use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

/// Name of the column holding the predicted labels.
pub const PREDICTED_COLUMN: &str = "predicted_column";

/// Brings an input batch into a local directory.
pub trait BatchFetcher {
    /// Fetches `source` into `dest_dir` and returns the path of the fetched file.
    fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Copies a local file.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl BatchFetcher for LocalFetcher {
    fn fetch(&self, source: &str, dest_dir: &Path) -> Result<PathBuf> {
        let src = Path::new(source);
        let file_name = src.file_name().ok_or_else(|| {
            PipelineError::Configuration(format!("{:?} is not a file path", source))
        })?;
        fs::create_dir_all(dest_dir).at_path(dest_dir)?;
        let dst = dest_dir.join(file_name);
        fs::copy(src, &dst).at_path(src)?;
        Ok(dst)
    }
}

/// Result of a successful prediction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    /// Run identifier.
    pub run_id: String,
    /// The model that scored the batch.
    pub model: ModelVersion,
    /// Local path of the output file.
    pub output_path: PathBuf,
    /// Where the output was published: the remote URI, or the local path when remote
    /// sync is disabled.
    pub output_location: String,
    /// The number of scored rows.
    pub n_rows: usize,
    /// Drift of the batch against the latest training data.
    pub drift: DriftCheck,
}

impl PredictionOutcome {
    /// Message reported to the caller.
    pub fn message(&self) -> String {
        let mut msg = format!("Prediction successful. Output at {}", self.output_location);
        if self.drift.drift_detected() {
            msg.push_str(". Datadrift detected. Retrain model for better results");
        }
        msg
    }
}

/// Scores input batches with the latest model in the model store.
///
/// The model is resolved once per run, so a promotion during a run does not change the
/// model that scores the batch. Several runs can be in progress at the same time.
pub struct PredictionPipeline<E, S, F> {
    config: PredictionPipelineConfig,
    schema: Schema,
    sync: S,
    fetcher: F,
    store: ArtifactStore,
    resolver: ModelResolver,
    estimator: PhantomData<fn() -> E>,
}

impl<E, S, F> PredictionPipeline<E, S, F>
where
    E: Estimator,
    S: RemoteSync,
    F: BatchFetcher,
{
    /// Constructs a pipeline; the schema is loaded and validated here.
    pub fn new(config: PredictionPipelineConfig, sync: S, fetcher: F) -> Result<Self> {
        let schema = Schema::load(&config.schema_path)?;
        Ok(Self {
            store: ArtifactStore::new(&config.artifact_root),
            resolver: ModelResolver::new(&config.model_store),
            config,
            schema,
            sync,
            fetcher,
            estimator: PhantomData,
        })
    }

    /// Configuration.
    pub fn config(&self) -> &PredictionPipelineConfig {
        &self.config
    }

    /// Resolver of the model store.
    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// Scores the batch at `source`.
    pub fn run(&self, source: &str) -> Result<PredictionOutcome> {
        let (run_id, run_dir) = util::create_timestamped_dir(&self.config.prediction_root)
            .context("Failed to create the prediction run directory")?;
        let mut recorder = YamlRecorder::new(run_dir.join("records.yaml"));
        info!("Started prediction run {} for {}", run_id, source);

        let input_path = self
            .fetcher
            .fetch(source, &run_dir.join("input"))
            .with_context(|| format!("Failed to fetch {}", source))?;
        let dataset = Dataset::read_csv(&input_path, &self.schema)?
            .without_columns(self.schema.drop_columns());
        let check = self.schema.check_columns(&dataset, false);
        if !check.unexpected_columns.is_empty() {
            warn!("Columns not in the schema: {:?}", check.unexpected_columns);
        }
        check.into_result().context("Invalid input batch")?;

        let drift = self.check_drift(&run_dir, &dataset)?;

        let store_uri = remote::model_store_uri(&self.config.training_bucket);
        if let Err(e) = self.sync.pull_dir(&store_uri, &self.config.model_store) {
            warn!("Failed to pull the model store from {}: {}", store_uri, e);
        }
        let model_version = self
            .resolver
            .latest_version()?
            .ok_or(PipelineError::ModelNotAvailable)?;
        info!("Scoring with model version {}", model_version.version);
        let model = TrainedModel::<E::Transform, E::Classifier>::load(&model_version.path)?;

        let mapping = self.schema.target_mapping();
        let labels = model
            .predict(&dataset)?
            .into_iter()
            .map(|class| {
                mapping.decode(class).map(|l| Some(l.to_string())).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "the model predicted unknown class {}",
                        class
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let n_rows = dataset.n_rows();
        let mut output = dataset;
        output.push_column(PREDICTED_COLUMN, Column::Categorical(labels))?;

        let file_name = input_path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "prediction.csv".to_string());
        let output_path = run_dir.join("prediction_output").join(&file_name);
        output.write_csv(&output_path)?;
        recorder.write(Record::from_slice(&[
            ("model_version", RecordValue::Scalar(model_version.version as f64)),
            ("n_rows", RecordValue::Scalar(n_rows as f64)),
            ("drift_detected", RecordValue::Scalar(drift.drift_detected() as u8 as f64)),
        ]));

        let output_location = if self.sync.is_enabled() {
            let bucket = &self.config.prediction_bucket;
            self.sync
                .push_dir(&run_dir, &remote::prediction_run_uri(bucket, &run_id))?;
            remote::prediction_output_uri(bucket, &run_id, &file_name)
        } else {
            output_path.display().to_string()
        };
        info!("Wrote predictions of {} rows to {}", n_rows, output_location);

        Ok(PredictionOutcome {
            run_id,
            model: model_version,
            output_path,
            output_location,
            n_rows,
            drift,
        })
    }

    /// Compares the batch with the training split of the latest successful training run.
    fn check_drift(&self, run_dir: &Path, dataset: &Dataset) -> Result<DriftCheck> {
        let baseline_run = match self.store.latest_completed_run(None)? {
            Some(run) => run,
            None => {
                info!("No successful training run, skipped the drift check");
                return Ok(DriftCheck::Skipped {
                    reason: "no successful training run".to_string(),
                });
            }
        };
        let baseline = baseline_run
            .read_artifact::<IngestionArtifact>(Stage::DataIngestion)
            .and_then(|a| Dataset::read_csv(&a.train_path, &self.schema));
        let baseline = match baseline {
            Ok(baseline) => baseline.select_columns(&self.schema.required_columns(false)),
            Err(e) => {
                warn!("Baseline of run {} is unreadable: {:#}", baseline_run.id(), e);
                return Ok(DriftCheck::Skipped {
                    reason: format!("baseline run {} is unreadable", baseline_run.id()),
                });
            }
        };

        let report = DriftDetector::new(self.config.drift_threshold).compare(
            &baseline,
            dataset,
            self.schema.target_column(),
        )?;
        let report_path = run_dir.join("drift_report").join("report.yaml");
        DriftDetector::write_report(&report, &report_path)?;
        if report.any_drifted {
            warn!("Data drift in {:?}", report.drifted_columns);
        }

        Ok(DriftCheck::Checked {
            baseline_run: baseline_run.id().to_string(),
            report_path,
            drift_detected: report.any_drifted,
            drifted_columns: report.drifted_columns,
        })
    }
}
