//! Training pipeline.
use super::{PipelineState, RunningFlag, TrainingPipelineConfig};
use crate::{
    artifact::{
        ArtifactStore, DriftCheck, EvaluationArtifact, IngestionArtifact, PusherArtifact, RunRoot,
        Stage, TrainingArtifact, TrainingReport, TransformationArtifact, ValidationArtifact,
    },
    dataset::Dataset,
    drift::DriftDetector,
    error::PipelineError,
    estimator::{Classifier, Estimator, TrainedModel, Transform},
    gate::EvaluationGate,
    metric::ClassificationMetric,
    record::{Record, RecordValue, Recorder, YamlRecorder},
    remote,
    resolver::{ManifestEntry, ModelResolver, MODEL_FILE_NAME},
    schema::Schema,
    sync::RemoteSync,
    util,
};
use anyhow::{Context, Result};
use chrono::Local;
use log::{error, info, warn};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{ffi::OsStr, time::Instant};

/// Transformed features with their class indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelledMatrix {
    /// Features, one row per sample.
    pub x: Array2<f64>,
    /// Class indices.
    pub y: Vec<usize>,
}

/// Runs the stages from data ingestion to model promotion.
///
/// At most one run is in progress per [`RunningFlag`]; clones of the flag can be
/// shared by several pipelines so that they exclude each other.
///
/// Each run lives in its own directory of the [`ArtifactStore`]. The directory is pushed
/// to the remote store once its manifest is final: after a success, or after a failed
/// stage so that the failure can be inspected. Remote sync never fails a run.
pub struct TrainingPipeline<E, S> {
    config: TrainingPipelineConfig,
    schema: Schema,
    estimator: E,
    sync: S,
    store: ArtifactStore,
    resolver: ModelResolver,
    flag: RunningFlag,
}

impl<E, S> TrainingPipeline<E, S>
where
    E: Estimator,
    S: RemoteSync,
{
    /// Constructs a pipeline; the schema is loaded and validated here.
    pub fn new(
        config: TrainingPipelineConfig,
        estimator: E,
        sync: S,
        flag: RunningFlag,
    ) -> Result<Self> {
        if !(config.test_ratio > 0.0 && config.test_ratio < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "test_ratio must be in (0, 1), got {}",
                config.test_ratio
            ))
            .into());
        }
        let schema = Schema::load(&config.schema_path)?;
        Ok(Self {
            store: ArtifactStore::new(&config.artifact_root),
            resolver: ModelResolver::new(&config.model_store),
            config,
            schema,
            estimator,
            sync,
            flag,
        })
    }

    /// Configuration.
    pub fn config(&self) -> &TrainingPipelineConfig {
        &self.config
    }

    /// Schema of the data.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Store of the runs.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Resolver of the model store.
    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    /// The flag set while a run is in progress.
    pub fn flag(&self) -> &RunningFlag {
        &self.flag
    }

    /// Executes a whole run.
    ///
    /// Fails with [`PipelineError::AlreadyRunning`] without touching the filesystem if
    /// a run holding the same flag is in progress.
    pub fn run(&self) -> Result<TrainingReport> {
        let _guard = self.flag.try_acquire()?;
        if !self.config.source_path.is_file() {
            return Err(PipelineError::Configuration(format!(
                "source data {:?} does not exist",
                self.config.source_path
            ))
            .into());
        }

        let mut run = self
            .store
            .new_run()
            .context("Failed to create the run directory")?;
        let mut recorder = YamlRecorder::new(run.records_path());
        info!("Started training run {}", run.id());

        match self.run_stages(&mut run, &mut recorder) {
            Ok(mut report) => {
                run.mark_succeeded()?;
                info!("Pipeline state: {}", PipelineState::Succeeded);
                report.run_sync_error = self.push_run(&run);
                Ok(report)
            }
            Err(e) => {
                error!("Training run {} failed: {:#}", run.id(), e);
                info!("Pipeline state: {}", PipelineState::Failed);
                if let Err(e) = run.mark_failed(format!("{:#}", e)) {
                    warn!("Failed to mark run {} as failed: {:#}", run.id(), e);
                }
                self.push_run(&run);
                Err(e)
            }
        }
    }

    /// Pushes the run directory, returning the error message on failure.
    fn push_run(&self, run: &RunRoot) -> Option<String> {
        if !self.sync.is_enabled() {
            return None;
        }
        let uri = remote::artifact_uri(&self.config.training_bucket, run.id());
        match self.sync.push_dir(run.path(), &uri) {
            Ok(()) => None,
            Err(e) => {
                warn!("Failed to push run {} to {}: {}", run.id(), uri, e);
                Some(e.to_string())
            }
        }
    }

    fn run_stages(
        &self,
        run: &mut RunRoot,
        recorder: &mut dyn Recorder,
    ) -> Result<TrainingReport> {
        let ingestion = self.stage(run, Stage::DataIngestion, recorder, |run, rec| {
            self.start_data_ingestion(run, rec)
        })?;
        let validation = self.stage(run, Stage::DataValidation, recorder, |run, rec| {
            self.start_data_validation(run, &ingestion, rec)
        })?;
        let transformation = self.stage(run, Stage::DataTransformation, recorder, |run, rec| {
            self.start_data_transformation(run, &validation, rec)
        })?;
        let training = self.stage(run, Stage::ModelTrainer, recorder, |run, rec| {
            self.start_model_trainer(run, &transformation, rec)
        })?;
        let evaluation = self.stage(run, Stage::ModelEvaluation, recorder, |run, rec| {
            self.start_model_evaluation(run, &validation, &training, rec)
        })?;
        let pusher = self.stage(run, Stage::ModelPusher, recorder, |run, rec| {
            self.start_model_pusher(run, &evaluation, rec)
        })?;

        Ok(TrainingReport {
            run_id: run.id().to_string(),
            ingestion,
            validation,
            transformation,
            training,
            evaluation,
            pusher,
            run_sync_error: None,
        })
    }

    /// Runs a stage and wraps its failure with the stage name.
    fn stage<T>(
        &self,
        run: &mut RunRoot,
        stage: Stage,
        recorder: &mut dyn Recorder,
        f: impl FnOnce(&RunRoot, &mut dyn Recorder) -> Result<T>,
    ) -> Result<T> {
        info!("Pipeline state: {}", PipelineState::of_stage(stage));
        run.enter_stage(stage)?;
        let start = Instant::now();
        let output = f(run, recorder).with_context(|| format!("{} stage failed", stage))?;
        recorder.write(Record::from_slice(&[
            ("stage", RecordValue::String(stage.to_string())),
            ("duration_secs", RecordValue::Scalar(start.elapsed().as_secs_f64())),
        ]));
        Ok(output)
    }

    /// Copies the source data into the feature store and splits it.
    pub fn start_data_ingestion(
        &self,
        run: &RunRoot,
        recorder: &mut dyn Recorder,
    ) -> Result<IngestionArtifact> {
        let dir = run.stage_dir(Stage::DataIngestion);
        let file_name = self
            .config
            .source_path
            .file_name()
            .unwrap_or_else(|| OsStr::new("data.csv"));

        let data = Dataset::read_csv(&self.config.source_path, &self.schema)?
            .without_columns(self.schema.drop_columns());
        let feature_store_path = dir.join("feature_store").join(file_name);
        data.write_csv(&feature_store_path)?;

        let (train, test) = data.train_test_split(self.config.test_ratio, self.config.seed);
        let train_path = dir.join("ingested").join("train.csv");
        let test_path = dir.join("ingested").join("test.csv");
        train.write_csv(&train_path)?;
        test.write_csv(&test_path)?;
        info!(
            "Ingested {} rows: {} for training, {} for testing",
            data.n_rows(),
            train.n_rows(),
            test.n_rows()
        );

        let artifact = IngestionArtifact {
            feature_store_path,
            train_path,
            test_path,
            n_train: train.n_rows(),
            n_test: test.n_rows(),
        };
        run.write_artifact(Stage::DataIngestion, &artifact)?;
        recorder.write(Record::from_slice(&[
            ("n_train", RecordValue::Scalar(artifact.n_train as f64)),
            ("n_test", RecordValue::Scalar(artifact.n_test as f64)),
        ]));
        Ok(artifact)
    }

    /// Checks both splits against the schema and the training split for drift.
    ///
    /// Drift is recorded but never fails the stage.
    pub fn start_data_validation(
        &self,
        run: &RunRoot,
        ingestion: &IngestionArtifact,
        recorder: &mut dyn Recorder,
    ) -> Result<ValidationArtifact> {
        let train = Dataset::read_csv(&ingestion.train_path, &self.schema)?;
        let test = Dataset::read_csv(&ingestion.test_path, &self.schema)?;

        let train_check = self.schema.check_columns(&train, true);
        let test_check = self.schema.check_columns(&test, true);
        let unexpected_columns = train_check.unexpected_columns.clone();
        if !unexpected_columns.is_empty() {
            warn!("Columns not in the schema: {:?}", unexpected_columns);
        }
        train_check.into_result().context("Invalid training split")?;
        test_check.into_result().context("Invalid test split")?;

        let drift = self.check_drift(run, &train)?;
        let n_drifted = match &drift {
            DriftCheck::Checked { drifted_columns, .. } => drifted_columns.len() as f64,
            DriftCheck::Skipped { .. } => 0.0,
        };
        recorder.write(Record::from_scalar("n_drifted_columns", n_drifted));

        let artifact = ValidationArtifact {
            valid_train_path: ingestion.train_path.clone(),
            valid_test_path: ingestion.test_path.clone(),
            unexpected_columns,
            drift,
        };
        run.write_artifact(Stage::DataValidation, &artifact)?;
        Ok(artifact)
    }

    fn check_drift(&self, run: &RunRoot, train: &Dataset) -> Result<DriftCheck> {
        let baseline_run = match self.store.latest_completed_run(Some(run.id()))? {
            Some(baseline_run) => baseline_run,
            None => {
                info!("No previous successful run, skipped the drift check");
                return Ok(DriftCheck::Skipped {
                    reason: "no previous successful run".to_string(),
                });
            }
        };
        let baseline = baseline_run
            .read_artifact::<IngestionArtifact>(Stage::DataIngestion)
            .and_then(|a| Dataset::read_csv(&a.train_path, &self.schema));
        let baseline = match baseline {
            Ok(baseline) => baseline.select_columns(&self.schema.required_columns(true)),
            Err(e) => {
                warn!("Baseline of run {} is unreadable: {:#}", baseline_run.id(), e);
                return Ok(DriftCheck::Skipped {
                    reason: format!("baseline run {} is unreadable", baseline_run.id()),
                });
            }
        };

        let report = DriftDetector::new(self.config.drift_threshold).compare(
            &baseline,
            train,
            self.schema.target_column(),
        )?;
        let report_path = run
            .stage_dir(Stage::DataValidation)
            .join("drift_report")
            .join("report.yaml");
        DriftDetector::write_report(&report, &report_path)?;
        if report.any_drifted {
            warn!(
                "Data drift against run {} in {:?}",
                baseline_run.id(),
                report.drifted_columns
            );
        }

        Ok(DriftCheck::Checked {
            baseline_run: baseline_run.id().to_string(),
            report_path,
            drift_detected: report.any_drifted,
            drifted_columns: report.drifted_columns,
        })
    }

    /// Fits the feature transform and transforms both splits.
    pub fn start_data_transformation(
        &self,
        run: &RunRoot,
        validation: &ValidationArtifact,
        recorder: &mut dyn Recorder,
    ) -> Result<TransformationArtifact> {
        let dir = run.stage_dir(Stage::DataTransformation);
        let train = Dataset::read_csv(&validation.valid_train_path, &self.schema)?;
        let test = Dataset::read_csv(&validation.valid_test_path, &self.schema)?;
        let feature_columns = self.schema.feature_columns();
        let target = self.schema.target_column();
        let mapping = self.schema.target_mapping();

        let x_train = train.feature_matrix(&feature_columns)?;
        let x_test = test.feature_matrix(&feature_columns)?;
        let transform = self.estimator.fit_transform(&x_train)?;
        let train_array = LabelledMatrix {
            x: transform.transform(&x_train)?,
            y: train.labels(target, mapping)?,
        };
        let test_array = LabelledMatrix {
            x: transform.transform(&x_test)?,
            y: test.labels(target, mapping)?,
        };

        let transform_path = dir.join("transformed_object").join("transform.bin");
        let train_array_path = dir.join("transformed").join("train.bin");
        let test_array_path = dir.join("transformed").join("test.bin");
        util::save_object(&transform_path, &transform)?;
        util::save_object(&train_array_path, &train_array)?;
        util::save_object(&test_array_path, &test_array)?;

        let artifact = TransformationArtifact {
            transform_path,
            train_array_path,
            test_array_path,
            feature_columns,
        };
        run.write_artifact(Stage::DataTransformation, &artifact)?;
        recorder.write(Record::from_scalar(
            "n_features",
            artifact.feature_columns.len() as f64,
        ));
        Ok(artifact)
    }

    /// Fits the classifier and scores it on both splits.
    pub fn start_model_trainer(
        &self,
        run: &RunRoot,
        transformation: &TransformationArtifact,
        recorder: &mut dyn Recorder,
    ) -> Result<TrainingArtifact> {
        let train: LabelledMatrix = util::load_object(&transformation.train_array_path)?;
        let test: LabelledMatrix = util::load_object(&transformation.test_array_path)?;
        let transform: E::Transform = util::load_object(&transformation.transform_path)?;

        let classifier = self.estimator.fit_classifier(&train.x, &train.y)?;
        let train_metric = ClassificationMetric::score(&train.y, &classifier.predict(&train.x))?;
        let test_metric = ClassificationMetric::score(&test.y, &classifier.predict(&test.x))?;
        info!(
            "Trained a model with F1 {:.4} on the training split and {:.4} on the test split",
            train_metric.f1, test_metric.f1
        );

        let model =
            TrainedModel::new(transform, classifier, transformation.feature_columns.clone());
        let model_path = run
            .stage_dir(Stage::ModelTrainer)
            .join("trained_model")
            .join(MODEL_FILE_NAME);
        model.save(&model_path)?;

        let artifact = TrainingArtifact {
            model_path,
            train_metric,
            test_metric,
        };
        run.write_artifact(Stage::ModelTrainer, &artifact)?;
        recorder.write(Record::from_slice(&[
            ("train_f1", RecordValue::Scalar(train_metric.f1)),
            ("train_precision", RecordValue::Scalar(train_metric.precision)),
            ("train_recall", RecordValue::Scalar(train_metric.recall)),
            ("test_f1", RecordValue::Scalar(test_metric.f1)),
            ("test_precision", RecordValue::Scalar(test_metric.precision)),
            ("test_recall", RecordValue::Scalar(test_metric.recall)),
        ]));
        Ok(artifact)
    }

    /// Decides whether the trained model replaces the deployed one.
    ///
    /// The deployed model is scored on the same test split as the candidate.
    pub fn start_model_evaluation(
        &self,
        run: &RunRoot,
        validation: &ValidationArtifact,
        training: &TrainingArtifact,
        recorder: &mut dyn Recorder,
    ) -> Result<EvaluationArtifact> {
        let gate =
            EvaluationGate::new(self.config.expected_accuracy, self.config.overfit_threshold);
        let verdict = gate.accept(
            &training.train_metric,
            &training.test_metric,
            &self.resolver,
            |champion| {
                info!("Scoring model version {} on the test split", champion.version);
                let model = TrainedModel::<E::Transform, E::Classifier>::load(&champion.path)?;
                let test = Dataset::read_csv(&validation.valid_test_path, &self.schema)?;
                let y = test.labels(self.schema.target_column(), self.schema.target_mapping())?;
                Ok(ClassificationMetric::score(&y, &model.predict(&test)?)?)
            },
        )?;
        info!("Accepted the model as version {}", verdict.version);

        let artifact = EvaluationArtifact {
            model_path: training.model_path.clone(),
            verdict,
        };
        run.write_artifact(Stage::ModelEvaluation, &artifact)?;
        if let Some(improvement) = artifact.verdict.improvement {
            recorder.write(Record::from_scalar("improvement", improvement));
        }
        Ok(artifact)
    }

    /// Promotes the accepted model and pushes the model store.
    ///
    /// A failed push is logged and kept in the artifact; the model stays promoted.
    pub fn start_model_pusher(
        &self,
        run: &RunRoot,
        evaluation: &EvaluationArtifact,
        recorder: &mut dyn Recorder,
    ) -> Result<PusherArtifact> {
        let entry = ManifestEntry {
            version: evaluation.verdict.version,
            created_at: Local::now(),
            run_id: run.id().to_string(),
            test_f1: evaluation.verdict.test_metric.f1,
        };
        let model = self.resolver.promote(&evaluation.model_path, entry)?;

        let mut artifact = PusherArtifact {
            model,
            remote_run_uri: None,
            remote_model_store_uri: None,
            model_store_sync_error: None,
        };
        if self.sync.is_enabled() {
            let bucket = &self.config.training_bucket;
            let uri = remote::model_store_uri(bucket);
            if let Err(e) = self.sync.push_dir(self.resolver.root(), &uri) {
                warn!("Failed to push the model store to {}: {}", uri, e);
                artifact.model_store_sync_error = Some(e.to_string());
            }
            artifact.remote_model_store_uri = Some(uri);
            artifact.remote_run_uri = Some(remote::artifact_uri(bucket, run.id()));
        }
        run.write_artifact(Stage::ModelPusher, &artifact)?;
        recorder.write(Record::from_scalar("version", artifact.model.version as f64));
        Ok(artifact)
    }
}
