//! Pipelines wired with the shipped estimator, remote sync and batch fetcher.
use crate::{config::VigilConfig, util::HttpFetcher};
use anyhow::Result;
use log::info;
use vigil_core::{
    artifact::TrainingReport,
    pipeline::{PredictionOutcome, PredictionPipeline, RunningFlag, TrainingPipeline},
};
use vigil_estimators::SensorEstimator;
use vigil_server::PipelineService;

/// Runs the pipelines described by a [`VigilConfig`].
///
/// Pipelines are constructed per run, so the schema is read again each time. Training
/// runs share one [`RunningFlag`], so at most one of them is in progress.
#[derive(Debug, Clone)]
pub struct App {
    config: VigilConfig,
    flag: RunningFlag,
}

impl App {
    /// Constructs the app.
    pub fn new(config: VigilConfig) -> Self {
        Self {
            config,
            flag: RunningFlag::new(),
        }
    }

    /// Configuration.
    pub fn config(&self) -> &VigilConfig {
        &self.config
    }

    /// Runs the training pipeline.
    pub fn run_training(&self) -> Result<TrainingReport> {
        let pipeline = TrainingPipeline::new(
            self.config.training.clone(),
            SensorEstimator::build(self.config.estimator.clone()),
            self.config.sync.build(),
            self.flag.clone(),
        )?;
        let report = pipeline.run()?;
        info!(
            "Run {} promoted model version {} (test f1 {:.4})",
            report.run_id,
            report.pusher.model.version,
            report.evaluation.verdict.test_metric.f1
        );
        Ok(report)
    }

    /// Runs the prediction pipeline on the batch at `source`.
    pub fn run_prediction(&self, source: &str) -> Result<PredictionOutcome> {
        let pipeline = PredictionPipeline::<SensorEstimator, _, _>::new(
            self.config.prediction.clone(),
            self.config.sync.build(),
            HttpFetcher,
        )?;
        let outcome = pipeline.run(source)?;
        info!("{}", outcome.message());
        Ok(outcome)
    }
}

impl PipelineService for App {
    fn train(&self) -> Result<()> {
        self.run_training().map(|_| ())
    }

    fn predict(&self, source: &str) -> Result<PredictionOutcome> {
        self.run_prediction(source)
    }
}
