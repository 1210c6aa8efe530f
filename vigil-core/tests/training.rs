mod common;
use anyhow::Result;
use common::{write_source, FixedThresholdEstimator, ThresholdEstimator, Workspace};
use std::{fs, path::Path};
use vigil_core::{
    artifact::{ArtifactStore, DriftCheck, PusherArtifact, RunStatus, Stage, ARTIFACT_FILE_NAME},
    gate::RejectionReason,
    pipeline::{RunningFlag, TrainingPipeline},
    record::{BufferedRecorder, NullRecorder},
    resolver::ModelResolver,
    sync::{LocalMirrorSync, NullSync, RemoteSync},
    PipelineError,
};

fn pipeline(
    ws: &Workspace,
    flag: RunningFlag,
) -> Result<TrainingPipeline<ThresholdEstimator, NullSync>> {
    TrainingPipeline::new(ws.training_config(), ThresholdEstimator, NullSync, flag)
}

/// Fails every transfer.
struct UnreachableRemote;

impl RemoteSync for UnreachableRemote {
    fn push_dir(&self, _local: &Path, remote_uri: &str) -> Result<(), PipelineError> {
        Err(PipelineError::ExternalService(format!("{} is unreachable", remote_uri)))
    }

    fn pull_dir(&self, remote_uri: &str, _local: &Path) -> Result<(), PipelineError> {
        Err(PipelineError::ExternalService(format!("{} is unreachable", remote_uri)))
    }
}

#[test]
fn first_run_promotes_version_one() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 200, 1, 0.0, true, true)?;
    let flag = RunningFlag::new();
    let report = pipeline(&ws, flag.clone())?.run()?;

    assert!(!flag.is_running());
    assert_eq!(report.ingestion.n_train + report.ingestion.n_test, 200);
    assert_eq!(report.ingestion.n_test, 40);
    assert!(!report.validation.drift.drift_detected());
    assert_eq!(report.transformation.feature_columns, vec!["aa_000", "ab_000", "ac_000"]);
    assert_eq!(report.training.train_metric.f1, 1.0);
    assert_eq!(report.evaluation.verdict.champion, None);
    assert_eq!(report.pusher.model.version, 1);
    assert!(report.pusher.model.path.is_file());

    let feature_store = fs::read_to_string(&report.ingestion.feature_store_path)?;
    assert!(!feature_store.lines().next().unwrap_or_default().contains("br_000"));

    let store = pipeline(&ws, RunningFlag::new())?.store().clone();
    let run = store.open_run(&report.run_id)?;
    assert_eq!(run.manifest().status, RunStatus::Succeeded);
    assert!(run.records_path().is_file());
    assert_eq!(report.pusher.remote_run_uri, None);
    assert_eq!(report.run_sync_error, None);
    Ok(())
}

#[test]
fn mirrored_run_carries_its_final_manifest() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 200, 1, 0.0, true, true)?;
    let mirror = LocalMirrorSync::new(ws.path("remote"));
    let flag = RunningFlag::new();
    let pipeline = TrainingPipeline::new(ws.training_config(), ThresholdEstimator, mirror, flag)?;
    let report = pipeline.run()?;

    assert_eq!(report.pusher.model_store_sync_error, None);
    assert_eq!(report.run_sync_error, None);
    assert_eq!(
        report.pusher.remote_run_uri.as_deref(),
        Some(format!("s3://train-bucket/artifact/{}", report.run_id).as_str())
    );

    let remote_store = ArtifactStore::new(ws.path("remote/train-bucket/artifact"));
    let remote_run = remote_store.open_run(&report.run_id)?;
    assert_eq!(remote_run.manifest().status, RunStatus::Succeeded);
    assert!(remote_run.manifest().finished_at.is_some());

    let remote_models = ModelResolver::new(ws.path("remote/train-bucket/saved_models"));
    assert_eq!(remote_models.latest_version()?.map(|v| v.version), Some(1));
    Ok(())
}

#[test]
fn unreachable_remote_does_not_fail_a_promoted_run() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 200, 1, 0.0, true, true)?;
    let pipeline = TrainingPipeline::new(
        ws.training_config(),
        ThresholdEstimator,
        UnreachableRemote,
        RunningFlag::new(),
    )?;
    let report = pipeline.run()?;

    assert_eq!(report.pusher.model.version, 1);
    let sync_error = report.pusher.model_store_sync_error.clone().unwrap_or_default();
    assert!(sync_error.contains("s3://train-bucket/saved_models is unreachable"));
    assert!(report.run_sync_error.is_some());

    let run = pipeline.store().open_run(&report.run_id)?;
    assert_eq!(run.manifest().status, RunStatus::Succeeded);
    assert_eq!(run.read_artifact::<PusherArtifact>(Stage::ModelPusher)?, report.pusher);
    assert_eq!(pipeline.resolver().latest_version()?.map(|v| v.version), Some(1));

    // The run owning the deployed model is the baseline of the next one.
    let second = pipeline.run()?;
    match &second.validation.drift {
        DriftCheck::Checked { baseline_run, .. } => assert_eq!(baseline_run, &report.run_id),
        other => panic!("drift check was skipped: {:?}", other),
    }
    Ok(())
}

#[test]
fn stages_can_be_driven_one_by_one() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 100, 3, 0.0, true, true)?;
    let pipeline = pipeline(&ws, RunningFlag::new())?;
    let run = pipeline.store().new_run()?;

    let mut records = BufferedRecorder::new();
    let ingestion = pipeline.start_data_ingestion(&run, &mut records)?;
    let validation = pipeline.start_data_validation(&run, &ingestion, &mut records)?;
    pipeline.start_data_transformation(&run, &validation, &mut NullRecorder)?;

    assert_eq!(records.len(), 2);
    let mut records = records.iter();
    let ingested = records.next().expect("ingestion record");
    assert_eq!(ingested.get_scalar("n_train")?, 80.0);
    assert_eq!(ingested.get_scalar("n_test")?, 20.0);
    let validated = records.next().expect("validation record");
    assert_eq!(validated.get_scalar("n_drifted_columns")?, 0.0);

    assert!(matches!(validation.drift, DriftCheck::Skipped { .. }));
    assert!(run
        .stage_dir(Stage::DataTransformation)
        .join(ARTIFACT_FILE_NAME)
        .is_file());
    assert_eq!(run.manifest().status, RunStatus::Running);
    Ok(())
}

#[test]
fn drifted_second_run_is_still_promoted() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 200, 7, 0.0, true, true)?;
    let first = pipeline(&ws, RunningFlag::new())?.run()?;

    // Same rows, except that `ab_000` moved far away.
    write_source(&ws.source_path(), 200, 7, 1000.0, true, true)?;
    let second = pipeline(&ws, RunningFlag::new())?.run()?;

    assert!(second.validation.drift.drift_detected());
    match &second.validation.drift {
        DriftCheck::Checked {
            baseline_run,
            drifted_columns,
            report_path,
            ..
        } => {
            assert_eq!(baseline_run, &first.run_id);
            assert_eq!(drifted_columns, &vec!["ab_000".to_string()]);
            assert!(report_path.is_file());
        }
        other => panic!("drift check was skipped: {:?}", other),
    }

    let champion = second.evaluation.verdict.champion.as_ref().unwrap();
    assert_eq!(champion.model.version, 1);
    assert_eq!(second.pusher.model.version, 2);
    let resolver = ModelResolver::new(ws.path("saved_models"));
    assert_eq!(resolver.latest_version()?.map(|v| v.version), Some(2));
    assert_eq!(resolver.manifest()?.entries.len(), 2);
    Ok(())
}

#[test]
fn train_f1_equal_to_floor_is_rejected() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 100, 3, 0.0, true, true)?;
    let config = ws.training_config().expected_accuracy(1.0);
    let flag = RunningFlag::new();
    let mirror = LocalMirrorSync::new(ws.path("remote"));
    let pipeline = TrainingPipeline::new(config, ThresholdEstimator, mirror, flag.clone())?;

    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Rejected(RejectionReason::BelowAccuracyFloor { .. }))
    ));
    assert!(format!("{:#}", err).contains("model_evaluation stage failed"));
    assert!(!flag.is_running());
    assert!(!pipeline.resolver().is_model_available());

    let run_id = pipeline.store().list_runs()?.remove(0);
    let run = pipeline.store().open_run(&run_id)?;
    assert_eq!(run.manifest().status, RunStatus::Failed);
    assert_eq!(run.manifest().stage, Some(Stage::ModelEvaluation));

    // The partial run was pushed.
    let pushed = ws.path("remote/train-bucket/artifact").join(&run_id);
    assert!(pushed.join("run.yaml").is_file());
    assert!(pushed.join("model_trainer").join("artifact.yaml").is_file());
    Ok(())
}

#[test]
fn candidate_worse_than_champion_is_rejected() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 200, 1, 0.0, true, true)?;
    let first = pipeline(&ws, RunningFlag::new())?.run()?;
    assert_eq!(first.evaluation.verdict.test_metric.f1, 1.0);

    // Most positives fall below 90: above the floor, below the deployed model.
    let config = ws
        .training_config()
        .expected_accuracy(0.1)
        .overfit_threshold(1.0);
    let estimator = FixedThresholdEstimator(90.0);
    let pipeline = TrainingPipeline::new(config, estimator, NullSync, RunningFlag::new())?;
    let err = pipeline.run().unwrap_err();
    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::Rejected(RejectionReason::WorseThanChampion {
            candidate_f1,
            champion_f1,
            champion_version,
        })) => {
            assert_eq!(*champion_version, 1);
            assert_eq!(*champion_f1, 1.0);
            assert!(candidate_f1 < champion_f1);
        }
        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(pipeline.resolver().latest_version()?.map(|v| v.version), Some(1));
    assert_eq!(pipeline.resolver().manifest()?.entries.len(), 1);

    let runs = pipeline.store().list_runs()?;
    assert_eq!(runs.len(), 2);
    let rejected = runs
        .iter()
        .find(|id| **id != first.run_id)
        .map(|id| pipeline.store().open_run(id))
        .transpose()?
        .expect("rejected run");
    assert_eq!(rejected.manifest().status, RunStatus::Failed);
    assert_eq!(rejected.manifest().stage, Some(Stage::ModelEvaluation));
    assert!(!rejected
        .stage_dir(Stage::ModelPusher)
        .join(ARTIFACT_FILE_NAME)
        .exists());
    Ok(())
}

#[test]
fn concurrent_run_is_refused_without_side_effects() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 100, 1, 0.0, true, true)?;
    let flag = RunningFlag::new();
    let pipeline = pipeline(&ws, flag.clone())?;

    let guard = flag.try_acquire()?;
    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::AlreadyRunning)
    ));
    assert!(!ws.path("artifact").exists());
    assert!(flag.is_running());

    drop(guard);
    pipeline.run()?;
    assert!(!flag.is_running());
    Ok(())
}

#[test]
fn invalid_data_fails_validation() -> Result<()> {
    let ws = Workspace::new()?;
    write_source(&ws.source_path(), 50, 1, 0.0, true, false)?;
    let flag = RunningFlag::new();
    let pipeline = pipeline(&ws, flag.clone())?;

    let err = pipeline.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Validation(_))
    ));
    assert!(!flag.is_running());
    let run = pipeline.store().open_run(&pipeline.store().list_runs()?[0])?;
    assert_eq!(run.manifest().stage, Some(Stage::DataValidation));
    Ok(())
}

#[test]
fn missing_inputs_are_configuration_errors() -> Result<()> {
    let ws = Workspace::new()?;
    let err = pipeline(&ws, RunningFlag::new())?.run().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Configuration(_))
    ));
    assert!(!ws.path("artifact").exists());

    let config = ws.training_config().schema_path(ws.path("config/missing.yaml"));
    let err = TrainingPipeline::new(config, ThresholdEstimator, NullSync, RunningFlag::new())
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::Configuration(_))
    ));
    Ok(())
}
