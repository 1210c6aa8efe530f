use super::{Stage, ARTIFACT_FILE_NAME};
use crate::{
    error::{IoResultExt, PipelineError},
    util,
};
use anyhow::Result;
use chrono::{DateTime, Local};
use log::{debug, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const RUN_MANIFEST_FILE_NAME: &str = "run.yaml";
const RECORDS_FILE_NAME: &str = "records.yaml";

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has not finished.
    Running,
    /// Every stage completed.
    Succeeded,
    /// A stage failed.
    Failed,
}

/// Contents of `run.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Run identifier.
    pub run_id: String,
    /// Status of the run.
    pub status: RunStatus,
    /// Start time.
    pub started_at: DateTime<Local>,
    /// End time, once finished.
    pub finished_at: Option<DateTime<Local>>,
    /// The stage being executed, or the one that failed.
    pub stage: Option<Stage>,
    /// Failure message.
    pub message: Option<String>,
}

/// Root directory of pipeline runs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Constructs a store rooted at `root`. Nothing is created until the first run.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the directory of a new run with one subdirectory per stage.
    pub fn new_run(&self) -> Result<RunRoot> {
        let (run_id, path) = util::create_timestamped_dir(&self.root)?;
        for stage in Stage::ALL.iter() {
            let dir = path.join(stage.dir_name());
            fs::create_dir_all(&dir).at_path(&dir)?;
        }
        let run = RunRoot {
            manifest: RunManifest {
                run_id: run_id.clone(),
                status: RunStatus::Running,
                started_at: Local::now(),
                finished_at: None,
                stage: None,
                message: None,
            },
            run_id,
            path,
        };
        run.save_manifest()?;
        info!("Created run directory {:?}", run.path);
        Ok(run)
    }

    /// Opens an existing run.
    pub fn open_run(&self, run_id: &str) -> Result<RunRoot> {
        let path = self.root.join(run_id);
        let manifest = util::read_yaml(&path.join(RUN_MANIFEST_FILE_NAME))?;
        Ok(RunRoot {
            run_id: run_id.to_string(),
            path,
            manifest,
        })
    }

    /// Directory of a stage of the given run.
    pub fn stage_path(&self, run_id: &str, stage: Stage) -> PathBuf {
        self.root.join(run_id).join(stage.dir_name())
    }

    /// Identifiers of all runs, newest first. A missing root has no runs.
    pub fn list_runs(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(PipelineError::storage(&self.root, e).into()),
        };
        let mut runs = vec![];
        for entry in entries {
            let entry = entry.at_path(&self.root)?;
            if entry.path().is_dir() {
                runs.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        runs.sort_unstable_by(|a, b| b.cmp(a));
        Ok(runs)
    }

    /// The newest run that succeeded, other than `excluding`.
    pub fn latest_completed_run(&self, excluding: Option<&str>) -> Result<Option<RunRoot>> {
        for run_id in self.list_runs()? {
            if Some(run_id.as_str()) == excluding {
                continue;
            }
            match self.open_run(&run_id) {
                Ok(run) if run.manifest.status == RunStatus::Succeeded => return Ok(Some(run)),
                Ok(_) => {}
                Err(e) => debug!("Skipped run {:?}: {:#}", run_id, e),
            }
        }
        Ok(None)
    }
}

/// Directory of a single run.
#[derive(Debug, Clone)]
pub struct RunRoot {
    run_id: String,
    path: PathBuf,
    manifest: RunManifest,
}

impl RunRoot {
    /// Run identifier.
    pub fn id(&self) -> &str {
        &self.run_id
    }

    /// Run directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current manifest.
    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    /// Directory of the given stage.
    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        self.path.join(stage.dir_name())
    }

    /// Path of the records written during the run.
    pub fn records_path(&self) -> PathBuf {
        self.path.join(RECORDS_FILE_NAME)
    }

    /// Writes the artifact of a stage. An artifact is written only once.
    pub fn write_artifact<T: Serialize>(&self, stage: Stage, artifact: &T) -> Result<PathBuf> {
        let path = self.stage_dir(stage).join(ARTIFACT_FILE_NAME);
        if path.exists() {
            let e = io::Error::new(io::ErrorKind::AlreadyExists, "artifact already written");
            return Err(PipelineError::storage(&path, e).into());
        }
        util::write_yaml(&path, artifact)?;
        Ok(path)
    }

    /// Reads the artifact of a stage.
    pub fn read_artifact<T: DeserializeOwned>(&self, stage: Stage) -> Result<T> {
        util::read_yaml(&self.stage_dir(stage).join(ARTIFACT_FILE_NAME))
    }

    /// Records the stage being executed.
    pub fn enter_stage(&mut self, stage: Stage) -> Result<()> {
        self.manifest.stage = Some(stage);
        self.save_manifest()
    }

    /// Marks the run as succeeded.
    pub fn mark_succeeded(&mut self) -> Result<()> {
        self.finish(RunStatus::Succeeded, None)
    }

    /// Marks the run as failed with a message.
    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<()> {
        self.finish(RunStatus::Failed, Some(message.into()))
    }

    fn finish(&mut self, status: RunStatus, message: Option<String>) -> Result<()> {
        self.manifest.status = status;
        self.manifest.finished_at = Some(Local::now());
        self.manifest.message = message;
        self.save_manifest()
    }

    fn save_manifest(&self) -> Result<()> {
        util::write_yaml(&self.path.join(RUN_MANIFEST_FILE_NAME), &self.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn new_run_creates_stage_dirs() -> Result<()> {
        let dir = TempDir::new("artifact")?;
        let store = ArtifactStore::new(dir.path().join("artifact"));
        let run = store.new_run()?;
        for stage in Stage::ALL.iter() {
            assert!(store.stage_path(run.id(), *stage).is_dir());
        }
        assert_eq!(store.open_run(run.id())?.manifest().status, RunStatus::Running);
        Ok(())
    }

    #[test]
    fn runs_are_listed_newest_first() -> Result<()> {
        let dir = TempDir::new("artifact")?;
        let store = ArtifactStore::new(dir.path());
        assert!(store.list_runs()?.is_empty());

        let first = store.new_run()?;
        let second = store.new_run()?;
        fs::write(dir.path().join("notes.txt"), "")?;
        assert_eq!(
            store.list_runs()?,
            vec![second.id().to_string(), first.id().to_string()]
        );
        Ok(())
    }

    #[test]
    fn latest_completed_run_skips_failures() -> Result<()> {
        let dir = TempDir::new("artifact")?;
        let store = ArtifactStore::new(dir.path());
        let mut ok = store.new_run()?;
        ok.mark_succeeded()?;
        let mut failed = store.new_run()?;
        failed.enter_stage(Stage::DataValidation)?;
        failed.mark_failed("validation failed")?;
        let running = store.new_run()?;

        let latest = store.latest_completed_run(Some(running.id()))?.unwrap();
        assert_eq!(latest.id(), ok.id());
        assert!(store.latest_completed_run(Some(ok.id()))?.is_none());

        let failed = store.open_run(failed.id())?;
        assert_eq!(failed.manifest().stage, Some(Stage::DataValidation));
        assert_eq!(failed.manifest().status, RunStatus::Failed);
        Ok(())
    }

    #[test]
    fn artifacts_are_written_once() -> Result<()> {
        let dir = TempDir::new("artifact")?;
        let run = ArtifactStore::new(dir.path()).new_run()?;
        run.write_artifact(Stage::DataIngestion, &vec![1, 2])?;
        assert!(run.write_artifact(Stage::DataIngestion, &vec![3]).is_err());
        assert_eq!(run.read_artifact::<Vec<i32>>(Stage::DataIngestion)?, vec![1, 2]);
        Ok(())
    }
}
