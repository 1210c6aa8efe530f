#![warn(missing_docs)]
//! Remote sync of vigil runs and models through the AWS CLI.
//!
//! [`AwsCliSync`] implements [`RemoteSync`] by running `aws s3 sync <src> <dst>`. The
//! CLI reads its credentials and region from the environment as usual, so nothing is
//! configured here besides the program to run.
//!
//! ```no_run
//! use std::path::Path;
//! use vigil_core::sync::RemoteSync;
//! use vigil_remote_sync::{AwsCliSync, AwsCliSyncConfig};
//!
//! let sync = AwsCliSync::new(AwsCliSyncConfig::default());
//! sync.push_dir(Path::new("saved_models"), "s3://my-bucket/saved_models").unwrap();
//! ```
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::{path::Path, process::Command};
use vigil_core::{sync::RemoteSync, PipelineError};

/// Configuration of [`AwsCliSync`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsCliSyncConfig {
    /// The program to run.
    pub program: String,

    /// Extra arguments appended to `s3 sync`, e.g. `--delete` or `--quiet`.
    pub extra_args: Vec<String>,
}

impl Default for AwsCliSyncConfig {
    fn default() -> Self {
        Self {
            program: "aws".to_string(),
            extra_args: vec![],
        }
    }
}

impl AwsCliSyncConfig {
    /// Sets the program to run.
    pub fn program(mut self, v: impl Into<String>) -> Self {
        self.program = v.into();
        self
    }

    /// Sets the extra arguments.
    pub fn extra_args(mut self, v: Vec<String>) -> Self {
        self.extra_args = v;
        self
    }
}

/// Syncs directories with S3 by running the AWS CLI.
#[derive(Debug, Clone)]
pub struct AwsCliSync {
    config: AwsCliSyncConfig,
}

impl AwsCliSync {
    /// Constructs the sync.
    pub fn new(config: AwsCliSyncConfig) -> Self {
        Self { config }
    }

    fn sync(&self, src: &str, dst: &str) -> Result<(), PipelineError> {
        info!("{} s3 sync {} {}", self.config.program, src, dst);
        let output = Command::new(&self.config.program)
            .args(["s3", "sync", src, dst])
            .args(&self.config.extra_args)
            .output()
            .map_err(|e| {
                PipelineError::ExternalService(format!(
                    "failed to run {:?}: {}",
                    self.config.program, e
                ))
            })?;
        debug!("{}", String::from_utf8_lossy(&output.stdout));

        if output.status.success() {
            Ok(())
        } else {
            Err(PipelineError::ExternalService(format!(
                "sync from {} to {} exited with {}: {}",
                src,
                dst,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl RemoteSync for AwsCliSync {
    fn push_dir(&self, local: &Path, remote_uri: &str) -> Result<(), PipelineError> {
        self.sync(&local.to_string_lossy(), remote_uri)
    }

    fn pull_dir(&self, remote_uri: &str, local: &Path) -> Result<(), PipelineError> {
        self.sync(remote_uri, &local.to_string_lossy())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempdir::TempDir;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Writes a script recording its arguments and exiting with `code`.
    fn fake_cli(dir: &Path, code: i32) -> anyhow::Result<String> {
        let path = dir.join("fake-aws");
        let log = dir.join("args.txt");
        fs::write(
            &path,
            format!("#!/bin/sh\necho \"$@\" > {}\nexit {}\n", log.display(), code),
        )?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(path.to_string_lossy().to_string())
    }

    #[test]
    fn runs_s3_sync() -> anyhow::Result<()> {
        init();
        let dir = TempDir::new("aws_cli_sync")?;
        let program = fake_cli(dir.path(), 0)?;
        let sync = AwsCliSync::new(
            AwsCliSyncConfig::default()
                .program(program)
                .extra_args(vec!["--quiet".to_string()]),
        );

        sync.push_dir(Path::new("/tmp/run"), "s3://bucket/artifact/run")?;
        let args = fs::read_to_string(dir.path().join("args.txt"))?;
        assert_eq!(args.trim(), "s3 sync /tmp/run s3://bucket/artifact/run --quiet");

        sync.pull_dir("s3://bucket/saved_models", Path::new("/tmp/models"))?;
        let args = fs::read_to_string(dir.path().join("args.txt"))?;
        assert_eq!(args.trim(), "s3 sync s3://bucket/saved_models /tmp/models --quiet");
        Ok(())
    }

    #[test]
    fn failures_are_external_service_errors() -> anyhow::Result<()> {
        init();
        let dir = TempDir::new("aws_cli_sync")?;
        let config = AwsCliSyncConfig::default().program(fake_cli(dir.path(), 1)?);
        let failing = AwsCliSync::new(config);
        assert!(matches!(
            failing.push_dir(Path::new("/tmp/run"), "s3://bucket/run"),
            Err(PipelineError::ExternalService(_))
        ));

        let missing = AwsCliSync::new(
            AwsCliSyncConfig::default().program(dir.path().join("no-such-cli").to_string_lossy()),
        );
        assert!(matches!(
            missing.pull_dir("s3://bucket/run", Path::new("/tmp/run")),
            Err(PipelineError::ExternalService(_))
        ));
        Ok(())
    }
}
