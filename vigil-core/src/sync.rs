//! Synchronisation of directory trees with a remote store.
use crate::{
    error::{IoResultExt, PipelineError},
    remote,
};
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Mirrors local directories to and from remote URIs.
pub trait RemoteSync {
    /// Uploads the contents of `local` to `remote_uri`.
    fn push_dir(&self, local: &Path, remote_uri: &str) -> Result<(), PipelineError>;

    /// Downloads the contents of `remote_uri` into `local`.
    fn pull_dir(&self, remote_uri: &str, local: &Path) -> Result<(), PipelineError>;

    /// `false` if nothing is ever transferred.
    fn is_enabled(&self) -> bool {
        true
    }
}

impl<T: RemoteSync + ?Sized> RemoteSync for Box<T> {
    fn push_dir(&self, local: &Path, remote_uri: &str) -> Result<(), PipelineError> {
        (**self).push_dir(local, remote_uri)
    }

    fn pull_dir(&self, remote_uri: &str, local: &Path) -> Result<(), PipelineError> {
        (**self).pull_dir(remote_uri, local)
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

/// Does nothing; used when remote sync is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSync;

impl RemoteSync for NullSync {
    fn push_dir(&self, local: &Path, remote_uri: &str) -> Result<(), PipelineError> {
        debug!("Remote sync disabled, not pushing {:?} to {}", local, remote_uri);
        Ok(())
    }

    fn pull_dir(&self, remote_uri: &str, local: &Path) -> Result<(), PipelineError> {
        debug!("Remote sync disabled, not pulling {} into {:?}", remote_uri, local);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Mirrors remote URIs into a local directory: `s3://bucket/key` maps to
/// `<root>/bucket/key`.
#[derive(Debug, Clone)]
pub struct LocalMirrorSync {
    root: PathBuf,
}

impl LocalMirrorSync {
    /// Constructs a mirror rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Local path standing in for `remote_uri`.
    pub fn resolve(&self, remote_uri: &str) -> Result<PathBuf, PipelineError> {
        let (bucket, key) = remote::split_uri(remote_uri)?;
        Ok(self.root.join(bucket).join(key))
    }
}

impl RemoteSync for LocalMirrorSync {
    fn push_dir(&self, local: &Path, remote_uri: &str) -> Result<(), PipelineError> {
        let dst = self.resolve(remote_uri)?;
        info!("Mirroring {:?} to {:?}", local, dst);
        copy_dir_all(local, &dst)
    }

    fn pull_dir(&self, remote_uri: &str, local: &Path) -> Result<(), PipelineError> {
        let src = self.resolve(remote_uri)?;
        if !src.exists() {
            // `aws s3 sync` treats a missing prefix as empty.
            debug!("Nothing to pull at {:?}", src);
            return Ok(());
        }
        info!("Mirroring {:?} to {:?}", src, local);
        copy_dir_all(&src, local)
    }
}

/// Recursively copies `src` into `dst`, overwriting existing files.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(dst).at_path(dst)?;
    for entry in fs::read_dir(src).at_path(src)? {
        let entry = entry.at_path(src)?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir_all(&from, &to)?;
        } else {
            fs::copy(&from, &to).at_path(&to)?;
        }
    }
    Ok(())
}
