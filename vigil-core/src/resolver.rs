//! Discovery and promotion of persisted model versions.
//!
//! The model store is a directory with one entry per version:
//!
//! ```text
//! <store>/
//!   manifest.yaml
//!   1/model.bin
//!   2/model.bin
//!   3.bin
//! ```
//!
//! An entry is either a directory named after the version holding `model.bin`, or a
//! file `<version>.bin`. Entries whose name is not a non-negative integer are
//! ignored. The latest model is the one with the largest version present on disk.
//! `manifest.yaml` keeps a monotonic counter, so a version number removed from the
//! store is never handed out again.
use crate::{
    error::{IoResultExt, PipelineError},
    util,
};
use anyhow::Result;
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    io,
    path::{Path, PathBuf},
};

/// File name of a model inside a version directory.
pub const MODEL_FILE_NAME: &str = "model.bin";

/// File name of the model store manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.yaml";

/// A persisted model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Version number.
    pub version: u64,

    /// Path of the model file.
    pub path: PathBuf,
}

/// A promotion recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Assigned version.
    pub version: u64,

    /// Time of the promotion.
    pub created_at: DateTime<Local>,

    /// Run that produced the model.
    pub run_id: String,

    /// F1 score on the held-out split of that run.
    pub test_f1: f64,
}

/// Contents of `manifest.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Largest version ever assigned.
    pub last_version: u64,

    /// Promotions, oldest first.
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

/// Resolves model versions in a model store.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    root: PathBuf,
}

impl ModelResolver {
    /// Constructs a resolver of the model store at `root`. The directory need not exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the model store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if the store holds at least one model.
    ///
    /// An unreadable store is reported as having no model.
    pub fn is_model_available(&self) -> bool {
        match self.latest_version() {
            Ok(v) => v.is_some(),
            Err(e) => {
                warn!("Failed to scan the model store {:?}: {}", self.root, e);
                false
            }
        }
    }

    /// Versions present in the store, ascending.
    pub fn versions(&self) -> Result<Vec<ModelVersion>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(PipelineError::storage(&self.root, e).into()),
        };

        // version -> (entry name, model path)
        let mut found: BTreeMap<u64, (String, PathBuf)> = BTreeMap::new();
        for entry in entries {
            let entry = entry.at_path(&self.root)?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let (version, model_path) = match parse_entry(&path, &name) {
                Some(v) => v,
                None => {
                    debug!("Ignored {:?} in the model store", path);
                    continue;
                }
            };
            match found.get(&version) {
                Some((other, _)) if *other > name => {
                    warn!(
                        "Model store entries {:?} and {:?} share version {}; using {:?}",
                        other, name, version, other
                    );
                }
                Some((other, _)) => {
                    warn!(
                        "Model store entries {:?} and {:?} share version {}; using {:?}",
                        other, name, version, name
                    );
                    found.insert(version, (name, model_path));
                }
                None => {
                    found.insert(version, (name, model_path));
                }
            }
        }

        Ok(found
            .into_iter()
            .map(|(version, (_, path))| ModelVersion { version, path })
            .collect())
    }

    /// The model with the largest version, or `None` for a missing or empty store.
    pub fn latest_version(&self) -> Result<Option<ModelVersion>> {
        Ok(self.versions()?.pop())
    }

    /// Path of the model file of the latest version.
    pub fn latest_model_path(&self) -> Result<PathBuf> {
        self.latest_version()?
            .map(|v| v.path)
            .ok_or_else(|| PipelineError::ModelNotAvailable.into())
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    /// Reads the manifest; a missing manifest is empty.
    pub fn manifest(&self) -> Result<ModelManifest> {
        let path = self.manifest_path();
        if path.exists() {
            util::read_yaml(&path)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// The version to assign to the next promoted model.
    pub fn next_version(&self) -> Result<u64> {
        let last = self.manifest()?.last_version;
        let present = self.latest_version()?.map(|v| v.version).unwrap_or(0);
        Ok(last.max(present) + 1)
    }

    /// Copies an accepted model into `<store>/<version>/model.bin` and records the
    /// promotion in the manifest.
    pub fn promote(
        &self,
        model_file: impl AsRef<Path>,
        entry: ManifestEntry,
    ) -> Result<ModelVersion> {
        let model_file = model_file.as_ref();
        let dir = self.root.join(entry.version.to_string());
        if dir.exists() {
            return Err(PipelineError::Configuration(format!(
                "model version {} already exists in {:?}",
                entry.version, self.root
            ))
            .into());
        }
        fs::create_dir_all(&dir).at_path(&dir)?;
        let path = dir.join(MODEL_FILE_NAME);
        fs::copy(model_file, &path).at_path(&path)?;

        let mut manifest = self.manifest()?;
        manifest.last_version = manifest.last_version.max(entry.version);
        let version = entry.version;
        manifest.entries.push(entry);
        util::write_yaml(&self.manifest_path(), &manifest)?;
        info!("Promoted {:?} as version {}", model_file, version);

        Ok(ModelVersion { version, path })
    }
}

fn parse_entry(path: &Path, name: &str) -> Option<(u64, PathBuf)> {
    if path.is_dir() {
        let version = name.parse::<u64>().ok()?;
        let model = path.join(MODEL_FILE_NAME);
        model.is_file().then_some((version, model))
    } else {
        let stem = name.strip_suffix(".bin")?;
        let version = stem.parse::<u64>().ok()?;
        Some((version, path.to_path_buf()))
    }
}
