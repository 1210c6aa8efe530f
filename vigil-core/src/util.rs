//! File helpers shared by the stages.
use crate::error::{IoResultExt, PipelineError};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter},
    path::{Path, PathBuf},
};

/// Format of run identifiers, sortable as strings.
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Returns the run identifier for the given time.
pub fn timestamp_id(time: DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Creates a directory named after the current time under `root`.
///
/// When the name is taken, `_1`, `_2`, ... are appended until a fresh directory is
/// created. Returns the name and the path of the directory.
pub fn create_timestamped_dir(root: &Path) -> Result<(String, PathBuf)> {
    fs::create_dir_all(root).at_path(root)?;
    let base = timestamp_id(Local::now());
    let mut id = base.clone();
    let mut n = 0;
    loop {
        let path = root.join(&id);
        match fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                id = format!("{}_{}", base, n);
            }
            Err(e) => return Err(PipelineError::storage(&path, e).into()),
        }
    }
}

/// Creates the parent directory of `path` if it does not exist.
pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).at_path(dir)?;
    }
    Ok(())
}

/// Writes `value` as YAML, creating the parent directory.
pub fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).at_path(path)?;
    serde_yaml::to_writer(BufWriter::new(file), value)
        .with_context(|| format!("Failed to serialize YAML into {:?}", path))?;
    Ok(())
}

/// Reads a YAML document.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).at_path(path)?;
    let value = serde_yaml::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse YAML in {:?}", path))?;
    Ok(value)
}

/// Serializes `obj` with bincode, creating the parent directory.
pub fn save_object<T: Serialize>(path: &Path, obj: &T) -> Result<()> {
    ensure_parent(path)?;
    let file = File::create(path).at_path(path)?;
    bincode::serialize_into(BufWriter::new(file), obj)
        .with_context(|| format!("Failed to save object into {:?}", path))?;
    Ok(())
}

/// Deserializes an object written by [`save_object`].
pub fn load_object<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).at_path(path)?;
    let obj = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("Failed to load object from {:?}", path))?;
    Ok(obj)
}
