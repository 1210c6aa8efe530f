use super::{Record, RecordValue, Recorder};
use chrono::Local;
use log::warn;
use std::{fs::File, io::BufWriter, path::PathBuf};

/// Writes records as a YAML sequence.
///
/// The whole sequence is rewritten on every [`Recorder::write`], so the file is
/// always a valid YAML document even when a run aborts half-way.
pub struct YamlRecorder {
    path: PathBuf,
    records: Vec<Record>,
}

impl YamlRecorder {
    /// Construct a [`YamlRecorder`] writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: vec![],
        }
    }

    /// Records written so far.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    fn dump(&self) -> anyhow::Result<()> {
        let file = File::create(&self.path)?;
        serde_yaml::to_writer(BufWriter::new(file), &self.records)?;
        Ok(())
    }
}

impl Recorder for YamlRecorder {
    /// Appends a timestamp to the record and rewrites the file.
    fn write(&mut self, mut record: Record) {
        record.insert("recorded_at", RecordValue::DateTime(Local::now()));
        self.records.push(record);
        if let Err(e) = self.dump() {
            warn!("Failed to write records to {:?}: {}", self.path, e);
        }
    }
}
