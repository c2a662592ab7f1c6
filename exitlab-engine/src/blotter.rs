//! Closed-trade blotter — append-only JSONL, one record per line.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use exitlab_core::domain::ClosedTrade;

#[derive(Debug, Error)]
pub enum BlotterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Append-only closed-trade log.
pub struct Blotter {
    path: PathBuf,
}

impl Blotter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a JSON line, creating the file if needed.
    pub fn append(&self, record: &ClosedTrade) -> Result<(), BlotterError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let line = serde_json::to_string(record).expect("closed trade serialization failed");
        writeln!(file, "{line}")?;
        Ok(())
    }

    pub fn append_all<'a>(&self, records: impl IntoIterator<Item = &'a ClosedTrade>) -> Result<(), BlotterError> {
        for record in records {
            self.append(record)?;
        }
        Ok(())
    }

    /// Read every record back, in file order.
    pub fn read_all(&self) -> Result<Vec<ClosedTrade>, BlotterError> {
        let file = std::fs::File::open(&self.path)?;
        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line)
                .map_err(|source| BlotterError::MalformedRecord { line: i + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }
}
