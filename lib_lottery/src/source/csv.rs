//! # CSV Record Source
//!
//! One bet per line: `first,last,document,birthdate,number`. Fields are
//! trimmed and blank lines are ignored. Every other line is handed over as-is,
//! so rows with the wrong number of fields reach the session, which skips,
//! counts and logs them like any other malformed tuple.

use std::path::PathBuf;

use crate::errors::SourceError;
use crate::source::{RawFields, RecordSource};

#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn parse(content: &str) -> Vec<RawFields> {
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.split(',').map(|f| f.trim().to_string()).collect())
            .collect()
    }
}

impl RecordSource for CsvRecordSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn records(&mut self) -> Result<Vec<RawFields>, SourceError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| SourceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&content))
    }
}
