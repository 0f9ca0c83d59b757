//! # Record Sources
//!
//! Where the bets come from. A source hands the session a finite sequence of
//! raw field tuples (`first, last, document, birthdate, number`); the session
//! attaches the agency and drops tuples of the wrong arity.
//!
//! Every source is restartable: each `records()` call starts again from the
//! beginning of its backing store.

pub mod csv;
pub mod env;

pub use csv::CsvRecordSource;
pub use env::EnvRecordSource;

use crate::errors::SourceError;

/// One raw tuple as produced by a source, before arity is checked.
pub type RawFields = Vec<String>;

pub trait RecordSource: Send {
    /// Short label used in logs (`memory`, `env`, the CSV path).
    fn describe(&self) -> String;

    /// Produces the whole sequence from the beginning.
    fn records(&mut self) -> Result<Vec<RawFields>, SourceError>;
}

impl<T: RecordSource + ?Sized> RecordSource for Box<T> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn records(&mut self) -> Result<Vec<RawFields>, SourceError> {
        (**self).records()
    }
}

/// # MemoryRecordSource
///
/// An in-process vector of tuples, used by tests and by callers that already
/// hold their bets.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSource {
    rows: Vec<RawFields>,
}

impl MemoryRecordSource {
    pub fn new(rows: Vec<RawFields>) -> Self {
        Self { rows }
    }

    /// Convenience constructor from string slices.
    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(|f| f.to_string()).collect())
                .collect(),
        }
    }
}

impl RecordSource for MemoryRecordSource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn records(&mut self) -> Result<Vec<RawFields>, SourceError> {
        Ok(self.rows.clone())
    }
}
