//! Single bet read from named external parameters.

use std::fmt;

use crate::errors::SourceError;
use crate::source::{RawFields, RecordSource};

/// Variable names, in tuple order.
pub const BET_ENV_VARS: [&str; 5] = ["NOMBRE", "APELLIDO", "DOCUMENTO", "NACIMIENTO", "NUMERO"];

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// # EnvRecordSource
///
/// Yields exactly one tuple built from `NOMBRE`, `APELLIDO`, `DOCUMENTO`,
/// `NACIMIENTO` and `NUMERO`. A missing variable makes the source unavailable.
pub struct EnvRecordSource {
    lookup: Lookup,
}

impl EnvRecordSource {
    /// Reads the process environment.
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Reads through `lookup` instead of the process environment.
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }
}

impl Default for EnvRecordSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvRecordSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvRecordSource").finish_non_exhaustive()
    }
}

impl RecordSource for EnvRecordSource {
    fn describe(&self) -> String {
        "env".to_string()
    }

    fn records(&mut self) -> Result<Vec<RawFields>, SourceError> {
        let mut row = Vec::with_capacity(BET_ENV_VARS.len());
        for name in BET_ENV_VARS {
            let value = (self.lookup)(name).ok_or_else(|| SourceError::MissingEnvVar(name.to_string()))?;
            row.push(value);
        }
        Ok(vec![row])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> EnvRecordSource {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvRecordSource::with_lookup(move |name| map.get(name).cloned())
    }

    #[test]
    fn test_reads_all_five_variables_in_order() {
        let mut src = source(&[
            ("NOMBRE", "Santiago Lionel"),
            ("APELLIDO", "Lorca"),
            ("DOCUMENTO", "30904465"),
            ("NACIMIENTO", "1999-03-17"),
            ("NUMERO", "7574"),
        ]);
        let rows = src.records().unwrap();
        assert_eq!(
            rows,
            vec![vec![
                "Santiago Lionel".to_string(),
                "Lorca".to_string(),
                "30904465".to_string(),
                "1999-03-17".to_string(),
                "7574".to_string()
            ]]
        );
    }

    #[test]
    fn test_missing_variable_is_reported_by_name() {
        let mut src = source(&[("NOMBRE", "Ana"), ("APELLIDO", "Diaz")]);
        match src.records() {
            Err(SourceError::MissingEnvVar(name)) => assert_eq!(name, "DOCUMENTO"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
