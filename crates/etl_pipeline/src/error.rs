use polars::error::PolarsError;
use serde::{Deserialize, Serialize};
use shared::SharedError;
use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum EtlError {
    /// A required column is absent or could not be coerced to its declared type
    #[error("Schema error in table '{table}', column '{column}': {reason}")]
    Schema {
        table: String,
        column: String,
        reason: String,
    },
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON (de)serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Snapshot error: {0}")]
    Snapshot(String),
    #[error("Reference data error: {0}")]
    Shared(#[from] SharedError),
}

impl EtlError {
    pub fn schema<T: Into<String>, C: Into<String>, R: Into<String>>(table: T, column: C, reason: R) -> Self {
        Self::Schema {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_column<T: Into<String>, C: Into<String>>(table: T, column: C) -> Self {
        Self::schema(table, column, "required column is missing")
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn snapshot<S: Into<String>>(msg: S) -> Self {
        Self::Snapshot(msg.into())
    }
}

/// Type alias for Results using EtlError
pub type EtlResult<T> = Result<T, EtlError>;

/// Data-quality findings that never abort the run.
///
/// They are logged when raised and kept in the pipeline state so that
/// consumers can inspect them after a snapshot reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A reconciliation lookup found several candidates for one key; the first was kept
    JoinAmbiguity {
        step: String,
        key: i64,
        candidates: usize,
    },
    /// Rows sharing a `(state_code, municipality_code, date)` key; the first was kept
    DuplicateKeys { dropped: usize },
    /// Rows whose backfill key had no match in the reference table
    UnmatchedKeys { step: String, rows: usize },
    /// Both population normalizations were requested and both factors were applied
    DoubleNormalization,
}

impl Diagnostic {
    /// Log the diagnostic at `warn` and hand it back for collection.
    pub fn emit(self) -> Self {
        match &self {
            Diagnostic::JoinAmbiguity { step, key, candidates } => {
                log::warn!("{step}: {candidates} candidate matches for key {key}, keeping the first");
            }
            Diagnostic::DuplicateKeys { dropped } => {
                log::warn!("Dropped {dropped} rows with a duplicated (state, municipality, date) key");
            }
            Diagnostic::UnmatchedKeys { step, rows } => {
                log::debug!("{step}: {rows} rows without a matching reference key");
            }
            Diagnostic::DoubleNormalization => {
                log::warn!(
                    "percapita and population_density both requested: both factors multiply, only the per-capita wording is shown"
                );
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_table_and_column() {
        let err = EtlError::missing_column("bulletin", "date");
        let message = err.to_string();
        assert!(message.contains("bulletin"));
        assert!(message.contains("date"));
        assert!(matches!(err, EtlError::Schema { ref column, .. } if column == "date"));
    }

    #[test]
    fn test_error_conversions() {
        let polars_err = PolarsError::NoData("test".into());
        let err: EtlError = polars_err.into();
        assert!(matches!(err, EtlError::Polars(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EtlError = io_err.into();
        assert!(matches!(err, EtlError::Io(_)));
    }

    #[test]
    fn test_diagnostic_emit_returns_itself() {
        let diagnostic = Diagnostic::DuplicateKeys { dropped: 2 }.emit();
        assert_eq!(diagnostic, Diagnostic::DuplicateKeys { dropped: 2 });
    }
}
