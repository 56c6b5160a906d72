//! Loader error types

use thiserror::Error;

use crate::ingest::mapping::MappingError;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Failures raised by the ingestion components.
///
/// Components return these to the caller; only the pipeline turns them into
/// load-log entries.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Object store or database unreachable
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Expected columns still absent after applying confirmed corrections
    #[error(
        "Schema mismatch in {file}: missing columns [{}]{}",
        .missing.join(", "),
        pending_hint(.pending)
    )]
    SchemaMismatch {
        file: String,
        missing: Vec<String>,
        /// Unconfirmed suggestions as `expected <- actual`
        pending: Vec<String>,
    },

    /// A staging table name does not belong to any known entity
    #[error("Unrecognized entity in staging table name: {table}")]
    UnrecognizedEntity { table: String },

    /// No delimiter candidate could parse the file
    #[error("Could not infer delimiter for {file}: no candidate parsed the file")]
    DelimiterInference { file: String },

    /// The file could not be parsed with its recorded delimiter
    #[error("Failed to parse {file} with delimiter '{delimiter}': {message}")]
    Parse {
        file: String,
        delimiter: char,
        message: String,
    },

    /// The stored matching rule of one file could not be read or parsed
    #[error("Matching rule for {file} is unreadable: {source}")]
    RuleUnreadable { file: String, source: MappingError },

    #[error("Mapping repository error: {0}")]
    Mapping(#[from] MappingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

fn pending_hint(pending: &[String]) -> String {
    if pending.is_empty() {
        String::new()
    } else {
        format!("; awaiting confirmation: {}", pending.join(", "))
    }
}

impl IngestError {
    /// Whether the failure concerns a single source file only.
    ///
    /// File-scoped failures are logged as FAILED and do not stop sibling files.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            IngestError::SchemaMismatch { .. }
                | IngestError::DelimiterInference { .. }
                | IngestError::Parse { .. }
                | IngestError::RuleUnreadable { .. }
        )
    }

    pub fn connectivity(context: &str, err: impl std::fmt::Display) -> Self {
        IngestError::Connectivity(format!("{}: {}", context, err))
    }
}

impl From<etl_common::EtlError> for IngestError {
    fn from(err: etl_common::EtlError) -> Self {
        IngestError::Validation(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message_names_file_and_suggestions() {
        let err = IngestError::SchemaMismatch {
            file: "20210100000001_prices.csv".to_string(),
            missing: vec!["productid".to_string(), "unit".to_string()],
            pending: vec!["productid <- ProductID".to_string()],
        };

        let message = err.to_string();
        assert!(message.contains("20210100000001_prices.csv"));
        assert!(message.contains("[productid, unit]"));
        assert!(message.contains("awaiting confirmation: productid <- ProductID"));
    }

    #[test]
    fn test_file_scoped_classification() {
        assert!(IngestError::DelimiterInference { file: "a.csv".into() }.is_file_scoped());
        assert!(!IngestError::Connectivity("down".into()).is_file_scoped());
        assert!(!IngestError::UnrecognizedEntity { table: "x".into() }.is_file_scoped());
        assert!(IngestError::RuleUnreadable {
            file: "a.csv".into(),
            source: MappingError::InvalidFileName("a.csv".into()),
        }
        .is_file_scoped());
        assert!(!IngestError::Mapping(MappingError::RuleNotFound("a.csv".into())).is_file_scoped());
    }
}
