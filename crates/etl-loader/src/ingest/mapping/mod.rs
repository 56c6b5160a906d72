//! Per-file matching rules and their repositories
//!
//! A matching rule records the delimiter chosen for a source file name and, for every
//! expected column that was absent, the suggested actual column plus two operator flags:
//! `user_submitted` (the suggestion is confirmed) and `pass_as_null` (load the column as
//! the `no_data` sentinel). Stored form:
//!
//! ```json
//! {
//!   "__delimiter__": ";",
//!   "productid": { "suggested": "ProductID", "user_submitted": 0, "pass_as_null": 0 }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

pub mod file;
pub mod memory;
pub mod postgres;

pub use file::FileMappingRepository;
pub use memory::InMemoryMappingRepository;
pub use postgres::PostgresMappingRepository;

pub type MappingResult<T> = std::result::Result<T, MappingError>;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("No matching rule stored for {0}")]
    RuleNotFound(String),

    #[error("Rule for {file} has no entry for column '{column}'")]
    UnknownColumn { file: String, column: String },

    #[error("Column '{column}' in {file} has no suggestion to confirm; pass an actual column name")]
    NoSuggestion { file: String, column: String },

    #[error("Invalid source file name '{0}'")]
    InvalidFileName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Correction entry for one expected column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCorrection {
    /// Actual column proposed to stand in for the expected one
    #[serde(default)]
    pub suggested: Option<String>,

    #[serde(rename = "user_submitted", default, with = "flag")]
    pub confirmed: bool,

    #[serde(rename = "pass_as_null", default, with = "flag")]
    pub fill_as_null: bool,
}

impl ColumnCorrection {
    pub fn proposed(suggested: Option<String>) -> Self {
        Self {
            suggested,
            confirmed: false,
            fill_as_null: false,
        }
    }
}

/// Prefix of keys that carry rule metadata rather than a column correction
const METADATA_PREFIX: &str = "__";

/// Delimiter and column corrections for one source file name
///
/// Keys starting with `__` other than `__delimiter__` are metadata and are dropped on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRule")]
pub struct MatchingRule {
    #[serde(rename = "__delimiter__")]
    pub delimiter: char,

    /// Expected column name -> correction
    #[serde(flatten)]
    pub corrections: BTreeMap<String, ColumnCorrection>,
}

/// Rule document as stored, before metadata keys are filtered out
#[derive(Deserialize)]
struct StoredRule {
    #[serde(rename = "__delimiter__")]
    delimiter: char,

    #[serde(flatten)]
    entries: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<StoredRule> for MatchingRule {
    type Error = serde_json::Error;

    fn try_from(stored: StoredRule) -> Result<Self, Self::Error> {
        let corrections = stored
            .entries
            .into_iter()
            .filter(|(key, _)| !key.starts_with(METADATA_PREFIX))
            .map(|(column, value)| Ok((column, serde_json::from_value(value)?)))
            .collect::<Result<_, serde_json::Error>>()?;

        Ok(Self {
            delimiter: stored.delimiter,
            corrections,
        })
    }
}

impl MatchingRule {
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            corrections: BTreeMap::new(),
        }
    }

    /// Unconfirmed suggestions formatted as `expected <- actual`
    pub fn pending(&self) -> Vec<String> {
        self.corrections
            .iter()
            .filter(|(_, c)| !c.confirmed && !c.fill_as_null)
            .filter_map(|(expected, c)| {
                c.suggested
                    .as_ref()
                    .map(|actual| format!("{} <- {}", expected, actual))
            })
            .collect()
    }
}

/// Durable store of matching rules keyed by source file name
#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn get(&self, file_name: &str) -> MappingResult<Option<MatchingRule>>;

    /// Insert or replace the rule for a file name
    async fn put(&self, file_name: &str, rule: &MatchingRule) -> MappingResult<()>;

    /// File names that have a stored rule, sorted
    async fn list(&self) -> MappingResult<Vec<String>>;
}

async fn update_column<F>(
    repository: &dyn MappingRepository,
    file_name: &str,
    column: &str,
    update: F,
) -> MappingResult<MatchingRule>
where
    F: FnOnce(&mut ColumnCorrection) -> MappingResult<()> + Send,
{
    let mut rule = repository
        .get(file_name)
        .await?
        .ok_or_else(|| MappingError::RuleNotFound(file_name.to_string()))?;

    let correction =
        rule.corrections
            .get_mut(column)
            .ok_or_else(|| MappingError::UnknownColumn {
                file: file_name.to_string(),
                column: column.to_string(),
            })?;
    update(correction)?;

    repository.put(file_name, &rule).await?;
    Ok(rule)
}

/// Confirm the suggestion for `column`, optionally replacing it with `actual`.
///
/// The next reconciliation of this file renames the actual column to the expected one.
pub async fn confirm_column(
    repository: &dyn MappingRepository,
    file_name: &str,
    column: &str,
    actual: Option<&str>,
) -> MappingResult<MatchingRule> {
    let rule = update_column(repository, file_name, column, |correction| {
        if let Some(actual) = actual {
            correction.suggested = Some(actual.to_string());
        }
        if correction.suggested.is_none() {
            return Err(MappingError::NoSuggestion {
                file: file_name.to_string(),
                column: column.to_string(),
            });
        }
        correction.confirmed = true;
        Ok(())
    })
    .await?;

    info!(file = file_name, column, "Column correction confirmed");
    Ok(rule)
}

/// Mark `column` to be loaded as the `no_data` sentinel when it stays absent.
pub async fn pass_column_as_null(
    repository: &dyn MappingRepository,
    file_name: &str,
    column: &str,
) -> MappingResult<MatchingRule> {
    let rule = update_column(repository, file_name, column, |correction| {
        correction.fill_as_null = true;
        Ok(())
    })
    .await?;

    info!(file = file_name, column, "Column passed as null");
    Ok(rule)
}

/// Flags are stored as `0`/`1`; booleans are accepted on read.
mod flag {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl<'de> Visitor<'de> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("0, 1 or a boolean")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                _ => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn proposed_rule() -> MatchingRule {
        let mut rule = MatchingRule::new(';');
        rule.corrections.insert(
            "productid".to_string(),
            ColumnCorrection::proposed(Some("ProductID".to_string())),
        );
        rule.corrections
            .insert("unit".to_string(), ColumnCorrection::proposed(None));
        rule
    }

    #[test]
    fn test_rule_json_shape() {
        let json = serde_json::to_value(proposed_rule()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "__delimiter__": ";",
                "productid": {"suggested": "ProductID", "user_submitted": 0, "pass_as_null": 0},
                "unit": {"suggested": null, "user_submitted": 0, "pass_as_null": 0}
            })
        );
    }

    #[test]
    fn test_rule_reads_flags_and_missing_fields() {
        let rule: MatchingRule = serde_json::from_str(
            r#"{"__delimiter__": ",", "price": {"suggested": "Price", "user_submitted": 1},
                "unit": {"pass_as_null": true}}"#,
        )
        .unwrap();

        assert_eq!(rule.delimiter, ',');
        assert!(rule.corrections["price"].confirmed);
        assert!(!rule.corrections["price"].fill_as_null);
        assert!(rule.corrections["unit"].fill_as_null);
        assert_eq!(rule.corrections["unit"].suggested, None);
    }

    #[test]
    fn test_rule_skips_metadata_keys() {
        let rule: MatchingRule = serde_json::from_str(
            r#"{"__delimiter__": ";", "__note__": "checked by ops", "__version__": 2,
                "productid": {"suggested": "ProductID", "user_submitted": 1, "pass_as_null": 0}}"#,
        )
        .unwrap();

        assert_eq!(rule.delimiter, ';');
        assert_eq!(rule.corrections.len(), 1);
        assert!(rule.corrections["productid"].confirmed);
    }

    #[test]
    fn test_rule_rejects_malformed_correction() {
        let result = serde_json::from_str::<MatchingRule>(
            r#"{"__delimiter__": ";", "productid": "ProductID"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_pending_lists_unconfirmed_suggestions() {
        assert_eq!(proposed_rule().pending(), vec!["productid <- ProductID"]);
    }

    #[tokio::test]
    async fn test_confirm_and_pass_as_null() {
        let repo = InMemoryMappingRepository::new();
        repo.put("f.csv", &proposed_rule()).await.unwrap();

        let rule = confirm_column(&repo, "f.csv", "productid", None).await.unwrap();
        assert!(rule.corrections["productid"].confirmed);

        let err = confirm_column(&repo, "f.csv", "unit", None).await.unwrap_err();
        assert!(matches!(err, MappingError::NoSuggestion { .. }));

        let rule = confirm_column(&repo, "f.csv", "unit", Some("Einheit"))
            .await
            .unwrap();
        assert_eq!(rule.corrections["unit"].suggested.as_deref(), Some("Einheit"));

        let rule = pass_column_as_null(&repo, "f.csv", "unit").await.unwrap();
        assert!(rule.corrections["unit"].fill_as_null);

        let stored = repo.get("f.csv").await.unwrap().unwrap();
        assert_eq!(stored, rule);
    }

    #[tokio::test]
    async fn test_confirm_requires_rule_and_column() {
        let repo = InMemoryMappingRepository::new();
        assert!(matches!(
            confirm_column(&repo, "none.csv", "id", None).await,
            Err(MappingError::RuleNotFound(_))
        ));

        repo.put("f.csv", &proposed_rule()).await.unwrap();
        assert!(matches!(
            pass_column_as_null(&repo, "f.csv", "id").await,
            Err(MappingError::UnknownColumn { .. })
        ));
    }
}
