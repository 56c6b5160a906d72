//! Schema reconciliation
//!
//! Turns a downloaded export into the entity's canonical column layout. The first time a
//! file name is seen the delimiter is inferred; if expected columns are missing, a matching
//! rule with suggestions is stored and the file fails until an operator confirms the
//! corrections. Later attempts reuse the stored delimiter and apply confirmed corrections.

use etl_common::Entity;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::mapping::{ColumnCorrection, MappingError, MappingRepository, MatchingRule};
use super::records::RecordSet;
use super::similarity::{LevenshteinMatcher, NameMatcher};
use crate::error::{IngestError, IngestResult};

/// Delimiters tried in order. On equal fit the earlier one wins.
pub const DELIMITER_CANDIDATES: [char; 2] = [';', ','];

/// Value written into columns passed as null
pub const NULL_SENTINEL: &str = "no_data";

pub struct SchemaReconciler {
    repository: Arc<dyn MappingRepository>,
    matcher: Box<dyn NameMatcher>,
}

impl SchemaReconciler {
    pub fn new(repository: Arc<dyn MappingRepository>) -> Self {
        Self {
            repository,
            matcher: Box::new(LevenshteinMatcher::default()),
        }
    }

    pub fn with_matcher(mut self, matcher: impl NameMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Read `path` and return exactly the expected columns of `entity`, in canonical order.
    ///
    /// Rules are keyed by the file name of `path`.
    #[instrument(skip(self, path, entity), fields(file = %path.display(), entity = %entity))]
    pub async fn reconcile(&self, path: &Path, entity: Entity) -> IngestResult<RecordSet> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                IngestError::Validation(format!("Invalid source path {}", path.display()))
            })?
            .to_string();

        let content = tokio::fs::read(path).await?;

        // A broken rule document only affects its own file; a database outage does not
        let stored = self
            .repository
            .get(&file_name)
            .await
            .map_err(|e| match e {
                MappingError::Database(_) => IngestError::Mapping(e),
                source => IngestError::RuleUnreadable {
                    file: file_name.clone(),
                    source,
                },
            })?;

        if let Some(rule) = stored {
            debug!(delimiter = %rule.delimiter, "Applying stored matching rule");
            let records =
                RecordSet::from_csv_reader(content.as_slice(), rule.delimiter).map_err(|e| {
                    IngestError::Parse {
                        file: file_name.clone(),
                        delimiter: rule.delimiter,
                        message: e.to_string(),
                    }
                })?;
            return apply_rule(records, &rule, entity, &file_name);
        }

        let (delimiter, records, missing) = infer_delimiter(&content, entity, &file_name)?;
        if missing.is_empty() {
            info!(%delimiter, rows = records.row_count(), "Schema matches");
            return canonical(records, entity, &file_name, Vec::new());
        }

        let mut rule = MatchingRule::new(delimiter);
        for column in &missing {
            let suggestion = self.matcher.closest(column, records.columns());
            rule.corrections
                .insert(column.clone(), ColumnCorrection::proposed(suggestion));
        }
        self.repository.put(&file_name, &rule).await?;

        warn!(
            missing = ?missing,
            "Columns missing; matching rule proposed and awaiting confirmation"
        );

        Err(IngestError::SchemaMismatch {
            file: file_name,
            missing,
            pending: rule.pending(),
        })
    }
}

/// Parse with each candidate and keep the one leaving the fewest expected columns missing.
fn infer_delimiter(
    content: &[u8],
    entity: Entity,
    file_name: &str,
) -> IngestResult<(char, RecordSet, Vec<String>)> {
    let mut best: Option<(char, RecordSet, Vec<String>)> = None;

    for delimiter in DELIMITER_CANDIDATES {
        let records = match RecordSet::from_csv_reader(content, delimiter) {
            Ok(records) => records,
            Err(e) => {
                debug!(%delimiter, error = %e, "Delimiter candidate rejected");
                continue;
            }
        };

        let missing = records.missing_columns(entity.column_names());
        debug!(%delimiter, missing = missing.len(), "Delimiter candidate parsed");

        let better = best
            .as_ref()
            .map_or(true, |(_, _, best_missing)| missing.len() < best_missing.len());
        if better {
            best = Some((delimiter, records, missing));
        }
    }

    best.ok_or_else(|| IngestError::DelimiterInference {
        file: file_name.to_string(),
    })
}

/// Apply confirmed renames and null fills from `rule`, then project to the canonical layout.
///
/// A correction is skipped when its expected column is already present. A confirmed
/// suggestion only renames when the suggested column exists; otherwise `fill_as_null`
/// adds the column filled with [`NULL_SENTINEL`].
pub fn apply_rule(
    mut records: RecordSet,
    rule: &MatchingRule,
    entity: Entity,
    file_name: &str,
) -> IngestResult<RecordSet> {
    let mut renames = HashMap::new();
    let mut null_columns = Vec::new();

    for (expected, correction) in &rule.corrections {
        if records.has_column(expected) {
            continue;
        }

        match &correction.suggested {
            Some(actual) if correction.confirmed && records.has_column(actual) => {
                renames.insert(actual.clone(), expected.clone());
            }
            _ if correction.fill_as_null => null_columns.push(expected.clone()),
            _ => {}
        }
    }

    if !renames.is_empty() {
        debug!(renames = ?renames, "Renaming confirmed columns");
        records.rename_columns(&renames);
    }
    for column in &null_columns {
        records.push_constant_column(column, NULL_SENTINEL);
    }

    canonical(records, entity, file_name, rule.pending())
}

fn canonical(
    records: RecordSet,
    entity: Entity,
    file_name: &str,
    pending: Vec<String>,
) -> IngestResult<RecordSet> {
    let expected: Vec<&str> = entity.column_names().collect();

    records
        .project(&expected)
        .ok_or_else(|| IngestError::SchemaMismatch {
            file: file_name.to_string(),
            missing: records.missing_columns(expected.iter().copied()),
            pending,
        })
}
