//! Source object discovery
//!
//! Export objects are named `{YYYYMM}{8 digits}_{entity}.csv`. Listing keeps the
//! keys whose month token falls inside an inclusive month range. Because the token
//! is fixed-width and zero-padded, plain string comparison orders months correctly.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, instrument};

use crate::error::{IngestError, IngestResult};

/// Minimal object-store surface the loader needs
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// Connectivity probe; fails with [`IngestError::Connectivity`] when unreachable
    async fn probe(&self, bucket: &str) -> IngestResult<()>;

    /// Every object key in the bucket
    async fn list_keys(&self, bucket: &str) -> IngestResult<Vec<String>>;

    /// Copy one object to a local path
    async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> IngestResult<()>;
}

/// A listed export object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceObject {
    pub key: String,
    pub entity: String,
    /// `YYYYMM`
    pub month: String,
    /// The 8 digits following the month token
    pub suffix: String,
}

impl SourceObject {
    /// File name of the object (last path segment of the key)
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

/// Inclusive `[start, end]` range of `YYYYMM` tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthRange {
    pub start: String,
    pub end: String,
}

impl MonthRange {
    /// Validate both bounds; a missing start defaults to the end month.
    pub fn new(start: Option<&str>, end: &str) -> IngestResult<Self> {
        let end = validate_month(end)?;
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(start) => validate_month(start)?,
            None => end.clone(),
        };

        if start > end {
            return Err(IngestError::Validation(format!(
                "Start month {} is after end month {}",
                start, end
            )));
        }

        Ok(Self { start, end })
    }

    pub fn contains(&self, month: &str) -> bool {
        self.start.as_str() <= month && month <= self.end.as_str()
    }
}

fn validate_month(token: &str) -> IngestResult<String> {
    let token = token.trim();
    let valid = token.len() == 6
        && token.bytes().all(|b| b.is_ascii_digit())
        && matches!(token[4..].parse::<u8>(), Ok(1..=12));

    if valid {
        Ok(token.to_string())
    } else {
        Err(IngestError::Validation(format!(
            "Invalid month '{}': expected YYYYMM",
            token
        )))
    }
}

/// Key pattern for one entity tag
fn entity_pattern(entity: &str) -> IngestResult<Regex> {
    Regex::new(&format!(r"^(\d{{6}})(\d{{8}})_{}\.csv$", regex::escape(entity)))
        .map_err(|e| IngestError::Validation(format!("Invalid entity '{}': {}", entity, e)))
}

/// Select keys matching any entity in the comma-separated list within `range`.
///
/// Result is ordered by key and contains each key once.
pub fn filter_keys<S: AsRef<str>>(
    keys: &[S],
    entities: &str,
    range: &MonthRange,
) -> IngestResult<Vec<SourceObject>> {
    let patterns = entities
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| Ok((e.to_string(), entity_pattern(e)?)))
        .collect::<IngestResult<Vec<_>>>()?;

    let mut selected = BTreeMap::new();
    for key in keys.iter().map(AsRef::as_ref) {
        for (entity, pattern) in &patterns {
            let Some(caps) = pattern.captures(key) else {
                continue;
            };

            let month = &caps[1];
            if range.contains(month) {
                debug!(key, entity = %entity, "Object matches");
                selected.insert(
                    key.to_string(),
                    SourceObject {
                        key: key.to_string(),
                        entity: entity.clone(),
                        month: month.to_string(),
                        suffix: caps[2].to_string(),
                    },
                );
            } else {
                debug!(key, month, "Skipping object outside month range");
            }
        }
    }

    Ok(selected.into_values().collect())
}

/// Lists export objects for entities and a month range
pub struct ObjectLister<'a> {
    source: &'a dyn ObjectSource,
}

impl<'a> ObjectLister<'a> {
    pub fn new(source: &'a dyn ObjectSource) -> Self {
        Self { source }
    }

    /// Probe the bucket, then list and filter its keys.
    ///
    /// An unreachable bucket aborts with no partial result.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        bucket: &str,
        entities: &str,
        range: &MonthRange,
    ) -> IngestResult<Vec<SourceObject>> {
        self.source.probe(bucket).await?;

        let keys = self.source.list_keys(bucket).await?;
        let objects = filter_keys(keys.as_slice(), entities, range)?;

        info!(
            bucket,
            scanned = keys.len(),
            matched = objects.len(),
            "Listed source objects for {}..{}",
            range.start,
            range.end
        );

        Ok(objects)
    }
}
