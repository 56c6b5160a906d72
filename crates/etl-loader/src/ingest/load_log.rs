//! Append-only load log

use etl_common::LoadStatus;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool, Row};
use std::fmt::Display;
use tracing::debug;

use crate::error::IngestResult;

/// File column value for batch step events
pub const STEP_EVENT_FILE: &str = "N/A";

/// One load outcome. Step events use the step name as `entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadLogEntry {
    pub load_id: String,
    pub entity: String,
    pub file: String,
    pub status: LoadStatus,
    pub rows_loaded: i64,
    pub error: Option<String>,
}

impl LoadLogEntry {
    pub fn success(load_id: &str, entity: &str, file: &str, rows_loaded: usize) -> Self {
        Self {
            load_id: load_id.to_string(),
            entity: entity.to_string(),
            file: file.to_string(),
            status: LoadStatus::Success,
            rows_loaded: i64::try_from(rows_loaded).unwrap_or(i64::MAX),
            error: None,
        }
    }

    pub fn failed(load_id: &str, entity: &str, file: &str, error: impl Display) -> Self {
        Self {
            load_id: load_id.to_string(),
            entity: entity.to_string(),
            file: file.to_string(),
            status: LoadStatus::Failed,
            rows_loaded: 0,
            error: Some(error.to_string()),
        }
    }

    /// Batch step event (connectivity check, ingestion, consolidation)
    pub fn step(load_id: &str, step: &str, error: Option<String>) -> Self {
        Self {
            load_id: load_id.to_string(),
            entity: step.to_string(),
            file: STEP_EVENT_FILE.to_string(),
            status: if error.is_some() {
                LoadStatus::Failed
            } else {
                LoadStatus::Success
            },
            rows_loaded: 0,
            error,
        }
    }
}

pub async fn ensure_table(conn: &mut PgConnection) -> IngestResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS load_log (
            id BIGSERIAL PRIMARY KEY,
            load_id TEXT NOT NULL,
            entity TEXT NOT NULL,
            file TEXT NOT NULL,
            status TEXT NOT NULL,
            rows_loaded BIGINT NOT NULL DEFAULT 0,
            error TEXT,
            logged_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn append(conn: &mut PgConnection, entry: &LoadLogEntry) -> IngestResult<()> {
    sqlx::query(
        r#"
        INSERT INTO load_log (load_id, entity, file, status, rows_loaded, error)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&entry.load_id)
    .bind(&entry.entity)
    .bind(&entry.file)
    .bind(entry.status.as_str())
    .bind(entry.rows_loaded)
    .bind(&entry.error)
    .execute(&mut *conn)
    .await?;

    debug!(
        load_id = %entry.load_id,
        entity = %entry.entity,
        file = %entry.file,
        status = %entry.status,
        "Load log entry appended"
    );
    Ok(())
}

/// Pool-backed load log access outside of staging transactions
#[derive(Debug, Clone)]
pub struct LoadLog {
    pool: PgPool,
}

impl LoadLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: &LoadLogEntry) -> IngestResult<()> {
        let mut conn = self.pool.acquire().await?;
        ensure_table(&mut conn).await?;
        append(&mut conn, entry).await
    }

    /// Entries of one load in insertion order
    pub async fn entries_for(&self, load_id: &str) -> IngestResult<Vec<LoadLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        ensure_table(&mut conn).await?;

        let rows = sqlx::query(
            r#"
            SELECT load_id, entity, file, status, rows_loaded, error
            FROM load_log
            WHERE load_id = $1
            ORDER BY id
            "#,
        )
        .bind(load_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter()
            .map(|row| -> IngestResult<LoadLogEntry> {
                let status: String = row.try_get("status")?;
                Ok(LoadLogEntry {
                    load_id: row.try_get("load_id")?,
                    entity: row.try_get("entity")?,
                    file: row.try_get("file")?,
                    status: status.parse()?,
                    rows_loaded: row.try_get("rows_loaded")?,
                    error: row.try_get("error")?,
                })
            })
            .collect()
    }
}
