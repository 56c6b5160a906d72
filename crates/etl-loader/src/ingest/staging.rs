//! Staging table materialization

use etl_common::Entity;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::load_log::{self, LoadLogEntry};
use super::records::RecordSet;
use crate::db::{check_identifier, qualified, quote_ident};
use crate::error::{IngestError, IngestResult};

pub const DEFAULT_INSERT_CHUNK_SIZE: usize = 1000;

/// PostgreSQL bind-parameter limit per statement
const MAX_BIND_PARAMS: usize = 65_535;

/// `{file stem}_staging_{load_id}`
pub fn staging_table_name(source_file: &str, load_id: &str) -> IngestResult<String> {
    let stem = Path::new(source_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            IngestError::Validation(format!("Cannot derive table name from '{}'", source_file))
        })?;

    let name = format!("{}_staging_{}", stem, load_id);
    check_identifier(&name)?;
    Ok(name)
}

/// Rows per INSERT statement for a table `width` columns wide
fn rows_per_statement(chunk_size: usize, width: usize) -> usize {
    chunk_size.min(MAX_BIND_PARAMS / width.max(1)).max(1)
}

/// Writes canonical record sets into per-file staging tables
#[derive(Debug, Clone)]
pub struct StagingWriter {
    pool: PgPool,
    schema: String,
    chunk_size: usize,
}

impl StagingWriter {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Replace the staging table for `(source_file, load_id)` and log SUCCESS.
    ///
    /// Table replacement, row inserts and the log entry commit together; on error nothing
    /// is left behind and the error propagates.
    #[instrument(skip(self, records), fields(rows = records.row_count()))]
    pub async fn write(
        &self,
        records: &RecordSet,
        entity: Entity,
        source_file: &str,
        load_id: &str,
    ) -> IngestResult<LoadLogEntry> {
        let table = staging_table_name(source_file, load_id)?;
        let target = qualified(&self.schema, &table);

        let column_list = records
            .columns()
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let column_defs = records
            .columns()
            .iter()
            .map(|c| format!("{} TEXT", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&self.schema)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", target))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("CREATE TABLE {} ({})", target, column_defs))
            .execute(&mut *tx)
            .await?;

        let per_statement = rows_per_statement(self.chunk_size, records.columns().len());
        let total_chunks = records.row_count().div_ceil(per_statement);

        for (chunk_idx, chunk) in records.rows().chunks(per_statement).enumerate() {
            debug!(
                "Inserting chunk {} / {} ({} rows) into {}",
                chunk_idx + 1,
                total_chunks,
                chunk.len(),
                table
            );

            let mut query_builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO {} ({}) ", target, column_list));
            query_builder.push_values(chunk, |mut b, row| {
                for cell in row {
                    b.push_bind(cell.as_deref());
                }
            });
            query_builder.build().execute(&mut *tx).await?;
        }

        let file_name = Path::new(source_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(source_file);
        let entry = LoadLogEntry::success(load_id, entity.as_str(), file_name, records.row_count());
        load_log::ensure_table(&mut tx).await?;
        load_log::append(&mut tx, &entry).await?;

        tx.commit().await?;

        info!(
            table = %table,
            rows = records.row_count(),
            "Staging table written"
        );

        Ok(entry)
    }
}
