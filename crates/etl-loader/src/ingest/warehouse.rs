//! Database side of a load: staging writes, load log and view consolidation

use async_trait::async_trait;
use etl_common::Entity;
use sqlx::PgPool;

use super::load_log::{LoadLog, LoadLogEntry};
use super::records::RecordSet;
use super::staging::StagingWriter;
use super::views::{StagingView, ViewConsolidator};
use crate::db;
use crate::error::IngestResult;

/// Everything the pipeline needs from the relational store
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn health_check(&self) -> IngestResult<()>;

    async fn write_staging(
        &self,
        records: &RecordSet,
        entity: Entity,
        source_file: &str,
        load_id: &str,
    ) -> IngestResult<LoadLogEntry>;

    async fn append_log(&self, entry: &LoadLogEntry) -> IngestResult<()>;

    async fn consolidate(&self, load_id: &str) -> IngestResult<Vec<StagingView>>;
}

/// Schemas and batching used by [`PgWarehouse`]
#[derive(Debug, Clone)]
pub struct WarehouseSettings {
    pub source_schema: String,
    pub view_schema: String,
    pub insert_chunk_size: usize,
}

pub struct PgWarehouse {
    pool: PgPool,
    writer: StagingWriter,
    log: LoadLog,
    consolidator: ViewConsolidator,
}

impl PgWarehouse {
    pub fn new(pool: PgPool, settings: &WarehouseSettings) -> Self {
        Self {
            writer: StagingWriter::new(pool.clone(), settings.source_schema.clone())
                .with_chunk_size(settings.insert_chunk_size),
            log: LoadLog::new(pool.clone()),
            consolidator: ViewConsolidator::new(
                pool.clone(),
                settings.source_schema.clone(),
                settings.view_schema.clone(),
            ),
            pool,
        }
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn health_check(&self) -> IngestResult<()> {
        db::health_check(&self.pool).await
    }

    async fn write_staging(
        &self,
        records: &RecordSet,
        entity: Entity,
        source_file: &str,
        load_id: &str,
    ) -> IngestResult<LoadLogEntry> {
        self.writer
            .write(records, entity, source_file, load_id)
            .await
    }

    async fn append_log(&self, entry: &LoadLogEntry) -> IngestResult<()> {
        self.log.record(entry).await
    }

    async fn consolidate(&self, load_id: &str) -> IngestResult<Vec<StagingView>> {
        self.consolidator.consolidate(load_id).await
    }
}
