//! ETL Loader Library
//!
//! Loads CSV exports from an S3/MinIO bucket into PostgreSQL staging tables and
//! consolidates each load into typed views.
//!
//! # Overview
//!
//! - **Object discovery**: exports are named `{YYYYMM}{8 digits}_{entity}.csv`
//! - **Schema reconciliation**: the delimiter is inferred once per file name; missing
//!   columns produce a matching rule with suggestions that an operator confirms
//! - **Staging**: one all-`TEXT` table per file and load, replaced on rerun
//! - **Consolidation**: one `{entity}_staging_view` per entity, casting to canonical types
//! - **Load log**: every file and batch step is recorded as SUCCESS or FAILED
//!
//! # Example
//!
//! ```no_run
//! use etl_loader::{config::Config, ingest::RunRequest, build_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = build_pipeline(&config).await?;
//!     let report = pipeline
//!         .run(&RunRequest {
//!             entities: "products,prices".to_string(),
//!             start_month: Some("202101".to_string()),
//!             end_month: "202103".to_string(),
//!             load_id: None,
//!         })
//!         .await?;
//!     println!("{} files loaded", report.loaded.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod storage;

use std::sync::Arc;

use config::{Config, MappingBackend};
use ingest::mapping::{FileMappingRepository, MappingRepository, PostgresMappingRepository};
use ingest::similarity::LevenshteinMatcher;
use ingest::{IngestPipeline, PgWarehouse, SchemaReconciler};
use storage::Storage;

/// Mapping repository selected by configuration.
///
/// The PostgreSQL backend reuses `pool` when given and opens its own otherwise.
pub async fn mapping_repository(
    config: &Config,
    pool: Option<&sqlx::PgPool>,
) -> anyhow::Result<Arc<dyn MappingRepository>> {
    let repository: Arc<dyn MappingRepository> = match config.ingest.mapping_backend {
        MappingBackend::File => {
            Arc::new(FileMappingRepository::new(config.ingest.matching_dir.clone()))
        }
        MappingBackend::Postgres => {
            let pool = match pool {
                Some(pool) => pool.clone(),
                None => db::create_pool(&config.database).await?,
            };
            Arc::new(PostgresMappingRepository::connect(pool).await?)
        }
    };
    Ok(repository)
}

/// Wire storage, database and mapping repository into a pipeline
pub async fn build_pipeline(config: &Config) -> anyhow::Result<IngestPipeline> {
    let pool = db::create_pool(&config.database).await?;
    let storage = Storage::new(config.storage.clone());

    let repository = mapping_repository(config, Some(&pool)).await?;
    let reconciler = SchemaReconciler::new(repository)
        .with_matcher(LevenshteinMatcher::new(config.ingest.similarity_threshold));

    let warehouse = PgWarehouse::new(pool, &config.ingest.warehouse());

    Ok(IngestPipeline::new(
        Arc::new(storage),
        Arc::new(warehouse),
        reconciler,
        config.storage.bucket.clone(),
        config.ingest.work_dir.clone(),
    ))
}
