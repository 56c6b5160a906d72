//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::{check_identifier, DbConfig};
use crate::ingest::similarity::DEFAULT_SIMILARITY_THRESHOLD;
use crate::ingest::staging::DEFAULT_INSERT_CHUNK_SIZE;
use crate::ingest::warehouse::WarehouseSettings;
use crate::storage::config::StorageConfig;

// ============================================================================
// Defaults
// ============================================================================

/// Default trigger API host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default trigger API port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Local directory for downloaded exports.
pub const DEFAULT_WORK_DIR: &str = "/tmp/etl_files";

/// Directory holding `matching_*.json` rule files.
pub const DEFAULT_MATCHING_DIR: &str = "./matchings";

/// Schema the staging tables are written to.
pub const DEFAULT_SOURCE_SCHEMA: &str = "public";

/// Schema the consolidated views are created in.
pub const DEFAULT_VIEW_SCHEMA: &str = "staging";

/// Where matching rules are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingBackend {
    #[default]
    File,
    Postgres,
}

impl std::str::FromStr for MappingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "json" => Ok(MappingBackend::File),
            "postgres" | "postgresql" | "db" => Ok(MappingBackend::Postgres),
            _ => anyhow::bail!("Invalid mapping backend: {} (expected file or postgres)", s),
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DbConfig,
    pub storage: StorageConfig,
    pub ingest: IngestSettings,
    pub server: ServerConfig,
}

/// Ingestion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    pub work_dir: PathBuf,
    pub mapping_backend: MappingBackend,
    pub matching_dir: PathBuf,
    pub source_schema: String,
    pub view_schema: String,
    pub insert_chunk_size: usize,
    pub similarity_threshold: f64,
}

/// Trigger API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            mapping_backend: MappingBackend::default(),
            matching_dir: PathBuf::from(DEFAULT_MATCHING_DIR),
            source_schema: DEFAULT_SOURCE_SCHEMA.to_string(),
            view_schema: DEFAULT_VIEW_SCHEMA.to_string(),
            insert_chunk_size: DEFAULT_INSERT_CHUNK_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

impl IngestSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            work_dir: var("ETL_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            mapping_backend: match var("MAPPING_BACKEND") {
                Some(value) => value.parse()?,
                None => defaults.mapping_backend,
            },
            matching_dir: var("MATCHING_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.matching_dir),
            source_schema: var("STAGING_SOURCE_SCHEMA").unwrap_or(defaults.source_schema),
            view_schema: var("STAGING_VIEW_SCHEMA").unwrap_or(defaults.view_schema),
            insert_chunk_size: var("INSERT_CHUNK_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.insert_chunk_size),
            similarity_threshold: var("SIMILARITY_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.similarity_threshold),
        })
    }

    pub fn warehouse(&self) -> WarehouseSettings {
        WarehouseSettings {
            source_schema: self.source_schema.clone(),
            view_schema: self.view_schema.clone(),
            insert_chunk_size: self.insert_chunk_size,
        }
    }
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            database: DbConfig::from_env(),
            storage: StorageConfig::from_env(),
            ingest: IngestSettings::from_env()?,
            server: ServerConfig {
                host: std::env::var("ETL_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("ETL_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.storage.bucket.is_empty() {
            anyhow::bail!("Bucket name cannot be empty");
        }

        check_identifier(&self.ingest.source_schema)?;
        check_identifier(&self.ingest.view_schema)?;

        if self.ingest.insert_chunk_size == 0 {
            anyhow::bail!("Insert chunk size must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.ingest.similarity_threshold) {
            anyhow::bail!(
                "Similarity threshold must be within 0.0..=1.0, got {}",
                self.ingest.similarity_threshold
            );
        }

        Ok(())
    }
}
