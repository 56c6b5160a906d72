//! Load orchestration
//!
//! A run lists the requested exports, then for each entity in processing order and each
//! file in key order: download, reconcile, write to staging. Failures that concern one file
//! are logged as FAILED and the run moves on; anything else is logged best-effort and
//! aborts. A batch wraps a run with a connectivity check and view consolidation, recording
//! each step in the load log.

use chrono::{DateTime, Utc};
use etl_common::Entity;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::lister::{MonthRange, ObjectLister, ObjectSource, SourceObject};
use super::load_log::LoadLogEntry;
use super::reconcile::SchemaReconciler;
use super::views::StagingView;
use super::warehouse::Warehouse;
use crate::db::MAX_IDENTIFIER_LEN;
use crate::error::{IngestError, IngestResult};

pub const STEP_CHECK_CONNECTIVITY: &str = "check_connectivity";
pub const STEP_RUN_INGESTION: &str = "run_ingestion";
pub const STEP_CREATE_VIEWS: &str = "create_staging_views";

/// Load id for a batch started at `now`: `YYYYMMDD_HHMMSSmmm`
pub fn generate_load_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S%3f").to_string()
}

/// Longest export file stem: `{YYYYMM}{8 digits}_contracts`
const LONGEST_EXPORT_STEM: usize = "20210100000001_contracts".len();

/// Longest load id that still fits every staging table name of the load
pub const MAX_LOAD_ID_LEN: usize = MAX_IDENTIFIER_LEN - "_staging_".len() - LONGEST_EXPORT_STEM;

/// Load ids end up in table names, so only `[A-Za-z0-9_]` is accepted, and only up to
/// [`MAX_LOAD_ID_LEN`] bytes.
pub fn validate_load_id(load_id: &str) -> IngestResult<()> {
    if load_id.is_empty() {
        return Err(IngestError::Validation("Load id cannot be empty".to_string()));
    }
    if load_id.len() > MAX_LOAD_ID_LEN {
        return Err(IngestError::Validation(format!(
            "Load id '{}' is {} bytes long; at most {} are allowed",
            load_id,
            load_id.len(),
            MAX_LOAD_ID_LEN
        )));
    }
    if !load_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(IngestError::Validation(format!(
            "Invalid load id '{}': only letters, digits and '_' are allowed",
            load_id
        )));
    }
    Ok(())
}

/// Parameters of one load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Comma-separated entity list
    #[serde(rename = "entity", alias = "entities")]
    pub entities: String,
    #[serde(default)]
    pub start_month: Option<String>,
    pub end_month: String,
    /// Generated from the current time when absent
    #[serde(default)]
    pub load_id: Option<String>,
}

struct LoadPlan {
    entities: Vec<Entity>,
    range: MonthRange,
    load_id: String,
}

impl RunRequest {
    fn plan(&self) -> IngestResult<LoadPlan> {
        let mut entities = Entity::parse_list(&self.entities)?;
        if entities.is_empty() {
            return Err(IngestError::Validation("No entities requested".to_string()));
        }
        entities.sort();

        let range = MonthRange::new(self.start_month.as_deref(), &self.end_month)?;

        let load_id = match &self.load_id {
            Some(load_id) => {
                validate_load_id(load_id)?;
                load_id.clone()
            }
            None => generate_load_id(Utc::now()),
        };

        Ok(LoadPlan {
            entities,
            range,
            load_id,
        })
    }
}

/// Outcome of a run: one entry per processed file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub load_id: String,
    pub loaded: Vec<LoadLogEntry>,
    pub failed: Vec<LoadLogEntry>,
}

impl RunReport {
    fn new(load_id: &str) -> Self {
        Self {
            load_id: load_id.to_string(),
            ..Default::default()
        }
    }

    pub fn rows_loaded(&self) -> i64 {
        self.loaded.iter().map(|e| e.rows_loaded).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub run: RunReport,
    pub views: Vec<StagingView>,
}

pub struct IngestPipeline {
    source: Arc<dyn ObjectSource>,
    warehouse: Arc<dyn Warehouse>,
    reconciler: SchemaReconciler,
    bucket: String,
    work_dir: PathBuf,
}

impl IngestPipeline {
    pub fn new(
        source: Arc<dyn ObjectSource>,
        warehouse: Arc<dyn Warehouse>,
        reconciler: SchemaReconciler,
        bucket: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            warehouse,
            reconciler,
            bucket: bucket.into(),
            work_dir: work_dir.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Bucket probe followed by a database round trip
    pub async fn check_connectivity(&self) -> IngestResult<()> {
        self.source.probe(&self.bucket).await?;
        self.warehouse.health_check().await?;
        info!(bucket = %self.bucket, "Object store and database are reachable");
        Ok(())
    }

    /// Load every matching export of the request into staging tables.
    pub async fn run(&self, request: &RunRequest) -> IngestResult<RunReport> {
        let plan = request.plan()?;
        self.run_plan(&plan).await
    }

    /// Consolidate the staging tables of an earlier load.
    pub async fn consolidate(&self, load_id: &str) -> IngestResult<Vec<StagingView>> {
        validate_load_id(load_id)?;
        self.warehouse.consolidate(load_id).await
    }

    /// Connectivity check, run, then consolidation, each logged as a step event.
    pub async fn run_batch(&self, request: &RunRequest) -> IngestResult<BatchReport> {
        let plan = request.plan()?;
        let load_id = plan.load_id.as_str();
        info!(load_id, "Starting load batch");

        let checked = self.check_connectivity().await;
        self.record_step(load_id, STEP_CHECK_CONNECTIVITY, &checked)
            .await?;
        checked?;

        let run = self.run_plan(&plan).await;
        self.record_step(load_id, STEP_RUN_INGESTION, &run).await?;
        let run = run?;

        let views = self.warehouse.consolidate(load_id).await;
        self.record_step(load_id, STEP_CREATE_VIEWS, &views).await?;
        let views = views?;

        info!(
            load_id,
            loaded = run.loaded.len(),
            failed = run.failed.len(),
            views = views.len(),
            "Load batch finished"
        );
        Ok(BatchReport { run, views })
    }

    async fn record_step<T>(
        &self,
        load_id: &str,
        step: &str,
        outcome: &IngestResult<T>,
    ) -> IngestResult<()> {
        let entry = LoadLogEntry::step(load_id, step, outcome.as_ref().err().map(|e| e.to_string()));

        match (self.warehouse.append_log(&entry).await, outcome) {
            (Err(log_err), Ok(_)) => Err(log_err),
            (Err(log_err), Err(_)) => {
                // The step error is what the caller needs to see
                warn!(step, error = %log_err, "Could not record failed step");
                Ok(())
            }
            (Ok(()), _) => Ok(()),
        }
    }

    #[instrument(skip(self, plan), fields(load_id = %plan.load_id))]
    async fn run_plan(&self, plan: &LoadPlan) -> IngestResult<RunReport> {
        let entity_list = plan
            .entities
            .iter()
            .map(Entity::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let objects = ObjectLister::new(self.source.as_ref())
            .list(&self.bucket, &entity_list, &plan.range)
            .await?;

        let mut report = RunReport::new(&plan.load_id);

        for entity in &plan.entities {
            let files: Vec<&SourceObject> = objects
                .iter()
                .filter(|o| o.entity == entity.as_str())
                .collect();
            info!(%entity, files = files.len(), "Processing entity");

            for object in files {
                match self.process_file(object, *entity, &plan.load_id).await {
                    Ok(entry) => report.loaded.push(entry),
                    Err(e) if e.is_file_scoped() => {
                        warn!(key = %object.key, error = %e, "File failed; continuing");
                        let entry = LoadLogEntry::failed(
                            &plan.load_id,
                            entity.as_str(),
                            object.file_name(),
                            &e,
                        );
                        self.warehouse.append_log(&entry).await?;
                        report.failed.push(entry);
                    }
                    Err(e) => {
                        error!(key = %object.key, error = %e, "Load aborted");
                        let entry = LoadLogEntry::failed(
                            &plan.load_id,
                            entity.as_str(),
                            object.file_name(),
                            &e,
                        );
                        if let Err(log_err) = self.warehouse.append_log(&entry).await {
                            warn!(error = %log_err, "Could not record failure");
                        }
                        return Err(e);
                    }
                }
            }
        }

        // Only succeeds once the per-load directory is empty
        let load_dir = self.work_dir.join(&plan.load_id);
        if let Err(e) = tokio::fs::remove_dir(&load_dir).await {
            if !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::DirectoryNotEmpty
            ) {
                warn!(path = %load_dir.display(), error = %e, "Could not remove load directory");
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            rows = report.rows_loaded(),
            "Run finished"
        );
        Ok(report)
    }

    async fn process_file(
        &self,
        object: &SourceObject,
        entity: Entity,
        load_id: &str,
    ) -> IngestResult<LoadLogEntry> {
        let local = self.work_dir.join(load_id).join(object.file_name());
        let result = self.load_file(object, entity, load_id, &local).await;

        if let Err(e) = tokio::fs::remove_file(&local).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %local.display(), error = %e, "Could not remove downloaded file");
            }
        }

        result
    }

    async fn load_file(
        &self,
        object: &SourceObject,
        entity: Entity,
        load_id: &str,
        local: &Path,
    ) -> IngestResult<LoadLogEntry> {
        self.source
            .download_to(&self.bucket, &object.key, local)
            .await?;

        let records = self.reconciler.reconcile(local, entity).await?;

        self.warehouse
            .write_staging(&records, entity, object.file_name(), load_id)
            .await
    }
}
