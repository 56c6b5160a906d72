//! Staged CSV ingestion
//!
//! Components, leaves first:
//!
//! - [`lister`]: finds export objects by naming convention and month range
//! - [`mapping`]: per-file matching rules and their repositories
//! - [`similarity`]: closest-name suggestions
//! - [`reconcile`]: delimiter inference and column reconciliation
//! - [`staging`] / [`load_log`]: staging tables and the load log
//! - [`views`]: per-load consolidation into typed views
//! - [`pipeline`]: orchestration of a load

pub mod lister;
pub mod load_log;
pub mod mapping;
pub mod pipeline;
pub mod reconcile;
pub mod records;
pub mod similarity;
pub mod staging;
pub mod views;
pub mod warehouse;

pub use lister::{MonthRange, ObjectLister, ObjectSource, SourceObject};
pub use load_log::{LoadLog, LoadLogEntry};
pub use mapping::{MappingRepository, MatchingRule};
pub use pipeline::{generate_load_id, BatchReport, IngestPipeline, RunReport, RunRequest};
pub use reconcile::SchemaReconciler;
pub use records::RecordSet;
pub use staging::StagingWriter;
pub use views::{StagingView, ViewConsolidator};
pub use warehouse::{PgWarehouse, Warehouse, WarehouseSettings};
