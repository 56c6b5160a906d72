//! ETL Common Library
//!
//! Shared types, logging, and error handling for the ETL workspace.
//!
//! # Overview
//!
//! - **Types**: the fixed entity catalogue and its canonical, typed column layout
//! - **Logging**: environment-driven `tracing` subscriber setup
//! - **Error Handling**: error type for parsing shared types
//!
//! # Example
//!
//! ```no_run
//! use etl_common::types::Entity;
//!
//! fn expected(name: &str) -> etl_common::Result<Vec<&'static str>> {
//!     let entity: Entity = name.parse()?;
//!     Ok(entity.column_names().collect())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{EtlError, Result};
pub use types::{ColumnType, Entity, LoadStatus};
