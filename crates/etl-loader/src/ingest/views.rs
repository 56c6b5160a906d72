//! Consolidation of a batch's staging tables into typed union views

use etl_common::Entity;
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

use crate::db::{qualified, quote_ident, quote_literal};
use crate::error::{IngestError, IngestResult};

/// A view created for one entity of a load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagingView {
    pub entity: Entity,
    pub schema: String,
    pub name: String,
    pub source_tables: Vec<String>,
}

/// Assign every staging table to its entity; tables within an entity are sorted.
///
/// A table whose name carries no known `{entity}_staging` marker fails the whole grouping.
pub fn group_staging_tables(tables: &[String]) -> IngestResult<BTreeMap<Entity, Vec<String>>> {
    let names: Vec<&str> = Entity::ALL.iter().map(Entity::as_str).collect();
    let pattern = Regex::new(&format!("({})_staging", names.join("|")))
        .map_err(|e| IngestError::Validation(e.to_string()))?;

    let mut groups: BTreeMap<Entity, Vec<String>> = BTreeMap::new();
    for table in tables {
        let entity = pattern
            .captures(table)
            .and_then(|caps| caps[1].parse::<Entity>().ok())
            .ok_or_else(|| IngestError::UnrecognizedEntity {
                table: table.clone(),
            })?;
        groups.entry(entity).or_default().push(table.clone());
    }

    for tables in groups.values_mut() {
        tables.sort();
    }
    Ok(groups)
}

/// `CREATE OR REPLACE VIEW` over all `tables`, casting each canonical column and tagging
/// rows with the table they came from.
pub fn build_view_sql(
    entity: Entity,
    tables: &[String],
    source_schema: &str,
    view_schema: &str,
) -> String {
    let columns = entity
        .columns()
        .iter()
        .map(|(name, ty)| {
            let ident = quote_ident(name);
            format!("{}::{} AS {}", ident, ty.sql_name(), ident)
        })
        .collect::<Vec<_>>()
        .join(", ");

    let selects = tables
        .iter()
        .map(|table| {
            format!(
                "SELECT {}, {}::text AS source_table FROM {}",
                columns,
                quote_literal(table),
                qualified(source_schema, table)
            )
        })
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n");

    format!(
        "CREATE OR REPLACE VIEW {} AS\n{}",
        qualified(view_schema, &entity.view_name()),
        selects
    )
}

#[derive(Debug, Clone)]
pub struct ViewConsolidator {
    pool: PgPool,
    source_schema: String,
    view_schema: String,
}

impl ViewConsolidator {
    pub fn new(
        pool: PgPool,
        source_schema: impl Into<String>,
        view_schema: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            source_schema: source_schema.into(),
            view_schema: view_schema.into(),
        }
    }

    /// Staging tables of `load_id` in the source schema, sorted
    pub async fn staging_tables(&self, load_id: &str) -> IngestResult<Vec<String>> {
        let suffix = format!("_staging_{}", load_id);
        let tables: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT tablename::text
            FROM pg_tables
            WHERE schemaname = $1 AND tablename LIKE $2
            ORDER BY tablename
            "#,
        )
        .bind(&self.source_schema)
        .bind(format!("%{}", suffix))
        .fetch_all(&self.pool)
        .await?;

        // LIKE treats `_` as a wildcard
        Ok(tables
            .into_iter()
            .filter(|t| t.ends_with(&suffix))
            .collect())
    }

    /// Create or replace one view per entity present in the load.
    ///
    /// No tables means nothing to do. Any unrecognized table aborts before DDL runs;
    /// schema and views are created in a single transaction.
    #[instrument(skip(self))]
    pub async fn consolidate(&self, load_id: &str) -> IngestResult<Vec<StagingView>> {
        let tables = self.staging_tables(load_id).await?;
        if tables.is_empty() {
            info!("No staging tables found for load {}", load_id);
            return Ok(Vec::new());
        }

        let groups = group_staging_tables(&tables)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&self.view_schema)
        ))
        .execute(&mut *tx)
        .await?;

        let mut views = Vec::with_capacity(groups.len());
        for (entity, tables) in groups {
            let sql = build_view_sql(entity, &tables, &self.source_schema, &self.view_schema);
            debug!(%entity, tables = tables.len(), "Creating view");
            sqlx::query(&sql).execute(&mut *tx).await?;

            views.push(StagingView {
                entity,
                schema: self.view_schema.clone(),
                name: entity.view_name(),
                source_tables: tables,
            });
        }

        tx.commit().await?;

        info!(
            views = views.len(),
            tables = tables.len(),
            "Staging views created for load {}",
            load_id
        );
        Ok(views)
    }
}
