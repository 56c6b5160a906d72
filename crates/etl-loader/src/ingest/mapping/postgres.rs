//! PostgreSQL mapping repository backed by a `schema_mappings` table

use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use tracing::{debug, instrument};

use super::{MappingRepository, MappingResult, MatchingRule};

#[derive(Debug, Clone)]
pub struct PostgresMappingRepository {
    pool: PgPool,
}

impl PostgresMappingRepository {
    /// Wrap the pool and make sure the table exists.
    pub async fn connect(pool: PgPool) -> MappingResult<Self> {
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> MappingResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_mappings (
                file_name TEXT PRIMARY KEY,
                rule JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MappingRepository for PostgresMappingRepository {
    #[instrument(skip(self))]
    async fn get(&self, file_name: &str) -> MappingResult<Option<MatchingRule>> {
        let rule: Option<Json<MatchingRule>> =
            sqlx::query_scalar("SELECT rule FROM schema_mappings WHERE file_name = $1")
                .bind(file_name)
                .fetch_optional(&self.pool)
                .await?;

        Ok(rule.map(|Json(rule)| rule))
    }

    #[instrument(skip(self, rule))]
    async fn put(&self, file_name: &str, rule: &MatchingRule) -> MappingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schema_mappings (file_name, rule, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (file_name)
            DO UPDATE SET rule = EXCLUDED.rule, updated_at = NOW()
            "#,
        )
        .bind(file_name)
        .bind(Json(rule))
        .execute(&self.pool)
        .await?;

        debug!("Matching rule stored");
        Ok(())
    }

    async fn list(&self) -> MappingResult<Vec<String>> {
        let names =
            sqlx::query_scalar("SELECT file_name FROM schema_mappings ORDER BY file_name")
                .fetch_all(&self.pool)
                .await?;
        Ok(names)
    }
}
