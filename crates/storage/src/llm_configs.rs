//! Process-wide LLM provider binding; at most one active row.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::models::{LlmProvider, LlmProviderConfig};

#[derive(Clone)]
pub struct LlmConfigRepo {
    pool: SqlitePool,
}

impl LlmConfigRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_active(&self) -> StorageResult<Option<LlmProviderConfig>> {
        let row = sqlx::query_as::<_, LlmProviderConfig>(
            "SELECT * FROM llm_configs WHERE is_active = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Replace the active binding: deactivate the previous row and insert
    /// the new one in a single transaction (the partial unique index on
    /// `is_active` backs this up).
    pub async fn set_active(
        &self,
        provider: LlmProvider,
        base_url: Option<&str>,
        api_key: Option<&str>,
    ) -> StorageResult<LlmProviderConfig> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        sqlx::query("UPDATE llm_configs SET is_active = 0, updated_at = ? WHERE is_active = 1")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO llm_configs (provider, base_url, api_key, is_active, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(provider.as_str())
        .bind(base_url)
        .bind(api_key)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.find_active()
            .await?
            .ok_or(crate::error::StorageError::NotFound)
    }
}
