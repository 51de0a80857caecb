//! Named transcription parameter bundles.

use chrono::Utc;
use scriberr_domain::TranscriptionParams;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::TranscriptionProfile;

#[derive(Clone)]
pub struct ProfileRepo {
    pool: SqlitePool,
}

impl ProfileRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        parameters: &TranscriptionParams,
    ) -> StorageResult<TranscriptionProfile> {
        let now = Utc::now();
        let params_json = serde_json::to_string(parameters)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO transcription_profiles
                 (user_id, name, description, is_default, parameters, created_at, updated_at)
             VALUES (?, ?, ?, 0, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(&params_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid(), user_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn find_by_id(
        &self,
        id: i64,
        user_id: i64,
    ) -> StorageResult<Option<TranscriptionProfile>> {
        let row = sqlx::query_as::<_, TranscriptionProfile>(
            "SELECT * FROM transcription_profiles WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_for_user(&self, user_id: i64) -> StorageResult<Vec<TranscriptionProfile>> {
        let rows = sqlx::query_as::<_, TranscriptionProfile>(
            "SELECT * FROM transcription_profiles WHERE user_id = ? ORDER BY name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_default(&self, user_id: i64) -> StorageResult<Option<TranscriptionProfile>> {
        let row = sqlx::query_as::<_, TranscriptionProfile>(
            "SELECT * FROM transcription_profiles WHERE user_id = ? AND is_default = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update(
        &self,
        id: i64,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        parameters: &TranscriptionParams,
    ) -> StorageResult<()> {
        let params_json = serde_json::to_string(parameters)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE transcription_profiles
             SET name = ?, description = ?, parameters = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(&params_json)
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Make this profile the user's default, clearing the previous one in
    /// the same transaction so at most one row ever has the flag.
    pub async fn set_default(&self, id: i64, user_id: i64) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE transcription_profiles SET is_default = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "UPDATE transcription_profiles SET is_default = 1, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64, user_id: i64) -> StorageResult<()> {
        let result =
            sqlx::query("DELETE FROM transcription_profiles WHERE id = ? AND user_id = ?")
                .bind(id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
