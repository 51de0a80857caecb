//! Long-lived API keys.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::ids;
use crate::models::ApiKey;

#[derive(Clone)]
pub struct ApiKeyRepo {
    pool: SqlitePool,
}

impl ApiKeyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Generate and store a new key for the user. The returned record is
    /// the only place the full key is ever handed out.
    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
    ) -> StorageResult<ApiKey> {
        let key = ids::new_api_key();
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO api_keys (user_id, key, name, description, is_active, created_at, updated_at)
             VALUES (?, ?, ?, ?, 1, ?, ?)",
        )
        .bind(user_id)
        .bind(&key)
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid())
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<ApiKey>> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(key)
    }

    /// Credential lookup used by the auth middleware. Only active keys
    /// match.
    pub async fn find_active_by_key(&self, key: &str) -> StorageResult<Option<ApiKey>> {
        let row =
            sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE key = ? AND is_active = 1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    pub async fn list_for_user(&self, user_id: i64) -> StorageResult<Vec<ApiKey>> {
        let keys = sqlx::query_as::<_, ApiKey>(
            "SELECT * FROM api_keys WHERE user_id = ? ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    pub async fn set_active(&self, id: i64, user_id: i64, is_active: bool) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE api_keys SET is_active = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(is_active)
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

    /// Best-effort usage stamp; the auth path ignores failures here.
    pub async fn touch_last_used(&self, id: i64) -> StorageResult<()> {
        sqlx::query("UPDATE api_keys SET last_used = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: i64, user_id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = ? AND user_id = ?")
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::users::UserRepo;

    async fn setup() -> (ApiKeyRepo, i64) {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        (ApiKeyRepo::new(pool), user.id)
    }

    #[tokio::test]
    async fn create_returns_full_key_once() {
        let (repo, user_id) = setup().await;
        let key = repo.create(user_id, "cli", Some("laptop")).await.unwrap();
        assert!(key.key.starts_with("sk-scriberr-"));
        assert!(key.is_active);
        assert_eq!(key.preview(), format!("{}...", &key.key[..8]));
    }

    #[tokio::test]
    async fn lookup_honors_active_flag() {
        let (repo, user_id) = setup().await;
        let key = repo.create(user_id, "cli", None).await.unwrap();

        assert!(repo
            .find_active_by_key(&key.key)
            .await
            .unwrap()
            .is_some());

        repo.set_active(key.id, user_id, false).await.unwrap();
        assert!(repo
            .find_active_by_key(&key.key)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_scopes_on_owner() {
        let (repo, user_id) = setup().await;
        let key = repo.create(user_id, "cli", None).await.unwrap();

        // Wrong owner does not delete.
        let err = repo.delete(key.id, user_id + 1).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));

        repo.delete(key.id, user_id).await.unwrap();
        assert!(repo.find_by_id(key.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn touch_last_used_sets_timestamp() {
        let (repo, user_id) = setup().await;
        let key = repo.create(user_id, "cli", None).await.unwrap();
        assert!(key.last_used.is_none());

        repo.touch_last_used(key.id).await.unwrap();
        let refreshed = repo.find_by_id(key.id).await.unwrap().unwrap();
        assert!(refreshed.last_used.is_some());
    }
}
