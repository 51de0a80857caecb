//! Server-side sessions, revocable independently of access tokens. Only
//! the sha256 digest of a token is stored.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::ids;
use crate::models::RefreshToken;

#[derive(Clone)]
pub struct RefreshTokenRepo {
    pool: SqlitePool,
}

impl RefreshTokenRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mint a token for the user; returns the plaintext (shown once).
    pub async fn issue(&self, user_id: i64, expires_at: DateTime<Utc>) -> StorageResult<String> {
        let token = ids::new_refresh_token();
        sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token_digest, expires_at, revoked, created_at)
             VALUES (?, ?, ?, 0, ?)",
        )
        .bind(user_id)
        .bind(ids::token_digest(&token))
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    /// Look up a live (unrevoked, unexpired) session for the plaintext
    /// token.
    pub async fn find_live(&self, token: &str) -> StorageResult<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            "SELECT * FROM refresh_tokens
             WHERE token_digest = ? AND revoked = 0 AND expires_at > ?",
        )
        .bind(ids::token_digest(token))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn revoke(&self, token: &str) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token_digest = ?")
            .bind(ids::token_digest(token))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revoke_all_for_user(&self, user_id: i64) -> StorageResult<u64> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::users::UserRepo;

    async fn setup() -> (RefreshTokenRepo, i64) {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        (RefreshTokenRepo::new(pool), user.id)
    }

    #[tokio::test]
    async fn issue_and_redeem() {
        let (repo, user_id) = setup().await;
        let token = repo
            .issue(user_id, Utc::now() + chrono::Duration::days(30))
            .await
            .unwrap();

        let session = repo.find_live(&token).await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        // The plaintext never hits the table.
        assert_ne!(session.token_digest, token);
    }

    #[tokio::test]
    async fn revoked_token_is_dead() {
        let (repo, user_id) = setup().await;
        let token = repo
            .issue(user_id, Utc::now() + chrono::Duration::days(30))
            .await
            .unwrap();

        assert!(repo.revoke(&token).await.unwrap());
        assert!(repo.find_live(&token).await.unwrap().is_none());
        // Second revoke reports the row is already gone from the live set
        // but remains harmless.
        assert!(repo.revoke(&token).await.unwrap());
    }

    #[tokio::test]
    async fn expired_token_is_dead() {
        let (repo, user_id) = setup().await;
        let token = repo
            .issue(user_id, Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(repo.find_live(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoke_all_clears_user_sessions() {
        let (repo, user_id) = setup().await;
        let exp = Utc::now() + chrono::Duration::days(30);
        let t1 = repo.issue(user_id, exp).await.unwrap();
        let t2 = repo.issue(user_id, exp).await.unwrap();

        assert_eq!(repo.revoke_all_for_user(user_id).await.unwrap(), 2);
        assert!(repo.find_live(&t1).await.unwrap().is_none());
        assert!(repo.find_live(&t2).await.unwrap().is_none());
    }
}
