//! Chat sessions and their ordered message history.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::{ChatMessage, ChatRole, ChatSession};

#[derive(Clone)]
pub struct ChatRepo {
    pool: SqlitePool,
}

impl ChatRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_session(
        &self,
        user_id: i64,
        transcription_id: &str,
        title: &str,
        model: &str,
        provider: &str,
    ) -> StorageResult<ChatSession> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO chat_sessions
                 (user_id, transcription_id, title, model, provider, is_active, message_count,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 1, 0, ?, ?)",
        )
        .bind(user_id)
        .bind(transcription_id)
        .bind(title)
        .bind(model)
        .bind(provider)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_session(result.last_insert_rowid(), user_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn find_session(
        &self,
        id: i64,
        user_id: i64,
    ) -> StorageResult<Option<ChatSession>> {
        let row = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_sessions(&self, user_id: i64) -> StorageResult<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions WHERE user_id = ? ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_sessions_for_transcription(
        &self,
        transcription_id: &str,
        user_id: i64,
    ) -> StorageResult<Vec<ChatSession>> {
        let rows = sqlx::query_as::<_, ChatSession>(
            "SELECT * FROM chat_sessions
             WHERE transcription_id = ? AND user_id = ?
             ORDER BY updated_at DESC",
        )
        .bind(transcription_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_title(&self, id: i64, user_id: i64, title: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET title = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(title)
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

    pub async fn delete_session(&self, id: i64, user_id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    pub async fn list_messages(&self, session_id: i64) -> StorageResult<Vec<ChatMessage>> {
        let rows = sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY seq ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Persist one completed exchange — the user message and the assistant
    /// reply — in a single transaction, bumping `message_count` by 2. The
    /// per-session `seq` keeps history strictly ordered even when two
    /// exchanges race: the UNIQUE(session_id, seq) index makes the loser
    /// retry at the handler level as a conflict.
    pub async fn append_exchange(
        &self,
        session_id: i64,
        user_content: &str,
        assistant_content: &str,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let (count,): (i64,) =
            sqlx::query_as("SELECT message_count FROM chat_sessions WHERE id = ?")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StorageError::NotFound)?;

        for (offset, (role, content)) in [
            (ChatRole::User, user_content),
            (ChatRole::Assistant, assistant_content),
        ]
        .into_iter()
        .enumerate()
        {
            sqlx::query(
                "INSERT INTO chat_messages (session_id, role, content, seq, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(role.as_str())
            .bind(content)
            .bind(count + offset as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE chat_sessions SET message_count = message_count + 2, updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
