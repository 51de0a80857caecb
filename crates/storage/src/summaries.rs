//! Terminal summarization outputs, one per transcription.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::models::Summary;

#[derive(Clone)]
pub struct SummaryRepo {
    pool: SqlitePool,
}

impl SummaryRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert by transcription id: re-summarizing replaces the previous
    /// output.
    pub async fn upsert(
        &self,
        transcription_id: &str,
        user_id: i64,
        model: &str,
        content: &str,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO summaries (transcription_id, user_id, model, content, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (transcription_id)
             DO UPDATE SET model = excluded.model, content = excluded.content,
                           created_at = excluded.created_at",
        )
        .bind(transcription_id)
        .bind(user_id)
        .bind(model)
        .bind(content)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_for_transcription(
        &self,
        transcription_id: &str,
        user_id: i64,
    ) -> StorageResult<Option<Summary>> {
        let row = sqlx::query_as::<_, Summary>(
            "SELECT * FROM summaries WHERE transcription_id = ? AND user_id = ?",
        )
        .bind(transcription_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jobs::JobRepo;
    use crate::users::UserRepo;
    use scriberr_domain::TranscriptionParams;

    #[tokio::test]
    async fn upsert_replaces_previous_summary() {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let job = JobRepo::new(pool.clone())
            .create(user.id, None, "/a.wav", false, &TranscriptionParams::default())
            .await
            .unwrap();
        let repo = SummaryRepo::new(pool);

        repo.upsert(&job.id, user.id, "gpt-4o-mini", "first pass")
            .await
            .unwrap();
        repo.upsert(&job.id, user.id, "gpt-4o", "second pass")
            .await
            .unwrap();

        let summary = repo
            .find_for_transcription(&job.id, user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.model, "gpt-4o");
        assert_eq!(summary.content, "second pass");
    }
}
