//! Transcript annotations.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::Note;

/// Fields supplied by the client when creating or updating a note.
#[derive(Debug, Clone)]
pub struct NoteDraft {
    pub start_word_index: i64,
    pub end_word_index: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub quote: String,
    pub content: String,
}

#[derive(Clone)]
pub struct NoteRepo {
    pool: SqlitePool,
}

impl NoteRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        job_id: &str,
        draft: &NoteDraft,
    ) -> StorageResult<Note> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO notes
                 (user_id, job_id, start_word_index, end_word_index, start_time, end_time,
                  quote, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(job_id)
        .bind(draft.start_word_index)
        .bind(draft.end_word_index)
        .bind(draft.start_time)
        .bind(draft.end_time)
        .bind(&draft.quote)
        .bind(&draft.content)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(result.last_insert_rowid(), user_id)
            .await?
            .ok_or(StorageError::NotFound)
    }

    pub async fn find_by_id(&self, id: i64, user_id: i64) -> StorageResult<Option<Note>> {
        let row = sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_for_job(&self, job_id: &str, user_id: i64) -> StorageResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, Note>(
            "SELECT * FROM notes WHERE job_id = ? AND user_id = ? ORDER BY start_time ASC",
        )
        .bind(job_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_content(
        &self,
        id: i64,
        user_id: i64,
        content: &str,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE notes SET content = ?, updated_at = ? WHERE id = ? AND user_id = ?",
        )
        .bind(content)
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

    pub async fn delete(&self, id: i64, user_id: i64) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ? AND user_id = ?")
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
    use crate::jobs::JobRepo;
    use crate::users::UserRepo;
    use scriberr_domain::TranscriptionParams;

    async fn setup() -> (NoteRepo, i64, String) {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let job = JobRepo::new(pool.clone())
            .create(user.id, None, "/a.wav", false, &TranscriptionParams::default())
            .await
            .unwrap();
        (NoteRepo::new(pool), user.id, job.id)
    }

    fn draft() -> NoteDraft {
        NoteDraft {
            start_word_index: 3,
            end_word_index: 7,
            start_time: 1.2,
            end_time: 3.4,
            quote: "ask not what".into(),
            content: "famous line".into(),
        }
    }

    #[tokio::test]
    async fn create_and_list_ordered_by_time() {
        let (repo, user_id, job_id) = setup().await;
        let mut late = draft();
        late.start_time = 9.0;
        repo.create(user_id, &job_id, &late).await.unwrap();
        repo.create(user_id, &job_id, &draft()).await.unwrap();

        let notes = repo.list_for_job(&job_id, user_id).await.unwrap();
        assert_eq!(notes.len(), 2);
        assert!(notes[0].start_time < notes[1].start_time);
    }

    #[tokio::test]
    async fn update_and_delete_scope_on_owner() {
        let (repo, user_id, job_id) = setup().await;
        let note = repo.create(user_id, &job_id, &draft()).await.unwrap();

        assert!(matches!(
            repo.update_content(note.id, user_id + 1, "x").await,
            Err(StorageError::NotFound)
        ));
        repo.update_content(note.id, user_id, "edited").await.unwrap();
        assert_eq!(
            repo.find_by_id(note.id, user_id)
                .await
                .unwrap()
                .unwrap()
                .content,
            "edited"
        );

        repo.delete(note.id, user_id).await.unwrap();
        assert!(repo.find_by_id(note.id, user_id).await.unwrap().is_none());
    }
}
