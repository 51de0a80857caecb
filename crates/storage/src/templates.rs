//! Reusable summarization prompts.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{StorageError, StorageResult};
use crate::models::SummaryTemplate;

#[derive(Clone)]
pub struct TemplateRepo {
    pool: SqlitePool,
}

impl TemplateRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        model: &str,
        prompt: &str,
    ) -> StorageResult<SummaryTemplate> {
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO summary_templates
                 (user_id, name, description, model, prompt, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(model)
        .bind(prompt)
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
    ) -> StorageResult<Option<SummaryTemplate>> {
        let row = sqlx::query_as::<_, SummaryTemplate>(
            "SELECT * FROM summary_templates WHERE id = ? AND user_id = ?",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_for_user(&self, user_id: i64) -> StorageResult<Vec<SummaryTemplate>> {
        let rows = sqlx::query_as::<_, SummaryTemplate>(
            "SELECT * FROM summary_templates WHERE user_id = ? ORDER BY name ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update(
        &self,
        id: i64,
        user_id: i64,
        name: &str,
        description: Option<&str>,
        model: &str,
        prompt: &str,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE summary_templates
             SET name = ?, description = ?, model = ?, prompt = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(model)
        .bind(prompt)
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
        let result = sqlx::query("DELETE FROM summary_templates WHERE id = ? AND user_id = ?")
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

    #[tokio::test]
    async fn crud_roundtrip() {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let repo = TemplateRepo::new(pool);

        let t = repo
            .create(
                user.id,
                "minutes",
                Some("meeting minutes"),
                "gpt-4o-mini",
                "Summarize:\n\n{{content}}",
            )
            .await
            .unwrap();
        assert!(t.prompt.contains("{{content}}"));

        repo.update(t.id, user.id, "minutes", None, "gpt-4o", &t.prompt)
            .await
            .unwrap();
        let fetched = repo.find_by_id(t.id, user.id).await.unwrap().unwrap();
        assert_eq!(fetched.model, "gpt-4o");
        assert!(fetched.description.is_none());

        repo.delete(t.id, user.id).await.unwrap();
        assert!(repo.list_for_user(user.id).await.unwrap().is_empty());
    }
}
