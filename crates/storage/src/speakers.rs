//! Per-job relabeling of diarized speakers.

use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::models::SpeakerMapping;

#[derive(Clone)]
pub struct SpeakerMappingRepo {
    pool: SqlitePool,
}

impl SpeakerMappingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list_for_job(&self, job_id: &str) -> StorageResult<Vec<SpeakerMapping>> {
        let rows = sqlx::query_as::<_, SpeakerMapping>(
            "SELECT * FROM speaker_mappings WHERE job_id = ? ORDER BY speaker_id ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Bulk upsert of speaker-id → friendly-name pairs for one job.
    pub async fn upsert_for_job(
        &self,
        job_id: &str,
        mappings: &[(String, String)],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for (speaker_id, label) in mappings {
            sqlx::query(
                "INSERT INTO speaker_mappings (job_id, speaker_id, label)
                 VALUES (?, ?, ?)
                 ON CONFLICT (job_id, speaker_id) DO UPDATE SET label = excluded.label",
            )
            .bind(job_id)
            .bind(speaker_id)
            .bind(label)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
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

    #[tokio::test]
    async fn upsert_overwrites_labels() {
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let job = JobRepo::new(pool.clone())
            .create(user.id, None, "/a.wav", true, &TranscriptionParams::default())
            .await
            .unwrap();
        let repo = SpeakerMappingRepo::new(pool);

        repo.upsert_for_job(
            &job.id,
            &[
                ("SPEAKER_00".into(), "Alice".into()),
                ("SPEAKER_01".into(), "Bob".into()),
            ],
        )
        .await
        .unwrap();
        repo.upsert_for_job(&job.id, &[("SPEAKER_01".into(), "Robert".into())])
            .await
            .unwrap();

        let mappings = repo.list_for_job(&job.id).await.unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[1].label, "Robert");
    }
}
