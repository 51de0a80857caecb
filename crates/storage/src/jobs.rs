//! Transcription jobs: lifecycle mutators with atomic status transitions,
//! delta-sync listing, and per-attempt execution audit rows.

use chrono::{DateTime, Utc};
use scriberr_domain::{JobStatus, TranscriptResult, TranscriptionParams};
use sqlx::{QueryBuilder, SqlitePool};

use crate::error::{StorageError, StorageResult};
use crate::ids;
use crate::models::{ExecutionStage, JobExecution, TranscriptionJob};

/// Error message written by zombie recovery; tests assert on this text.
pub const ZOMBIE_ERROR: &str = "interrupted by server restart";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// List query
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default)]
pub struct ListJobsQuery {
    pub offset: i64,
    pub limit: i64,
    pub sort: JobSort,
    pub descending: bool,
    pub search: Option<String>,
    /// Delta-sync mode: include soft-deleted rows updated after this
    /// instant.
    pub updated_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JobSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
    Status,
}

impl JobSort {
    /// Whitelisted column name; user input never reaches SQL directly.
    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Title => "title",
            Self::Status => "status",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "title" => Some(Self::Title),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct JobRepo {
    pool: SqlitePool,
}

impl JobRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        title: Option<&str>,
        audio_path: &str,
        diarization: bool,
        parameters: &TranscriptionParams,
    ) -> StorageResult<TranscriptionJob> {
        self.create_with_id(
            &ids::new_job_id(),
            user_id,
            title,
            audio_path,
            diarization,
            parameters,
        )
        .await
    }

    /// Insert with a caller-chosen id. The upload handler generates the id
    /// first so the audio can stream to `uploads/<jobID>/` before the row
    /// exists.
    pub async fn create_with_id(
        &self,
        id: &str,
        user_id: i64,
        title: Option<&str>,
        audio_path: &str,
        diarization: bool,
        parameters: &TranscriptionParams,
    ) -> StorageResult<TranscriptionJob> {
        let now = Utc::now();
        let params_json = serde_json::to_string(parameters)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        sqlx::query(
            "INSERT INTO transcription_jobs
                 (id, user_id, title, status, audio_path, diarization, parameters,
                  created_at, updated_at)
             VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(title)
        .bind(audio_path)
        .bind(diarization)
        .bind(&params_json)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id).await?.ok_or(StorageError::NotFound)
    }

    /// Fetch by id, including soft-deleted rows; callers inspect
    /// `deleted_at` where that matters.
    pub async fn find_by_id(&self, id: &str) -> StorageResult<Option<TranscriptionJob>> {
        let job =
            sqlx::query_as::<_, TranscriptionJob>("SELECT * FROM transcription_jobs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(job)
    }

    /// Paged listing scoped to one user. Without `updated_after`,
    /// soft-deleted rows are hidden; with it, every row whose
    /// `updated_at` is newer is returned (deleted ones carry
    /// `deleted_at`) so offline clients can reconcile.
    pub async fn list(
        &self,
        user_id: i64,
        q: &ListJobsQuery,
    ) -> StorageResult<(Vec<TranscriptionJob>, i64)> {
        let order = if q.descending { "DESC" } else { "ASC" };

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM transcription_jobs WHERE ");
        let mut qb = QueryBuilder::new("SELECT * FROM transcription_jobs WHERE ");
        for builder in [&mut count_qb, &mut qb] {
            builder.push("user_id = ").push_bind(user_id);
            match q.updated_after {
                Some(after) => {
                    builder.push(" AND updated_at > ").push_bind(after);
                }
                None => {
                    builder.push(" AND deleted_at IS NULL");
                }
            }
            if let Some(search) = q.search.as_deref().filter(|s| !s.is_empty()) {
                builder
                    .push(" AND title LIKE ")
                    .push_bind(format!("%{}%", search.replace(['%', '_'], "")));
            }
        }

        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        qb.push(format!(" ORDER BY {} {} LIMIT ", q.sort.column(), order))
            .push_bind(q.limit.max(1))
            .push(" OFFSET ")
            .push_bind(q.offset.max(0));

        let jobs = qb
            .build_query_as::<TranscriptionJob>()
            .fetch_all(&self.pool)
            .await?;

        Ok((jobs, total))
    }

    // ── Status transitions ─────────────────────────────────────────

    /// Atomic check-and-set transition. Returns false when another actor
    /// won the race (the row was not in `from`).
    pub async fn transition_status(
        &self,
        id: &str,
        from: JobStatus,
        to: JobStatus,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE transcription_jobs SET status = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Terminal failure from any non-terminal state; a no-op once the job
    /// is already terminal, which makes zombie recovery idempotent.
    pub async fn mark_failed(&self, id: &str, message: &str) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE transcription_jobs SET status = 'failed', error_message = ?, updated_at = ?
             WHERE id = ? AND status IN ('pending', 'processing', 'diarizing')",
        )
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_transcript(
        &self,
        id: &str,
        transcript: &TranscriptResult,
    ) -> StorageResult<()> {
        let json = serde_json::to_string(transcript)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let result = sqlx::query(
            "UPDATE transcription_jobs SET transcript = ?, error_message = NULL, updated_at = ?
             WHERE id = ?",
        )
        .bind(&json)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    pub async fn update_summary(&self, id: &str, summary: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE transcription_jobs SET summary = ?, updated_at = ? WHERE id = ?",
        )
        .bind(summary)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    pub async fn update_title(&self, id: &str, user_id: i64, title: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE transcription_jobs SET title = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
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

    /// Soft delete. The row stays for delta-sync clients; notes, chat
    /// sessions, and summaries keep their references.
    pub async fn soft_delete(&self, id: &str, user_id: i64) -> StorageResult<()> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE transcription_jobs SET deleted_at = ?, updated_at = ?
             WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Explicit restart: failed → pending in one statement, clearing the
    /// previous attempt's outputs.
    pub async fn restart(&self, id: &str, user_id: i64) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE transcription_jobs
             SET status = 'pending', error_message = NULL, transcript = NULL, updated_at = ?
             WHERE id = ? AND user_id = ? AND status = 'failed' AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Boot-time recovery: every job persisted as running but absent from
    /// the live set is marked failed. Idempotent.
    pub async fn reset_zombies(&self, running: &[String]) -> StorageResult<u64> {
        let mut qb = QueryBuilder::new(
            "UPDATE transcription_jobs SET status = 'failed', error_message = ",
        );
        qb.push_bind(ZOMBIE_ERROR);
        qb.push(", updated_at = ").push_bind(Utc::now());
        qb.push(" WHERE status IN ('processing', 'diarizing')");
        if !running.is_empty() {
            qb.push(" AND id NOT IN (");
            let mut sep = qb.separated(", ");
            for id in running {
                sep.push_bind(id);
            }
            qb.push(")");
        }
        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    pub async fn count_by_status(&self, status: JobStatus) -> StorageResult<i64> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM transcription_jobs WHERE status = ? AND deleted_at IS NULL",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(n)
    }

    // ── Execution audit rows ───────────────────────────────────────

    pub async fn record_execution_start(
        &self,
        job_id: &str,
        stage: ExecutionStage,
    ) -> StorageResult<i64> {
        let result = sqlx::query(
            "INSERT INTO job_executions (job_id, stage, started_at) VALUES (?, ?, ?)",
        )
        .bind(job_id)
        .bind(stage.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn finish_execution(
        &self,
        execution_id: i64,
        exit_status: Option<i64>,
        stdout_tail: &str,
        stderr_tail: &str,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE job_executions
             SET finished_at = ?, exit_status = ?, stdout_tail = ?, stderr_tail = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(exit_status)
        .bind(stdout_tail)
        .bind(stderr_tail)
        .bind(execution_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_executions(&self, job_id: &str) -> StorageResult<Vec<JobExecution>> {
        let rows = sqlx::query_as::<_, JobExecution>(
            "SELECT * FROM job_executions WHERE job_id = ? ORDER BY started_at ASC",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
