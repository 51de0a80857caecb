//! Bounded FIFO task queue and worker pool.
//!
//! Enqueue order is dequeue order across the pool; completion order is
//! not guaranteed. The `running` map carries one cancellation token per
//! in-flight job and is the authority for `kill` and zombie recovery; no
//! two workers can hold the same job id because claiming is an atomic
//! status transition in the store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use scriberr_domain::{Error, JobStatus, Result};
use scriberr_storage::jobs::JobRepo;

use crate::processor::JobProcessor;

const MAX_DEFAULT_WORKERS: usize = 8;

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub current_workers: usize,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
}

struct QueueInner {
    tx: mpsc::Sender<String>,
    /// Workers share the single consumer end.
    rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    running: parking_lot::Mutex<HashMap<String, CancellationToken>>,
    accepting: AtomicBool,
    shutdown: CancellationToken,
    capacity: usize,
    workers: usize,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    processor: Arc<JobProcessor>,
    jobs: JobRepo,
}

#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new(
        processor: Arc<JobProcessor>,
        jobs: JobRepo,
        capacity: usize,
        workers: Option<usize>,
    ) -> Self {
        let workers = workers.unwrap_or_else(|| num_cpus::get().min(MAX_DEFAULT_WORKERS).max(1));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx: tokio::sync::Mutex::new(rx),
                running: parking_lot::Mutex::new(HashMap::new()),
                accepting: AtomicBool::new(true),
                shutdown: CancellationToken::new(),
                capacity: capacity.max(1),
                workers,
                handles: parking_lot::Mutex::new(Vec::new()),
                processor,
                jobs,
            }),
        }
    }

    /// Push a job id for processing. Rejects with `queue_full` at
    /// capacity and `shutting_down` once [`TaskQueue::stop`] has begun.
    pub fn enqueue(&self, job_id: &str) -> Result<()> {
        if !self.inner.accepting.load(Ordering::Acquire) {
            return Err(Error::ShuttingDown);
        }
        match self.inner.tx.try_send(job_id.to_string()) {
            Ok(()) => {
                tracing::debug!(job_id = %job_id, "job enqueued");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(Error::QueueFull),
            Err(TrySendError::Closed(_)) => Err(Error::ShuttingDown),
        }
    }

    /// Launch the worker pool.
    pub fn start(&self) {
        let mut handles = self.inner.handles.lock();
        for worker_id in 0..self.inner.workers {
            let inner = self.inner.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(inner, worker_id).await;
            }));
        }
        tracing::info!(workers = self.inner.workers, capacity = self.inner.capacity, "worker pool started");
    }

    /// Refuse new enqueues, let in-flight jobs finish, and join the
    /// workers, bounded by `timeout`.
    pub async fn stop(&self, timeout: Duration) {
        self.inner.accepting.store(false, Ordering::Release);
        self.inner.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().drain(..).collect();
        let deadline = tokio::time::Instant::now() + timeout;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                tracing::warn!("worker did not finish within the shutdown window");
            }
        }
        tracing::info!("worker pool stopped");
    }

    /// Cancel a running job. Consults only the running map — a job that
    /// is merely queued or already terminal is `not_found` here.
    pub fn kill_job(&self, job_id: &str) -> Result<()> {
        match self.inner.running.lock().get(job_id) {
            Some(token) => {
                tracing::info!(job_id = %job_id, "kill requested");
                token.cancel();
                Ok(())
            }
            None => Err(Error::NotFound(format!("job {job_id} is not running"))),
        }
    }

    pub fn is_job_running(&self, job_id: &str) -> bool {
        self.inner.running.lock().contains_key(job_id)
    }

    pub async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>> {
        let job = self.inner.jobs.find_by_id(job_id).await.map_err(Error::from)?;
        Ok(job.map(|j| j.status))
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let jobs = &self.inner.jobs;
        let processing = jobs
            .count_by_status(JobStatus::Processing)
            .await
            .map_err(Error::from)?
            + jobs
                .count_by_status(JobStatus::Diarizing)
                .await
                .map_err(Error::from)?;
        Ok(QueueStats {
            queue_size: self.inner.capacity - self.inner.tx.capacity(),
            queue_capacity: self.inner.capacity,
            current_workers: self.inner.workers,
            pending_jobs: jobs
                .count_by_status(JobStatus::Pending)
                .await
                .map_err(Error::from)?,
            processing_jobs: processing,
            completed_jobs: jobs
                .count_by_status(JobStatus::Completed)
                .await
                .map_err(Error::from)?,
            failed_jobs: jobs
                .count_by_status(JobStatus::Failed)
                .await
                .map_err(Error::from)?,
        })
    }

    /// Startup recovery: any job persisted as running with no live worker
    /// was interrupted by an abnormal shutdown. Idempotent.
    pub async fn reset_zombie_jobs(&self) -> Result<u64> {
        let running: Vec<String> = self.inner.running.lock().keys().cloned().collect();
        let reset = self
            .inner
            .jobs
            .reset_zombies(&running)
            .await
            .map_err(Error::from)?;
        if reset > 0 {
            tracing::warn!(count = reset, "reset zombie jobs from previous run");
        }
        Ok(reset)
    }
}

async fn worker_loop(inner: Arc<QueueInner>, worker_id: usize) {
    loop {
        let job_id = tokio::select! {
            // Shutdown: drain what is already queued, then exit. The
            // stop timeout bounds how long this drain may take.
            _ = inner.shutdown.cancelled() => {
                match inner.rx.lock().await.try_recv() {
                    Ok(id) => id,
                    Err(_) => break,
                }
            }
            job = async { inner.rx.lock().await.recv().await } => match job {
                Some(id) => id,
                None => break,
            },
        };

        let token = CancellationToken::new();
        inner.running.lock().insert(job_id.clone(), token.clone());
        tracing::debug!(worker = worker_id, job_id = %job_id, "worker picked up job");

        // The processor owns terminal status and the terminal broadcast;
        // errors here are already persisted on the job row.
        if let Err(e) = inner.processor.process(&job_id, &token).await {
            tracing::debug!(worker = worker_id, job_id = %job_id, error = %e, "job ended with error");
        }

        inner.running.lock().remove(&job_id);
    }
    tracing::debug!(worker = worker_id, "worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ProgressBroadcaster;
    use scriberr_adapters::{AdapterRegistry, CommandSpec, TranscriptionAdapter};
    use scriberr_domain::params::ModelCapability;
    use scriberr_domain::{TranscriptResult, TranscriptionParams};
    use scriberr_storage::users::UserRepo;
    use scriberr_storage::Database;
    use std::path::Path;

    /// Shell-backed engine: sleeps, then emits a one-segment transcript.
    struct SleepEngine {
        delay_secs: u32,
    }

    impl TranscriptionAdapter for SleepEngine {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn supported_models(&self) -> Vec<ModelCapability> {
            Vec::new()
        }

        fn build_command(
            &self,
            _params: &TranscriptionParams,
            _audio: &Path,
            output_dir: &Path,
        ) -> CommandSpec {
            let script = format!(
                "sleep {}; printf '%s' '{}' > '{}'",
                self.delay_secs,
                r#"{"language":"en","segments":[{"start":0.0,"end":1.0,"text":"ok","words":[]}]}"#,
                output_dir.join("result.json").display()
            );
            CommandSpec::new("/bin/sh").args(["-c", &script])
        }

        fn parse_output(&self, output_dir: &Path) -> scriberr_domain::Result<TranscriptResult> {
            let raw = std::fs::read_to_string(output_dir.join("result.json"))?;
            serde_json::from_str(&raw)
                .map_err(|e| scriberr_domain::Error::EngineFailed(e.to_string()))
        }

        fn progress_decoder(&self) -> Box<dyn scriberr_adapters::ProgressDecoder> {
            Box::new(scriberr_adapters::progress::NoProgress)
        }
    }

    struct Rig {
        queue: TaskQueue,
        jobs: JobRepo,
        user_id: i64,
        _tmp: tempfile::TempDir,
    }

    async fn rig(delay_secs: u32, capacity: usize, workers: usize) -> Rig {
        let tmp = tempfile::tempdir().unwrap();
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let jobs = JobRepo::new(pool);

        let registry = Arc::new(AdapterRegistry::new());
        registry.register_transcription(Arc::new(SleepEngine { delay_secs }));

        let processor = Arc::new(JobProcessor::new(
            jobs.clone(),
            registry,
            Arc::new(ProgressBroadcaster::new()),
            tmp.path().join("temp"),
            tmp.path().join("transcripts"),
            false,
        ));

        Rig {
            queue: TaskQueue::new(processor, jobs.clone(), capacity, Some(workers)),
            jobs,
            user_id: user.id,
            _tmp: tmp,
        }
    }

    async fn submit(rig: &Rig) -> String {
        let mut params = TranscriptionParams::default();
        params.engine_name = "sleepy".into();
        rig.jobs
            .create(rig.user_id, None, "/dev/null", false, &params)
            .await
            .unwrap()
            .id
    }

    async fn wait_for_status(rig: &Rig, job_id: &str, status: JobStatus, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let current = rig.jobs.find_by_id(job_id).await.unwrap().unwrap().status;
            if current == status {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {job_id} stuck in {current}, wanted {status}"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    #[tokio::test]
    async fn overflow_rejects_with_queue_full() {
        // Workers never started, so the channel fills.
        let rig = rig(0, 3, 1).await;
        for _ in 0..3 {
            let id = submit(&rig).await;
            rig.queue.enqueue(&id).unwrap();
        }
        let overflow = submit(&rig).await;
        let err = rig.queue.enqueue(&overflow).unwrap_err();
        assert_eq!(err.kind(), "queue_full");
    }

    #[tokio::test]
    async fn stop_rejects_with_shutting_down() {
        let rig = rig(0, 4, 1).await;
        rig.queue.start();
        rig.queue.stop(Duration::from_secs(5)).await;

        let id = submit(&rig).await;
        let err = rig.queue.enqueue(&id).unwrap_err();
        assert_eq!(err.kind(), "shutting_down");
    }

    #[tokio::test]
    async fn workers_drain_jobs_to_terminal_states() {
        let rig = rig(0, 16, 2).await;
        rig.queue.start();

        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = submit(&rig).await;
            rig.queue.enqueue(&id).unwrap();
            ids.push(id);
        }
        for id in &ids {
            wait_for_status(&rig, id, JobStatus::Completed, Duration::from_secs(20)).await;
        }

        let stats = rig.queue.stats().await.unwrap();
        assert_eq!(stats.completed_jobs, 4);
        assert_eq!(stats.pending_jobs, 0);
        assert_eq!(stats.current_workers, 2);
        rig.queue.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn stop_drains_already_queued_jobs() {
        let rig = rig(0, 16, 1).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = submit(&rig).await;
            rig.queue.enqueue(&id).unwrap();
            ids.push(id);
        }

        rig.queue.start();
        rig.queue.stop(Duration::from_secs(30)).await;

        for id in &ids {
            let status = rig.jobs.find_by_id(id).await.unwrap().unwrap().status;
            assert!(status.is_terminal(), "job {id} left in {status}");
        }
    }

    #[tokio::test]
    async fn kill_cancels_a_running_job() {
        let rig = rig(30, 4, 1).await;
        rig.queue.start();
        let id = submit(&rig).await;
        rig.queue.enqueue(&id).unwrap();

        // Wait for the worker to pick it up.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !rig.queue.is_job_running(&id) {
            assert!(tokio::time::Instant::now() < deadline, "job never started");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        rig.queue.kill_job(&id).unwrap();
        wait_for_status(&rig, &id, JobStatus::Failed, Duration::from_secs(10)).await;
        let job = rig.jobs.find_by_id(&id).await.unwrap().unwrap();
        assert!(job.error_message.unwrap().contains("cancel"));
        assert!(!rig.queue.is_job_running(&id));
        rig.queue.stop(Duration::from_secs(5)).await;
    }

    #[tokio::test]
    async fn kill_unknown_job_is_not_found() {
        let rig = rig(0, 4, 1).await;
        let err = rig.queue.kill_job("nope").unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn zombie_reset_spares_live_jobs() {
        let rig = rig(0, 4, 1).await;

        // A zombie from a previous run: persisted processing, not in the
        // running map.
        let zombie = submit(&rig).await;
        rig.jobs
            .transition_status(&zombie, JobStatus::Pending, JobStatus::Processing)
            .await
            .unwrap();

        assert_eq!(rig.queue.reset_zombie_jobs().await.unwrap(), 1);
        let job = rig.jobs.find_by_id(&zombie).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job
            .error_message
            .unwrap()
            .contains("interrupted by server restart"));

        // Idempotent.
        assert_eq!(rig.queue.reset_zombie_jobs().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_reflect_queue_depth() {
        let rig = rig(0, 8, 1).await;
        for _ in 0..3 {
            let id = submit(&rig).await;
            rig.queue.enqueue(&id).unwrap();
        }
        let stats = rig.queue.stats().await.unwrap();
        assert_eq!(stats.queue_size, 3);
        assert_eq!(stats.queue_capacity, 8);
        assert_eq!(stats.pending_jobs, 3);
    }
}
