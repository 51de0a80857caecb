//! The unified job processor: runs one transcription job end-to-end.
//!
//! A worker hands the processor a claimed-pending job id and a
//! cancellation token. The processor stages the job forward
//! (`processing`, optionally `diarizing`, then a terminal state), invokes
//! engine subprocesses built by the registered adapters, persists
//! artifacts and results, and publishes progress to the broadcaster. It
//! never panics: every unexpected condition lands the job in `failed`
//! with a diagnostic message.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use scriberr_adapters::AdapterRegistry;
use scriberr_domain::job::ProgressEvent;
use scriberr_domain::{Error, JobStatus, Result, TranscriptResult};
use scriberr_storage::jobs::JobRepo;
use scriberr_storage::{ExecutionStage, TranscriptionJob};

use crate::broadcast::ProgressBroadcaster;
use crate::subprocess::{run_command, RunOutcome};

/// Stderr carried into `error_message` and execution rows.
const STDERR_REPORT_CAP: usize = 4 * 1024;

/// Watchdog bounds: audio duration × 10, clamped.
const WATCHDOG_FLOOR_SECS: f64 = 120.0;
const WATCHDOG_CEILING_SECS: f64 = 6.0 * 3600.0;

pub struct JobProcessor {
    jobs: JobRepo,
    registry: Arc<AdapterRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    work_dir: PathBuf,
    transcripts_dir: PathBuf,
    keep_temp_on_failure: bool,
}

impl JobProcessor {
    pub fn new(
        jobs: JobRepo,
        registry: Arc<AdapterRegistry>,
        broadcaster: Arc<ProgressBroadcaster>,
        work_dir: PathBuf,
        transcripts_dir: PathBuf,
        keep_temp_on_failure: bool,
    ) -> Self {
        Self {
            jobs,
            registry,
            broadcaster,
            work_dir,
            transcripts_dir,
            keep_temp_on_failure,
        }
    }

    /// Execute one job. Terminal state and the terminal SSE event are
    /// guaranteed on every path out of this function once the job is
    /// claimed.
    pub async fn process(&self, job_id: &str, cancel: &CancellationToken) -> Result<()> {
        let job = self
            .jobs
            .find_by_id(job_id)
            .await
            .map_err(Error::from)?
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;

        // Rerunning a finished (or already claimed) job is refused;
        // restarts go through the explicit restart operation.
        if job.status != JobStatus::Pending {
            return Err(Error::Conflict(format!(
                "job {job_id} is {}, not pending",
                job.status
            )));
        }

        // Claim. Losing the compare-and-set means another worker owns the
        // job; that is not an error.
        if !self
            .jobs
            .transition_status(job_id, JobStatus::Pending, JobStatus::Processing)
            .await
            .map_err(Error::from)?
        {
            tracing::debug!(job_id = %job_id, "lost claim race, skipping");
            return Ok(());
        }
        self.broadcaster
            .publish(job_id, ProgressEvent::status(JobStatus::Processing));

        let result = self.run_pipeline(&job, cancel).await;
        let temp_root = self.work_dir.join(job_id);

        match result {
            Ok(()) => {
                remove_dir_quiet(&temp_root);
                self.broadcaster
                    .publish_terminal(job_id, ProgressEvent::status(JobStatus::Completed));
                tracing::info!(job_id = %job_id, "job completed");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(db_err) = self.jobs.mark_failed(job_id, &message).await {
                    tracing::error!(job_id = %job_id, error = %db_err, "failed to persist failure");
                }
                if self.keep_temp_on_failure {
                    tracing::info!(job_id = %job_id, dir = %temp_root.display(), "keeping temp dir for diagnostics");
                } else {
                    remove_dir_quiet(&temp_root);
                }
                self.broadcaster
                    .publish_terminal(job_id, ProgressEvent::failed(message.clone()));
                tracing::warn!(job_id = %job_id, error = %message, "job failed");
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, job: &TranscriptionJob, cancel: &CancellationToken) -> Result<()> {
        let job_id = job.id.as_str();
        let audio_path = PathBuf::from(&job.audio_path);
        let artifacts_dir = self.transcripts_dir.join(job_id);
        std::fs::create_dir_all(&artifacts_dir)?;

        // ── Transcription stage ────────────────────────────────────
        let adapter = self
            .registry
            .transcription(&job.parameters.engine_name)
            .ok_or_else(|| {
                Error::EngineFailed(format!(
                    "no transcription engine named {:?}",
                    job.parameters.engine_name
                ))
            })?;

        let stage_dir = self.stage_dir(job_id, "transcription")?;
        let spec = adapter.build_command(&job.parameters, &audio_path, &stage_dir);
        let decoder = adapter.progress_decoder();

        let outcome = self
            .run_stage(
                job_id,
                ExecutionStage::Transcription,
                JobStatus::Processing,
                &spec,
                decoder.as_ref(),
                &audio_path,
                cancel,
            )
            .await?;
        check_outcome("transcription", &outcome)?;

        persist_artifacts(&stage_dir, &artifacts_dir)?;
        let mut transcript = adapter.parse_output(&stage_dir)?;
        self.jobs
            .update_transcript(job_id, &transcript)
            .await
            .map_err(Error::from)?;

        // ── Diarization stage (optional) ───────────────────────────
        if job.diarization {
            if !self
                .jobs
                .transition_status(job_id, JobStatus::Processing, JobStatus::Diarizing)
                .await
                .map_err(Error::from)?
            {
                return Err(Error::Conflict(format!(
                    "job {job_id} left processing state mid-run"
                )));
            }
            self.broadcaster
                .publish(job_id, ProgressEvent::status(JobStatus::Diarizing));

            self.run_diarization(job, &audio_path, &artifacts_dir, &mut transcript, cancel)
                .await?;
        }

        // ── Completion ─────────────────────────────────────────────
        let final_from = if job.diarization {
            JobStatus::Diarizing
        } else {
            JobStatus::Processing
        };
        if !self
            .jobs
            .transition_status(job_id, final_from, JobStatus::Completed)
            .await
            .map_err(Error::from)?
        {
            return Err(Error::Conflict(format!(
                "job {job_id} left {final_from} state before completion"
            )));
        }
        Ok(())
    }

    async fn run_diarization(
        &self,
        job: &TranscriptionJob,
        audio_path: &Path,
        artifacts_dir: &Path,
        transcript: &mut TranscriptResult,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let job_id = job.id.as_str();
        let engine = job.parameters.diarization_engine.as_str();
        let adapter = self.registry.diarization(engine).ok_or_else(|| {
            Error::EngineFailed(format!("no diarization engine named {engine:?}"))
        })?;

        let stage_dir = self.stage_dir(job_id, "diarization")?;
        let spec = adapter.build_command(&job.parameters, audio_path, &stage_dir);
        let decoder = adapter.progress_decoder();

        let outcome = self
            .run_stage(
                job_id,
                ExecutionStage::Diarization,
                JobStatus::Diarizing,
                &spec,
                decoder.as_ref(),
                audio_path,
                cancel,
            )
            .await?;
        check_outcome("diarization", &outcome)?;

        persist_artifacts(&stage_dir, artifacts_dir)?;
        let turns = adapter.parse_output(&stage_dir)?;
        crate::align::align_speakers(transcript, &turns);
        self.jobs
            .update_transcript(job_id, transcript)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Run one engine subprocess with progress forwarding and an
    /// execution audit row around it.
    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        job_id: &str,
        stage: ExecutionStage,
        status: JobStatus,
        spec: &scriberr_adapters::CommandSpec,
        decoder: &dyn scriberr_adapters::ProgressDecoder,
        audio_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let execution_id = self
            .jobs
            .record_execution_start(job_id, stage)
            .await
            .map_err(Error::from)?;

        tracing::debug!(
            job_id = %job_id,
            stage = stage.as_str(),
            program = %spec.program.display(),
            "starting engine subprocess"
        );

        let outcome = run_command(spec, cancel, watchdog_for(audio_path), |line| {
            if let Some(pct) = decoder.decode(line) {
                self.broadcaster
                    .publish(job_id, ProgressEvent::progress(status, pct));
            }
        })
        .await?;

        if let Err(e) = self
            .jobs
            .finish_execution(
                execution_id,
                outcome.exit_code.map(i64::from),
                &tail_of(&outcome.stdout_tail),
                &tail_of(&outcome.stderr_tail),
            )
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "failed to record execution end");
        }

        Ok(outcome)
    }

    fn stage_dir(&self, job_id: &str, stage: &str) -> Result<PathBuf> {
        let dir = self.work_dir.join(job_id).join(stage);
        std::fs::create_dir_all(&dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(dir)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Map a finished subprocess to the stage result.
fn check_outcome(stage: &str, outcome: &RunOutcome) -> Result<()> {
    if outcome.cancelled {
        return Err(Error::EngineFailed(format!("{stage} cancelled by user")));
    }
    if outcome.timed_out {
        return Err(Error::EngineFailed(format!(
            "{stage} engine exceeded its watchdog timeout"
        )));
    }
    match outcome.exit_code {
        Some(0) => Ok(()),
        Some(code) => Err(Error::EngineFailed(format!(
            "{stage} engine exited with status {code}: {}",
            tail_of(&outcome.stderr_tail).trim_end()
        ))),
        None => Err(Error::EngineFailed(format!(
            "{stage} engine was killed by a signal: {}",
            tail_of(&outcome.stderr_tail).trim_end()
        ))),
    }
}

fn tail_of(text: &str) -> String {
    if text.len() <= STDERR_REPORT_CAP {
        return text.to_string();
    }
    let cut = text.len() - STDERR_REPORT_CAP;
    match text[cut..].find('\n') {
        Some(nl) => text[cut + nl + 1..].to_string(),
        None => text[cut..].to_string(),
    }
}

/// Copy stage artifacts into the kept transcripts directory so completed
/// jobs can be re-parsed without re-running the engine.
fn persist_artifacts(stage_dir: &Path, artifacts_dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(stage_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::copy(entry.path(), artifacts_dir.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn remove_dir_quiet(dir: &Path) {
    if dir.exists() {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to remove temp dir");
        }
    }
}

/// Watchdog: ten times the audio duration when it can be read cheaply
/// from a WAV header, clamped to [2 min, 6 h]; the ceiling alone when the
/// container is opaque.
fn watchdog_for(audio_path: &Path) -> Duration {
    match wav_duration_secs(audio_path) {
        Some(secs) => Duration::from_secs_f64(
            (secs * 10.0).clamp(WATCHDOG_FLOOR_SECS, WATCHDOG_CEILING_SECS),
        ),
        None => Duration::from_secs_f64(WATCHDOG_CEILING_SECS),
    }
}

/// Duration from a canonical RIFF/WAVE header: payload size over byte
/// rate. Returns `None` for anything that is not plainly WAV.
fn wav_duration_secs(path: &Path) -> Option<f64> {
    use std::io::Read;

    let mut file = std::fs::File::open(path).ok()?;
    let mut header = [0u8; 44];
    file.read_exact(&mut header).ok()?;
    if &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return None;
    }
    let byte_rate = u32::from_le_bytes([header[28], header[29], header[30], header[31]]);
    if byte_rate == 0 {
        return None;
    }
    let payload = file.metadata().ok()?.len().saturating_sub(44);
    Some(payload as f64 / byte_rate as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scriberr_adapters::{CommandSpec, DiarizationAdapter, TranscriptionAdapter};
    use scriberr_domain::params::ModelCapability;
    use scriberr_domain::{SpeakerTurn, TranscriptionParams};
    use scriberr_storage::users::UserRepo;
    use scriberr_storage::Database;

    /// Test engine backed by /bin/sh: emits a fixed artifact, optionally
    /// stalling first so cancellation can land.
    struct FakeEngine {
        delay_secs: u32,
        fail: bool,
    }

    impl TranscriptionAdapter for FakeEngine {
        fn name(&self) -> &str {
            "fake"
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
            let artifact = output_dir.join("result.json");
            let script = if self.fail {
                "echo 'model exploded' >&2; exit 9".to_string()
            } else {
                format!(
                    "sleep {}; printf '%s' '{}' > '{}'",
                    self.delay_secs,
                    r#"{"language":"en","segments":[{"start":0.0,"end":2.0,"text":"ask not","words":[{"start":0.0,"end":1.0,"word":"ask"},{"start":1.0,"end":2.0,"word":"not"}]}]}"#,
                    artifact.display()
                )
            };
            CommandSpec::new("/bin/sh").args(["-c", &script])
        }

        fn parse_output(&self, output_dir: &Path) -> scriberr_domain::Result<TranscriptResult> {
            let raw = std::fs::read_to_string(output_dir.join("result.json"))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::EngineFailed(format!("fake artifact: {e}")))
        }

        fn progress_decoder(&self) -> Box<dyn scriberr_adapters::ProgressDecoder> {
            Box::new(scriberr_adapters::progress::NoProgress)
        }
    }

    struct FakeDiarizer;

    impl DiarizationAdapter for FakeDiarizer {
        fn name(&self) -> &str {
            "fake-diarizer"
        }

        fn build_command(
            &self,
            _params: &TranscriptionParams,
            _audio: &Path,
            output_dir: &Path,
        ) -> CommandSpec {
            let artifact = output_dir.join("turns.json");
            let script = format!(
                "printf '%s' '{}' > '{}'",
                r#"[{"start":0.0,"end":1.0,"speaker":"SPEAKER_00"},{"start":1.0,"end":2.0,"speaker":"SPEAKER_01"}]"#,
                artifact.display()
            );
            CommandSpec::new("/bin/sh").args(["-c", &script])
        }

        fn parse_output(&self, output_dir: &Path) -> scriberr_domain::Result<Vec<SpeakerTurn>> {
            let raw = std::fs::read_to_string(output_dir.join("turns.json"))?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::EngineFailed(format!("fake turns: {e}")))
        }

        fn progress_decoder(&self) -> Box<dyn scriberr_adapters::ProgressDecoder> {
            Box::new(scriberr_adapters::progress::NoProgress)
        }
    }

    struct Harness {
        processor: JobProcessor,
        jobs: JobRepo,
        broadcaster: Arc<ProgressBroadcaster>,
        user_id: i64,
        _tmp: tempfile::TempDir,
    }

    async fn harness(engine: FakeEngine, diarizer: bool) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let pool = Database::in_memory().await.unwrap().pool();
        let user = UserRepo::new(pool.clone())
            .create("alice", "h")
            .await
            .unwrap();
        let jobs = JobRepo::new(pool);

        let registry = Arc::new(AdapterRegistry::new());
        registry.register_transcription(Arc::new(engine));
        if diarizer {
            registry.register_diarization(Arc::new(FakeDiarizer));
        }

        let broadcaster = Arc::new(ProgressBroadcaster::new());
        let processor = JobProcessor::new(
            jobs.clone(),
            registry,
            broadcaster.clone(),
            tmp.path().join("temp"),
            tmp.path().join("transcripts"),
            false,
        );

        Harness {
            processor,
            jobs,
            broadcaster,
            user_id: user.id,
            _tmp: tmp,
        }
    }

    fn fake_params(diarization_engine: &str) -> TranscriptionParams {
        let mut params = TranscriptionParams::default();
        params.engine_name = "fake".into();
        params.diarization_engine = diarization_engine.into();
        params
    }

    #[tokio::test]
    async fn happy_path_reaches_completed_with_transcript() {
        let h = harness(FakeEngine { delay_secs: 0, fail: false }, false).await;
        let job = h
            .jobs
            .create(h.user_id, Some("jfk"), "/dev/null", false, &fake_params("none"))
            .await
            .unwrap();
        let mut events = h.broadcaster.subscribe(&job.id);

        h.processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap();

        let fetched = h.jobs.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        assert!(fetched.error_message.is_none());
        let transcript = fetched.transcript.unwrap();
        assert_eq!(transcript.segments.len(), 1);
        assert!(transcript.segments[0].text.contains("ask"));

        // Observed status sequence is monotonic and ends with the
        // explicit terminal event.
        let mut statuses = Vec::new();
        while let Ok(event) = events.recv().await {
            statuses.push(event.status);
        }
        assert_eq!(statuses.first(), Some(&JobStatus::Processing));
        assert_eq!(statuses.last(), Some(&JobStatus::Completed));
    }

    #[tokio::test]
    async fn diarization_tags_every_segment() {
        let h = harness(FakeEngine { delay_secs: 0, fail: false }, true).await;
        let job = h
            .jobs
            .create(h.user_id, None, "/dev/null", true, &fake_params("fake-diarizer"))
            .await
            .unwrap();

        h.processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap();

        let fetched = h.jobs.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Completed);
        let transcript = fetched.transcript.unwrap();
        for segment in &transcript.segments {
            assert!(segment.speaker.is_some());
        }
        // Two speakers from the fake diarizer's turn list.
        let speakers: std::collections::HashSet<_> = transcript.segments[0]
            .words
            .iter()
            .filter_map(|w| w.speaker.clone())
            .collect();
        assert_eq!(speakers.len(), 2);
    }

    #[tokio::test]
    async fn engine_failure_lands_in_failed_with_stderr() {
        let h = harness(FakeEngine { delay_secs: 0, fail: true }, false).await;
        let job = h
            .jobs
            .create(h.user_id, None, "/dev/null", false, &fake_params("none"))
            .await
            .unwrap();

        let err = h
            .processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "engine_failed");

        let fetched = h.jobs.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        let message = fetched.error_message.unwrap();
        assert!(message.contains("status 9"));
        assert!(message.contains("model exploded"));

        // Audit row captured the attempt.
        let execs = h.jobs.list_executions(&job.id).await.unwrap();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].exit_status, Some(9));
    }

    #[tokio::test]
    async fn cancellation_fails_the_job_with_cancel_message() {
        let h = harness(FakeEngine { delay_secs: 30, fail: false }, false).await;
        let job = h
            .jobs
            .create(h.user_id, None, "/dev/null", false, &fake_params("none"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let err = h.processor.process(&job.id, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "engine_failed");

        let fetched = h.jobs.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert!(fetched.error_message.unwrap().contains("cancel"));
    }

    #[tokio::test]
    async fn unknown_engine_fails_the_job() {
        let h = harness(FakeEngine { delay_secs: 0, fail: false }, false).await;
        let mut params = fake_params("none");
        params.engine_name = "no-such-engine".into();
        let job = h
            .jobs
            .create(h.user_id, None, "/dev/null", false, &params)
            .await
            .unwrap();

        let err = h
            .processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "engine_failed");
        let fetched = h.jobs.find_by_id(&job.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert!(fetched
            .error_message
            .unwrap()
            .contains("no-such-engine"));
    }

    #[tokio::test]
    async fn completed_job_is_refused() {
        let h = harness(FakeEngine { delay_secs: 0, fail: false }, false).await;
        let job = h
            .jobs
            .create(h.user_id, None, "/dev/null", false, &fake_params("none"))
            .await
            .unwrap();

        h.processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap();
        let err = h
            .processor
            .process(&job.id, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn wav_duration_reads_canonical_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        // 44-byte canonical header, byte rate 32000, plus 64000 bytes of
        // payload = 2 seconds.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36u32 + 64000).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&16000u32.to_le_bytes()); // sample rate
        bytes.extend_from_slice(&32000u32.to_le_bytes()); // byte rate
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&64000u32.to_le_bytes());
        bytes.resize(44 + 64000, 0);
        std::fs::write(&path, &bytes).unwrap();

        let secs = wav_duration_secs(&path).unwrap();
        assert!((secs - 2.0).abs() < 0.01);
        // 2s × 10 is under the floor, so the floor applies.
        assert_eq!(watchdog_for(&path), Duration::from_secs_f64(120.0));
    }

    #[test]
    fn opaque_audio_gets_the_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ogg");
        std::fs::write(&path, b"OggS-not-a-wav-file-with-enough-bytes-to-read-header").unwrap();
        assert_eq!(
            watchdog_for(&path),
            Duration::from_secs_f64(WATCHDOG_CEILING_SECS)
        );
    }
}
