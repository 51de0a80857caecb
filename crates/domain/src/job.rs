//! Transcription job status and the progress events published while a job
//! moves through the pipeline.

use serde::{Deserialize, Serialize};

/// Pipeline position of a transcription job.
///
/// Transitions only move forward along
/// `pending → processing → (diarizing →)? completed | failed`; terminal
/// states never revert. The storage layer enforces this with atomic
/// check-and-set updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Diarizing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Monotonic rank used to reject backward transitions.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Diarizing => 2,
            Self::Completed | Self::Failed => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Diarizing => "diarizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "diarizing" => Some(Self::Diarizing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress event for a job, published to SSE subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub status: JobStatus,
    /// 0.0–100.0 when the engine reports progress lines, absent otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            error: None,
        }
    }

    pub fn progress(status: JobStatus, pct: f32) -> Self {
        Self {
            status,
            progress: Some(pct.clamp(0.0, 100.0)),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: None,
            error: Some(message.into()),
        }
    }
}
