//! Record types, one per aggregate root.
//!
//! Rows with JSON blobs or enum columns implement [`FromRow`] by hand so a
//! corrupt column surfaces as a decode error instead of a panic.

use chrono::{DateTime, Utc};
use scriberr_domain::{JobStatus, TranscriptResult, TranscriptionParams};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    /// Opaque random key, stored verbatim. Never serialized; the create
    /// handler returns it once, list responses use [`ApiKey::preview`].
    #[serde(skip_serializing)]
    pub key: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// First 8 chars + `"..."`, the only form list endpoints expose.
    pub fn preview(&self) -> String {
        let head: String = self.key.chars().take(8).collect();
        format!("{head}...")
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub token_digest: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transcription jobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionJob {
    pub id: String,
    pub user_id: i64,
    pub title: Option<String>,
    pub status: JobStatus,
    pub audio_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<TranscriptResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub diarization: bool,
    pub parameters: TranscriptionParams,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set only for soft-deleted rows, surfaced to delta-sync clients.
    pub deleted_at: Option<DateTime<Utc>>,
}

fn decode_err(
    column: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.into(),
        source: Box::new(source),
    }
}

#[derive(Debug)]
struct BadEnum(String);

impl std::fmt::Display for BadEnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unrecognized value: {}", self.0)
    }
}

impl std::error::Error for BadEnum {}

impl FromRow<'_, SqliteRow> for TranscriptionJob {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status = JobStatus::parse(&status_raw)
            .ok_or_else(|| decode_err("status", BadEnum(status_raw)))?;

        let params_raw: String = row.try_get("parameters")?;
        let parameters: TranscriptionParams =
            serde_json::from_str(&params_raw).map_err(|e| decode_err("parameters", e))?;

        let transcript: Option<TranscriptResult> = row
            .try_get::<Option<String>, _>("transcript")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| decode_err("transcript", e))?;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            status,
            audio_path: row.try_get("audio_path")?,
            transcript,
            summary: row.try_get("summary")?,
            diarization: row.try_get("diarization")?,
            parameters,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            deleted_at: row.try_get("deleted_at")?,
        })
    }
}

/// One pipeline stage attempt, kept for retry history.
#[derive(Debug, Clone, Serialize)]
pub struct JobExecution {
    pub id: i64,
    pub job_id: String,
    pub stage: ExecutionStage,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_status: Option<i64>,
    pub stdout_tail: Option<String>,
    pub stderr_tail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Transcription,
    Diarization,
}

impl ExecutionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Diarization => "diarization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcription" => Some(Self::Transcription),
            "diarization" => Some(Self::Diarization),
            _ => None,
        }
    }
}

impl FromRow<'_, SqliteRow> for JobExecution {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let stage_raw: String = row.try_get("stage")?;
        let stage = ExecutionStage::parse(&stage_raw)
            .ok_or_else(|| decode_err("stage", BadEnum(stage_raw)))?;
        Ok(Self {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            stage,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            exit_status: row.try_get("exit_status")?,
            stdout_tail: row.try_get("stdout_tail")?,
            stderr_tail: row.try_get("stderr_tail")?,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Profiles & notes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionProfile {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub parameters: TranscriptionParams,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for TranscriptionProfile {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let params_raw: String = row.try_get("parameters")?;
        let parameters: TranscriptionParams =
            serde_json::from_str(&params_raw).map_err(|e| decode_err("parameters", e))?;
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            is_default: row.try_get("is_default")?,
            parameters,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Note {
    pub id: i64,
    pub user_id: i64,
    pub job_id: String,
    pub start_word_index: i64,
    pub end_word_index: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub quote: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM plane
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SummaryTemplate {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub model: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Summary {
    pub transcription_id: String,
    pub user_id: i64,
    pub model: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Openai,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "openai" => Some(Self::Openai),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }
}

/// Process-wide provider binding; at most one row has `is_active = true`.
#[derive(Debug, Clone, Serialize)]
pub struct LlmProviderConfig {
    pub id: i64,
    pub provider: LlmProvider,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for LlmProviderConfig {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let provider_raw: String = row.try_get("provider")?;
        let provider = LlmProvider::parse(&provider_raw)
            .ok_or_else(|| decode_err("provider", BadEnum(provider_raw)))?;
        Ok(Self {
            id: row.try_get("id")?,
            provider,
            base_url: row.try_get("base_url")?,
            api_key: row.try_get("api_key")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatSession {
    pub id: i64,
    pub user_id: i64,
    pub transcription_id: String,
    pub title: String,
    pub model: String,
    pub provider: String,
    pub is_active: bool,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub role: ChatRole,
    pub content: String,
    /// Strictly increasing per session.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ChatMessage {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let role_raw: String = row.try_get("role")?;
        let role =
            ChatRole::parse(&role_raw).ok_or_else(|| decode_err("role", BadEnum(role_raw)))?;
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            role,
            content: row.try_get("content")?,
            seq: row.try_get("seq")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SpeakerMapping {
    pub job_id: String,
    pub speaker_id: String,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_preview_truncates() {
        let key = ApiKey {
            id: 1,
            user_id: 1,
            key: "sk-scriberr-abcdefghijkl".into(),
            name: "test".into(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_used: None,
        };
        assert_eq!(key.preview(), "sk-scrib...");
    }

    #[test]
    fn api_key_serialization_omits_key() {
        let key = ApiKey {
            id: 1,
            user_id: 1,
            key: "sk-scriberr-secret".into(),
            name: "test".into(),
            description: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_used: None,
        };
        let json = serde_json::to_string(&key).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"name\":\"test\""));
    }

    #[test]
    fn user_serialization_omits_password_hash() {
        let user = User {
            id: 1,
            username: "alice".into(),
            password_hash: "$argon2id$v=19$secret".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn chat_role_roundtrip() {
        for role in [ChatRole::System, ChatRole::User, ChatRole::Assistant] {
            assert_eq!(ChatRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(ChatRole::parse("tool"), None);
    }

    #[test]
    fn llm_provider_roundtrip() {
        assert_eq!(LlmProvider::parse("openai"), Some(LlmProvider::Openai));
        assert_eq!(LlmProvider::parse("ollama"), Some(LlmProvider::Ollama));
        assert_eq!(LlmProvider::parse("azure"), None);
    }
}
