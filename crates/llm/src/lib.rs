//! Provider-agnostic LLM client.
//!
//! Speaks the OpenAI chat-completions wire format, which covers both
//! configured providers (OpenAI itself and Ollama's `/v1` endpoint).
//! Streaming decodes SSE chunks into plain content deltas; the stream
//! yields at most one `Err` and then ends, and dropping it tears down the
//! upstream connection.

pub mod sse;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use scriberr_domain::stream::BoxStream;
use scriberr_domain::{Error, Result};

/// Non-streaming completion timeout.
const COMPLETION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct LlmClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Upstream(format!("http client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// OpenAI with the platform base URL.
    pub fn openai(api_key: Option<String>, base_url: Option<&str>) -> Result<Self> {
        Self::new(base_url.unwrap_or("https://api.openai.com/v1"), api_key)
    }

    /// Ollama's OpenAI-compatible endpoint; no key required.
    pub fn ollama(base_url: Option<&str>) -> Result<Self> {
        let base = base_url.unwrap_or("http://localhost:11434");
        Self::new(format!("{}/v1", base.trim_end_matches('/')), None)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }
        builder
    }

    fn chat_body(model: &str, messages: &[Message], temperature: f32, stream: bool) -> Value {
        serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": stream,
        })
    }

    // ── Models ─────────────────────────────────────────────────────

    pub async fn models(&self) -> Result<Vec<String>> {
        let mut builder = self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(COMPLETION_TIMEOUT);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Upstream(format!("HTTP {status} - {body}")));
        }

        let mut ids: Vec<String> = body
            .get("data")
            .and_then(|d| d.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        Ok(ids)
    }

    // ── Chat ───────────────────────────────────────────────────────

    /// Non-streaming completion, returned whole.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<String> {
        let resp = self
            .post("/chat/completions")
            .timeout(COMPLETION_TIMEOUT)
            .json(&Self::chat_body(model, messages, temperature, false))
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::Upstream(format!("HTTP {status} - {text}")));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Upstream(format!("malformed response: {e}")))?;
        body.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(String::from)
            .ok_or_else(|| Error::Upstream("no content in completion".into()))
    }

    /// Streaming completion: a stream of decoded content deltas.
    pub async fn chat_completion_stream(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let resp = self
            .post("/chat/completions")
            .json(&Self::chat_body(model, messages, temperature, true))
            .send()
            .await
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .map_err(|e| Error::Upstream(e.to_string()))?;
            return Err(Error::Upstream(format!("HTTP {status} - {text}")));
        }

        Ok(sse::delta_stream(resp))
    }
}

/// Extract the content delta from one decoded SSE payload, if any.
/// Returns `None` for housekeeping chunks (role preludes, finish
/// markers, usage reports).
pub(crate) fn parse_delta(data: &str) -> Option<Result<String>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(Error::Upstream(format!("malformed chunk: {e}")))),
    };

    // Some providers surface mid-stream errors as a JSON object.
    if let Some(err) = v.get("error") {
        let message = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("provider error");
        return Some(Err(Error::Upstream(message.to_string())));
    }

    let delta = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .and_then(|choice| choice.get("delta"))?;

    let text = delta.get("content").and_then(|c| c.as_str())?;
    if text.is_empty() {
        return None;
    }
    Some(Ok(text.to_string()))
}
