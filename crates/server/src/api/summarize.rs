//! Summarization and the LLM provider binding.
//!
//! `POST /summarize/` streams the reply as chunked text/plain (the
//! legacy shape, deliberately not SSE) and upserts the `Summary` row when
//! the stream completes.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use futures_util::StreamExt;
use serde::Deserialize;

use scriberr_domain::Error;
use scriberr_llm::Message;
use scriberr_storage::LlmProvider;

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::llm::resolve_client;
use crate::state::AppState;

use super::transcription::load_owned_job;

const DEFAULT_PROMPT: &str =
    "Summarize the following transcript concisely, keeping key decisions \
     and action items:\n\n{{content}}";

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub transcription_id: String,
    #[serde(default)]
    pub template_id: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/summarize/
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn summarize(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<SummarizeRequest>,
) -> ApiResult<Response> {
    let job = load_owned_job(&state, &auth, &body.transcription_id).await?;
    let transcript = job
        .transcript
        .ok_or_else(|| Error::Conflict("transcription has no transcript yet".into()))?;

    let (prompt, template_model) = match body.template_id {
        Some(id) => {
            let template = state
                .repos
                .templates
                .find_by_id(id, auth.user_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("template {id}")))?;
            (template.prompt, Some(template.model))
        }
        None => (DEFAULT_PROMPT.to_string(), None),
    };

    let resolved = resolve_client(&state).await?;
    let model = body
        .model
        .or(template_model)
        .or(resolved.default_model)
        .ok_or_else(|| bad_request("model is required (no default configured)"))?;

    let rendered = prompt.replace("{{content}}", &transcript.plain_text());
    let upstream = resolved
        .client
        .chat_completion_stream(&model, &[Message::user(rendered)], 0.3)
        .await?;

    let repos = state.repos.clone();
    let job_id = job.id.clone();
    let user_id = auth.user_id;
    let body_stream = async_stream::stream! {
        let mut upstream = upstream;
        let mut summary = String::new();
        while let Some(item) = upstream.next().await {
            match item {
                Ok(delta) => {
                    summary.push_str(&delta);
                    yield Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(delta));
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "summarize stream failed upstream");
                    yield Ok(axum::body::Bytes::from(format!("\n[stream error: {e}]")));
                    return;
                }
            }
        }
        if summary.is_empty() {
            return;
        }
        if let Err(e) = repos.summaries.upsert(&job_id, user_id, &model, &summary).await {
            tracing::error!(job_id = %job_id, error = %e, "failed to persist summary");
        }
        if let Err(e) = repos.jobs.update_summary(&job_id, &summary).await {
            tracing::error!(job_id = %job_id, error = %e, "failed to stamp summary on job");
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/transcription/:id/summary
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_summary(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    let summary = state
        .repos
        .summaries
        .find_for_transcription(&job_id, auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("no summary for this transcription".into()))?;
    Ok(Json(summary))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider binding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct LlmConfigRequest {
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

pub async fn get_llm_config(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    match state.repos.llm_configs.find_active().await? {
        Some(config) => Ok(Json(serde_json::json!({ "config": config }))),
        None => Ok(Json(serde_json::json!({ "config": null }))),
    }
}

pub async fn set_llm_config(
    State(state): State<AppState>,
    Json(body): Json<LlmConfigRequest>,
) -> ApiResult<impl IntoResponse> {
    let provider = LlmProvider::parse(&body.provider)
        .ok_or_else(|| bad_request("provider must be \"openai\" or \"ollama\""))?;
    let config = state
        .repos
        .llm_configs
        .set_active(provider, body.base_url.as_deref(), body.api_key.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "config": config })))
}
