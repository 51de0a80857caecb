//! Chat over a completed transcription.
//!
//! Replies stream back as raw chunked text (not SSE) — the legacy wire
//! shape clients already consume. The user/assistant exchange is
//! persisted in one transaction when the stream finishes.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use futures_util::StreamExt;
use serde::Deserialize;

use scriberr_domain::{Error, JobStatus};
use scriberr_llm::Message;
use scriberr_storage::{ChatRole, ChatSession};

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::llm::resolve_client;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub transcription_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

async fn load_session(
    state: &AppState,
    auth: &AuthUser,
    session_id: i64,
) -> ApiResult<ChatSession> {
    state
        .repos
        .chat
        .find_session(session_id, auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("chat session {session_id}")).into())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/chat/models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn models(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let resolved = resolve_client(&state).await?;
    let models = resolved.client.models().await?;
    Ok(Json(serde_json::json!({
        "provider": resolved.provider,
        "models": models,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session CRUD
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state.repos.chat.list_sessions(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

pub async fn sessions_for_transcription(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(transcription_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let sessions = state
        .repos
        .chat
        .list_sessions_for_transcription(&transcription_id, auth.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateSessionRequest>,
) -> ApiResult<impl IntoResponse> {
    let job = super::transcription::load_owned_job(&state, &auth, &body.transcription_id).await?;
    if job.status != JobStatus::Completed {
        return Err(Error::Conflict(
            "chat requires a completed transcription".into(),
        )
        .into());
    }

    let resolved = resolve_client(&state).await?;
    let model = body
        .model
        .or(resolved.default_model)
        .ok_or_else(|| bad_request("model is required (no default configured)"))?;
    let title = body
        .title
        .or_else(|| job.title.clone())
        .unwrap_or_else(|| "New chat".into());

    let session = state
        .repos
        .chat
        .create_session(auth.user_id, &job.id, &title, &model, resolved.provider)
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let session = load_session(&state, &auth, session_id).await?;
    let messages = state.repos.chat.list_messages(session.id).await?;
    Ok(Json(serde_json::json!({
        "session": session,
        "messages": messages,
    })))
}

pub async fn update_session_title(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<i64>,
    Json(body): Json<TitleRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }
    state
        .repos
        .chat
        .update_title(session_id, auth.user_id, body.title.trim())
        .await?;
    Ok(Json(serde_json::json!({ "id": session_id })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state
        .repos
        .chat
        .delete_session(session_id, auth.user_id)
        .await?;
    Ok(Json(serde_json::json!({ "id": session_id, "deleted": true })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/chat/sessions/:id/messages (streams raw chunks)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(session_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<Response> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session = load_session(&state, &auth, session_id).await?;
    let job = super::transcription::load_owned_job(&state, &auth, &session.transcription_id).await?;
    let transcript = job
        .transcript
        .ok_or_else(|| Error::Conflict("transcription has no transcript".into()))?;

    // Full history: transcript as system context, then the stored
    // conversation, then the new user message.
    let mut messages = vec![Message::system(format!(
        "You are discussing an audio transcript with the user. \
         Answer from the transcript below.\n\n{}",
        transcript.plain_text()
    ))];
    for stored in state.repos.chat.list_messages(session.id).await? {
        messages.push(Message {
            role: match stored.role {
                ChatRole::System => scriberr_llm::Role::System,
                ChatRole::User => scriberr_llm::Role::User,
                ChatRole::Assistant => scriberr_llm::Role::Assistant,
            },
            content: stored.content,
        });
    }
    messages.push(Message::user(body.message.clone()));

    let resolved = resolve_client(&state).await?;
    let upstream = resolved
        .client
        .chat_completion_stream(&session.model, &messages, 0.7)
        .await?;

    // Forward deltas as they arrive; persist the exchange only when the
    // upstream finished cleanly.
    let repos = state.repos.clone();
    let user_message = body.message;
    let body_stream = async_stream::stream! {
        let mut upstream = upstream;
        let mut assistant = String::new();
        while let Some(item) = upstream.next().await {
            match item {
                Ok(delta) => {
                    assistant.push_str(&delta);
                    yield Ok::<_, std::convert::Infallible>(axum::body::Bytes::from(delta));
                }
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "chat stream failed upstream");
                    yield Ok(axum::body::Bytes::from(format!("\n[stream error: {e}]")));
                    return;
                }
            }
        }
        if let Err(e) = repos
            .chat
            .append_exchange(session_id, &user_message, &assistant)
            .await
        {
            tracing::error!(session_id, error = %e, "failed to persist chat exchange");
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
