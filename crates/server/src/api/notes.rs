//! Transcript annotations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use scriberr_storage::notes::NoteDraft;

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

use super::transcription::load_owned_job;

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub start_word_index: i64,
    pub end_word_index: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub quote: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub content: String,
}

pub async fn list_for_job(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    let notes = state.repos.notes.list_for_job(&job_id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "notes": notes })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
    Json(body): Json<CreateNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.end_word_index < body.start_word_index || body.end_time < body.start_time {
        return Err(bad_request("note range is inverted"));
    }
    if body.content.trim().is_empty() {
        return Err(bad_request("content is required"));
    }
    load_owned_job(&state, &auth, &job_id).await?;

    let note = state
        .repos
        .notes
        .create(
            auth.user_id,
            &job_id,
            &NoteDraft {
                start_word_index: body.start_word_index,
                end_word_index: body.end_word_index,
                start_time: body.start_time,
                end_time: body.end_time,
                quote: body.quote,
                content: body.content,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateNoteRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.content.trim().is_empty() {
        return Err(bad_request("content is required"));
    }
    state
        .repos
        .notes
        .update_content(id, auth.user_id, &body.content)
        .await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.repos.notes.delete(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}
