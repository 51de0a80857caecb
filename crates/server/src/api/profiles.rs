//! Saved transcription profiles.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use scriberr_domain::{Error, TranscriptionParams};

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: TranscriptionParams,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let profiles = state.repos.profiles.list_for_user(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "profiles": profiles })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    let profile = state
        .repos
        .profiles
        .create(
            auth.user_id,
            body.name.trim(),
            body.description.as_deref(),
            &body.parameters,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let profile = state
        .repos
        .profiles
        .find_by_id(id, auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("profile {id}")))?;
    Ok(Json(profile))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<ProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    state
        .repos
        .profiles
        .update(
            id,
            auth.user_id,
            body.name.trim(),
            body.description.as_deref(),
            &body.parameters,
        )
        .await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn set_default(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.repos.profiles.set_default(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "id": id, "is_default": true })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.repos.profiles.delete(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}
