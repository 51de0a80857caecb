//! Summary prompt templates.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use scriberr_domain::Error;

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub model: String,
    pub prompt: String,
}

fn validate(body: &TemplateRequest) -> ApiResult<()> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    if !body.prompt.contains("{{content}}") {
        return Err(bad_request("prompt must contain the {{content}} placeholder"));
    }
    Ok(())
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let templates = state.repos.templates.list_for_user(auth.user_id).await?;
    Ok(Json(serde_json::json!({ "templates": templates })))
}

pub async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&body)?;
    let template = state
        .repos
        .templates
        .create(
            auth.user_id,
            body.name.trim(),
            body.description.as_deref(),
            &body.model,
            &body.prompt,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let template = state
        .repos
        .templates
        .find_by_id(id, auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("template {id}")))?;
    Ok(Json(template))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<TemplateRequest>,
) -> ApiResult<impl IntoResponse> {
    validate(&body)?;
    state
        .repos
        .templates
        .update(
            id,
            auth.user_id,
            body.name.trim(),
            body.description.as_deref(),
            &body.model,
            &body.prompt,
        )
        .await?;
    Ok(Json(serde_json::json!({ "id": id })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.repos.templates.delete(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}
