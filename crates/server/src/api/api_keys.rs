//! API key management (session token only).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    pub is_active: bool,
}

/// List responses never carry the full key, only `key_preview`.
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let keys = state.repos.api_keys.list_for_user(auth.user_id).await?;
    let items: Vec<serde_json::Value> = keys
        .iter()
        .map(|k| {
            serde_json::json!({
                "id": k.id,
                "name": k.name,
                "description": k.description,
                "key_preview": k.preview(),
                "is_active": k.is_active,
                "created_at": k.created_at,
                "updated_at": k.updated_at,
                "last_used": k.last_used,
            })
        })
        .collect();
    Ok(Json(serde_json::json!({ "api_keys": items })))
}

/// The create response is the only place the full key appears.
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CreateKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    let key = state
        .repos
        .api_keys
        .create(auth.user_id, body.name.trim(), body.description.as_deref())
        .await?;

    Ok((
        axum::http::StatusCode::CREATED,
        Json(serde_json::json!({
            "id": key.id,
            "name": key.name,
            "description": key.description,
            "key": key.key,
            "is_active": key.is_active,
            "created_at": key.created_at,
        })),
    ))
}

pub async fn update_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateKeyRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .repos
        .api_keys
        .set_active(id, auth.user_id, body.is_active)
        .await?;
    Ok(Json(serde_json::json!({ "id": id, "is_active": body.is_active })))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.repos.api_keys.delete(id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "message": "deleted" })))
}
