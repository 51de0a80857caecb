//! Auth endpoints — registration, login, session management, and the CLI
//! pairing flow.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::Extension;
use serde::Deserialize;

use scriberr_domain::Error;

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shapes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUsernameRequest {
    pub new_username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CliAuthorizeRequest {
    pub callback_url: String,
    pub device_name: String,
}

fn validate_credentials(username: &str, password: &str) -> ApiResult<()> {
    if username.trim().is_empty() || !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(bad_request(
            "username must be non-empty and alphanumeric (underscores allowed)",
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/auth/register
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    if !state.config.auth.registration_enabled {
        return Err(Error::Forbidden("registration is disabled".into()).into());
    }
    validate_credentials(&body.username, &body.password)?;

    let hash = state.auth.hash_password(&body.password)?;
    let user = state.repos.users.create(&body.username, &hash).await?;
    let token = state.auth.issue_token(&user, false)?;
    let refresh_token = state.auth.issue_refresh_token(user.id).await?;

    tracing::info!(username = %user.username, "user registered");
    Ok(Json(serde_json::json!({
        "user": user,
        "token": token,
        "refresh_token": refresh_token,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/auth/login
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state.repos.users.find_by_username(&body.username).await?;

    // Verify against the real hash when the user exists, otherwise burn
    // equivalent time; a username probe costs the same either way.
    let valid = match &user {
        Some(user) => state.auth.verify_password(&user.password_hash, &body.password),
        None => state.auth.verify_password("", &body.password),
    };
    let user = match (user, valid) {
        (Some(user), true) => user,
        _ => return Err(Error::Unauthenticated("invalid username or password".into()).into()),
    };

    let token = state.auth.issue_token(&user, false)?;
    let refresh_token = state.auth.issue_refresh_token(user.id).await?;
    Ok(Json(serde_json::json!({
        "user": user,
        "token": token,
        "refresh_token": refresh_token,
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/auth/refresh, /logout, GET /registration-status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, token) = state.auth.refresh_session(&body.refresh_token).await?;
    Ok(Json(serde_json::json!({ "user": user, "token": token })))
}

/// Always 200; revoking an unknown token is indistinguishable from
/// revoking a valid one.
pub async fn logout(
    State(state): State<AppState>,
    body: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    if let Some(Json(LogoutRequest {
        refresh_token: Some(token),
    })) = body
    {
        if let Err(e) = state.auth.revoke_refresh_token(&token).await {
            tracing::debug!(error = %e, "logout revocation failed");
        }
    }
    Json(serde_json::json!({ "message": "logged out" }))
}

pub async fn registration_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "registration_enabled": state.config.auth.registration_enabled,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Account management (session token only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.new_password != body.confirm_password {
        return Err(bad_request("new password and confirmation do not match"));
    }
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = state
        .repos
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("user".into()))?;
    if !state
        .auth
        .verify_password(&user.password_hash, &body.current_password)
    {
        return Err(Error::Unauthenticated("current password is incorrect".into()).into());
    }

    let hash = state.auth.hash_password(&body.new_password)?;
    state.repos.users.update_password(user.id, &hash).await?;
    Ok(Json(serde_json::json!({ "message": "password changed" })))
}

pub async fn change_username(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<ChangeUsernameRequest>,
) -> ApiResult<impl IntoResponse> {
    validate_credentials(&body.new_username, &"x".repeat(MIN_PASSWORD_LEN))?;

    let user = state
        .repos
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("user".into()))?;
    if !state.auth.verify_password(&user.password_hash, &body.password) {
        return Err(Error::Unauthenticated("password is incorrect".into()).into());
    }

    state
        .repos
        .users
        .update_username(user.id, &body.new_username)
        .await?;
    let user = state
        .repos
        .users
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| Error::NotFound("user".into()))?;
    let token = state.auth.issue_token(&user, false)?;
    Ok(Json(serde_json::json!({ "user": user, "token": token })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLI pairing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// GET — identifies the session for the CLI's confirmation screen.
pub async fn cli_authorize_info(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .repos
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("user".into()))?;
    Ok(Json(serde_json::json!({ "user": user })))
}

/// POST — mints a long-lived token and hands back the redirect carrying
/// it to the device.
pub async fn cli_authorize(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Json(body): Json<CliAuthorizeRequest>,
) -> ApiResult<impl IntoResponse> {
    if !body.callback_url.starts_with("http://") && !body.callback_url.starts_with("https://") {
        return Err(bad_request("callback_url must be an http(s) URL"));
    }
    if body.device_name.trim().is_empty() {
        return Err(bad_request("device_name is required"));
    }

    let user = state
        .repos
        .users
        .find_by_id(auth.user_id)
        .await?
        .ok_or_else(|| Error::NotFound("user".into()))?;
    let token = state.auth.issue_token(&user, true)?;

    let separator = if body.callback_url.contains('?') { '&' } else { '?' };
    let redirect_url = format!("{}{}token={}", body.callback_url, separator, token);

    tracing::info!(username = %user.username, device = %body.device_name, "CLI device paired");
    Ok(Json(serde_json::json!({ "redirect_url": redirect_url })))
}
