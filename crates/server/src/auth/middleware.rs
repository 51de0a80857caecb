//! Route guards.
//!
//! Protected routes accept `Authorization: Bearer <token>` or
//! `X-API-Key: <key>`; account-management routes accept the session token
//! only and answer API keys with `403` (wrong credential type, not a
//! missing one). The resolved identity rides the request extensions as
//! [`AuthUser`].

use axum::body::Body;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use scriberr_domain::{Error, Result};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub via_api_key: bool,
}

/// Either credential.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Session token only; an API key is the wrong credential type here.
pub async fn require_session_token(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if req.headers().contains_key("x-api-key") {
        return ApiError(Error::Forbidden(
            "this route requires a session token, not an API key".into(),
        ))
        .into_response();
    }
    match authenticate(&state, req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        let user = state.auth.verify_api_key(key).await?;
        return Ok(AuthUser {
            user_id: user.id,
            username: user.username,
            via_api_key: true,
        });
    }

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Error::Unauthenticated("missing credentials".into()))?;

    let claims = state.auth.validate_token(token)?;
    Ok(AuthUser {
        user_id: claims.sub,
        username: claims.username,
        via_api_key: false,
    })
}
