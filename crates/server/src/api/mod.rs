//! The versioned HTTP surface.
//!
//! Routes split three ways: **public** (no credential), **protected**
//! (session token or API key), and **session-only** (account management,
//! where an API key is the wrong credential type). Streaming routes are
//! exempt from the 60 s handler timeout.

pub mod admin;
pub mod api_keys;
pub mod auth;
pub mod chat;
pub mod events;
pub mod notes;
pub mod profiles;
pub mod summarize;
pub mod templates;
pub mod transcription;

use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use crate::auth::middleware::{require_auth, require_session_token};
use crate::state::AppState;

const HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Build the full API router. `state` is needed up front to wire the
/// auth middleware.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(admin::health))
        .route("/install.sh", get(admin::install_script))
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route(
            "/api/v1/auth/registration-status",
            get(auth::registration_status),
        );

    // Account management and API keys: session token only.
    let session_only = Router::new()
        .route("/api/v1/auth/change-password", post(auth::change_password))
        .route("/api/v1/auth/change-username", post(auth::change_username))
        .route(
            "/api/v1/auth/cli/authorize",
            get(auth::cli_authorize_info).post(auth::cli_authorize),
        )
        .route(
            "/api/v1/api-keys/",
            get(api_keys::list_keys).post(api_keys::create_key),
        )
        .route(
            "/api/v1/api-keys/:id",
            put(api_keys::update_key).delete(api_keys::delete_key),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_session_token,
        ));

    // Either credential, bounded handlers.
    let protected = Router::new()
        // Transcription lifecycle
        .route("/api/v1/transcription/submit", post(transcription::submit))
        .route("/api/v1/transcription/list", get(transcription::list))
        .route("/api/v1/transcription/models", get(transcription::models))
        .route(
            "/api/v1/transcription/:id",
            get(transcription::get).delete(transcription::delete),
        )
        .route("/api/v1/transcription/:id/start", post(transcription::start))
        .route("/api/v1/transcription/:id/kill", post(transcription::kill))
        .route(
            "/api/v1/transcription/:id/restart",
            post(transcription::restart),
        )
        .route("/api/v1/transcription/:id/status", get(transcription::status))
        .route(
            "/api/v1/transcription/:id/transcript",
            get(transcription::transcript),
        )
        .route("/api/v1/transcription/:id/audio", get(transcription::audio))
        .route(
            "/api/v1/transcription/:id/executions",
            get(transcription::executions),
        )
        .route(
            "/api/v1/transcription/:id/title",
            put(transcription::update_title),
        )
        .route(
            "/api/v1/transcription/:id/speakers",
            get(transcription::get_speakers).post(transcription::set_speakers),
        )
        .route(
            "/api/v1/transcription/:id/summary",
            get(summarize::get_summary),
        )
        // Notes
        .route(
            "/api/v1/transcription/:id/notes",
            get(notes::list_for_job).post(notes::create),
        )
        .route(
            "/api/v1/notes/:id",
            put(notes::update).delete(notes::delete),
        )
        // Profiles
        .route(
            "/api/v1/profiles/",
            get(profiles::list).post(profiles::create),
        )
        .route(
            "/api/v1/profiles/:id",
            get(profiles::get).put(profiles::update).delete(profiles::delete),
        )
        .route("/api/v1/profiles/:id/default", post(profiles::set_default))
        // Summary templates
        .route(
            "/api/v1/summaries/templates",
            get(templates::list).post(templates::create),
        )
        .route(
            "/api/v1/summaries/templates/:id",
            get(templates::get)
                .put(templates::update)
                .delete(templates::delete),
        )
        // Chat sessions
        .route("/api/v1/chat/models", get(chat::models))
        .route(
            "/api/v1/chat/sessions",
            get(chat::list_sessions).post(chat::create_session),
        )
        .route(
            "/api/v1/chat/sessions/:id",
            get(chat::get_session).delete(chat::delete_session),
        )
        .route(
            "/api/v1/chat/sessions/:id/title",
            put(chat::update_session_title),
        )
        .route(
            "/api/v1/chat/sessions/by-transcription/:transcriptionId",
            get(chat::sessions_for_transcription),
        )
        // LLM binding
        .route(
            "/api/v1/llm/config",
            get(summarize::get_llm_config).post(summarize::set_llm_config),
        )
        // Admin
        .route("/api/v1/admin/queue/stats", get(admin::queue_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(TimeoutLayer::new(HANDLER_TIMEOUT));

    // Either credential, streaming: SSE progress and chunked LLM
    // replies run longer than any sane handler timeout.
    let streaming = Router::new()
        .route("/api/v1/transcribe/:id", get(events::job_events))
        .route("/api/v1/chat/sessions/:id/messages", post(chat::send_message))
        .route("/api/v1/summarize/", post(summarize::summarize))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public
        .merge(session_only)
        .merge(protected)
        .merge(streaming)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may end in `:*` to match any port on that host
/// (e.g. `http://localhost:*`); a literal `"*"` allows all origins.
/// Preflight `OPTIONS` requests are answered here, before auth runs.
pub fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
        header::HeaderName::from_static("x-api-key"),
    ];

    if allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut port_wildcards: Vec<String> = Vec::new();
    for origin in allowed_origins {
        if let Some(prefix) = origin.strip_suffix('*') {
            port_wildcards.push(prefix.to_string());
        } else if let Ok(value) = origin.parse::<HeaderValue>() {
            exact.push(value);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = AllowOrigin::predicate(move |origin, _| {
        if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
            return true;
        }
        let origin = origin.to_str().unwrap_or("");
        // The remainder after a wildcard prefix must be digits only, so
        // "http://localhost:3000.evil.com" cannot slip through.
        port_wildcards.iter().any(|prefix| {
            origin
                .strip_prefix(prefix.as_str())
                .map(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false)
        })
    });

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(true)
}
