//! SSE progress stream for one transcription job.
//!
//! Emits `{status, progress?, error?}` events and closes after the
//! explicit terminal event. A subscriber that outruns its buffer loses
//! its own oldest events; the pipeline never waits for it.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Extension;
use futures_util::stream::Stream;

use scriberr_domain::job::ProgressEvent;
use scriberr_domain::JobStatus;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

use super::transcription::load_owned_job;

/// GET /api/v1/transcribe/:id
pub async fn job_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;

    // Subscribe before the decisive status read; a job finishing in
    // between would otherwise complete on a topic we never joined.
    let rx = state.broadcaster.subscribe(&job_id);
    let job = load_owned_job(&state, &auth, &job_id).await?;

    // Already terminal: replay the terminal event and close.
    if job.status.is_terminal() {
        let event = match job.status {
            JobStatus::Failed => ProgressEvent::failed(
                job.error_message.unwrap_or_else(|| "failed".into()),
            ),
            status => ProgressEvent::status(status),
        };
        let stream = futures_util::stream::once(async move { to_sse(&event) });
        return Ok(Sse::new(boxed(stream))
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let stream = async_stream::stream! {
        // Late subscribers still learn the current stage first.
        yield to_sse(&ProgressEvent::status(job.status));

        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = event.status.is_terminal();
                    yield to_sse(&event);
                    if terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(job_id = %job_id, missed = n, "slow SSE subscriber");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(boxed(stream))
        .keep_alive(KeepAlive::default())
        .into_response())
}

type SseItem = Result<Event, std::convert::Infallible>;

fn to_sse(event: &ProgressEvent) -> SseItem {
    Ok(Event::default()
        .event("progress")
        .data(serde_json::to_string(event).unwrap_or_else(|_| "{}".into())))
}

fn boxed(
    stream: impl Stream<Item = SseItem> + Send + 'static,
) -> std::pin::Pin<Box<dyn Stream<Item = SseItem> + Send>> {
    Box::pin(stream)
}
