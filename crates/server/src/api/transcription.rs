//! Transcription job endpoints: multipart submit, lifecycle operations,
//! delta-sync listing, and artifact access.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::Extension;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use scriberr_domain::{Error, JobStatus, TranscriptionParams};
use scriberr_storage::jobs::{JobSort, ListJobsQuery};
use scriberr_storage::{ids, TranscriptionJob};

use crate::auth::AuthUser;
use crate::error::{bad_request, ApiResult};
use crate::state::AppState;
use crate::upload;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared lookup
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fetch a job, enforcing ownership; soft-deleted jobs are absent
/// everywhere except delta-sync listings.
pub(crate) async fn load_owned_job(
    state: &AppState,
    auth: &AuthUser,
    job_id: &str,
) -> ApiResult<TranscriptionJob> {
    let job = state
        .repos
        .jobs
        .find_by_id(job_id)
        .await?
        .filter(|j| j.user_id == auth.user_id && j.deleted_at.is_none())
        .ok_or_else(|| Error::NotFound(format!("job {job_id}")))?;
    Ok(job)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /api/v1/transcription/submit (multipart)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn submit(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    let job_id = ids::new_job_id();
    let mut title: Option<String> = None;
    let mut diarization = false;
    let mut params: Option<TranscriptionParams> = None;
    let mut audio_path: Option<String> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("multipart: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "audio" => {
                let name = upload::sanitize_filename(field.file_name().unwrap_or("audio"));
                upload::validate_audio_extension(&name)?;

                // Stream the part straight to disk; nothing buffers in
                // memory beyond one chunk.
                let dir = state.config.upload_dir().join(&job_id);
                tokio::fs::create_dir_all(&dir).await?;
                let path = dir.join(&name);
                let mut file = tokio::fs::File::create(&path).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| bad_request(format!("upload interrupted: {e}")))?
                {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                audio_path = Some(path.display().to_string());
            }
            "title" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("title: {e}")))?;
                if !text.trim().is_empty() {
                    title = Some(text.trim().to_string());
                }
            }
            "diarization" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("diarization: {e}")))?;
                diarization = matches!(text.trim(), "true" | "1");
            }
            "params" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("params: {e}")))?;
                params = Some(
                    serde_json::from_str(&text)
                        .map_err(|e| bad_request(format!("params: {e}")))?,
                );
            }
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }

    let audio_path = audio_path.ok_or_else(|| bad_request("audio part is required"))?;
    let params = params.unwrap_or_default();

    if state.registry.transcription(&params.engine_name).is_none() {
        return Err(bad_request(format!(
            "unknown engine {:?}; available: {}",
            params.engine_name,
            state.registry.transcription_engines().join(", ")
        )));
    }

    let job = state
        .repos
        .jobs
        .create_with_id(
            &job_id,
            auth.user_id,
            title.as_deref(),
            &audio_path,
            diarization,
            &params,
        )
        .await?;

    // Submitting also enqueues. If the queue is saturated the job stays
    // pending and the caller gets the capacity error; an explicit /start
    // can retry later.
    state.queue.enqueue(&job.id)?;

    tracing::info!(job_id = %job.id, user = %auth.username, "job submitted");
    Ok((StatusCode::ACCEPTED, Json(job)).into_response())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lifecycle: start / kill / restart
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn start(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = load_owned_job(&state, &auth, &job_id).await?;
    if job.status != JobStatus::Pending {
        return Err(Error::Conflict(format!(
            "job is {}, only pending jobs can start",
            job.status
        ))
        .into());
    }
    state.queue.enqueue(&job.id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": job.id, "status": "pending" })),
    ))
}

pub async fn kill(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    state.queue.kill_job(&job_id)?;
    Ok(Json(serde_json::json!({ "id": job_id, "killed": true })))
}

pub async fn restart(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    if !state.repos.jobs.restart(&job_id, auth.user_id).await? {
        return Err(Error::Conflict("only failed jobs can be restarted".into()).into());
    }
    state.queue.enqueue(&job_id)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "id": job_id, "status": "pending" })),
    ))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/transcription/list
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "d_page")]
    pub page: i64,
    #[serde(default = "d_limit")]
    pub limit: i64,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    /// RFC 3339; switches the listing into delta-sync mode.
    #[serde(default)]
    pub updated_after: Option<String>,
}

fn d_page() -> i64 {
    1
}
fn d_limit() -> i64 {
    20
}

pub async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Query(q): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = q.limit.clamp(1, 200);
    let page = q.page.max(1);

    let sort = match q.sort.as_deref() {
        None | Some("") => JobSort::CreatedAt,
        Some(raw) => JobSort::parse(raw)
            .ok_or_else(|| bad_request(format!("unknown sort column {raw:?}")))?,
    };
    let descending = match q.order.as_deref() {
        None | Some("desc") => true,
        Some("asc") => false,
        Some(other) => return Err(bad_request(format!("unknown order {other:?}"))),
    };
    let updated_after = q
        .updated_after
        .as_deref()
        .map(|raw| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| bad_request(format!("updated_after: {e}")))
        })
        .transpose()?;

    let (jobs, total) = state
        .repos
        .jobs
        .list(
            auth.user_id,
            &ListJobsQuery {
                offset: (page - 1) * limit,
                limit,
                sort,
                descending,
                search: q.q.clone(),
                updated_after,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "jobs": jobs,
        "pagination": { "page": page, "limit": limit, "total": total },
    })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Single-job reads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(load_owned_job(&state, &auth, &job_id).await?))
}

pub async fn status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = load_owned_job(&state, &auth, &job_id).await?;
    Ok(Json(serde_json::json!({
        "id": job.id,
        "status": job.status,
        "error_message": job.error_message,
    })))
}

pub async fn transcript(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = load_owned_job(&state, &auth, &job_id).await?;
    let transcript = job
        .transcript
        .ok_or_else(|| Error::NotFound("transcript not available yet".into()))?;
    Ok(Json(transcript))
}

pub async fn audio(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job = load_owned_job(&state, &auth, &job_id).await?;
    let file = tokio::fs::File::open(&job.audio_path)
        .await
        .map_err(|_| Error::NotFound("audio file missing from disk".into()))?;

    let stream = tokio_util::io::ReaderStream::new(file);
    Ok((
        [(
            header::CONTENT_TYPE,
            upload::audio_content_type(&job.audio_path),
        )],
        Body::from_stream(stream),
    )
        .into_response())
}

pub async fn executions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    let rows = state.repos.jobs.list_executions(&job_id).await?;
    Ok(Json(serde_json::json!({ "executions": rows })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mutations: title / delete / speakers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct TitleRequest {
    pub title: String,
}

pub async fn update_title(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
    Json(body): Json<TitleRequest>,
) -> ApiResult<impl IntoResponse> {
    if body.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }
    state
        .repos
        .jobs
        .update_title(&job_id, auth.user_id, body.title.trim())
        .await?;
    Ok(Json(serde_json::json!({ "id": job_id, "title": body.title.trim() })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.repos.jobs.soft_delete(&job_id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "id": job_id, "deleted": true })))
}

#[derive(Debug, Deserialize)]
pub struct SpeakerMappingsRequest {
    /// speaker-id → friendly name.
    pub mappings: std::collections::BTreeMap<String, String>,
}

pub async fn get_speakers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    let mappings = state.repos.speakers.list_for_job(&job_id).await?;
    Ok(Json(serde_json::json!({ "speakers": mappings })))
}

pub async fn set_speakers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    Path(job_id): Path<String>,
    Json(body): Json<SpeakerMappingsRequest>,
) -> ApiResult<impl IntoResponse> {
    load_owned_job(&state, &auth, &job_id).await?;
    let pairs: Vec<(String, String)> = body.mappings.into_iter().collect();
    state.repos.speakers.upsert_for_job(&job_id, &pairs).await?;
    let mappings = state.repos.speakers.list_for_job(&job_id).await?;
    Ok(Json(serde_json::json!({ "speakers": mappings })))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /api/v1/transcription/models
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn models(State(state): State<AppState>) -> impl IntoResponse {
    let capabilities = state.registry.model_capabilities();
    let mut languages: Vec<&str> = vec![
        "en", "de", "es", "fr", "it", "ja", "ko", "nl", "pt", "ru", "uk", "zh",
    ];
    languages.sort_unstable();

    Json(serde_json::json!({
        "models": capabilities,
        "languages": languages,
    }))
}
