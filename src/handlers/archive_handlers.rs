//! HTTP handlers for archive runs and archive retrieval.
//!
//! The caller's identity arrives in the `x-user-id` header, set by the
//! authenticating proxy in front of this service. Archive runs execute on
//! their own task and finish even if the client goes away; downloads stream
//! the archive from disk.

use crate::{
    errors::AppError,
    models::{access::AccessGrant, archive::ArchiveEntry},
    services::pipeline::PipelineSummary,
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Body of `POST /archives`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateArchivesReq {
    pub event_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveRunResponse {
    status: &'static str,
    catalog_entry_ids: Vec<String>,
    #[serde(flatten)]
    summary: PipelineSummary,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveListResponse {
    event_id: String,
    archives: Vec<ArchiveEntry>,
}

/// `POST /archives` — archive every photo of an event.
///
/// Responds 201 when at least one chunk was delivered and 502 when none
/// were; both carry the full summary so every failed photo is listed.
pub async fn create_archives(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let caller = caller_id(&headers)?;
    let req: CreateArchivesReq = serde_json::from_slice(&body)
        .map_err(|err| AppError::bad_request(format!("invalid request body: {}", err)))?;
    let event_id = req
        .event_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_request("eventId is required"))?;

    let summary = state
        .pipeline
        .spawn_run(event_id, caller)
        .await
        .map_err(|err| {
            tracing::error!("archive run task failed: {}", err);
            AppError::internal("archive run aborted")
        })??;

    let status = summary.status();
    let code = if status == "failed" {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::CREATED
    };
    let body = ArchiveRunResponse {
        status,
        catalog_entry_ids: summary.catalog_entry_ids(),
        summary,
    };
    Ok((code, Json(body)).into_response())
}

/// `GET /events/{event_id}/archives` — list recorded archives (owner only).
pub async fn list_event_archives(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let caller = caller_id(&headers)?;
    let event = state.catalog.fetch_event(&event_id).await?;
    if !event.is_owned_by(&caller) {
        return Err(AppError::forbidden(format!(
            "user `{}` does not own event `{}`",
            caller, event_id
        )));
    }

    let archives = state.catalog.list_archives(&event_id).await?;
    Ok(Json(ArchiveListResponse { event_id, archives }).into_response())
}

/// `GET /archives/{archive_id}/download` — stream an archive (owner only).
pub async fn download_archive(
    State(state): State<AppState>,
    Path(archive_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let caller = caller_id(&headers)?;
    let entry = state.catalog.get_archive(&archive_id).await?;
    if !AccessGrant::allows(&entry.permissions, "read", &caller) {
        return Err(AppError::forbidden("not allowed to read this archive"));
    }

    let bucket = &state.pipeline.config().archive_bucket;
    let (blob, file) = state.storage.get_blob_reader(bucket, &entry.file_id).await?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    if let Ok(value) = HeaderValue::from_str(&blob.size_bytes.max(0).to_string()) {
        headers.insert(header::CONTENT_LENGTH, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", entry.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", blob.etag)) {
        headers.insert(header::ETAG, value);
    }
    *response.status_mut() = StatusCode::OK;
    Ok(response)
}

/// Authenticated caller id from the identity header.
fn caller_id(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized("missing caller identity"))
}
