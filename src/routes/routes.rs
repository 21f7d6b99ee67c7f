//! Defines routes for archive runs and archive retrieval.
//!
//! - `POST /archives` — archive all photos of the event named in the body
//! - `GET  /events/{event_id}/archives` — list an event's archives
//! - `GET  /archives/{archive_id}/download` — download one archive
//! - `GET  /healthz`, `GET /readyz` — probes
//!
//! Every archive route expects the caller's id in the `x-user-id` header.

use crate::{
    handlers::{
        archive_handlers::{create_archives, download_archive, list_event_archives},
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. It carries `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/archives", post(create_archives))
        .route("/archives/{archive_id}/download", get(download_archive))
        .route("/events/{event_id}/archives", get(list_event_archives))
}
