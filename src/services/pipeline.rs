//! src/services/pipeline.rs
//!
//! ArchivePipeline: turns all photos of an event into one or more ZIP
//! archives. A run moves through
//! `Start -> Partitioned -> ProcessingGroup(1..=n) -> Done`, or stops in
//! `Failed` when the event cannot be resolved, the caller does not own it,
//! or its photos cannot be listed. Failures of single photos and of single
//! chunks are collected and reported in the summary; they never stop the
//! run.

use crate::{
    models::{archive::ArchiveEntry, event::Event, photo::Photo},
    services::{
        archive_builder::{FailureRecord, SinkFactory, build_archive, entry_name, memory_sinks},
        backends::{ArchiveCatalog, BlobStore, EventDirectory},
        partitioner::{Group, partition},
        recorder::{ChunkUpload, GroupError, archive_filename, upload_and_record},
        storage_service::StorageError,
    },
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_SIZE_BUDGET_MB: f64 = 2048.0;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Settings fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on the declared size of one chunk, in megabytes.
    pub size_budget_mb: f64,
    /// Photos requested per listing page.
    pub page_size: usize,
    /// Bucket photo payloads are read from.
    pub photo_bucket: String,
    /// Bucket finished archives are written to.
    pub archive_bucket: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            size_budget_mb: DEFAULT_SIZE_BUDGET_MB,
            page_size: DEFAULT_PAGE_SIZE,
            photo_bucket: "photos".into(),
            archive_bucket: "archives".into(),
        }
    }
}

/// Errors that end a run before or instead of chunk processing.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("event `{0}` not found")]
    EventNotFound(String),
    #[error("user `{user_id}` does not own event `{event_id}`")]
    Unauthorized { event_id: String, user_id: String },
    #[error("event `{0}` has no photos")]
    NoContent(String),
    #[error("failed to look up event: {0}")]
    EventLookup(#[source] StorageError),
    #[error("failed to list photos: {0}")]
    Listing(#[source] StorageError),
}

/// Stage of a run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Partitioned { groups: usize },
    ProcessingGroup { ordinal: usize },
    Done,
    Failed,
}

/// A chunk that could not be delivered.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupFailure {
    pub chunk_index: usize,
    /// Photos that were in the archive when the chunk failed.
    pub photo_ids: Vec<String>,
    pub error: String,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub event_id: String,
    pub total_photos: usize,
    pub archived_photos: usize,
    pub failed_photos: usize,
    pub total_chunks: usize,
    pub archives: Vec<ArchiveEntry>,
    pub failures: Vec<FailureRecord>,
    pub failed_chunks: Vec<GroupFailure>,
}

impl PipelineSummary {
    pub fn catalog_entry_ids(&self) -> Vec<String> {
        self.archives.iter().map(|a| a.id.clone()).collect()
    }

    /// `success` when every photo was archived, `partial` when some were,
    /// `failed` when none were.
    pub fn status(&self) -> &'static str {
        if self.failed_photos == 0 && self.failed_chunks.is_empty() {
            "success"
        } else if self.archived_photos > 0 {
            "partial"
        } else {
            "failed"
        }
    }
}

#[derive(Clone)]
pub struct ArchivePipeline {
    config: PipelineConfig,
    events: Arc<dyn EventDirectory>,
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn ArchiveCatalog>,
    sinks: SinkFactory,
}

impl ArchivePipeline {
    pub fn new(
        config: PipelineConfig,
        events: Arc<dyn EventDirectory>,
        blobs: Arc<dyn BlobStore>,
        catalog: Arc<dyn ArchiveCatalog>,
    ) -> Self {
        Self {
            config,
            events,
            blobs,
            catalog,
            sinks: memory_sinks(),
        }
    }

    #[cfg(test)]
    pub fn with_sinks(mut self, sinks: SinkFactory) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a run on its own task. The run continues to completion even if
    /// the returned handle is dropped, so no chunk is abandoned between its
    /// upload and its catalog write.
    pub fn spawn_run(
        &self,
        event_id: String,
        caller_id: String,
    ) -> JoinHandle<Result<PipelineSummary, PipelineError>> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(&event_id, &caller_id).await })
    }

    /// Archive every photo of `event_id` on behalf of `caller_id`.
    pub async fn run(
        &self,
        event_id: &str,
        caller_id: &str,
    ) -> Result<PipelineSummary, PipelineError> {
        let mut stage = Stage::Start;
        let result = self.run_stages(event_id, caller_id, &mut stage).await;
        if let Err(err) = &result {
            warn!(event_id, from = ?stage, "archive run failed: {}", err);
            transition(&mut stage, Stage::Failed);
        }
        result
    }

    async fn run_stages(
        &self,
        event_id: &str,
        caller_id: &str,
        stage: &mut Stage,
    ) -> Result<PipelineSummary, PipelineError> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return Err(PipelineError::InvalidRequest("eventId is required".into()));
        }
        if caller_id.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("caller identity is required".into()));
        }

        let event = self.authorize(event_id, caller_id).await?;
        let photos = self.list_all_photos(event_id).await?;
        if photos.is_empty() {
            return Err(PipelineError::NoContent(event_id.to_string()));
        }

        let total_photos = photos.len();
        info!(event_id, total_photos, budget_mb = self.config.size_budget_mb, "archive run started");

        let groups = partition(photos, self.config.size_budget_mb);
        let total_chunks = groups.len();
        transition(stage, Stage::Partitioned { groups: total_chunks });

        let mut archives = Vec::new();
        let mut failures = Vec::new();
        let mut failed_chunks = Vec::new();

        for group in groups {
            transition(stage, Stage::ProcessingGroup { ordinal: group.ordinal });
            let ordinal = group.ordinal;
            match self
                .process_group(&event, group, total_chunks, &mut failures)
                .await
            {
                Ok(Some(entry)) => archives.push(entry),
                Ok(None) => debug!(event_id, chunk = ordinal, "no photos appended, chunk skipped"),
                Err((photo_ids, err)) => {
                    warn!(event_id, chunk = ordinal, "chunk failed: {}", err);
                    failed_chunks.push(GroupFailure {
                        chunk_index: ordinal,
                        photo_ids,
                        error: err.to_string(),
                    });
                }
            }
        }

        transition(stage, Stage::Done);

        let archived_photos = archives.iter().map(|a| a.photo_count as usize).sum();
        let summary = PipelineSummary {
            event_id: event_id.to_string(),
            total_photos,
            archived_photos,
            failed_photos: total_photos - archived_photos,
            total_chunks,
            archives,
            failures,
            failed_chunks,
        };
        info!(
            event_id,
            total_chunks,
            archived = summary.archived_photos,
            failed = summary.failed_photos,
            status = summary.status(),
            "archive run finished"
        );
        Ok(summary)
    }

    /// Resolve the event and check that `caller_id` owns it.
    async fn authorize(&self, event_id: &str, caller_id: &str) -> Result<Event, PipelineError> {
        let event = self
            .events
            .get_event(event_id)
            .await
            .map_err(|err| match err {
                StorageError::EventNotFound(id) => PipelineError::EventNotFound(id),
                other => PipelineError::EventLookup(other),
            })?;
        if !event.is_owned_by(caller_id) {
            return Err(PipelineError::Unauthorized {
                event_id: event_id.to_string(),
                user_id: caller_id.to_string(),
            });
        }
        Ok(event)
    }

    /// Request pages until a short page comes back.
    async fn list_all_photos(&self, event_id: &str) -> Result<Vec<Photo>, PipelineError> {
        let page_size = self.config.page_size.max(1);
        let mut photos = Vec::new();
        loop {
            let page = self
                .events
                .list_photos_page(event_id, photos.len(), page_size)
                .await
                .map_err(PipelineError::Listing)?;
            let fetched = page.len();
            debug!(event_id, offset = photos.len(), fetched, "photo page listed");
            photos.extend(page);
            if fetched < page_size {
                break;
            }
        }
        Ok(photos)
    }

    /// Build, upload, and record one chunk. Photo failures are appended to
    /// `failures` whatever happens to the chunk itself. A chunk with no
    /// appended photos yields `Ok(None)` and uploads nothing.
    async fn process_group(
        &self,
        event: &Event,
        group: Group,
        total_chunks: usize,
        failures: &mut Vec<FailureRecord>,
    ) -> Result<Option<ArchiveEntry>, (Vec<String>, GroupError)> {
        let built = build_archive(
            (self.sinks)(),
            &group,
            self.blobs.as_ref(),
            &self.config.photo_bucket,
            entry_name,
        )
        .await
        .map_err(|err| (group.photo_ids(), GroupError::from(err)))?;
        let appended = built.success_count();
        failures.extend(built.failures);

        if appended == 0 {
            return Ok(None);
        }

        let chunk = ChunkUpload {
            photo_count: appended,
            bytes: built.bytes,
            filename: archive_filename(&event.name, group.ordinal, total_chunks),
            ordinal: group.ordinal,
            total_chunks,
            owner_id: &event.owner_id,
            event_id: &event.id,
        };
        upload_and_record(
            self.blobs.as_ref(),
            self.catalog.as_ref(),
            &self.config.archive_bucket,
            chunk,
        )
        .await
        .map(Some)
        .map_err(|err| (built.appended, err))
    }
}

fn transition(stage: &mut Stage, next: Stage) {
    debug!(from = ?*stage, to = ?next, "pipeline stage");
    *stage = next;
}
