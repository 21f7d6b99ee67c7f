//! In-memory collaborators and fixtures for pipeline tests.
//!
//! Each fake records the calls it receives and supports failure injection,
//! so tests can assert both outcomes and the exact remote traffic.

use crate::{
    models::{
        access::AccessGrant,
        archive::{ArchiveEntry, NewArchiveEntry, STATUS_COMPLETED},
        event::Event,
        photo::Photo,
    },
    services::{
        archive_builder::ArchiveSink,
        backends::{ArchiveCatalog, BlobStore, EventDirectory},
        storage_service::{StorageError, StorageResult},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::{
    collections::{HashMap, HashSet},
    io::{self, Cursor, Seek, SeekFrom, Write},
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// A photo of event `ev-1` whose payload lives at `file-{id}`.
pub fn photo(id: &str, size_mb: Option<f64>) -> Photo {
    Photo {
        id: id.to_string(),
        event_id: "ev-1".to_string(),
        file_id: format!("file-{}", id),
        size_mb,
        file_type: None,
        created_at: base_time(),
    }
}

pub fn photo_with_type(id: &str, file_type: &str) -> Photo {
    Photo {
        file_type: Some(file_type.to_string()),
        ..photo(id, Some(1.0))
    }
}

pub fn photo_at(id: &str, event_id: &str, size_mb: Option<f64>, minute: i64) -> Photo {
    Photo {
        event_id: event_id.to_string(),
        created_at: base_time() + Duration::minutes(minute),
        ..photo(id, size_mb)
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what)))
}

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryCall {
    GetEvent(String),
    ListPage { offset: usize, limit: usize },
}

/// Events and photos held in memory.
#[derive(Default)]
pub struct MemoryEvents {
    events: Mutex<HashMap<String, Event>>,
    photos: Mutex<Vec<Photo>>,
    fail_listing: Mutex<bool>,
    calls: Mutex<Vec<DirectoryCall>>,
}

impl MemoryEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, id: &str, name: &str, owner_id: &str) {
        self.events.lock().expect("lock").insert(
            id.to_string(),
            Event {
                id: id.to_string(),
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                created_at: base_time(),
            },
        );
    }

    pub fn add_photo(&self, photo: Photo) {
        self.photos.lock().expect("lock").push(photo);
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().expect("lock") = true;
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl EventDirectory for MemoryEvents {
    async fn get_event(&self, event_id: &str) -> StorageResult<Event> {
        self.calls
            .lock()
            .expect("lock")
            .push(DirectoryCall::GetEvent(event_id.to_string()));
        self.events
            .lock()
            .expect("lock")
            .get(event_id)
            .cloned()
            .ok_or_else(|| StorageError::EventNotFound(event_id.to_string()))
    }

    async fn list_photos_page(
        &self,
        event_id: &str,
        offset: usize,
        limit: usize,
    ) -> StorageResult<Vec<Photo>> {
        self.calls
            .lock()
            .expect("lock")
            .push(DirectoryCall::ListPage { offset, limit });
        if *self.fail_listing.lock().expect("lock") {
            return Err(injected("listing"));
        }
        Ok(self
            .photos
            .lock()
            .expect("lock")
            .iter()
            .filter(|p| p.event_id == event_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Blob store keyed by `(bucket, id)`.
#[derive(Default)]
pub struct MemoryBlobs {
    data: Mutex<HashMap<(String, String), (Bytes, Option<AccessGrant>)>>,
    failing_fetches: Mutex<HashSet<String>>,
    fail_uploads: Mutex<bool>,
    fetched: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl MemoryBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: &str, id: &str, data: &[u8]) {
        self.data.lock().expect("lock").insert(
            (bucket.to_string(), id.to_string()),
            (Bytes::copy_from_slice(data), None),
        );
    }

    pub fn fail_fetch(&self, id: &str) {
        self.failing_fetches
            .lock()
            .expect("lock")
            .insert(id.to_string());
    }

    pub fn fail_uploads(&self) {
        *self.fail_uploads.lock().expect("lock") = true;
    }

    pub fn get(&self, bucket: &str, id: &str) -> Option<Vec<u8>> {
        self.data
            .lock()
            .expect("lock")
            .get(&(bucket.to_string(), id.to_string()))
            .map(|(data, _)| data.to_vec())
    }

    pub fn grant_for(&self, bucket: &str, id: &str) -> Option<AccessGrant> {
        self.data
            .lock()
            .expect("lock")
            .get(&(bucket.to_string(), id.to_string()))
            .and_then(|(_, grant)| grant.clone())
    }

    pub fn count(&self, bucket: &str) -> usize {
        self.data
            .lock()
            .expect("lock")
            .keys()
            .filter(|(b, _)| b == bucket)
            .count()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().expect("lock").clone()
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().expect("lock").clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("lock").clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn fetch_blob(&self, bucket: &str, file_id: &str) -> StorageResult<Bytes> {
        self.fetched.lock().expect("lock").push(file_id.to_string());
        if self.failing_fetches.lock().expect("lock").contains(file_id) {
            return Err(injected("fetch"));
        }
        self.data
            .lock()
            .expect("lock")
            .get(&(bucket.to_string(), file_id.to_string()))
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::BlobNotFound {
                bucket: bucket.to_string(),
                id: file_id.to_string(),
            })
    }

    async fn upload_blob(
        &self,
        bucket: &str,
        blob_id: &str,
        _filename: &str,
        data: Bytes,
        grant: &AccessGrant,
    ) -> StorageResult<String> {
        if *self.fail_uploads.lock().expect("lock") {
            return Err(injected("upload"));
        }
        self.uploaded.lock().expect("lock").push(blob_id.to_string());
        self.data.lock().expect("lock").insert(
            (bucket.to_string(), blob_id.to_string()),
            (data, Some(grant.clone())),
        );
        Ok(blob_id.to_string())
    }

    async fn delete_blob(&self, bucket: &str, blob_id: &str) -> StorageResult<()> {
        self.deleted.lock().expect("lock").push(blob_id.to_string());
        self.data
            .lock()
            .expect("lock")
            .remove(&(bucket.to_string(), blob_id.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::BlobNotFound {
                bucket: bucket.to_string(),
                id: blob_id.to_string(),
            })
    }
}

/// Catalog that keeps entries in a vector.
#[derive(Default)]
pub struct MemoryCatalog {
    entries: Mutex<Vec<ArchiveEntry>>,
    fail_writes: Mutex<bool>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().expect("lock") = true;
    }

    pub fn entries(&self) -> Vec<ArchiveEntry> {
        self.entries.lock().expect("lock").clone()
    }

    /// Park every write until the returned gate is notified.
    pub fn hold_writes(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().expect("lock") = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl ArchiveCatalog for MemoryCatalog {
    async fn create_archive_entry(
        &self,
        entry: NewArchiveEntry,
        grant: &AccessGrant,
    ) -> StorageResult<ArchiveEntry> {
        let gate = self.gate.lock().expect("lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if *self.fail_writes.lock().expect("lock") {
            return Err(injected("catalog"));
        }
        let mut entries = self.entries.lock().expect("lock");
        let recorded = ArchiveEntry {
            id: format!("entry-{}", entries.len() + 1),
            event_id: entry.event_id,
            owner_id: entry.owner_id,
            file_id: entry.file_id,
            filename: entry.filename,
            size_bytes: entry.size_bytes,
            photo_count: entry.photo_count,
            chunk_index: entry.chunk_index,
            total_chunks: entry.total_chunks,
            status: STATUS_COMPLETED.to_string(),
            permissions: grant.to_json()?,
            created_at: base_time(),
        };
        entries.push(recorded.clone());
        Ok(recorded)
    }
}

/// Accepts every write but cannot hand the archive back.
#[derive(Default)]
pub struct RefusingSink(Cursor<Vec<u8>>);

impl Write for RefusingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Seek for RefusingSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl ArchiveSink for RefusingSink {
    fn into_bytes(self: Box<Self>) -> io::Result<Vec<u8>> {
        Err(io::Error::other("device full"))
    }
}
