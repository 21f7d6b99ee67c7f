//! Streaming assembly of one chunk's ZIP archive.
//!
//! Members are fetched one at a time and appended as uncompressed entries to
//! an in-memory ZIP. A member that cannot be fetched or appended is recorded
//! as a failure and skipped; only a failure to finalize the container fails
//! the whole chunk.

use crate::{
    models::photo::Photo,
    services::{backends::BlobStore, partitioner::Group},
};
use serde::Serialize;
use std::{
    collections::HashSet,
    io::{self, Cursor, Seek, Write},
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use zip::{
    CompressionMethod, ZipWriter,
    result::ZipError,
    write::SimpleFileOptions,
};

const DEFAULT_EXTENSION: &str = "jpg";

/// Entries at or above this size need ZIP64 headers.
const ZIP64_THRESHOLD: usize = u32::MAX as usize;

/// A photo that could not be put into an archive, and why.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub photo_id: String,
    pub error: String,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to start entry `{name}`: {source}")]
    StartEntry {
        name: String,
        #[source]
        source: ZipError,
    },
    #[error("failed to write entry `{name}`: {source}")]
    WriteEntry {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to finalize archive: {0}")]
    Finalize(#[source] ZipError),
}

/// The finished archive of one group.
#[derive(Debug)]
pub struct BuiltArchive {
    /// Complete ZIP bytes, central directory included.
    pub bytes: Vec<u8>,
    /// Ids of the photos written into the archive, in group order.
    pub appended: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl BuiltArchive {
    pub fn success_count(&self) -> usize {
        self.appended.len()
    }
}

/// Where the bytes of an archive under construction go.
pub trait ArchiveSink: Write + Seek + Send {
    /// Hand back the finished archive once the central directory is written.
    fn into_bytes(self: Box<Self>) -> io::Result<Vec<u8>>;
}

impl ArchiveSink for Cursor<Vec<u8>> {
    fn into_bytes(self: Box<Self>) -> io::Result<Vec<u8>> {
        Ok((*self).into_inner())
    }
}

/// Opens a fresh sink for each group.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn ArchiveSink> + Send + Sync>;

/// A growable in-memory buffer.
pub fn memory_sink() -> Box<dyn ArchiveSink> {
    Box::new(Cursor::new(Vec::new()))
}

pub fn memory_sinks() -> SinkFactory {
    Arc::new(memory_sink)
}

/// Accumulates ZIP entries in a sink owned for one group.
pub struct ArchiveWriter {
    zip: ZipWriter<Box<dyn ArchiveSink>>,
    names: HashSet<String>,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self::with_sink(memory_sink())
    }

    pub fn with_sink(sink: Box<dyn ArchiveSink>) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            names: HashSet::new(),
        }
    }

    /// Append one stored entry. If `name` is already taken a `-N` suffix is
    /// added before the extension. Returns the name actually used.
    pub fn append(&mut self, name: &str, data: &[u8]) -> Result<String, ArchiveError> {
        let name = self.unique_name(name);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(data.len() >= ZIP64_THRESHOLD);

        self.zip
            .start_file(name.as_str(), options)
            .map_err(|source| ArchiveError::StartEntry {
                name: name.clone(),
                source,
            })?;
        self.zip
            .write_all(data)
            .map_err(|source| ArchiveError::WriteEntry {
                name: name.clone(),
                source,
            })?;

        self.names.insert(name.clone());
        Ok(name)
    }

    /// Write the central directory and hand back the archive bytes.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        let sink = self.zip.finish().map_err(ArchiveError::Finalize)?;
        sink.into_bytes().map_err(|err| ArchiveError::Finalize(ZipError::Io(err)))
    }

    fn unique_name(&self, name: &str) -> String {
        if !self.names.contains(name) {
            return name.to_string();
        }
        let (stem, ext) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (name, None),
        };
        (2..)
            .map(|n| match ext {
                Some(ext) => format!("{}-{}.{}", stem, n, ext),
                None => format!("{}-{}", stem, n),
            })
            .find(|candidate| !self.names.contains(candidate))
            .unwrap_or_else(|| format!("{}-{}", name, Uuid::new_v4().simple()))
    }
}

/// Entry name for a photo: `{id}.{ext}`, or a generated name when the photo
/// has no usable id.
pub fn entry_name(photo: &Photo) -> String {
    let ext = photo
        .file_type
        .as_deref()
        .and_then(extension_from_hint)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    let stem: String = photo
        .id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if stem.is_empty() {
        format!("photo-{}.{}", Uuid::new_v4().simple(), ext)
    } else {
        format!("{}.{}", stem, ext)
    }
}

/// Derive a file extension from a MIME type or a filename.
fn extension_from_hint(hint: &str) -> Option<String> {
    let hint = hint.trim().to_ascii_lowercase();
    if let Some((_, subtype)) = hint.split_once('/') {
        let subtype = subtype.split(';').next().unwrap_or("").trim();
        let ext = match subtype {
            "jpeg" | "jpg" | "pjpeg" => "jpg",
            "svg+xml" => "svg",
            "x-icon" | "vnd.microsoft.icon" => "ico",
            other => other.trim_start_matches("x-"),
        };
        return is_plain_extension(ext).then(|| ext.to_string());
    }
    let (_, ext) = hint.rsplit_once('.')?;
    let ext = if ext == "jpeg" { "jpg" } else { ext };
    is_plain_extension(ext).then(|| ext.to_string())
}

fn is_plain_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Build the archive for `group` into `sink`.
///
/// Fetches are issued and awaited one at a time. Per-member failures end up
/// in `BuiltArchive::failures`; the caller decides what to do with an
/// archive that has no members.
pub async fn build_archive<F>(
    sink: Box<dyn ArchiveSink>,
    group: &Group,
    source: &dyn BlobStore,
    bucket: &str,
    name_of: F,
) -> Result<BuiltArchive, ArchiveError>
where
    F: Fn(&Photo) -> String,
{
    let mut writer = ArchiveWriter::with_sink(sink);
    let mut appended = Vec::with_capacity(group.len());
    let mut failures = Vec::new();

    for photo in &group.photos {
        let data = match source.fetch_blob(bucket, &photo.file_id).await {
            Ok(data) => data,
            Err(err) => {
                warn!(photo_id = %photo.id, chunk = group.ordinal, "fetch failed: {}", err);
                failures.push(FailureRecord {
                    photo_id: photo.id.clone(),
                    error: format!("fetch failed: {}", err),
                });
                continue;
            }
        };

        match writer.append(&name_of(photo), &data) {
            Ok(name) => {
                debug!(photo_id = %photo.id, entry = %name, bytes = data.len(), "appended");
                appended.push(photo.id.clone());
            }
            Err(err) => {
                warn!(photo_id = %photo.id, chunk = group.ordinal, "append failed: {}", err);
                failures.push(FailureRecord {
                    photo_id: photo.id.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let bytes = writer.finish()?;
    Ok(BuiltArchive {
        bytes,
        appended,
        failures,
    })
}
