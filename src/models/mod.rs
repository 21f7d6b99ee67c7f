//! Core data models for the event archiver.
//!
//! Events own photos; photos point at payloads in the blob store; archives
//! are the catalog entries written after a chunk has been uploaded. Rows map
//! to SQLite via `sqlx::FromRow` and serialize as camelCase JSON via `serde`.

pub mod access;
pub mod archive;
pub mod blob;
pub mod event;
pub mod photo;
