//! Shared application state handed to every handler.

use crate::services::{
    catalog_service::CatalogService,
    pipeline::{ArchivePipeline, PipelineConfig},
    storage_service::StorageService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: ArchivePipeline,
    pub catalog: CatalogService,
    pub storage: StorageService,
}

impl AppState {
    /// Wire the pipeline to the SQLite catalog and the disk blob store.
    pub fn new(
        config: PipelineConfig,
        catalog: CatalogService,
        storage: StorageService,
    ) -> Self {
        let pipeline = ArchivePipeline::new(
            config,
            Arc::new(catalog.clone()),
            Arc::new(storage.clone()),
            Arc::new(catalog.clone()),
        );
        Self {
            pipeline,
            catalog,
            storage,
        }
    }
}
