pub mod archive_builder;
pub mod backends;
pub mod catalog_service;
pub mod partitioner;
pub mod pipeline;
pub mod recorder;
pub mod storage_service;

#[cfg(test)]
pub mod testing;
