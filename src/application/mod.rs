//! Application services: classification, ingestion and identity resolution.

pub mod checkpoint;
pub mod classify;
pub mod error;
pub mod identity;
pub mod indexer;
pub mod ingest;
pub mod repos;
pub mod retention;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;
