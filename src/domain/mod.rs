//! Domain layer: content identifiers, record schemas and repository operations.

pub mod cid;
pub mod error;
pub mod operations;
pub mod records;
pub mod types;
