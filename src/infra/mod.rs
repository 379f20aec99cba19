//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod firehose;
pub mod identity;
pub mod telemetry;
