pub mod application;
pub mod cache;
pub mod codec;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
