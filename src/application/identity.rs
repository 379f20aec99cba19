//! Handle and DID resolution, optionally fronted by the identity cache.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

use crate::cache::{CacheError, HandleCache};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("identity `{0}` could not be resolved")]
    NotFound(String),
    #[error("identity service request failed: {0}")]
    Http(String),
    #[error("identity service returned an unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Resolves identities against the network. Results for a key are assumed stable.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn did_for_handle(&self, handle: &str) -> Result<String, ResolveError>;

    async fn handle_for_did(&self, did: &str) -> Result<String, ResolveError>;
}

#[derive(Clone)]
pub struct IdentityService {
    resolver: Arc<dyn IdentityResolver>,
    cache: Option<HandleCache>,
}

impl IdentityService {
    pub fn new(resolver: Arc<dyn IdentityResolver>, cache: Option<HandleCache>) -> Self {
        Self { resolver, cache }
    }

    #[instrument(skip(self))]
    pub async fn did_for_handle(&self, handle: &str) -> Result<String, IdentityError> {
        let handle = normalize_handle(handle);
        match &self.cache {
            Some(cache) => {
                cache
                    .fetch_did(&handle, || self.resolver.did_for_handle(&handle))
                    .await
            }
            None => Ok(self.resolver.did_for_handle(&handle).await?),
        }
    }

    #[instrument(skip(self))]
    pub async fn handle_for_did(&self, did: &str) -> Result<String, IdentityError> {
        let resolve = || async {
            let handle = self.resolver.handle_for_did(did).await?;
            Ok::<_, ResolveError>(normalize_handle(&handle))
        };
        match &self.cache {
            Some(cache) => cache.fetch_handle(did, resolve).await,
            None => Ok(resolve().await?),
        }
    }
}

/// Handles are case-insensitive; a leading `@` is accepted.
fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_ascii_lowercase()
}
