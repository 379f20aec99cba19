//! XRPC identity resolution against an AppView or PDS.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use crate::application::identity::{IdentityResolver, ResolveError};

use super::error::InfraError;

const RESOLVE_HANDLE_NSID: &str = "com.atproto.identity.resolveHandle";
const GET_PROFILE_NSID: &str = "app.bsky.actor.getProfile";
const INVALID_HANDLE: &str = "handle.invalid";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const METRIC_RESOLVE_MS: &str = "listfeed_identity_resolve_ms";

#[derive(Debug, Deserialize)]
struct ResolveHandleOutput {
    did: String,
}

#[derive(Debug, Deserialize)]
struct ProfileView {
    did: String,
    handle: String,
}

#[derive(Debug, Clone)]
pub struct XrpcIdentityResolver {
    client: Client,
    base: Url,
}

impl XrpcIdentityResolver {
    pub fn new(base: Url) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("listfeed/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, base })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, subject: &str) -> Result<T, ResolveError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| ResolveError::Http(err.to_string()))?;
        histogram!(METRIC_RESOLVE_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
            debug!(target = "infra::identity", subject, %status, "identity not found");
            return Err(ResolveError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            return Err(ResolveError::Http(format!("unexpected status {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ResolveError::InvalidResponse(err.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for XrpcIdentityResolver {
    #[instrument(skip(self))]
    async fn did_for_handle(&self, handle: &str) -> Result<String, ResolveError> {
        let url = method_url(&self.base, RESOLVE_HANDLE_NSID, "handle", handle);
        let output: ResolveHandleOutput = self.get(url, handle).await?;
        did_from_output(output)
    }

    #[instrument(skip(self))]
    async fn handle_for_did(&self, did: &str) -> Result<String, ResolveError> {
        let url = method_url(&self.base, GET_PROFILE_NSID, "actor", did);
        let profile: ProfileView = self.get(url, did).await?;
        handle_from_profile(did, profile)
    }
}

fn method_url(base: &Url, nsid: &str, param: &str, value: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("/xrpc/{nsid}"));
    url.query_pairs_mut().clear().append_pair(param, value);
    url
}

fn did_from_output(output: ResolveHandleOutput) -> Result<String, ResolveError> {
    if !output.did.starts_with("did:") {
        return Err(ResolveError::InvalidResponse(format!(
            "`{}` is not a DID",
            output.did
        )));
    }
    Ok(output.did)
}

fn handle_from_profile(did: &str, profile: ProfileView) -> Result<String, ResolveError> {
    if profile.did != did {
        return Err(ResolveError::InvalidResponse(format!(
            "profile for `{did}` describes `{}`",
            profile.did
        )));
    }
    if profile.handle == INVALID_HANDLE {
        return Err(ResolveError::NotFound(did.to_string()));
    }
    Ok(profile.handle)
}
