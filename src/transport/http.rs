//! HTTP peer transport: JSON request/response against the `/internal`
//! routes that every turnstile node serves.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::paths;
use crate::cluster::messages::{
    IncrementRequest, IncrementResponse, LookupResponse, PeekRequest, PeekResponse, RegistryUpdate,
};
use crate::error::{RegistryError, Result, TurnstileError};
use crate::node::node_id::NodeName;
use crate::singleton::registry::SingletonHandle;
use crate::transport::PeerClient;

pub struct HttpPeerClient {
    client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TurnstileError::Transport(format!("building HTTP client: {}", err)))?;
        Ok(Self { client })
    }

    fn url(target: &NodeName, path: &str) -> String {
        format!("{}{}", target.as_str(), path)
    }

    /// Owner-side rejections come back as structured HTTP errors; turn the
    /// ones the dispatcher cares about back into typed errors.
    fn check_status(target: &NodeName, response: reqwest::Response) -> Result<reqwest::Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound(format!(
                "{} has no live instance",
                target
            ))
            .into()),
            StatusCode::CONFLICT => Err(TurnstileError::Transport(format!(
                "{} rejected the call as stale",
                target
            ))),
            status => Err(TurnstileError::Transport(format!(
                "{} answered {}",
                target, status
            ))),
        }
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn increment(
        &self,
        target: &NodeName,
        request: &IncrementRequest,
        timeout: Duration,
    ) -> Result<IncrementResponse> {
        let response = self
            .client
            .post(Self::url(target, paths::internal::INCREMENT))
            .timeout(timeout)
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(target, response)?;
        Ok(response.json().await?)
    }

    async fn peek(
        &self,
        target: &NodeName,
        request: &PeekRequest,
        timeout: Duration,
    ) -> Result<PeekResponse> {
        let response = self
            .client
            .post(Self::url(target, paths::internal::PEEK))
            .timeout(timeout)
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(target, response)?;
        Ok(response.json().await?)
    }

    async fn announce(
        &self,
        target: &NodeName,
        update: &RegistryUpdate,
        timeout: Duration,
    ) -> Result<()> {
        let response = self
            .client
            .post(Self::url(target, paths::internal::ANNOUNCE))
            .timeout(timeout)
            .json(update)
            .send()
            .await?;
        Self::check_status(target, response)?;
        Ok(())
    }

    async fn lookup(
        &self,
        target: &NodeName,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<SingletonHandle>> {
        let url = format!("{}/internal/registry/{}", target.as_str(), name);
        let response = self.client.get(url).timeout(timeout).send().await?;
        let response = Self::check_status(target, response)?;
        let looked_up: LookupResponse = response.json().await?;
        Ok(looked_up.handle)
    }

    async fn ping(&self, target: &NodeName, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .get(Self::url(target, paths::base::HEALTH))
            .timeout(timeout)
            .send()
            .await?;
        Self::check_status(target, response)?;
        Ok(())
    }
}
