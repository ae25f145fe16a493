//! In-process peer transport.
//!
//! Routes calls between nodes assembled inside one process, which is how
//! the integration tests stand up multi-node clusters without sockets.
//! Links can be severed and delayed to simulate partitions and slow peers.
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::cluster::messages::{
    IncrementRequest, IncrementResponse, PeekRequest, PeekResponse, RegistryUpdate,
};
use crate::error::{Result, TurnstileError};
use crate::limiter::service::{serve_increment, serve_peek, LimiterSlot};
use crate::node::node_id::NodeName;
use crate::singleton::registry::{SingletonHandle, SingletonRegistry};
use crate::transport::PeerClient;

/// The server half a node registers with the hub; mirrors the `/internal`
/// HTTP routes.
#[derive(Clone)]
pub struct MemoryEndpoint {
    pub registry: Arc<SingletonRegistry>,
    pub slot: LimiterSlot,
}

#[derive(Default)]
struct HubInner {
    endpoints: HashMap<NodeName, MemoryEndpoint>,
    severed: HashSet<(NodeName, NodeName)>,
    latency: HashMap<(NodeName, NodeName), Duration>,
}

#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: NodeName, endpoint: MemoryEndpoint) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.endpoints.insert(name, endpoint);
        }
    }

    /// Remove a node from the hub entirely, as if its process died.
    pub fn unregister(&self, name: &NodeName) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.endpoints.remove(name);
        }
    }

    /// Block traffic between two nodes in both directions.
    pub fn sever(&self, a: &NodeName, b: &NodeName) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.severed.insert((a.clone(), b.clone()));
            inner.severed.insert((b.clone(), a.clone()));
        }
    }

    /// Restore traffic between two nodes.
    pub fn heal(&self, a: &NodeName, b: &NodeName) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.severed.remove(&(a.clone(), b.clone()));
            inner.severed.remove(&(b.clone(), a.clone()));
        }
    }

    /// Delay every call on the given directed link.
    pub fn set_latency(&self, from: &NodeName, to: &NodeName, delay: Duration) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.latency.insert((from.clone(), to.clone()), delay);
        }
    }

    fn route(&self, from: &NodeName, to: &NodeName) -> Result<(MemoryEndpoint, Duration)> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| TurnstileError::Transport("hub lock poisoned".to_string()))?;
        if inner.severed.contains(&(from.clone(), to.clone())) {
            return Err(TurnstileError::Transport(format!(
                "link severed: {} -> {}",
                from, to
            )));
        }
        let delay = inner
            .latency
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or(Duration::ZERO);
        inner
            .endpoints
            .get(to)
            .cloned()
            .map(|endpoint| (endpoint, delay))
            .ok_or_else(|| TurnstileError::Transport(format!("no such peer: {}", to)))
    }
}

pub struct MemoryPeerClient {
    hub: MemoryHub,
    local: NodeName,
}

impl MemoryPeerClient {
    pub fn new(hub: MemoryHub, local: NodeName) -> Self {
        Self { hub, local }
    }

    async fn with_deadline<T>(
        timeout: Duration,
        delay: Duration,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let slowed = async {
            if delay > Duration::ZERO {
                tokio::time::sleep(delay).await;
            }
            call.await
        };
        match tokio::time::timeout(timeout, slowed).await {
            Ok(result) => result,
            Err(_) => Err(TurnstileError::Timeout(format!(
                "peer call exceeded {:?}",
                timeout
            ))),
        }
    }
}

#[async_trait]
impl PeerClient for MemoryPeerClient {
    async fn increment(
        &self,
        target: &NodeName,
        request: &IncrementRequest,
        timeout: Duration,
    ) -> Result<IncrementResponse> {
        let (endpoint, delay) = self.hub.route(&self.local, target)?;
        let request = request.clone();
        Self::with_deadline(timeout, delay, serve_increment(&endpoint.slot, request)).await
    }

    async fn peek(
        &self,
        target: &NodeName,
        request: &PeekRequest,
        timeout: Duration,
    ) -> Result<PeekResponse> {
        let (endpoint, delay) = self.hub.route(&self.local, target)?;
        let request = request.clone();
        Self::with_deadline(timeout, delay, serve_peek(&endpoint.slot, request)).await
    }

    async fn announce(
        &self,
        target: &NodeName,
        update: &RegistryUpdate,
        timeout: Duration,
    ) -> Result<()> {
        let (endpoint, delay) = self.hub.route(&self.local, target)?;
        let update = update.clone();
        Self::with_deadline(timeout, delay, async move {
            endpoint.registry.apply(update).await;
            Ok(())
        })
        .await
    }

    async fn lookup(
        &self,
        target: &NodeName,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<SingletonHandle>> {
        let (endpoint, delay) = self.hub.route(&self.local, target)?;
        let name = name.to_string();
        Self::with_deadline(timeout, delay, async move {
            Ok(endpoint.registry.lookup(&name).await)
        })
        .await
    }

    async fn ping(&self, target: &NodeName, timeout: Duration) -> Result<()> {
        let (_, delay) = self.hub.route(&self.local, target)?;
        Self::with_deadline(timeout, delay, async { Ok(()) }).await
    }
}
