//! One turnstile process: the cluster seams wired to the singleton
//! machinery, plus the façade the API layer calls.
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

pub mod node_id;

pub use node_id::{NodeId, NodeName};

use crate::cluster::heartbeat;
use crate::cluster::membership::Membership;
use crate::cluster::messages::PeekResponse;
use crate::dispatch::{RateDecision, RemoteDispatcher};
use crate::error::Result;
use crate::limiter::service::LimiterSlot;
use crate::settings::Settings;
use crate::singleton::registry::SingletonRegistry;
use crate::singleton::supervisor::SingletonSupervisor;
use crate::transport::{HttpPeerClient, PeerClient};

#[derive(Clone)]
pub struct Node {
    pub settings: Settings,
    pub membership: Arc<Membership>,
    pub registry: Arc<SingletonRegistry>,
    pub slot: LimiterSlot,
    dispatcher: RemoteDispatcher,
    supervisor: Arc<SingletonSupervisor>,
    supervision: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Node {
    /// Wire the full node over HTTP and start supervision and peer
    /// heartbeats. This is the production entry point.
    pub async fn start(settings: Settings) -> Result<Self> {
        let peers: Arc<dyn PeerClient> = Arc::new(HttpPeerClient::new()?);
        let node = Self::build(settings, peers.clone())?;
        node.supervise().await;
        if !node.membership.configured_peers().is_empty() {
            let _ = heartbeat::spawn(
                node.membership.clone(),
                peers,
                node.settings.heartbeat_interval(),
                node.settings.call_timeout(),
            );
        }
        Ok(node)
    }

    /// Assemble a node on any transport without starting background tasks.
    /// Tests use this with the in-memory hub, then call `supervise`.
    pub fn build(settings: Settings, peers: Arc<dyn PeerClient>) -> Result<Self> {
        let local = settings.node_name();
        info!(node = %local, peers = settings.peer_names().len(), "assembling node");
        let membership = Arc::new(Membership::new(local.clone(), settings.peer_names()));
        let registry = Arc::new(SingletonRegistry::new());
        let slot = LimiterSlot::new();
        let supervisor = SingletonSupervisor::new(
            &settings,
            registry.clone(),
            membership.clone(),
            peers.clone(),
            slot.clone(),
        );
        let dispatcher = RemoteDispatcher::new(
            settings.singleton_name.clone(),
            local,
            settings.call_timeout(),
            registry.clone(),
            slot.clone(),
            peers,
        );
        Ok(Self {
            settings,
            membership,
            registry,
            slot,
            dispatcher,
            supervisor,
            supervision: Arc::new(Mutex::new(None)),
        })
    }

    pub fn name(&self) -> &NodeName {
        self.membership.local_name()
    }

    /// Start the supervision loop. Call at most once per node.
    pub async fn supervise(&self) {
        let handle = self.supervisor.clone().spawn();
        *self.supervision.lock().await = Some(handle);
    }

    /// Count one call against `key`'s quota.
    pub async fn check_rate(&self, key: &str) -> RateDecision {
        self.dispatcher.check(key).await
    }

    /// Remaining quota for `key`, without consuming any.
    pub async fn peek_rate(&self, key: &str) -> Result<PeekResponse> {
        self.dispatcher.peek(key).await
    }

    /// Graceful stop: retire and unregister the singleton if this node owns
    /// it, then wait for the supervisor to finish.
    pub async fn shutdown(&self) {
        self.supervisor.begin_shutdown();
        if let Some(handle) = self.supervision.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Tear the node down ungracefully, as if its process died. Test-cluster
    /// hook for failover scenarios.
    pub async fn halt(&self) {
        if let Some(handle) = self.supervision.lock().await.take() {
            handle.abort();
        }
        if let Some(active) = self.slot.active().await {
            let _ = active.handle.shutdown().await;
        }
        self.slot.clear().await;
    }
}
