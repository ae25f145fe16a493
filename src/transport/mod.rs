//! Peer transport seam.
//!
//! Node identity (`NodeName`) is deliberately separate from the channel used
//! to reach it; everything cross-node goes through this trait. Every call
//! carries its own deadline, and deadline expiry is the only cancellation
//! mechanism: the counter-owner's work is near-instant, so nothing in-flight
//! is ever torn down server-side.
pub mod http;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;

use crate::cluster::messages::{
    IncrementRequest, IncrementResponse, PeekRequest, PeekResponse, RegistryUpdate,
};
use crate::error::Result;
use crate::node::node_id::NodeName;
use crate::singleton::registry::SingletonHandle;

pub use http::HttpPeerClient;
pub use memory::{MemoryEndpoint, MemoryHub, MemoryPeerClient};

#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Check-and-increment on the target node's limiter instance.
    async fn increment(
        &self,
        target: &NodeName,
        request: &IncrementRequest,
        timeout: Duration,
    ) -> Result<IncrementResponse>;

    /// Read-only quota probe on the target node's limiter instance.
    async fn peek(
        &self,
        target: &NodeName,
        request: &PeekRequest,
        timeout: Duration,
    ) -> Result<PeekResponse>;

    /// Deliver a singleton directory announcement to the target node.
    async fn announce(
        &self,
        target: &NodeName,
        update: &RegistryUpdate,
        timeout: Duration,
    ) -> Result<()>;

    /// Ask the target node what it has registered under `name`.
    async fn lookup(
        &self,
        target: &NodeName,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<SingletonHandle>>;

    /// Liveness probe used by the heartbeat loop.
    async fn ping(&self, target: &NodeName, timeout: Duration) -> Result<()>;
}
