//! Client-facing façade for rate checks.
//!
//! The dispatcher is the only thing application code calls. Each call is
//! independent and stateless: resolve the current owner through the local
//! registry replica, perform the check-and-increment (in process when this
//! node is the owner, over the peer transport otherwise), and normalize
//! every failure to `Unavailable`. The limiter never fails open: callers
//! pick their own fallback policy.
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cluster::messages::{IncrementRequest, IncrementResponse, PeekRequest, PeekResponse};
use crate::error::{RegistryError, Result, TurnstileError};
use crate::limiter::counter_store::Verdict;
use crate::limiter::service::{serve_increment, serve_peek, LimiterSlot};
use crate::node::node_id::NodeName;
use crate::singleton::registry::{SingletonHandle, SingletonRegistry};
use crate::transport::PeerClient;

/// Three-way outcome of a rate check. `Unavailable` covers every failure:
/// no registered owner, transport trouble, or a deadline expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { calls_remaining: u32, window_id: u64 },
    Denied { window_id: u64 },
    Unavailable,
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RateDecision::Denied { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RateDecision::Unavailable)
    }
}

#[derive(Clone)]
pub struct RemoteDispatcher {
    name: String,
    local: NodeName,
    call_timeout: Duration,
    registry: Arc<SingletonRegistry>,
    slot: LimiterSlot,
    peers: Arc<dyn PeerClient>,
}

impl RemoteDispatcher {
    pub fn new(
        name: String,
        local: NodeName,
        call_timeout: Duration,
        registry: Arc<SingletonRegistry>,
        slot: LimiterSlot,
        peers: Arc<dyn PeerClient>,
    ) -> Self {
        Self {
            name,
            local,
            call_timeout,
            registry,
            slot,
            peers,
        }
    }

    /// Count one call against `key`'s quota.
    pub async fn check(&self, key: &str) -> RateDecision {
        let Some(owner) = self.registry.lookup(&self.name).await else {
            debug!(key, singleton = %self.name, "no registered owner; unavailable");
            return RateDecision::Unavailable;
        };
        match self.increment_on(&owner, key).await {
            Ok(response) => match response.result {
                Verdict::Allowed => RateDecision::Allowed {
                    calls_remaining: response.calls_remaining,
                    window_id: response.window_id,
                },
                Verdict::Denied => RateDecision::Denied {
                    window_id: response.window_id,
                },
            },
            Err(err) => {
                debug!(key, error = %err, "rate check failed; unavailable");
                RateDecision::Unavailable
            }
        }
    }

    /// Read the remaining quota for `key` without consuming any.
    pub async fn peek(&self, key: &str) -> Result<PeekResponse> {
        let owner = self
            .registry
            .lookup(&self.name)
            .await
            .ok_or_else(|| RegistryError::NotFound(self.name.clone()))?;
        let request = PeekRequest {
            name: self.name.clone(),
            incarnation: owner.incarnation,
            key: key.to_string(),
        };
        if owner.owner == self.local {
            match tokio::time::timeout(self.call_timeout, serve_peek(&self.slot, request)).await {
                Ok(result) => result,
                Err(_) => Err(TurnstileError::Timeout(format!(
                    "local quota probe for '{}' timed out",
                    key
                ))),
            }
        } else {
            self.peers
                .peek(&owner.owner, &request, self.call_timeout)
                .await
        }
    }

    async fn increment_on(
        &self,
        owner: &SingletonHandle,
        key: &str,
    ) -> Result<IncrementResponse> {
        let request = IncrementRequest {
            name: self.name.clone(),
            incarnation: owner.incarnation,
            key: key.to_string(),
        };
        if owner.owner == self.local {
            match tokio::time::timeout(self.call_timeout, serve_increment(&self.slot, request))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TurnstileError::Timeout(format!(
                    "local increment for '{}' timed out",
                    key
                ))),
            }
        } else {
            self.peers
                .increment(&owner.owner, &request, self.call_timeout)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::service::{ActiveLimiter, LimiterService};
    use crate::settings::QuotaSettings;
    use crate::transport::{MemoryHub, MemoryPeerClient};

    fn dispatcher_for(
        registry: Arc<SingletonRegistry>,
        slot: LimiterSlot,
        local: &NodeName,
        hub: &MemoryHub,
    ) -> RemoteDispatcher {
        RemoteDispatcher::new(
            "rate_limiter".to_string(),
            local.clone(),
            Duration::from_secs(5),
            registry,
            slot,
            Arc::new(MemoryPeerClient::new(hub.clone(), local.clone())),
        )
    }

    #[tokio::test]
    async fn empty_registry_is_unavailable_immediately() {
        let hub = MemoryHub::new();
        let local = NodeName::from("http://10.0.0.1:8620");
        let dispatcher = dispatcher_for(
            Arc::new(SingletonRegistry::new()),
            LimiterSlot::new(),
            &local,
            &hub,
        );
        assert!(dispatcher.check("any_key").await.is_unavailable());
        assert!(dispatcher.peek("any_key").await.is_err());
    }

    #[tokio::test]
    async fn local_owner_maps_verdicts_through() {
        let hub = MemoryHub::new();
        let local = NodeName::from("http://10.0.0.1:8620");
        let registry = Arc::new(SingletonRegistry::new());
        let slot = LimiterSlot::new();

        let (handle, _join) = LimiterService::spawn(QuotaSettings {
            max_per_window: 2,
            window_seconds: 60,
        });
        slot.install(ActiveLimiter {
            name: "rate_limiter".to_string(),
            incarnation: 1,
            handle,
        })
        .await;
        registry
            .register(SingletonHandle {
                name: "rate_limiter".to_string(),
                owner: local.clone(),
                incarnation: 1,
            })
            .await
            .unwrap();

        let dispatcher = dispatcher_for(registry, slot, &local, &hub);
        assert!(dispatcher.check("127.0.0.1").await.is_allowed());
        assert!(dispatcher.check("127.0.0.1").await.is_allowed());
        assert!(dispatcher.check("127.0.0.1").await.is_denied());
    }

    #[tokio::test]
    async fn registry_pointing_at_dead_node_is_unavailable() {
        let hub = MemoryHub::new();
        let local = NodeName::from("http://10.0.0.1:8620");
        let registry = Arc::new(SingletonRegistry::new());
        registry
            .register(SingletonHandle {
                name: "rate_limiter".to_string(),
                owner: NodeName::from("http://10.0.0.9:8620"),
                incarnation: 1,
            })
            .await
            .unwrap();

        let dispatcher = dispatcher_for(registry, LimiterSlot::new(), &local, &hub);
        assert!(dispatcher.check("127.0.0.1").await.is_unavailable());
    }
}
