//! Turnstile application settings
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::node::node_id::NodeName;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const STANDARD_PORT_HTTP: u16 = 8620;
pub const DEFAULT_PORT_HTTP: &str = "8620";

pub const DEFAULT_MAX_PER_WINDOW: &str = "2";
pub const DEFAULT_WINDOW_SECONDS: &str = "60";
pub const DEFAULT_CALL_TIMEOUT_SECONDS: &str = "5";
pub const DEFAULT_FAILURE_TIMEOUT_SECONDS: &str = "15";
pub const DEFAULT_SINGLETON_NAME: &str = "rate_limiter";

/// Quota enforced by the counter-owner for one window.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QuotaSettings {
    pub max_per_window: u32,
    pub window_seconds: u64,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            max_per_window: 2,
            window_seconds: 60,
        }
    }
}

impl QuotaSettings {
    pub fn window_duration(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // Server listen address
    pub listen_address: String,

    // HTTP API listen port
    pub listen_port: u16,

    // URL peers use to reach this node
    pub advertise_url: Url,

    // Cluster configuration information: peer node URLs
    pub topology: Vec<Url>,

    // Quota: max calls allowed per key per window
    pub max_per_window: u32,

    // Quota: window length in seconds before counters reset
    pub window_seconds: u64,

    // Deadline for calls to the counter-owner
    pub call_timeout_seconds: u64,

    // Peer failure detection timeout
    pub failure_timeout_seconds: u64,

    // Logical name the counter-owner registers under
    pub singleton_name: String,
}

impl Settings {
    pub fn node_name(&self) -> NodeName {
        NodeName::from_url(&self.advertise_url)
    }

    /// Configured peers, excluding this node itself.
    pub fn peer_names(&self) -> Vec<NodeName> {
        let local = self.node_name();
        let mut peers: Vec<NodeName> = self
            .topology
            .iter()
            .map(NodeName::from_url)
            .filter(|name| *name != local)
            .collect();
        peers.sort();
        peers.dedup();
        peers
    }

    pub fn quota(&self) -> QuotaSettings {
        QuotaSettings {
            max_per_window: self.max_per_window,
            window_seconds: self.window_seconds,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_seconds)
    }

    /// Peers are pinged a few times per failure window.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs((self.failure_timeout_seconds / 3).max(1))
    }
}
