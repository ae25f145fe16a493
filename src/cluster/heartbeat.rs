//! Peer liveness probing.
//!
//! A light failure detector over the peer transport: every configured peer
//! is pinged on a fixed cadence and marked down after a few consecutive
//! misses, up again on the first success. Anything smarter (gossip, phi
//! accrual) belongs to an external membership system feeding
//! `Membership::mark_up`/`mark_down` directly.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::cluster::membership::Membership;
use crate::node::node_id::NodeName;
use crate::transport::PeerClient;

const MISSES_BEFORE_DOWN: u32 = 3;

pub fn spawn(
    membership: Arc<Membership>,
    peers: Arc<dyn PeerClient>,
    interval: Duration,
    ping_timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut misses: HashMap<NodeName, u32> = HashMap::new();
        loop {
            ticker.tick().await;
            for peer in membership.configured_peers().to_vec() {
                match peers.ping(&peer, ping_timeout).await {
                    Ok(()) => {
                        misses.remove(&peer);
                        membership.mark_up(&peer).await;
                    }
                    Err(err) => {
                        let count = misses.entry(peer.clone()).or_insert(0);
                        *count += 1;
                        debug!(%peer, misses = *count, error = %err, "peer heartbeat failed");
                        if *count >= MISSES_BEFORE_DOWN {
                            membership.mark_down(&peer).await;
                        }
                    }
                }
            }
        }
    })
}
