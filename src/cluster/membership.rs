//! Cluster membership seam.
//!
//! Turnstile does not run its own gossip protocol; it only needs a live view
//! of which configured peers are reachable. Whatever failure detector is in
//! front (the built-in heartbeat loop, an orchestrator, a test harness)
//! feeds `mark_up`/`mark_down`, and every consumer observes changes through
//! a watch channel.
use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::node::node_id::{NodeId, NodeName};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Down,
}

/// One reachable-member snapshot. Cheap to clone; replaced wholesale on
/// every membership change.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterView {
    pub version: u64,
    members: BTreeMap<NodeId, NodeName>,
}

impl ClusterView {
    pub fn contains(&self, name: &NodeName) -> bool {
        self.members.values().any(|member| member == name)
    }

    /// Deterministic election rule: the active member with the lowest id.
    pub fn elected(&self) -> Option<&NodeName> {
        self.members.first_key_value().map(|(_, name)| name)
    }

    pub fn peer_names(&self, local: &NodeName) -> Vec<NodeName> {
        self.members
            .values()
            .filter(|member| *member != local)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MemberReport {
    pub name: NodeName,
    pub status: MemberStatus,
}

struct Roster {
    statuses: BTreeMap<NodeName, MemberStatus>,
    version: u64,
}

impl Roster {
    fn view(&self) -> ClusterView {
        let members = self
            .statuses
            .iter()
            .filter(|(_, status)| **status == MemberStatus::Active)
            .map(|(name, _)| (name.node_id(), name.clone()))
            .collect();
        ClusterView {
            version: self.version,
            members,
        }
    }
}

/// Tracks which configured members are currently reachable and publishes
/// every change on a watch channel.
pub struct Membership {
    local: NodeName,
    configured_peers: Vec<NodeName>,
    roster: Mutex<Roster>,
    view_tx: watch::Sender<ClusterView>,
}

impl Membership {
    pub fn new(local: NodeName, peers: Vec<NodeName>) -> Self {
        let mut statuses = BTreeMap::new();
        statuses.insert(local.clone(), MemberStatus::Active);
        for peer in &peers {
            statuses.insert(peer.clone(), MemberStatus::Active);
        }
        let roster = Roster {
            statuses,
            version: 1,
        };
        let (view_tx, _) = watch::channel(roster.view());
        Self {
            local,
            configured_peers: peers,
            roster: Mutex::new(roster),
            view_tx,
        }
    }

    pub fn local_name(&self) -> &NodeName {
        &self.local
    }

    pub fn local_id(&self) -> NodeId {
        self.local.node_id()
    }

    /// All configured peers regardless of status; the heartbeat loop pings
    /// these so a downed peer can come back.
    pub fn configured_peers(&self) -> &[NodeName] {
        &self.configured_peers
    }

    pub fn view(&self) -> ClusterView {
        self.view_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ClusterView> {
        self.view_tx.subscribe()
    }

    pub async fn mark_down(&self, name: &NodeName) {
        // The local node never marks itself down
        if name == &self.local {
            return;
        }
        self.set_status(name, MemberStatus::Down).await;
    }

    pub async fn mark_up(&self, name: &NodeName) {
        self.set_status(name, MemberStatus::Active).await;
    }

    async fn set_status(&self, name: &NodeName, status: MemberStatus) {
        let mut roster = self.roster.lock().await;
        // Unknown members are ignored: topology is fixed configuration
        let changed = roster
            .statuses
            .get(name)
            .is_some_and(|current| *current != status);
        if changed {
            tracing::info!(member = %name, ?status, "cluster membership changed");
            roster.statuses.insert(name.clone(), status);
            roster.version += 1;
            let view = roster.view();
            drop(roster);
            self.view_tx.send_replace(view);
        }
    }

    pub async fn members(&self) -> Vec<MemberReport> {
        let roster = self.roster.lock().await;
        roster
            .statuses
            .iter()
            .map(|(name, status)| MemberReport {
                name: name.clone(),
                status: *status,
            })
            .collect()
    }
}
