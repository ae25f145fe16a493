//! Cluster-wide singleton directory.
//!
//! Every node keeps a local replica of the name -> owner mapping; owners
//! announce registrations over the peer transport and each replica applies
//! them with the same conflict rule, so replicas converge within one
//! propagation round. Lookup is purely local.
use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::cluster::messages::RegistryUpdate;
use crate::error::{RegistryError, Result};
use crate::node::node_id::{NodeId, NodeName};

/// Location of a live singleton instance. Replaced wholesale on every
/// re-election; never mutated in place.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct SingletonHandle {
    pub name: String,
    pub owner: NodeName,
    pub incarnation: u64,
}

impl SingletonHandle {
    pub fn owner_id(&self) -> NodeId {
        self.owner.node_id()
    }

    /// Conflict rule: higher incarnation wins; equal incarnations break
    /// toward the lower owner id, the same ordering elections use.
    pub fn supersedes(&self, other: &SingletonHandle) -> bool {
        match self.incarnation.cmp(&other.incarnation) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.owner_id() < other.owner_id(),
        }
    }

    pub fn describe(&self) -> String {
        format!("{}@{}#{}", self.name, self.owner, self.incarnation)
    }
}

/// What applying a remote update did to the local directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Accepted,
    Ignored,
}

#[derive(Default)]
struct Directory {
    entries: HashMap<String, SingletonHandle>,
    // Highest incarnation ever observed per name, live or retired. New
    // instances must start above this so they supersede any stale replica.
    high_water: HashMap<String, u64>,
}

impl Directory {
    fn note(&mut self, name: &str, incarnation: u64) {
        let mark = self.high_water.entry(name.to_string()).or_insert(0);
        if incarnation > *mark {
            *mark = incarnation;
        }
    }
}

pub struct SingletonRegistry {
    directory: RwLock<Directory>,
    version_tx: watch::Sender<u64>,
}

impl Default for SingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SingletonRegistry {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            directory: RwLock::new(Directory::default()),
            version_tx,
        }
    }

    /// Wakes on every directory change; carries no payload, readers re-read.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    fn bump(&self) {
        self.version_tx.send_modify(|version| *version += 1);
    }

    pub async fn lookup(&self, name: &str) -> Option<SingletonHandle> {
        self.directory.read().await.entries.get(name).cloned()
    }

    /// Publish a local instance. Refused when a superseding registration is
    /// already known: the caller lost a race and must stand down.
    pub async fn register(&self, handle: SingletonHandle) -> Result<()> {
        let mut directory = self.directory.write().await;
        if let Some(existing) = directory.entries.get(&handle.name) {
            if existing != &handle && !handle.supersedes(existing) {
                return Err(RegistryError::ConflictingOwner {
                    held: existing.describe(),
                    offered: handle.describe(),
                }
                .into());
            }
        }
        directory.note(&handle.name, handle.incarnation);
        directory.entries.insert(handle.name.clone(), handle);
        drop(directory);
        self.bump();
        Ok(())
    }

    /// Retire a registration this node published. Only the exact incarnation
    /// is removed; a newer registration stays untouched.
    pub async fn unregister(&self, name: &str, incarnation: u64) -> bool {
        let mut directory = self.directory.write().await;
        directory.note(name, incarnation);
        let held = directory
            .entries
            .get(name)
            .is_some_and(|entry| entry.incarnation == incarnation);
        if held {
            directory.entries.remove(name);
            drop(directory);
            self.bump();
        }
        held
    }

    /// Apply an announcement from a peer with the incarnation conflict rule.
    pub async fn apply(&self, update: RegistryUpdate) -> Applied {
        match update {
            RegistryUpdate::Register { handle } => {
                let mut directory = self.directory.write().await;
                directory.note(&handle.name, handle.incarnation);
                if let Some(existing) = directory.entries.get(&handle.name) {
                    if existing == &handle {
                        return Applied::Ignored;
                    }
                    if !handle.supersedes(existing) {
                        debug!(
                            held = %existing.describe(),
                            offered = %handle.describe(),
                            "ignoring superseded registration"
                        );
                        return Applied::Ignored;
                    }
                }
                directory.entries.insert(handle.name.clone(), handle);
                drop(directory);
                self.bump();
                Applied::Accepted
            }
            RegistryUpdate::Unregister { name, incarnation } => {
                if self.unregister(&name, incarnation).await {
                    Applied::Accepted
                } else {
                    Applied::Ignored
                }
            }
        }
    }

    /// Drop `handle` from the directory because its owner left the cluster.
    /// A no-op if a different registration has since taken the name.
    pub async fn evict(&self, handle: &SingletonHandle) -> bool {
        let mut directory = self.directory.write().await;
        directory.note(&handle.name, handle.incarnation);
        let held = directory
            .entries
            .get(&handle.name)
            .is_some_and(|entry| entry == handle);
        if held {
            directory.entries.remove(&handle.name);
            drop(directory);
            self.bump();
        }
        held
    }

    /// The incarnation a fresh instance must start at to supersede anything
    /// this replica has ever seen.
    pub async fn next_incarnation(&self, name: &str) -> u64 {
        let directory = self.directory.read().await;
        directory.high_water.get(name).copied().unwrap_or(0) + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(name: &str, owner: &str, incarnation: u64) -> SingletonHandle {
        SingletonHandle {
            name: name.to_string(),
            owner: NodeName::from(owner),
            incarnation,
        }
    }

    #[test]
    fn higher_incarnation_supersedes() {
        let old = handle("rate_limiter", "http://10.0.0.1:8620", 1);
        let new = handle("rate_limiter", "http://10.0.0.2:8620", 2);
        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
    }

    #[test]
    fn equal_incarnations_break_toward_lower_id() {
        let a = handle("rate_limiter", "http://10.0.0.1:8620", 1);
        let b = handle("rate_limiter", "http://10.0.0.2:8620", 1);
        let winner = if a.owner_id() < b.owner_id() { &a } else { &b };
        let loser = if a.owner_id() < b.owner_id() { &b } else { &a };
        assert!(winner.supersedes(loser));
        assert!(!loser.supersedes(winner));
    }

    #[tokio::test]
    async fn register_and_lookup() {
        let registry = SingletonRegistry::new();
        let owner = handle("rate_limiter", "http://10.0.0.1:8620", 1);
        registry.register(owner.clone()).await.unwrap();
        assert_eq!(registry.lookup("rate_limiter").await, Some(owner));
        assert_eq!(registry.lookup("other").await, None);
    }

    #[tokio::test]
    async fn register_refuses_superseded_handle() {
        let registry = SingletonRegistry::new();
        registry
            .register(handle("rate_limiter", "http://10.0.0.1:8620", 3))
            .await
            .unwrap();
        let refused = registry
            .register(handle("rate_limiter", "http://10.0.0.2:8620", 2))
            .await;
        assert!(refused.is_err());
        // the held registration is unchanged
        let held = registry.lookup("rate_limiter").await.unwrap();
        assert_eq!(held.incarnation, 3);
    }

    #[tokio::test]
    async fn apply_keeps_highest_incarnation() {
        let registry = SingletonRegistry::new();
        let old = handle("rate_limiter", "http://10.0.0.1:8620", 1);
        let new = handle("rate_limiter", "http://10.0.0.2:8620", 2);

        let applied = registry
            .apply(RegistryUpdate::Register { handle: new.clone() })
            .await;
        assert_eq!(applied, Applied::Accepted);

        // a late announcement for the older incarnation is ignored
        let applied = registry
            .apply(RegistryUpdate::Register { handle: old })
            .await;
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(registry.lookup("rate_limiter").await, Some(new));
    }

    #[tokio::test]
    async fn unregister_only_removes_exact_incarnation() {
        let registry = SingletonRegistry::new();
        registry
            .register(handle("rate_limiter", "http://10.0.0.1:8620", 2))
            .await
            .unwrap();

        assert!(!registry.unregister("rate_limiter", 1).await);
        assert!(registry.lookup("rate_limiter").await.is_some());

        assert!(registry.unregister("rate_limiter", 2).await);
        assert!(registry.lookup("rate_limiter").await.is_none());
    }

    #[tokio::test]
    async fn next_incarnation_rises_past_evicted_entries() {
        let registry = SingletonRegistry::new();
        assert_eq!(registry.next_incarnation("rate_limiter").await, 1);

        let owner = handle("rate_limiter", "http://10.0.0.1:8620", 4);
        registry.register(owner.clone()).await.unwrap();
        assert_eq!(registry.next_incarnation("rate_limiter").await, 5);

        registry.evict(&owner).await;
        assert!(registry.lookup("rate_limiter").await.is_none());
        // an evicted owner's incarnation is never reused
        assert_eq!(registry.next_incarnation("rate_limiter").await, 5);
    }

    #[tokio::test]
    async fn evict_spares_newer_registrations() {
        let registry = SingletonRegistry::new();
        let departed = handle("rate_limiter", "http://10.0.0.1:8620", 1);
        let replacement = handle("rate_limiter", "http://10.0.0.2:8620", 2);
        registry.register(replacement.clone()).await.unwrap();

        assert!(!registry.evict(&departed).await);
        assert_eq!(registry.lookup("rate_limiter").await, Some(replacement));
    }

    #[tokio::test]
    async fn subscribers_wake_on_changes() {
        let registry = SingletonRegistry::new();
        let mut rx = registry.subscribe();
        registry
            .register(handle("rate_limiter", "http://10.0.0.1:8620", 1))
            .await
            .unwrap();
        rx.changed().await.unwrap();
    }
}
