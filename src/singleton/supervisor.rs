//! Singleton supervision.
//!
//! Every node runs one supervisor for the limiter singleton. The supervisor
//! is a single control loop that wakes on membership changes, directory
//! changes, local instance exit, or shutdown, and reconciles observed state
//! into the one-owner invariant: the active member with the lowest id runs
//! the instance, a crashed instance restarts with a fresh incarnation, and
//! a superseded owner stands down.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cluster::membership::{ClusterView, Membership};
use crate::cluster::messages::RegistryUpdate;
use crate::limiter::service::{ActiveLimiter, LimiterHandle, LimiterService, LimiterSlot};
use crate::limiter::window::WindowScheduler;
use crate::node::node_id::NodeName;
use crate::settings::{QuotaSettings, Settings};
use crate::singleton::registry::{SingletonHandle, SingletonRegistry};
use crate::transport::PeerClient;

/// Pause between restart attempts. Restarts themselves are unlimited: a
/// transient gap in enforcement beats a permanently dead limiter.
const RESTART_DELAY: Duration = Duration::from_millis(500);

/// One local lifetime of the singleton instance.
struct Tenure {
    incarnation: u64,
    join: JoinHandle<()>,
    handle: LimiterHandle,
    scheduler: WindowScheduler,
}

enum Wake {
    InstanceExit,
    Membership,
    Registry,
    Shutdown,
    Closed,
}

pub struct SingletonSupervisor {
    name: String,
    local: NodeName,
    quota: QuotaSettings,
    call_timeout: Duration,
    registry: Arc<SingletonRegistry>,
    membership: Arc<Membership>,
    peers: Arc<dyn PeerClient>,
    slot: LimiterSlot,
    shutdown: Notify,
}

impl SingletonSupervisor {
    pub fn new(
        settings: &Settings,
        registry: Arc<SingletonRegistry>,
        membership: Arc<Membership>,
        peers: Arc<dyn PeerClient>,
        slot: LimiterSlot,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: settings.singleton_name.clone(),
            local: settings.node_name(),
            quota: settings.quota(),
            call_timeout: settings.call_timeout(),
            registry,
            membership,
            peers,
            slot,
            shutdown: Notify::new(),
        })
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    /// Ask for a graceful stop: the instance is retired and unregistered
    /// cluster-wide before the loop exits.
    pub fn begin_shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn run(self: Arc<Self>) {
        let mut members = self.membership.watch();
        let mut registry_changes = self.registry.subscribe();

        self.adopt_existing().await;

        let mut tenure: Option<Tenure> = None;
        // (membership version, incarnation) last announced to peers
        let mut announced: Option<(u64, u64)> = None;

        loop {
            tenure = self.reconcile(tenure).await;

            if let Some(t) = &tenure {
                let view = self.membership.view();
                if announced != Some((view.version, t.incarnation)) {
                    self.broadcast(
                        &view,
                        RegistryUpdate::Register {
                            handle: SingletonHandle {
                                name: self.name.clone(),
                                owner: self.local.clone(),
                                incarnation: t.incarnation,
                            },
                        },
                    )
                    .await;
                    announced = Some((view.version, t.incarnation));
                }
            }

            let wake = {
                let instance_exit = async {
                    match tenure.as_mut() {
                        Some(t) => {
                            let _ = (&mut t.join).await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    _ = instance_exit => Wake::InstanceExit,
                    changed = members.changed() => {
                        if changed.is_ok() { Wake::Membership } else { Wake::Closed }
                    }
                    changed = registry_changes.changed() => {
                        if changed.is_ok() { Wake::Registry } else { Wake::Closed }
                    }
                    _ = self.shutdown.notified() => Wake::Shutdown,
                }
            };

            match wake {
                Wake::InstanceExit | Wake::Membership | Wake::Registry => continue,
                Wake::Shutdown => {
                    if let Some(t) = tenure.take() {
                        self.retire(t).await;
                    }
                    info!("singleton supervisor stopped");
                    break;
                }
                Wake::Closed => break,
            }
        }
    }

    /// Join-time negotiation: before electing anyone, ask the configured
    /// peers whether an owner is already registered and adopt it if so. A
    /// restarting node must never displace a healthy running instance.
    async fn adopt_existing(&self) {
        let view = self.membership.view();
        for peer in view.peer_names(&self.local) {
            match self.peers.lookup(&peer, &self.name, self.call_timeout).await {
                Ok(Some(handle)) => {
                    debug!(%peer, handle = %handle.describe(), "adopting registration from peer");
                    self.registry
                        .apply(RegistryUpdate::Register { handle })
                        .await;
                }
                Ok(None) => {}
                Err(err) => debug!(%peer, error = %err, "join-time lookup failed"),
            }
        }
    }

    /// Drive observed state toward the one-owner invariant. Returns the
    /// local tenure to carry into the next iteration.
    async fn reconcile(&self, mut tenure: Option<Tenure>) -> Option<Tenure> {
        let view = self.membership.view();

        // A registration pointing at a departed node blocks election until
        // it is retired.
        if let Some(current) = self.registry.lookup(&self.name).await {
            if current.owner != self.local && !view.contains(&current.owner) {
                info!(
                    handle = %current.describe(),
                    "owner left the cluster, retiring its registration"
                );
                self.registry.evict(&current).await;
            }
        }

        if let Some(t) = tenure.take() {
            match self.registry.lookup(&self.name).await {
                Some(current)
                    if current.owner == self.local && current.incarnation == t.incarnation =>
                {
                    if t.join.is_finished() {
                        warn!(
                            incarnation = t.incarnation,
                            "limiter instance exited, restarting with a fresh incarnation"
                        );
                        self.slot.clear().await;
                        t.scheduler.stop();
                        self.registry.unregister(&self.name, t.incarnation).await;
                        tokio::time::sleep(RESTART_DELAY).await;
                        let incarnation = self.registry.next_incarnation(&self.name).await;
                        return self.try_activate(incarnation).await;
                    }
                    // Healthy registered owner; nothing to reconcile.
                    return Some(t);
                }
                Some(current) => {
                    info!(
                        winner = %current.describe(),
                        incarnation = t.incarnation,
                        "superseded by a newer registration, standing down"
                    );
                    self.deactivate(t).await;
                }
                None => {
                    info!(
                        incarnation = t.incarnation,
                        "registration withdrawn, stopping local instance"
                    );
                    self.deactivate(t).await;
                }
            }
        }

        match self.registry.lookup(&self.name).await {
            Some(current) if current.owner == self.local => {
                // A peer remembered this node as owner from a previous life;
                // supersede that handle with a fresh instance.
                let incarnation = self.registry.next_incarnation(&self.name).await;
                self.try_activate(incarnation).await
            }
            Some(_) => None,
            None => {
                if view.elected() == Some(&self.local) {
                    let incarnation = self.registry.next_incarnation(&self.name).await;
                    self.try_activate(incarnation).await
                } else {
                    None
                }
            }
        }
    }

    /// Start a fresh instance and publish it. On a lost registration race
    /// the instance is discarded and this node defers.
    async fn try_activate(&self, incarnation: u64) -> Option<Tenure> {
        let (handle, join) = LimiterService::spawn(self.quota.clone());
        let scheduler =
            WindowScheduler::start(handle.clone(), self.quota.window_duration(), incarnation);
        let registration = SingletonHandle {
            name: self.name.clone(),
            owner: self.local.clone(),
            incarnation,
        };
        if let Err(err) = self.registry.register(registration).await {
            warn!(error = %err, incarnation, "registration refused, discarding instance");
            scheduler.stop();
            join.abort();
            return None;
        }
        self.slot
            .install(ActiveLimiter {
                name: self.name.clone(),
                incarnation,
                handle: handle.clone(),
            })
            .await;
        info!(incarnation, "rate limiter singleton is active on this node");
        Some(Tenure {
            incarnation,
            join,
            handle,
            scheduler,
        })
    }

    /// Stop the local instance without touching the directory.
    async fn deactivate(&self, tenure: Tenure) {
        self.slot.clear().await;
        tenure.scheduler.stop();
        let _ = tenure.handle.shutdown().await;
        tenure.join.abort();
    }

    /// Intentional stop: deactivate, then withdraw the registration locally
    /// and cluster-wide.
    async fn retire(&self, tenure: Tenure) {
        let incarnation = tenure.incarnation;
        self.deactivate(tenure).await;
        self.registry.unregister(&self.name, incarnation).await;
        let view = self.membership.view();
        self.broadcast(
            &view,
            RegistryUpdate::Unregister {
                name: self.name.clone(),
                incarnation,
            },
        )
        .await;
    }

    async fn broadcast(&self, view: &ClusterView, update: RegistryUpdate) {
        for peer in view.peer_names(&self.local) {
            if let Err(err) = self.peers.announce(&peer, &update, self.call_timeout).await {
                debug!(%peer, error = %err, "registry announcement failed");
            }
        }
    }
}
