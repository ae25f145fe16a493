//! The singleton limiter instance: a task owning the `CounterStore` and
//! draining a command channel. All increments and resets for the cluster
//! pass through this one loop, which is what makes them linearizable.
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cluster::messages::{IncrementRequest, IncrementResponse, PeekRequest, PeekResponse};
use crate::error::{RegistryError, Result, TurnstileError};
use crate::limiter::counter_store::{CounterStore, Verdict};
use crate::settings::QuotaSettings;

const COMMAND_BUFFER: usize = 64;

/// Commands accepted by a running limiter instance.
#[derive(Debug)]
pub enum LimiterCommand {
    /// Count a call and report the verdict
    Increment {
        key: String,
        resp_chan: oneshot::Sender<IncrementOutcome>,
    },
    /// Report remaining quota without consuming any
    Peek {
        key: String,
        resp_chan: oneshot::Sender<PeekOutcome>,
    },
    /// Clear all counters and begin the next window
    Reset,
    /// Report window and key-count information
    Status {
        resp_chan: oneshot::Sender<LimiterStatus>,
    },
    /// Stop the instance
    Shutdown,
}

#[derive(Clone, Copy, Debug)]
pub struct IncrementOutcome {
    pub verdict: Verdict,
    pub calls_remaining: u32,
    pub window_id: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct PeekOutcome {
    pub calls_remaining: u32,
    pub window_id: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LimiterStatus {
    pub window_id: u64,
    pub window_started_at: DateTime<Utc>,
    pub tracked_keys: usize,
}

/// Cheap-to-clone handle for sending commands into a running instance.
#[derive(Clone, Debug)]
pub struct LimiterHandle {
    tx: mpsc::Sender<LimiterCommand>,
}

impl LimiterHandle {
    pub async fn increment(&self, key: String) -> Result<IncrementOutcome> {
        let (resp_chan, rx) = oneshot::channel();
        self.tx
            .send(LimiterCommand::Increment { key, resp_chan })
            .await
            .map_err(|_| TurnstileError::Singleton("limiter instance is gone".to_string()))?;
        rx.await
            .map_err(|_| TurnstileError::Singleton("limiter dropped the reply channel".to_string()))
    }

    pub async fn peek(&self, key: String) -> Result<PeekOutcome> {
        let (resp_chan, rx) = oneshot::channel();
        self.tx
            .send(LimiterCommand::Peek { key, resp_chan })
            .await
            .map_err(|_| TurnstileError::Singleton("limiter instance is gone".to_string()))?;
        rx.await
            .map_err(|_| TurnstileError::Singleton("limiter dropped the reply channel".to_string()))
    }

    pub async fn reset(&self) -> Result<()> {
        self.tx
            .send(LimiterCommand::Reset)
            .await
            .map_err(|_| TurnstileError::Singleton("limiter instance is gone".to_string()))
    }

    pub async fn status(&self) -> Result<LimiterStatus> {
        let (resp_chan, rx) = oneshot::channel();
        self.tx
            .send(LimiterCommand::Status { resp_chan })
            .await
            .map_err(|_| TurnstileError::Singleton("limiter instance is gone".to_string()))?;
        rx.await
            .map_err(|_| TurnstileError::Singleton("limiter dropped the reply channel".to_string()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(LimiterCommand::Shutdown)
            .await
            .map_err(|_| TurnstileError::Singleton("limiter instance is gone".to_string()))
    }
}

pub struct LimiterService {
    store: CounterStore,
    rx: mpsc::Receiver<LimiterCommand>,
}

impl LimiterService {
    /// Spawn a fresh instance with empty counters.
    pub fn spawn(quota: QuotaSettings) -> (LimiterHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            store: CounterStore::new(quota),
            rx,
        };
        let join = tokio::spawn(service.run());
        (LimiterHandle { tx }, join)
    }

    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                LimiterCommand::Increment { key, resp_chan } => {
                    let verdict = self.store.increment(&key);
                    let outcome = IncrementOutcome {
                        verdict,
                        calls_remaining: self.store.calls_remaining(&key),
                        window_id: self.store.window().id,
                    };
                    if resp_chan.send(outcome).is_err() {
                        debug!(key, "increment caller went away before the reply");
                    }
                }
                LimiterCommand::Peek { key, resp_chan } => {
                    let outcome = PeekOutcome {
                        calls_remaining: self.store.calls_remaining(&key),
                        window_id: self.store.window().id,
                    };
                    let _ = resp_chan.send(outcome);
                }
                LimiterCommand::Reset => {
                    debug!(
                        expired_window = self.store.window().id,
                        tracked_keys = self.store.len(),
                        "window elapsed, clearing counters"
                    );
                    self.store.reset();
                }
                LimiterCommand::Status { resp_chan } => {
                    let _ = resp_chan.send(LimiterStatus {
                        window_id: self.store.window().id,
                        window_started_at: self.store.window().started_at,
                        tracked_keys: self.store.len(),
                    });
                }
                LimiterCommand::Shutdown => {
                    info!("limiter instance shutting down");
                    break;
                }
            }
        }
    }
}

/// The local singleton instance slot: populated only while this node is the
/// counter-owner, empty everywhere else.
#[derive(Clone, Debug, Default)]
pub struct LimiterSlot {
    inner: Arc<RwLock<Option<ActiveLimiter>>>,
}

#[derive(Clone, Debug)]
pub struct ActiveLimiter {
    pub name: String,
    pub incarnation: u64,
    pub handle: LimiterHandle,
}

impl LimiterSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, active: ActiveLimiter) {
        *self.inner.write().await = Some(active);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn active(&self) -> Option<ActiveLimiter> {
        self.inner.read().await.clone()
    }
}

/// Serve a check-and-increment against the local instance. Shared by the
/// internal HTTP route and the in-memory transport so both enforce the same
/// incarnation rules.
pub async fn serve_increment(
    slot: &LimiterSlot,
    request: IncrementRequest,
) -> Result<IncrementResponse> {
    let active = slot
        .active()
        .await
        .filter(|active| active.name == request.name)
        .ok_or_else(|| RegistryError::NotFound(request.name.clone()))?;
    if active.incarnation != request.incarnation {
        return Err(RegistryError::StaleIncarnation {
            expected: active.incarnation,
            got: request.incarnation,
        }
        .into());
    }
    let outcome = active.handle.increment(request.key).await?;
    Ok(IncrementResponse {
        result: outcome.verdict,
        calls_remaining: outcome.calls_remaining,
        window_id: outcome.window_id,
    })
}

/// Serve a read-only quota probe against the local instance.
pub async fn serve_peek(slot: &LimiterSlot, request: PeekRequest) -> Result<PeekResponse> {
    let active = slot
        .active()
        .await
        .filter(|active| active.name == request.name)
        .ok_or_else(|| RegistryError::NotFound(request.name.clone()))?;
    if active.incarnation != request.incarnation {
        return Err(RegistryError::StaleIncarnation {
            expected: active.incarnation,
            got: request.incarnation,
        }
        .into());
    }
    let outcome = active.handle.peek(request.key).await?;
    Ok(PeekResponse {
        calls_remaining: outcome.calls_remaining,
        window_id: outcome.window_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max_per_window: u32) -> QuotaSettings {
        QuotaSettings {
            max_per_window,
            window_seconds: 60,
        }
    }

    #[tokio::test]
    async fn increment_through_handle() {
        let (handle, _join) = LimiterService::spawn(quota(2));
        let first = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(first.verdict, Verdict::Allowed);
        assert_eq!(first.calls_remaining, 1);

        let second = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(second.verdict, Verdict::Allowed);
        assert_eq!(second.calls_remaining, 0);

        let third = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(third.verdict, Verdict::Denied);
    }

    #[tokio::test]
    async fn reset_starts_new_window() {
        let (handle, _join) = LimiterService::spawn(quota(1));
        handle.increment("a1".to_string()).await.unwrap();
        let denied = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(denied.verdict, Verdict::Denied);
        assert_eq!(denied.window_id, 0);

        handle.reset().await.unwrap();
        let after = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(after.verdict, Verdict::Allowed);
        assert_eq!(after.window_id, 1);
    }

    #[tokio::test]
    async fn peek_does_not_consume_quota() {
        let (handle, _join) = LimiterService::spawn(quota(2));
        for _ in 0..5 {
            let probe = handle.peek("a1".to_string()).await.unwrap();
            assert_eq!(probe.calls_remaining, 2);
        }
        let outcome = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(outcome.calls_remaining, 1);
    }

    #[tokio::test]
    async fn concurrent_increments_are_never_lost() {
        let total: u32 = 500;
        let (handle, _join) = LimiterService::spawn(quota(total));
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    handle.increment("shared".to_string()).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let probe = handle.peek("shared".to_string()).await.unwrap();
        assert_eq!(probe.calls_remaining, 0);
    }

    #[tokio::test]
    async fn shutdown_stops_the_instance() {
        let (handle, join) = LimiterService::spawn(quota(2));
        handle.shutdown().await.unwrap();
        join.await.unwrap();
        assert!(handle.increment("a1".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn serve_increment_enforces_incarnation() {
        let (handle, _join) = LimiterService::spawn(quota(2));
        let slot = LimiterSlot::new();
        slot.install(ActiveLimiter {
            name: "rate_limiter".to_string(),
            incarnation: 2,
            handle,
        })
        .await;

        let stale = serve_increment(
            &slot,
            IncrementRequest {
                name: "rate_limiter".to_string(),
                incarnation: 1,
                key: "a1".to_string(),
            },
        )
        .await;
        assert!(matches!(
            stale,
            Err(TurnstileError::Registry(
                RegistryError::StaleIncarnation { expected: 2, got: 1 }
            ))
        ));

        let current = serve_increment(
            &slot,
            IncrementRequest {
                name: "rate_limiter".to_string(),
                incarnation: 2,
                key: "a1".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(current.result, Verdict::Allowed);
    }

    #[tokio::test]
    async fn serve_increment_without_instance_is_not_found() {
        let slot = LimiterSlot::new();
        let result = serve_increment(
            &slot,
            IncrementRequest {
                name: "rate_limiter".to_string(),
                incarnation: 1,
                key: "a1".to_string(),
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(TurnstileError::Registry(RegistryError::NotFound(_)))
        ));
    }
}
