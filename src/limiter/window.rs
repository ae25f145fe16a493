//! Window scheduler: the repeating reset timer for one owner tenure.
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::limiter::service::LimiterHandle;

/// Clears the counter store every window. One scheduler exists per owner
/// tenure: it starts when the local node activates the singleton and is
/// stopped when that tenure ends, so window boundaries are monotonic per
/// tenure but not synchronized across failovers.
#[derive(Debug)]
pub struct WindowScheduler {
    task: JoinHandle<()>,
}

impl WindowScheduler {
    /// The first reset fires one full window after activation.
    pub fn start(limiter: LimiterHandle, window: Duration, incarnation: u64) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + window, window);
            loop {
                ticker.tick().await;
                if limiter.reset().await.is_err() {
                    debug!(incarnation, "limiter instance gone, stopping window timer");
                    break;
                }
            }
        });
        Self { task }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::counter_store::Verdict;
    use crate::limiter::service::LimiterService;
    use crate::settings::QuotaSettings;

    #[tokio::test(start_paused = true)]
    async fn scheduler_resets_every_window() {
        let quota = QuotaSettings {
            max_per_window: 1,
            window_seconds: 60,
        };
        let (handle, _join) = LimiterService::spawn(quota.clone());
        let scheduler = WindowScheduler::start(handle.clone(), quota.window_duration(), 1);

        assert_eq!(
            handle.increment("a1".to_string()).await.unwrap().verdict,
            Verdict::Allowed
        );
        assert_eq!(
            handle.increment("a1".to_string()).await.unwrap().verdict,
            Verdict::Denied
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        let outcome = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Allowed);
        assert_eq!(outcome.window_id, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let outcome = handle.increment("a1".to_string()).await.unwrap();
        assert_eq!(outcome.window_id, 2);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_scheduler_no_longer_resets() {
        let quota = QuotaSettings {
            max_per_window: 1,
            window_seconds: 60,
        };
        let (handle, _join) = LimiterService::spawn(quota.clone());
        let scheduler = WindowScheduler::start(handle.clone(), quota.window_duration(), 1);
        scheduler.stop();

        tokio::time::sleep(Duration::from_secs(180)).await;
        let probe = handle.peek("a1".to_string()).await.unwrap();
        assert_eq!(probe.window_id, 0);
    }
}
