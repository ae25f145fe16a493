//! Integration tests for window-based counting through the limiter service.
use std::time::Duration;

use turnstile::limiter::counter_store::Verdict;
use turnstile::limiter::service::LimiterService;
use turnstile::limiter::window::WindowScheduler;
use turnstile::settings::QuotaSettings;

fn quota(max_per_window: u32, window_seconds: u64) -> QuotaSettings {
    QuotaSettings {
        max_per_window,
        window_seconds,
    }
}

#[tokio::test]
async fn sequential_calls_fill_then_exhaust_quota() {
    let (handle, _join) = LimiterService::spawn(quota(5, 60));

    for n in 1..=5u32 {
        let outcome = handle.increment("client".to_string()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Allowed, "call {} should fit", n);
        assert_eq!(outcome.calls_remaining, 5 - n);
    }
    for n in 6..=10u32 {
        let outcome = handle.increment("client".to_string()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Denied, "call {} should be denied", n);
        assert_eq!(outcome.calls_remaining, 0);
    }
}

#[tokio::test]
async fn reset_restores_previously_denied_keys() {
    let (handle, _join) = LimiterService::spawn(quota(2, 60));

    handle.increment("a1".to_string()).await.unwrap();
    handle.increment("a1".to_string()).await.unwrap();
    let denied = handle.increment("a1".to_string()).await.unwrap();
    assert_eq!(denied.verdict, Verdict::Denied);

    handle.reset().await.unwrap();

    let allowed = handle.increment("a1".to_string()).await.unwrap();
    assert_eq!(allowed.verdict, Verdict::Allowed);
    assert_eq!(allowed.window_id, 1);
}

#[tokio::test(start_paused = true)]
async fn default_quota_scenario_over_one_window() {
    // max_per_window=2, window_duration=60s: three quick calls for the same
    // address yield allowed, allowed, denied; once the window elapses the
    // next call is allowed again.
    let quota = quota(2, 60);
    let (handle, _join) = LimiterService::spawn(quota.clone());
    let scheduler = WindowScheduler::start(handle.clone(), quota.window_duration(), 1);

    let first = handle.increment("127.0.0.1".to_string()).await.unwrap();
    let second = handle.increment("127.0.0.1".to_string()).await.unwrap();
    let third = handle.increment("127.0.0.1".to_string()).await.unwrap();
    assert_eq!(first.verdict, Verdict::Allowed);
    assert_eq!(second.verdict, Verdict::Allowed);
    assert_eq!(third.verdict, Verdict::Denied);

    tokio::time::sleep(Duration::from_secs(61)).await;

    let fourth = handle.increment("127.0.0.1".to_string()).await.unwrap();
    assert_eq!(fourth.verdict, Verdict::Allowed);
    assert_eq!(fourth.window_id, 1);

    scheduler.stop();
}

#[tokio::test]
async fn quota_is_tracked_per_key() {
    let (handle, _join) = LimiterService::spawn(quota(1, 60));
    let keys: Vec<String> = (0..20).map(|n| format!("10.1.0.{}", n)).collect();

    for key in &keys {
        let outcome = handle.increment(key.clone()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Allowed);
    }
    for key in &keys {
        let outcome = handle.increment(key.clone()).await.unwrap();
        assert_eq!(outcome.verdict, Verdict::Denied);
    }

    let status = handle.status().await.unwrap();
    assert_eq!(status.tracked_keys, keys.len());
}

#[tokio::test]
async fn churned_keys_keep_independent_tallies() {
    use rand::Rng;

    let (handle, _join) = LimiterService::spawn(quota(3, 60));
    let mut rng = rand::thread_rng();
    let keys: std::collections::BTreeSet<String> = (0..30)
        .map(|_| format!("198.51.100.{}", rng.gen_range(0u32..1_000_000)))
        .collect();

    // Hit each distinct key a random number of times and track expectations
    for key in &keys {
        let hits = rng.gen_range(1u32..=6);
        let mut last = None;
        for _ in 0..hits {
            last = Some(handle.increment(key.clone()).await.unwrap());
        }
        let expected = if hits <= 3 {
            Verdict::Allowed
        } else {
            Verdict::Denied
        };
        assert_eq!(last.unwrap().verdict, expected, "key {} after {} hits", key, hits);
    }
}

#[tokio::test]
async fn interleaved_callers_share_one_tally() {
    // Many concurrent callers against one key never double-spend quota:
    // exactly max_per_window of them are allowed in the window.
    let max = 10u32;
    let (handle, _join) = LimiterService::spawn(quota(max, 60));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.increment("shared".to_string()).await.unwrap().verdict
        }));
    }

    let mut allowed = 0;
    for task in tasks {
        if task.await.unwrap() == Verdict::Allowed {
            allowed += 1;
        }
    }
    assert_eq!(allowed, max);
}
