//! Integration tests for adaptive rate limiting
//!
//! Time is paused so spacing windows can be stepped through exactly.

use orchestrator::config::RateLimiterConfig;
use orchestrator::rate_limiter::{AdaptiveRateLimiter, LimiterMode, LimiterRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn remote_api(mode: LimiterMode) -> AdaptiveRateLimiter {
    AdaptiveRateLimiter::new("remote-api", 10.0, Duration::from_secs(60), 1.5, 0.0).with_mode(mode)
}

#[tokio::test(start_paused = true)]
async fn test_error_slows_limiter_until_spacing_elapses() {
    let limiter = remote_api(LimiterMode::Strict);

    assert!(limiter.can_execute());
    limiter.register_error(Some("429 Too Many Requests"));
    assert!((limiter.current_rate() - 6.667).abs() < 0.001);

    assert!(!limiter.can_execute());

    tokio::time::advance(Duration::from_millis(8_900)).await;
    assert!(!limiter.can_execute());

    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(limiter.can_execute());
}

#[tokio::test(start_paused = true)]
async fn test_lenient_mode_permits_at_eighty_percent_of_spacing() {
    let limiter = remote_api(LimiterMode::Lenient);

    assert!(limiter.can_execute());
    limiter.register_error(None);

    // 9s spacing after the error, lenient threshold is 7.2s
    tokio::time::advance(Duration::from_millis(7_100)).await;
    assert!(!limiter.can_execute());
    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(limiter.can_execute());
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_ready_sleeps_for_remaining_spacing() {
    let limiter = remote_api(LimiterMode::Strict);
    assert!(limiter.can_execute());

    let start = tokio::time::Instant::now();
    limiter.wait_until_ready().await;
    let waited = start.elapsed();

    assert!(waited >= Duration::from_secs(6), "waited {:?}", waited);
    assert!(limiter.get_wait_time().is_zero());
    assert!(limiter.can_execute());
}

#[tokio::test(start_paused = true)]
async fn test_long_idle_always_permits() {
    let limiter = remote_api(LimiterMode::Strict);
    assert!(limiter.can_execute());
    for _ in 0..20 {
        limiter.register_error(None);
    }
    assert!((limiter.current_rate() - 0.5).abs() < 1e-9);

    // Five periods without a call reset the spacing requirement
    tokio::time::advance(Duration::from_secs(301)).await;
    assert!(limiter.can_execute());
}

#[tokio::test]
async fn test_shared_limiter_reset_through_registry() {
    let mut configs = HashMap::new();
    configs.insert(
        "remote-api".to_string(),
        RateLimiterConfig {
            initial_rate: 5.0,
            period_seconds: 60.0,
            error_backoff: 2.0,
            max_jitter: 0.0,
            mode: LimiterMode::Strict,
        },
    );
    let registry = LimiterRegistry::from_config(&configs);

    let first: Arc<AdaptiveRateLimiter> = registry.get("remote-api").unwrap();
    let second = registry.get("remote-api").unwrap();
    first.register_error(None);
    assert_eq!(second.current_rate(), 2.5);

    assert!(registry.reset("remote-api"));
    assert_eq!(first.current_rate(), 5.0);
    assert!(!registry.reset("unknown"));

    let statuses = registry.statuses();
    assert_eq!(statuses["remote-api"].errors, 0);
    assert_eq!(statuses["remote-api"].mode, LimiterMode::Strict);
}
