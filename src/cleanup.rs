//! Scheduled sweep of expired refresh sessions.
//!
//! The sweep deletes rows with `expire < now`, the same predicate
//! authentication already rejects, so it needs no coordination with requests.
//! The same tick prunes idle entries from the exchange rate limiter.

use std::time::Duration;
use tracing::{debug, warn};

use crate::rate_limit::RateLimitConfig;
use crate::tokens::{TokenController, now_millis};

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Run one sweep. Failures are logged by the controller and swallowed here.
pub async fn run_sweep(controller: &TokenController) -> u64 {
    controller.sweep(now_millis()).await.unwrap_or(0)
}

/// Spawn a background task that sweeps periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_sweep_scheduler(
    controller: TokenController,
    rate_limit: Option<RateLimitConfig>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    let every = if every.is_zero() {
        warn!("Sweep interval of zero requested, using the default");
        DEFAULT_SWEEP_INTERVAL
    } else {
        every
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            run_sweep(&controller).await;

            if let Some(rate_limit) = &rate_limit {
                let tracked = rate_limit.forget_idle();
                debug!(tracked, "Pruned exchange rate limiter");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::jwt::JwtConfig;
    use crate::tokens::TokenSettings;
    use std::sync::Arc;

    async fn controller(settings: TokenSettings) -> TokenController {
        let db = Database::open(":memory:").await.unwrap();
        let jwt = Arc::new(JwtConfig::new(b"test-secret-key-for-testing"));
        TokenController::new(jwt, db, settings)
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let ctl = controller(TokenSettings {
            refresh_ttl: Duration::ZERO,
            ..TokenSettings::default()
        })
        .await;
        ctl.create("ip", "u1").await.unwrap();
        ctl.create("ip", "u2").await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(run_sweep(&ctl).await, 2);
        assert_eq!(run_sweep(&ctl).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_failure_is_swallowed() {
        let ctl = controller(TokenSettings::default()).await;
        ctl.db().close().await;

        assert_eq!(run_sweep(&ctl).await, 0);
    }

    #[tokio::test]
    async fn test_scheduler_runs_immediately() {
        let ctl = controller(TokenSettings {
            refresh_ttl: Duration::ZERO,
            ..TokenSettings::default()
        })
        .await;
        ctl.create("ip", "u1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let rate_limit = RateLimitConfig::new(10, None);
        assert!(rate_limit.exchange.check_key(&"10.0.0.1".to_string()).is_ok());

        let handle =
            spawn_sweep_scheduler(ctl.clone(), Some(rate_limit.clone()), Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        let remaining: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(ctl.db().pool())
            .await
            .unwrap();
        assert_eq!(remaining.0, 0);
        // One request out of ten leaves the bucket partly drained, so it is kept
        assert_eq!(rate_limit.exchange.len(), 1);
    }
}
