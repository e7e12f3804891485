//! Bounded exponential backoff for a single provider.
//!
//! Retry is within one provider; failover across providers is the worker's
//! loop. The two are never conflated.

use crate::providers::{Provider, ProviderError};
use rand::Rng;
use std::time::{Duration, Instant};

/// Retry schedule for one provider attempt series.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// First backoff interval
    pub initial: Duration,
    /// Growth factor applied after every failed attempt
    pub multiplier: f64,
    /// Randomization factor in [0, 1]; each interval is scaled by a uniform
    /// value in [1 - jitter, 1 + jitter]
    pub jitter: f64,
    /// Total elapsed budget; once spent, the provider is considered failed
    pub max_elapsed: Duration,
    /// Deadline applied to every individual send attempt
    pub attempt_timeout: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            multiplier: 1.5,
            jitter: 0.5,
            max_elapsed: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

fn jittered(interval: Duration, jitter: f64) -> Duration {
    if jitter <= 0.0 {
        return interval;
    }
    let scale = 1.0 + jitter * (rand::thread_rng().gen::<f64>() * 2.0 - 1.0);
    interval.mul_f64(scale.max(0.0))
}

/// Drive one provider until success, a permanent rejection, or budget
/// exhaustion.
pub async fn send_with_retry(
    provider: &dyn Provider,
    msg: &crate::models::DispatchMessage,
    policy: &BackoffPolicy,
) -> Result<(), ProviderError> {
    let started = Instant::now();
    let mut interval = policy.initial;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let outcome = tokio::time::timeout(policy.attempt_timeout, provider.send(msg)).await;
        let err = match outcome {
            Ok(Ok(())) => {
                if attempt > 1 {
                    tracing::debug!(
                        provider = provider.name(),
                        attempt = attempt,
                        "send succeeded after retry"
                    );
                }
                return Ok(());
            }
            Ok(Err(e)) if e.is_permanent() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Transient(format!(
                "attempt deadline of {:?} exceeded",
                policy.attempt_timeout
            )),
        };

        let backoff = jittered(interval, policy.jitter);
        if started.elapsed() + backoff >= policy.max_elapsed {
            tracing::warn!(
                provider = provider.name(),
                attempts = attempt,
                error = %err,
                "retry budget exhausted"
            );
            return Err(err);
        }

        tracing::warn!(
            provider = provider.name(),
            attempt = attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %err,
            "provider send failed, retrying"
        );
        tokio::time::sleep(backoff).await;
        interval = interval.mul_f64(policy.multiplier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DispatchMessage;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn envelope() -> DispatchMessage {
        DispatchMessage {
            message_id: "m-1".to_string(),
            tenant_id: "t1".to_string(),
            channel: "email".to_string(),
            payload: serde_json::json!({}),
            template_id: "tpl".to_string(),
            created_at: Utc::now(),
            metadata: None,
        }
    }

    fn fast_policy() -> BackoffPolicy {
        BackoffPolicy {
            initial: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: 0.0,
            max_elapsed: Duration::from_millis(60),
            attempt_timeout: Duration::from_secs(1),
        }
    }

    struct ScriptedProvider {
        attempts: Arc<AtomicU32>,
        failures_before_success: u32,
        permanent: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn send(&self, _msg: &DispatchMessage) -> Result<(), ProviderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.permanent {
                return Err(ProviderError::Permanent("rejected".to_string()));
            }
            if attempt <= self.failures_before_success {
                return Err(ProviderError::Transient("unavailable".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let attempts = Arc::new(AtomicU32::new(0));
        let provider = ScriptedProvider {
            attempts: attempts.clone(),
            failures_before_success: 0,
            permanent: false,
            delay: Duration::ZERO,
        };

        let result = send_with_retry(&provider, &envelope(), &fast_policy()).await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let provider = ScriptedProvider {
            attempts: attempts.clone(),
            failures_before_success: 2,
            permanent: false,
            delay: Duration::ZERO,
        };

        let result = send_with_retry(&provider, &envelope(), &fast_policy()).await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_stops_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let provider = ScriptedProvider {
            attempts: attempts.clone(),
            failures_before_success: 0,
            permanent: true,
            delay: Duration::ZERO,
        };

        let err = send_with_retry(&provider, &envelope(), &fast_policy())
            .await
            .unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn budget_exhaustion_fails_the_provider() {
        let attempts = Arc::new(AtomicU32::new(0));
        let provider = ScriptedProvider {
            attempts: attempts.clone(),
            failures_before_success: u32::MAX,
            permanent: false,
            delay: Duration::ZERO,
        };

        let err = send_with_retry(&provider, &envelope(), &fast_policy())
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
        // initial 5ms doubling within a 60ms budget allows a handful of
        // attempts, never an unbounded series
        let made = attempts.load(Ordering::SeqCst);
        assert!(made > 1 && made < 10, "attempts: {made}");
    }

    #[tokio::test]
    async fn slow_attempts_hit_the_per_attempt_deadline() {
        let attempts = Arc::new(AtomicU32::new(0));
        let provider = ScriptedProvider {
            attempts: attempts.clone(),
            failures_before_success: 0,
            permanent: false,
            delay: Duration::from_millis(100),
        };
        let policy = BackoffPolicy {
            attempt_timeout: Duration::from_millis(10),
            ..fast_policy()
        };

        let err = send_with_retry(&provider, &envelope(), &policy)
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(100);
        for _ in 0..100 {
            let value = jittered(base, 0.5);
            assert!(value >= Duration::from_millis(50), "value: {value:?}");
            assert!(value <= Duration::from_millis(150), "value: {value:?}");
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let base = Duration::from_millis(100);
        assert_eq!(jittered(base, 0.0), base);
    }
}
