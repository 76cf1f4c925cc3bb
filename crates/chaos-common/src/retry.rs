//! Exponential backoff
//!
//! Two flavours share one config type: [`Backoff::delay_for`] is the
//! deterministic per-failure delay used by the work queue, and
//! [`retry_with_backoff`] wraps one-shot startup calls (CRD install) with
//! jittered retries.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Exponential backoff parameters
#[derive(Clone, Debug, PartialEq)]
pub struct Backoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on any single delay
    pub max: Duration,
    /// Give up after this many attempts (0 = never)
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            max: Duration::from_secs(30),
            max_attempts: 0,
        }
    }
}

impl Backoff {
    /// Per-item backoff for the reconcile queue: 5ms doubling up to 1000s
    pub fn queue_default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
            max_attempts: 0,
        }
    }

    /// Same curve with a bounded number of attempts
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay after the `failures`-th consecutive failure: `base * 2^(failures-1)`, capped
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exp = (failures - 1).min(63);
        let factor = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        let nanos = (self.base.as_nanos()).saturating_mul(u128::from(factor));
        if nanos >= self.max.as_nanos() {
            self.max
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

/// Run `operation` until it succeeds or `backoff.max_attempts` is reached.
///
/// Each sleep is the deterministic delay scaled by a random 0.5x-1.5x jitter.
pub async fn retry_with_backoff<F, Fut, T, E>(
    backoff: &Backoff,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if backoff.max_attempts > 0 && attempt >= backoff.max_attempts {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let delay = backoff.delay_for(attempt).mul_f64(jitter);

        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        tokio::time::sleep(delay).await;
    }
}
