//! Fixed-delay retry for probes that wait on cluster convergence.
//!
//! A probe is invoked until it succeeds or the attempt budget is spent. The
//! delay between attempts is constant; there is no backoff and no jitter.
//! Waiting goes through `tokio::time`, so tests run on a paused clock.
//!
//! # Example
//!
//! ```ignore
//! use kwok_e2e::retry::{retry, RetryPolicy};
//!
//! retry(&RetryPolicy::default(), "scale-node", &cancel, || async {
//!     runner.output("kwokctl", &args).await.map(|_| ())
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::{Error, Result};

/// Default number of invocations for a retried probe
pub const DEFAULT_MAX_ATTEMPTS: u32 = 120;

/// Default wait between invocations
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Attempt budget and delay for a retried probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of invocations, must be at least 1
    pub max_attempts: u32,
    /// Wait between a failed invocation and the next one
    #[serde(rename = "delay_ms", with = "duration_millis")]
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given budget and delay
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Create a policy with the default delay and a custom budget
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Reject a zero attempt budget
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation("retry max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Invoke `probe` until it succeeds, at most `policy.max_attempts` times.
///
/// Returns the first successful value. When every attempt fails, returns
/// [`Error::RetryExhausted`] carrying the last probe failure. Cancellation is
/// observed while a probe is running and while waiting between attempts.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ProbeError>>,
{
    policy.validate()?;

    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(Error::cancelled(operation));
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled(operation)),
            outcome = probe() => outcome,
        };

        let last_error = match outcome {
            Ok(value) => {
                debug!(operation = %operation, attempt, "probe succeeded");
                return Ok(value);
            }
            Err(e) => e,
        };

        if attempt >= policy.max_attempts {
            warn!(
                operation = %operation,
                attempt,
                error = %last_error,
                "probe failed after max attempts"
            );
            return Err(Error::RetryExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last_error,
            });
        }

        warn!(
            operation = %operation,
            attempt,
            max_attempts = policy.max_attempts,
            error = %last_error,
            delay_ms = policy.delay.as_millis() as u64,
            "probe failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::cancelled(operation)),
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub(crate) mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
