//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use crate::error::{ParleyError, Result};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Scale each sleep by a random 75%-125%.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Poll `operation` until it yields a client for `model`.
    ///
    /// `Ok(None)` and retryable errors back off and try again; any other
    /// error returns immediately. Running out of attempts is
    /// [`ParleyError::NoClient`].
    pub async fn acquire<F, Fut, T>(&self, model: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    tracing::warn!(model, attempt, max_attempts = self.max_attempts, "no online client yet");
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(model, attempt, max_attempts = self.max_attempts, error = %e, "retrying after error");
                }
                Err(e) => return Err(e),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.sleep_for(backoff)).await;
                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
                );
            }
        }

        Err(ParleyError::NoClient {
            model: model.to_string(),
            attempts: self.max_attempts,
        })
    }

    fn sleep_for(&self, backoff: Duration) -> Duration {
        if !self.jitter {
            return backoff;
        }
        let jitter_factor = 0.75 + (rand_factor() * 0.5);
        Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor)
    }
}

/// Simple pseudo-random factor [0, 1) without pulling in rand crate.
fn rand_factor() -> f64 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
        .hash(&mut hasher);
    std::thread::current().id().hash(&mut hasher);

    let hash = hasher.finish();
    (hash % 10000) as f64 / 10000.0
}
