// Retrying request wrapper.
//
// Every outbound request goes through `RetryPolicy::run`. Only
// connection-level failures are repeated; anything else (HTTP error
// statuses, decode failures) surfaces on the first occurrence.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::Error;

/// Linear-backoff retry budget for a single logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub attempts: u32,
    /// Backoff unit; the wait after attempt `n` (0-based) is `n × unit`.
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            backoff_unit: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Run `op` until it succeeds, fails with a non-connection error,
    /// or the attempt budget is exhausted.
    ///
    /// `op` receives the 0-based attempt index. `method` and `url` only
    /// label the exhaustion error.
    pub async fn run<T, F, Fut>(&self, method: &str, url: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_connection_failure() => {
                    debug!(error = %e, attempt, attempts, method, url, "connection failure");
                    if attempt + 1 >= attempts {
                        return Err(Error::RequestExhausted {
                            method: method.to_owned(),
                            url: url.to_owned(),
                            attempts,
                            source: Box::new(e),
                        });
                    }
                    tokio::time::sleep(self.backoff_unit * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
