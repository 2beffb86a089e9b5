//! Wait Mechanisms
//!
//! Poll an async probe until it yields a value or the timeout expires.
//! Missing and stale elements are polled through; any other driver error
//! ends the wait immediately.

use crate::config::{PageflowConfig, DEFAULT_ELEMENT_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS};
use crate::result::{PageflowError, PageflowResult};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::trace;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ELEMENT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Element wait options from configuration
    #[must_use]
    pub const fn from_config(config: &PageflowConfig) -> Self {
        Self {
            timeout_ms: config.element_timeout_ms,
            poll_interval_ms: config.poll_interval_ms,
        }
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// WAIT RESULT
// =============================================================================

/// Result of a wait operation
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of probes made
    pub attempts: u32,
    /// Description of what was waited for
    pub waited_for: String,
}

// =============================================================================
// WAITER
// =============================================================================

/// Poller for element conditions
#[derive(Debug, Clone, Copy, Default)]
pub struct Wait {
    options: WaitOptions,
}

impl Wait {
    /// Create a waiter
    #[must_use]
    pub const fn new(options: WaitOptions) -> Self {
        Self { options }
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Poll `probe` until it returns `Some`, returning the value
    pub async fn until<T, F, Fut>(&self, message: &str, probe: F) -> PageflowResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PageflowResult<Option<T>>>,
    {
        self.poll(message, probe).await.map(|(value, _)| value)
    }

    /// Poll `probe` until it returns `Some`, returning the value and timing
    pub async fn poll<T, F, Fut>(
        &self,
        message: &str,
        mut probe: F,
    ) -> PageflowResult<(T, WaitResult)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PageflowResult<Option<T>>>,
    {
        let start = Instant::now();
        let timeout = self.options.timeout();
        let mut attempts = 0;

        loop {
            attempts += 1;
            match probe().await {
                Ok(Some(value)) => {
                    let result = WaitResult {
                        elapsed: start.elapsed(),
                        attempts,
                        waited_for: message.to_string(),
                    };
                    return Ok((value, result));
                }
                Ok(None) => {}
                Err(e) if e.is_transient() => trace!(error = %e, "polling through"),
                Err(e) => return Err(e),
            }

            if start.elapsed() >= timeout {
                return Err(PageflowError::Timeout {
                    ms: self.options.timeout_ms,
                    message: message.to_string(),
                });
            }
            tokio::time::sleep(self.options.poll_interval()).await;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> Wait {
        Wait::new(WaitOptions::new().with_timeout(60).with_poll_interval(5))
    }

    mod wait_options_tests {
        use super::*;

        #[test]
        fn test_defaults_match_element_timeout() {
            let opts = WaitOptions::default();
            assert_eq!(opts.timeout_ms, 10_000);
            assert_eq!(opts.poll_interval_ms, 500);
        }

        #[test]
        fn test_from_config() {
            let config = PageflowConfig::new()
                .with_element_timeout(42)
                .with_poll_interval(7);
            let opts = WaitOptions::from_config(&config);
            assert_eq!(opts.timeout(), Duration::from_millis(42));
            assert_eq!(opts.poll_interval(), Duration::from_millis(7));
        }
    }

    mod until_tests {
        use super::*;

        #[tokio::test]
        async fn test_returns_first_value() {
            let calls = AtomicU32::new(0);
            let value = fast()
                .until("third call", || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Ok((n >= 2).then_some(n))
                })
                .await
                .unwrap();
            assert_eq!(value, 2);
        }

        #[tokio::test]
        async fn test_timeout_carries_message() {
            let err = fast()
                .until::<(), _, _>("never", || async { Ok(None) })
                .await
                .unwrap_err();
            match err {
                PageflowError::Timeout { ms, message } => {
                    assert_eq!(ms, 60);
                    assert_eq!(message, "never");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_polls_through_missing_elements() {
            let calls = AtomicU32::new(0);
            let value = fast()
                .until("appears", || async {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(PageflowError::NoSuchElement {
                            selector: "#late".to_string(),
                        })
                    } else {
                        Ok(Some("found"))
                    }
                })
                .await
                .unwrap();
            assert_eq!(value, "found");
        }

        #[tokio::test]
        async fn test_other_errors_propagate() {
            let err = fast()
                .until::<(), _, _>("broken", || async {
                    Err(PageflowError::driver("session deleted"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, PageflowError::Driver { .. }));
        }

        #[tokio::test]
        async fn test_poll_reports_attempts() {
            let calls = AtomicU32::new(0);
            let (_, result) = fast()
                .poll("second", || async {
                    Ok((calls.fetch_add(1, Ordering::SeqCst) == 1).then_some(()))
                })
                .await
                .unwrap();
            assert_eq!(result.attempts, 2);
            assert_eq!(result.waited_for, "second");
        }
    }
}
