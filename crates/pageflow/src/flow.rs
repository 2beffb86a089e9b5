//! Retry and ignore flow control.
//!
//! ```ignore
//! let messages = retry_async(5, |e: &PageflowError| matches!(e, PageflowError::Email { .. }), || {
//!     gmail.gmail_search("subject:Welcome")
//! })
//! .await?;
//! ```

use std::future::Future;
use tracing::{debug, warn};

/// Default number of attempts
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Call `f` until it succeeds, retrying errors that satisfy `should_retry`
///
/// `f` is always called at least once. After `attempts` calls the last
/// error is returned.
pub fn retry<T, E, F, P>(attempts: u32, should_retry: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && should_retry(&e) => {
                debug!(attempt, attempts, error = %e, "retrying");
                attempt += 1;
            }
            Err(e) => {
                if attempt == attempts {
                    warn!(attempts, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Async form of [`retry`]
pub async fn retry_async<T, E, F, Fut, P>(attempts: u32, should_retry: P, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && should_retry(&e) => {
                debug!(attempt, attempts, error = %e, "retrying");
                attempt += 1;
            }
            Err(e) => {
                if attempt == attempts {
                    warn!(attempts, error = %e, "retries exhausted");
                }
                return Err(e);
            }
        }
    }
}

/// Call `f`, turning errors that satisfy `should_ignore` into `Ok(None)`
pub fn ignore<T, E, F, P>(should_ignore: P, f: F) -> Result<Option<T>, E>
where
    F: FnOnce() -> Result<T, E>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    match f() {
        Ok(value) => Ok(Some(value)),
        Err(e) if should_ignore(&e) => {
            debug!(error = %e, "ignored");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Async form of [`ignore`]
pub async fn ignore_async<T, E, Fut, P>(should_ignore: P, f: Fut) -> Result<Option<T>, E>
where
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    match f.await {
        Ok(value) => Ok(Some(value)),
        Err(e) if should_ignore(&e) => {
            debug!(error = %e, "ignored");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::result::PageflowError;
    use proptest::prelude::*;
    use std::cell::Cell;

    fn transient() -> PageflowError {
        PageflowError::email("connection reset")
    }

    fn is_email(e: &PageflowError) -> bool {
        matches!(e, PageflowError::Email { .. })
    }

    mod retry_tests {
        use super::*;

        #[test]
        fn test_succeeds_after_failures() {
            let calls = Cell::new(0);
            let value = retry(DEFAULT_ATTEMPTS, is_email, || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            })
            .unwrap();
            assert_eq!(value, "done");
            assert_eq!(calls.get(), 3);
        }

        #[test]
        fn test_non_retryable_error_stops_immediately() {
            let calls = Cell::new(0);
            let err = retry(DEFAULT_ATTEMPTS, is_email, || {
                calls.set(calls.get() + 1);
                Err::<(), _>(PageflowError::NoBrowser)
            })
            .unwrap_err();
            assert!(matches!(err, PageflowError::NoBrowser));
            assert_eq!(calls.get(), 1);
        }

        #[test]
        fn test_zero_attempts_still_calls_once() {
            let calls = Cell::new(0);
            let _ = retry(0, is_email, || {
                calls.set(calls.get() + 1);
                Err::<(), _>(transient())
            });
            assert_eq!(calls.get(), 1);
        }

        #[tokio::test]
        async fn test_retry_async_returns_last_error() {
            let calls = Cell::new(0);
            let err = retry_async(3, is_email, || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err::<(), _>(PageflowError::email(format!("attempt {n}"))) }
            })
            .await
            .unwrap_err();
            assert_eq!(err.to_string(), "Email error: attempt 3");
        }
    }

    mod ignore_tests {
        use super::*;

        #[test]
        fn test_ignore_variants() {
            assert_eq!(ignore(is_email, || Ok::<_, PageflowError>(7)).unwrap(), Some(7));
            assert_eq!(ignore(is_email, || Err::<i32, _>(transient())).unwrap(), None);
            assert!(ignore(is_email, || Err::<i32, _>(PageflowError::NoBrowser)).is_err());
        }

        #[tokio::test]
        async fn test_ignore_async() {
            let value = ignore_async(is_email, async { Err::<i32, _>(transient()) })
                .await
                .unwrap();
            assert_eq!(value, None);
        }
    }

    mod flow_props {
        use super::*;

        proptest! {
            #[test]
            fn retry_never_exceeds_attempts(attempts in 1u32..10, failures in 0u32..20) {
                let calls = Cell::new(0u32);
                let result = retry(attempts, is_email, || {
                    calls.set(calls.get() + 1);
                    if calls.get() <= failures { Err(transient()) } else { Ok(()) }
                });
                prop_assert!(calls.get() <= attempts);
                prop_assert_eq!(result.is_ok(), failures < attempts);
            }
        }
    }
}
