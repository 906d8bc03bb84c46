use std::time::Duration;

use super::{FetchError, RemoteError};

/// Retry with exponential backoff.
///
/// An operation is attempted up to `max_attempts` times.
/// The delay before the second attempt is `initial_backoff`, and it doubles after every subsequent failure.
/// Failures that are not [retryable](FetchError::is_retryable) are returned immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
        }
    }

    /// The maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempts are exhausted.
    ///
    /// # Errors
    /// Returns [`RemoteError::NotFound`] if the resource does not exist, [`RemoteError::InvalidResponse`] for other permanent failures, and [`RemoteError::RetriesExhausted`] with the last failure otherwise.
    pub fn run<T>(
        &self,
        url: &str,
        mut operation: impl FnMut() -> Result<T, FetchError>,
    ) -> Result<T, RemoteError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            let err = match operation() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if err.is_not_found() {
                return Err(RemoteError::NotFound(url.to_string()));
            }
            if !err.is_retryable() {
                return Err(RemoteError::InvalidResponse {
                    url: url.to_string(),
                    source: err,
                });
            }
            if attempt >= self.max_attempts {
                return Err(RemoteError::RetriesExhausted {
                    url: url.to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
            log::warn!(
                "attempt {attempt}/{} for {url} failed, retrying in {backoff:?}: {err}",
                self.max_attempts
            );
            std::thread::sleep(backoff);
            backoff = backoff.saturating_mul(2);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(8, Duration::ZERO);
        let mut calls = 0;
        let value = policy
            .run("u", || {
                calls += 1;
                if calls < 3 {
                    Err(FetchError::Transport("reset".to_string()))
                } else {
                    Ok(calls)
                }
            })
            .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn retry_exhausted() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("u", || {
            calls += 1;
            Err(FetchError::InvalidLength {
                expected: 4,
                received: 0,
            })
        });
        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(RemoteError::RetriesExhausted { attempts: 3, .. })
        ));
    }

    #[test]
    fn retry_not_found_is_fatal() {
        let policy = RetryPolicy::new(8, Duration::ZERO);
        let mut calls = 0;
        let result: Result<(), _> = policy.run("u", || {
            calls += 1;
            Err(FetchError::Status {
                status: 404,
                url: "u".to_string(),
            })
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }
}
