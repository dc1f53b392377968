//! Retry policy for transient I/O failures
//!
//! A single policy object wraps a fallible closure instead of scattering
//! ad-hoc retry loops through the WAL and data-file code. Only errors
//! classified as transient are retried; validation, conflict, permanent,
//! and corruption errors surface immediately.

use crate::error::Result;
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retry).
    pub max_attempts: u32,
    /// Delay before the first retry; doubles each attempt.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Run `op`, retrying transient failures with exponential backoff.
    ///
    /// Non-transient errors are returned immediately. The final transient
    /// error is returned once attempts are exhausted.
    pub fn run<T, F>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    std::thread::sleep(self.delay_for(attempt));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Backoff delay for the given zero-based attempt, with jitter of up
    /// to half the computed delay.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        let half = exp.as_micros() as u64 / 2;
        let jitter = rand::thread_rng().gen_range(0..=half);
        exp + Duration::from_micros(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io;

    fn transient() -> Error {
        Error::Io(io::Error::new(io::ErrorKind::Interrupted, "interrupted"))
    }

    #[test]
    fn test_success_first_try() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let out: Result<u32> = policy.run(|| {
            calls += 1;
            Ok(7)
        });
        assert_eq!(out.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retries_transient_until_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_micros(10),
            max_delay: Duration::from_micros(50),
        };
        let mut calls = 0;
        let out = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err(transient())
            } else {
                Ok(())
            }
        });
        assert!(out.is_ok());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_micros(1),
            max_delay: Duration::from_micros(5),
        };
        let mut calls = 0;
        let out: Result<()> = policy.run(|| {
            calls += 1;
            Err(transient())
        });
        assert!(out.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_permanent_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let out: Result<()> = policy.run(|| {
            calls += 1;
            Err(Error::Corruption("bad crc".into()))
        });
        assert!(matches!(out, Err(Error::Corruption(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_validation_not_retried() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let out: Result<()> = policy.run(|| {
            calls += 1;
            Err(Error::InvalidJson("nope".into()))
        });
        assert!(out.is_err());
        assert_eq!(calls, 1);
    }
}
