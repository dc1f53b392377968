//! Error-rate tracking for the durability layer
//!
//! Write and sync failures are classified and counted so operators can
//! alert on them; the counters are observational only and never affect
//! control flow.

use parking_lot::Mutex;
use quill_core::{Error, ErrorClass};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorCounts {
    /// Transient I/O failures (retried).
    pub transient: u64,
    /// Permanent/critical failures.
    pub permanent: u64,
    /// Checksum and verification failures.
    pub corruption: u64,
    /// Validation failures.
    pub validation: u64,
    /// Everything else.
    pub other: u64,
}

/// Classified failure counters plus the most recent error message.
#[derive(Debug, Default)]
pub struct ErrorTracker {
    transient: AtomicU64,
    permanent: AtomicU64,
    corruption: AtomicU64,
    validation: AtomicU64,
    other: AtomicU64,
    last: Mutex<Option<String>>,
}

impl ErrorTracker {
    /// New tracker with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one failure.
    pub fn record(&self, err: &Error) {
        let counter = match err.class() {
            ErrorClass::Transient => &self.transient,
            ErrorClass::Permanent => &self.permanent,
            ErrorClass::Corruption => &self.corruption,
            ErrorClass::Validation => &self.validation,
            _ => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.last.lock() = Some(err.to_string());
    }

    /// Snapshot the counters.
    pub fn counts(&self) -> ErrorCounts {
        ErrorCounts {
            transient: self.transient.load(Ordering::Relaxed),
            permanent: self.permanent.load(Ordering::Relaxed),
            corruption: self.corruption.load(Ordering::Relaxed),
            validation: self.validation.load(Ordering::Relaxed),
            other: self.other.load(Ordering::Relaxed),
        }
    }

    /// Most recent error message, if any failure occurred.
    pub fn last_error(&self) -> Option<String> {
        self.last.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_classified_counting() {
        let tracker = ErrorTracker::new();
        tracker.record(&Error::Io(io::Error::new(
            io::ErrorKind::Interrupted,
            "interrupted",
        )));
        tracker.record(&Error::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "denied",
        )));
        tracker.record(&Error::Corruption("crc".into()));

        let counts = tracker.counts();
        assert_eq!(counts.transient, 1);
        assert_eq!(counts.permanent, 1);
        assert_eq!(counts.corruption, 1);
        assert_eq!(counts.validation, 0);
    }

    #[test]
    fn test_last_error_kept() {
        let tracker = ErrorTracker::new();
        assert!(tracker.last_error().is_none());
        tracker.record(&Error::Corruption("bad record".into()));
        assert!(tracker.last_error().unwrap().contains("bad record"));
    }
}
