//! Memory quota accounting
//!
//! A capacity counter, not a concurrency-critical structure: reservations
//! are a CAS loop over an atomic byte count. The engine holds one global
//! quota and one per logical database; a write reserves against both
//! before touching disk and releases on any failure so accounting state
//! never leaks.

use quill_core::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Byte-count quota with a fixed limit.
#[derive(Debug)]
pub struct MemoryQuota {
    limit: u64,
    used: AtomicU64,
}

impl MemoryQuota {
    /// New quota with `limit` bytes of capacity.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Reserve `bytes`, failing with a memory-limit error if the cap
    /// would be exceeded.
    pub fn reserve(&self, bytes: u64) -> Result<()> {
        let mut current = self.used.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.limit {
                return Err(Error::MemoryLimit {
                    requested: bytes,
                    available: self.limit.saturating_sub(current),
                });
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    /// Release a previous reservation. Saturates at zero.
    pub fn release(&self, bytes: u64) {
        let mut current = self.used.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Set the used count outright. Recovery only: after replay the live
    /// payload bytes are counted once instead of replaying reservations.
    pub fn set_used(&self, bytes: u64) {
        self.used.store(bytes, Ordering::SeqCst);
    }

    /// Add to the used count without checking the limit. Used by the pool
    /// to fold a freshly recovered database into the global quota.
    pub fn add_used(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Capacity in bytes.
    pub fn limit(&self) -> u64 {
        self.limit
    }
}
