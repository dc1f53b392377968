//! Background corruption scanning
//!
//! One healing service per open database. It has two inputs:
//!
//! - Reports: a read that hit corruption sends a `CorruptionReport`
//!   through the channel, and the document is re-verified promptly.
//! - The scan timer: every `scan_interval_ms` the service sweeps up to
//!   `max_batch` live documents through the data file's checksum path.
//!
//! With a single copy of every payload there is nothing to repair from;
//! the service's job is detection. Corrupt documents are counted and
//! logged so operators find out from the scanner, not from a customer
//! read months later.
//!
//! The thread holds only a `Weak` reference to its database, so a
//! dropped database ends the thread instead of leaking it.

use crate::database::LogicalDatabase;
use quill_core::{DocId, HealingConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// A document flagged by a failed read.
#[derive(Debug, Clone)]
pub struct CorruptionReport {
    /// Collection holding the document.
    pub collection: String,
    /// Flagged document.
    pub doc_id: DocId,
}

/// Handle to one database's healing thread.
pub struct HealingService {
    reporter: Option<Sender<CorruptionReport>>,
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl HealingService {
    /// Spawn the healing thread for `db`.
    pub fn start(db: Weak<LogicalDatabase>, config: HealingConfig) -> Self {
        let (reporter, reports) = mpsc::channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let handle = std::thread::Builder::new()
            .name("quill-heal".to_string())
            .spawn(move || run(db, config, reports, flag))
            .expect("failed to spawn healing thread");
        Self {
            reporter: Some(reporter),
            handle: Some(handle),
            shutdown,
        }
    }

    /// Queue a document for prompt re-verification.
    pub fn report(&self, report: CorruptionReport) {
        if let Some(reporter) = &self.reporter {
            let _ = reporter.send(report);
        }
    }

    /// Stop the thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Dropping the sender wakes a blocked recv immediately
        self.reporter.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HealingService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(
    db: Weak<LogicalDatabase>,
    config: HealingConfig,
    reports: Receiver<CorruptionReport>,
    shutdown: Arc<AtomicBool>,
) {
    let interval = Duration::from_millis(config.scan_interval_ms.max(1));
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match reports.recv_timeout(interval) {
            Ok(report) => {
                let Some(db) = db.upgrade() else { return };
                if !db.verify_document(&report.collection, report.doc_id) {
                    warn!(
                        db = db.name(),
                        collection = %report.collection,
                        doc_id = report.doc_id,
                        "read-reported corruption confirmed"
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let Some(db) = db.upgrade() else { return };
                let corrupt = db.scan_for_corruption(config.max_batch);
                if corrupt > 0 {
                    warn!(db = db.name(), corrupt, "healing scan found corrupt documents");
                } else {
                    debug!(db = db.name(), "healing scan clean");
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}
