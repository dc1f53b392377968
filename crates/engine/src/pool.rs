//! Multi-database pool
//!
//! The pool is the engine's front door. It owns the catalog, the global
//! memory quota, the scheduler, and the set of open databases, and it is
//! the request handler the scheduler's workers call into.
//!
//! Databases open lazily: creating one only registers it in the catalog;
//! the files are touched when it is first opened. The number of
//! simultaneously open databases is capped by `db.max_open`.
//!
//! # Shutdown
//!
//! `stop()` walks the ladder Running → Draining → Closing → Closed:
//! draining lets queued requests finish (bounded by the drain timeout),
//! closing checkpoints and closes every open database, and a closed pool
//! rejects everything with `PoolStopped`.

use crate::catalog::Catalog;
use crate::database::{DatabaseStats, LogicalDatabase};
use crate::scheduler::{Handler, Scheduler};
use dashmap::DashMap;
use parking_lot::Mutex;
use quill_core::{DbId, EngineConfig, Error, OpType, Request, Response, Result};
use quill_storage::MemoryQuota;
use std::path::Path;
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Running,
    Draining,
    Closing,
    Closed,
}

/// The multi-database engine front door.
pub struct Pool {
    config: EngineConfig,
    catalog: Catalog,
    databases: DashMap<DbId, Arc<LogicalDatabase>>,
    global_quota: Arc<MemoryQuota>,
    scheduler: Scheduler,
    state: Mutex<PoolState>,
    /// Serializes lazy opens so a database is never opened twice.
    open_lock: Mutex<()>,
}

impl Pool {
    /// Start a pool rooted at `dir`, loading `quill.toml` if present.
    pub fn start<P: AsRef<Path>>(dir: P) -> Result<Arc<Self>> {
        Self::start_with(EngineConfig::load_or_default(dir)?)
    }

    /// Start a pool from an explicit configuration.
    pub fn start_with(config: EngineConfig) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.db.data_dir)?;
        std::fs::create_dir_all(&config.wal.dir)?;
        let catalog = Catalog::open(config.db.data_dir.join("catalog.json"))?;
        let global_quota = Arc::new(MemoryQuota::new(config.memory.global_bytes()));

        let pool = Arc::new_cyclic(|weak: &Weak<Pool>| {
            let handler_weak = weak.clone();
            let handler: Handler = Arc::new(move |request: Request| {
                match handler_weak.upgrade() {
                    Some(pool) => pool.handle_request(&request),
                    None => Response::from_error(&Error::PoolStopped),
                }
            });
            Pool {
                scheduler: Scheduler::new(config.scheduler.clone(), handler),
                config,
                catalog,
                databases: DashMap::new(),
                global_quota,
                state: Mutex::new(PoolState::Running),
                open_lock: Mutex::new(()),
            }
        });
        info!(
            databases = pool.catalog.list().len(),
            "pool started"
        );
        Ok(pool)
    }

    fn ensure_running(&self) -> Result<()> {
        if *self.state.lock() == PoolState::Running {
            Ok(())
        } else {
            Err(Error::PoolStopped)
        }
    }

    /// Register a new database and open it.
    pub fn create_database(&self, name: &str) -> Result<DbId> {
        self.ensure_running()?;
        self.catalog.create(name)?;
        self.open_database(name)
    }

    /// Open the database if it is registered, otherwise create it.
    pub fn open_or_create_database(&self, name: &str) -> Result<DbId> {
        if self.catalog.get(name).is_some() {
            self.open_database(name)
        } else {
            self.create_database(name)
        }
    }

    /// Open a registered database, recovering it if needed. Idempotent.
    pub fn open_database(&self, name: &str) -> Result<DbId> {
        self.ensure_running()?;
        let id = self
            .catalog
            .get(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
        if self.databases.contains_key(&id) {
            return Ok(id);
        }
        let _guard = self.open_lock.lock();
        if self.databases.contains_key(&id) {
            return Ok(id);
        }
        if self.databases.len() >= self.config.db.max_open {
            return Err(Error::InvalidOperation(format!(
                "open database limit reached ({})",
                self.config.db.max_open
            )));
        }
        let db = LogicalDatabase::open(id, name, &self.config, Arc::clone(&self.global_quota))?;
        self.databases.insert(id, db);
        self.scheduler.register_db(id);
        info!(db = name, id, "database opened");
        Ok(id)
    }

    /// Close an open database, leaving its files and catalog entry.
    pub fn close_database(&self, name: &str) -> Result<()> {
        let id = self
            .catalog
            .get(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
        let (_, db) = self
            .databases
            .remove(&id)
            .ok_or(Error::DbNotActive(id))?;
        self.scheduler.unregister_db(id);
        db.close()
    }

    /// Delete a database: close it if open, unregister it, and remove
    /// its data file, WAL segments, and snapshot.
    pub fn delete_database(&self, name: &str) -> Result<()> {
        let id = self
            .catalog
            .get(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
        if let Some((_, db)) = self.databases.remove(&id) {
            self.scheduler.unregister_db(id);
            db.close()?;
        }
        self.catalog.remove(name)?;

        let data = self.config.db.data_dir.join(format!("{name}.data"));
        if data.exists() {
            std::fs::remove_file(&data)?;
        }
        let wal_prefix = format!("{name}.wal");
        let snap = format!("{name}.snap");
        if self.config.wal.dir.exists() {
            for entry in std::fs::read_dir(&self.config.wal.dir)? {
                let entry = entry?;
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if file_name == wal_prefix
                    || file_name.starts_with(&format!("{wal_prefix}."))
                    || file_name == snap
                {
                    std::fs::remove_file(entry.path())?;
                }
            }
        }
        info!(db = name, id, "database deleted");
        Ok(())
    }

    /// Registered database names, sorted.
    pub fn list_databases(&self) -> Vec<String> {
        self.catalog.list().into_iter().map(|(name, _)| name).collect()
    }

    /// Direct handle to an open database, for the embedded API
    /// (transactions, checkpoints, stats).
    pub fn database(&self, id: DbId) -> Result<Arc<LogicalDatabase>> {
        self.databases
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(Error::DbNotActive(id))
    }

    /// Statistics for an open database.
    pub fn database_stats(&self, id: DbId) -> Result<DatabaseStats> {
        Ok(self.database(id)?.stats())
    }

    /// Bytes charged against the global memory quota.
    pub fn memory_used(&self) -> u64 {
        self.global_quota.used()
    }

    /// Submit a request; the response arrives on the returned channel.
    ///
    /// Backpressure is the error path: `QueueFull` when the database's
    /// queue is saturated, `PoolStopped` once shutdown has begun.
    pub fn execute(&self, request: Request) -> Result<Receiver<Response>> {
        let (tx, rx) = mpsc::channel();
        self.scheduler.enqueue(request, tx)?;
        Ok(rx)
    }

    /// Request dispatch, called by scheduler workers.
    fn handle_request(&self, request: &Request) -> Response {
        match self.dispatch(request) {
            Ok(data) => Response::ok(data),
            Err(e) => Response::from_error(&e),
        }
    }

    fn dispatch(&self, request: &Request) -> Result<Vec<u8>> {
        let db = self.database(request.db_id)?;
        match request.op {
            OpType::Create => {
                db.create(&request.collection, request.doc_id, &request.payload)?;
                Ok(Vec::new())
            }
            OpType::Read => db.read(&request.collection, request.doc_id),
            OpType::Update => {
                db.update(&request.collection, request.doc_id, &request.payload)?;
                Ok(Vec::new())
            }
            OpType::Delete => {
                db.delete(&request.collection, request.doc_id)?;
                Ok(Vec::new())
            }
            OpType::Patch => db.patch(&request.collection, request.doc_id, &request.payload),
            OpType::CreateCollection => {
                db.create_collection(&request.collection)?;
                Ok(Vec::new())
            }
            OpType::DeleteCollection => {
                db.delete_collection(&request.collection)?;
                Ok(Vec::new())
            }
            OpType::Commit | OpType::Checkpoint => Err(Error::InvalidOperation(format!(
                "{:?} cannot be submitted as a request",
                request.op
            ))),
        }
    }

    /// Shut the pool down: drain the scheduler, close every database,
    /// and reject further work.
    pub fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != PoolState::Running {
                return;
            }
            *state = PoolState::Draining;
        }
        self.scheduler
            .stop(Duration::from_millis(self.config.scheduler.drain_timeout_ms));

        *self.state.lock() = PoolState::Closing;
        let ids: Vec<DbId> = self.databases.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, db)) = self.databases.remove(&id) {
                if let Err(e) = db.close() {
                    warn!(db = db.name(), error = %e, "database close failed during shutdown");
                }
            }
        }
        *self.state.lock() = PoolState::Closed;
        info!("pool stopped");
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.stop();
    }
}
