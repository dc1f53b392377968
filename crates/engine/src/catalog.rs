//! Database catalog
//!
//! Persistent map from database name to id, stored as a JSON file next
//! to the data files. Ids are never reused: the catalog carries a
//! monotonic `next_id` so a deleted database's WAL segments can never be
//! confused with a later database's.
//!
//! Writes go through a temp file and an atomic rename, so a crash mid
//! write leaves the previous catalog intact.

use parking_lot::RwLock;
use quill_core::{DbId, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CatalogData {
    next_id: DbId,
    databases: BTreeMap<String, DbId>,
}

/// Persistent name-to-id registry for logical databases.
pub struct Catalog {
    path: PathBuf,
    data: RwLock<CatalogData>,
}

impl Catalog {
    /// Load the catalog from `path`, starting empty if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Serialization(format!("bad catalog: {}", e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CatalogData {
                next_id: 1,
                databases: BTreeMap::new(),
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Register a new database name, allocating its id.
    pub fn create(&self, name: &str) -> Result<DbId> {
        if name.is_empty() {
            return Err(Error::InvalidOperation(
                "database name must not be empty".into(),
            ));
        }
        let mut guard = self.data.write();
        if guard.databases.contains_key(name) {
            return Err(Error::DatabaseExists(name.to_string()));
        }
        let id = guard.next_id;
        guard.next_id += 1;
        guard.databases.insert(name.to_string(), id);
        if let Err(e) = self.persist(&guard) {
            guard.databases.remove(name);
            guard.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    /// Id registered for `name`, if any.
    pub fn get(&self, name: &str) -> Option<DbId> {
        self.data.read().databases.get(name).copied()
    }

    /// Name registered for `id`, if any.
    pub fn name_of(&self, id: DbId) -> Option<String> {
        self.data
            .read()
            .databases
            .iter()
            .find(|(_, db)| **db == id)
            .map(|(name, _)| name.clone())
    }

    /// Unregister a database, returning its id.
    pub fn remove(&self, name: &str) -> Result<DbId> {
        let mut guard = self.data.write();
        let id = guard
            .databases
            .remove(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
        if let Err(e) = self.persist(&guard) {
            guard.databases.insert(name.to_string(), id);
            return Err(e);
        }
        Ok(id)
    }

    /// Registered databases, sorted by name.
    pub fn list(&self) -> Vec<(String, DbId)> {
        self.data
            .read()
            .databases
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect()
    }

    fn persist(&self, data: &CatalogData) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(data)
            .map_err(|e| Error::Serialization(format!("catalog encode failed: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
