//! Collection registry
//!
//! Tracks collection existence and live document counts. Collections are
//! created explicitly, or implicitly when a database opens (the default
//! collection), and may only be deleted when empty.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quill_core::{Error, Result};
use rustc_hash::FxHashMap;

/// Collection metadata.
#[derive(Debug, Clone)]
pub struct CollectionMeta {
    /// Collection name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Live (non-tombstoned) document count.
    pub doc_count: u64,
}

/// Registry of collections for one logical database.
pub struct CollectionRegistry {
    inner: RwLock<FxHashMap<String, CollectionMeta>>,
}

impl CollectionRegistry {
    /// New empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }

    /// Explicit creation; fails if the collection already exists.
    pub fn create(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.write();
        if guard.contains_key(name) {
            return Err(Error::CollectionExists(name.to_string()));
        }
        guard.insert(
            name.to_string(),
            CollectionMeta {
                name: name.to_string(),
                created_at: Utc::now(),
                doc_count: 0,
            },
        );
        Ok(())
    }

    /// Implicit creation; no-op if the collection exists.
    pub fn ensure(&self, name: &str) {
        let mut guard = self.inner.write();
        guard.entry(name.to_string()).or_insert_with(|| CollectionMeta {
            name: name.to_string(),
            created_at: Utc::now(),
            doc_count: 0,
        });
    }

    /// Delete a collection; only allowed when it holds no live documents.
    pub fn delete(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.write();
        match guard.get(name) {
            None => Err(Error::CollectionNotFound(name.to_string())),
            Some(meta) if meta.doc_count > 0 => {
                Err(Error::CollectionNotEmpty(name.to_string()))
            }
            Some(_) => {
                guard.remove(name);
                Ok(())
            }
        }
    }

    /// Remove without the emptiness check. Replay of a logged
    /// DeleteCollection record only.
    pub fn remove_unchecked(&self, name: &str) {
        self.inner.write().remove(name);
    }

    /// Whether the collection exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Live document count, if the collection exists.
    pub fn doc_count(&self, name: &str) -> Option<u64> {
        self.inner.read().get(name).map(|m| m.doc_count)
    }

    /// Increment the live count on a committed create.
    pub fn incr(&self, name: &str) {
        if let Some(meta) = self.inner.write().get_mut(name) {
            meta.doc_count += 1;
        }
    }

    /// Decrement the live count on a committed delete.
    pub fn decr(&self, name: &str) {
        if let Some(meta) = self.inner.write().get_mut(name) {
            meta.doc_count = meta.doc_count.saturating_sub(1);
        }
    }

    /// All collections, unordered.
    pub fn list(&self) -> Vec<CollectionMeta> {
        self.inner.read().values().cloned().collect()
    }

    /// Recovery: recreate a collection with a known count and timestamp.
    pub fn restore(&self, name: &str, created_at: DateTime<Utc>, doc_count: u64) {
        self.inner.write().insert(
            name.to_string(),
            CollectionMeta {
                name: name.to_string(),
                created_at,
                doc_count,
            },
        );
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_duplicate() {
        let reg = CollectionRegistry::new();
        reg.create("users").unwrap();
        assert!(reg.contains("users"));
        assert!(matches!(
            reg.create("users"),
            Err(Error::CollectionExists(_))
        ));
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let reg = CollectionRegistry::new();
        reg.ensure("c");
        reg.incr("c");
        reg.ensure("c");
        assert_eq!(reg.doc_count("c"), Some(1));
    }

    #[test]
    fn test_delete_only_when_empty() {
        let reg = CollectionRegistry::new();
        reg.create("c").unwrap();
        reg.incr("c");
        assert!(matches!(reg.delete("c"), Err(Error::CollectionNotEmpty(_))));
        reg.decr("c");
        reg.delete("c").unwrap();
        assert!(!reg.contains("c"));
    }

    #[test]
    fn test_delete_missing() {
        let reg = CollectionRegistry::new();
        assert!(matches!(
            reg.delete("ghost"),
            Err(Error::CollectionNotFound(_))
        ));
    }

    #[test]
    fn test_decr_saturates() {
        let reg = CollectionRegistry::new();
        reg.create("c").unwrap();
        reg.decr("c");
        assert_eq!(reg.doc_count("c"), Some(0));
    }

    #[test]
    fn test_list() {
        let reg = CollectionRegistry::new();
        reg.create("a").unwrap();
        reg.create("b").unwrap();
        let mut names: Vec<String> = reg.list().into_iter().map(|m| m.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
