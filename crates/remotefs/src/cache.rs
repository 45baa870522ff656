//! Session-scoped caches.
//!
//! All caches are append-only within a session: the first value written for a
//! key wins and later writers get the stored value back. `SessionCaches::invalidate`
//! is the single place that discards them.

use std::collections::HashMap;
use std::sync::Arc;

use moka::sync::Cache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::indexer::FolderIndex;

type RootKey = (String, String);

/// `(root, folder) -> display path` relative to `root`.
#[derive(Debug, Clone)]
pub struct PathCache {
    cache: Cache<RootKey, String>,
}

impl PathCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    pub fn get(&self, root: &str, folder: &str) -> Option<String> {
        self.cache.get(&(root.to_string(), folder.to_string()))
    }

    /// Stores `path` unless a path is already cached; returns the stored one.
    pub fn insert_first(&self, root: &str, folder: &str, path: String) -> String {
        self.cache
            .entry((root.to_string(), folder.to_string()))
            .or_insert(path)
            .into_value()
    }

    fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for PathCache {
    fn default() -> Self {
        Self::new()
    }
}

/// `(candidate, root) -> is descendant`.
#[derive(Debug, Clone)]
pub struct AncestryCache {
    cache: Cache<RootKey, bool>,
}

impl AncestryCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    pub fn get(&self, candidate: &str, root: &str) -> Option<bool> {
        self.cache.get(&(candidate.to_string(), root.to_string()))
    }

    pub fn insert_first(&self, candidate: &str, root: &str, verdict: bool) -> bool {
        self.cache
            .entry((candidate.to_string(), root.to_string()))
            .or_insert(verdict)
            .into_value()
    }

    fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for AncestryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies one folder index: a canonical root id and its depth bound.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey {
    pub root_id: String,
    pub max_depth: usize,
}

pub type IndexSlot = Arc<OnceCell<Arc<FolderIndex>>>;

/// Built folder indexes, one slot per [`IndexKey`].
///
/// A slot is initialized by a single builder; concurrent searches for the
/// same root await that build instead of starting their own.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    slots: Mutex<HashMap<IndexKey, IndexSlot>>,
}

impl IndexRegistry {
    pub fn slot(&self, key: IndexKey) -> IndexSlot {
        self.slots.lock().entry(key).or_default().clone()
    }

    /// Returns the index for `key` if it has been built.
    pub fn get(&self, key: &IndexKey) -> Option<Arc<FolderIndex>> {
        self.slots
            .lock()
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// The caches shared by every component of one engine session.
#[derive(Debug, Clone, Default)]
pub struct SessionCaches {
    pub paths: PathCache,
    pub ancestry: AncestryCache,
    pub indexes: Arc<IndexRegistry>,
}

impl SessionCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards every cached path, ancestry verdict and folder index.
    pub fn invalidate(&self) {
        self.paths.clear();
        self.ancestry.clear();
        self.indexes.clear();
        tracing::info!("session caches invalidated");
    }
}
