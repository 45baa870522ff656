//! Folder index data.
//!
//! `FolderIndex` maps every discovered folder under a root to its child
//! folders, display path and BFS depth. Entries are written once: the first
//! discovery of a folder id fixes its path and depth, and BFS order makes that
//! discovery a shortest one.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderIndexEntry {
    pub folder_id: String,
    pub child_folder_ids: BTreeSet<String>,
    pub resolved_path: String,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct FolderIndex {
    root_id: String,
    max_depth: usize,
    entries: HashMap<String, FolderIndexEntry>,
    /// Folder ids in discovery order.
    order: Vec<String>,
    /// Folders whose child listing failed; their subtrees are missing.
    pub failed_folders: Vec<String>,
    /// Folders at the depth bound, indexed but not listed.
    pub depth_limited: usize,
    /// Number of child-folder listings issued during the build.
    pub listed_folders: usize,
    /// Listings stopped by the page ceiling; some folders may be missing.
    pub truncated_listings: usize,
    pub built_at: DateTime<Utc>,
}

impl FolderIndex {
    /// An index holding only the root.
    pub fn empty(root_id: &str, max_depth: usize) -> Self {
        let root = FolderIndexEntry {
            folder_id: root_id.to_string(),
            child_folder_ids: BTreeSet::new(),
            resolved_path: "/".to_string(),
            depth: 0,
        };
        Self {
            root_id: root_id.to_string(),
            max_depth,
            entries: HashMap::from([(root_id.to_string(), root)]),
            order: vec![root_id.to_string()],
            failed_folders: Vec::new(),
            depth_limited: 0,
            listed_folders: 0,
            truncated_listings: 0,
            built_at: Utc::now(),
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, folder_id: &str) -> Option<&FolderIndexEntry> {
        self.entries.get(folder_id)
    }

    pub fn contains(&self, folder_id: &str) -> bool {
        self.entries.contains_key(folder_id)
    }

    /// Entries in discovery (BFS) order.
    pub fn folders(&self) -> impl Iterator<Item = &FolderIndexEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Links an already indexed `child_id` under `parent_id`.
    pub fn link_child(&mut self, parent_id: &str, child_id: &str) {
        if !self.entries.contains_key(child_id) {
            return;
        }
        if let Some(parent) = self.entries.get_mut(parent_id) {
            parent.child_folder_ids.insert(child_id.to_string());
        }
    }

    /// Links `child_id` under `parent_id` and indexes it if it is new.
    ///
    /// Returns `false` when the child was already indexed; its path and depth
    /// are left untouched.
    pub fn record_child(&mut self, parent_id: &str, child_id: &str, depth: usize, path: String) -> bool {
        if let Some(parent) = self.entries.get_mut(parent_id) {
            parent.child_folder_ids.insert(child_id.to_string());
        }
        if self.entries.contains_key(child_id) {
            return false;
        }
        self.entries.insert(
            child_id.to_string(),
            FolderIndexEntry {
                folder_id: child_id.to_string(),
                child_folder_ids: BTreeSet::new(),
                resolved_path: path,
                depth,
            },
        );
        self.order.push(child_id.to_string());
        true
    }
}
