//! Core types shared by the client, resolvers, indexer and search strategies.
//!
//! These are the records handed to front ends; they serialize with camelCase
//! field names.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, Result};

/// Node kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Leaf,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Leaf => "leaf",
        }
    }
}

/// An addressable entry in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Parent ids in store order; the first one is the primary parent.
    #[serde(default)]
    pub parent_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<DateTime<Utc>>,
    /// Content type the store can convert this leaf into when it has no raw bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exportable_as: Option<String>,
}

impl Node {
    pub fn folder(id: impl Into<String>, name: impl Into<String>, parent: Option<&str>) -> Self {
        Self::new(id, name, NodeKind::Folder, parent)
    }

    pub fn leaf(id: impl Into<String>, name: impl Into<String>, parent: Option<&str>) -> Self {
        Self::new(id, name, NodeKind::Leaf, parent)
    }

    fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: NodeKind,
        parent: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            parent_ids: parent.map(|p| vec![p.to_string()]).unwrap_or_default(),
            size: None,
            modified_at: None,
            exportable_as: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn primary_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }

    /// Whether `folder_id` is this node's primary parent. Listings match any
    /// parent, but membership follows the primary one.
    pub fn is_primary_child_of(&self, folder_id: &str) -> bool {
        self.primary_parent() == Some(folder_id)
    }
}

/// Kind filter for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KindFilter {
    #[default]
    All,
    Folder,
    Leaf,
}

impl KindFilter {
    pub fn matches(&self, kind: NodeKind) -> bool {
        match self {
            Self::All => true,
            Self::Folder => kind == NodeKind::Folder,
            Self::Leaf => kind == NodeKind::Leaf,
        }
    }
}

/// A single listing query. `parent = None` is a wide query over the whole
/// accessible store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub parent: Option<String>,
    pub kind: KindFilter,
    pub name_contains: Option<String>,
}

impl ListQuery {
    pub fn children(parent: &str) -> Self {
        Self {
            parent: Some(parent.to_string()),
            ..Self::default()
        }
    }

    pub fn child_folders(parent: &str) -> Self {
        Self::children(parent).with_kind(KindFilter::Folder)
    }

    pub fn everywhere(name_contains: &str) -> Self {
        Self {
            parent: None,
            kind: KindFilter::All,
            name_contains: Some(name_contains.to_string()),
        }
    }

    pub fn with_kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_name(mut self, name_contains: &str) -> Self {
        self.name_contains = Some(name_contains.to_string());
        self
    }

    /// Local re-check of the filter, for stores that filter loosely.
    pub fn accepts(&self, node: &Node) -> bool {
        if !self.kind.matches(node.kind) {
            return false;
        }
        match &self.name_contains {
            Some(needle) => name_contains(&node.name, needle),
            None => true,
        }
    }
}

/// Case-insensitive substring match, the semantics of a store's `name contains`.
pub fn name_contains(name: &str, needle: &str) -> bool {
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct NodePage {
    pub nodes: Vec<Node>,
    pub next_page_token: Option<String>,
}

/// Search request as accepted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub root_id: String,
    pub max_depth: usize,
    pub concurrency_limit: usize,
    pub max_results: Option<usize>,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(RemoteError::Configuration(
                "search query must not be empty".to_string(),
            ));
        }
        if self.root_id.trim().is_empty() {
            return Err(RemoteError::Configuration(
                "search root must not be empty".to_string(),
            ));
        }
        if self.concurrency_limit == 0 {
            return Err(RemoteError::Configuration(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The strategies the coordinator tries, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Global,
    Indexed,
    Naive,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Strategy::Global, Strategy::Indexed, Strategy::Naive];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Indexed => "indexed",
            Self::Naive => "naive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shaped search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub node: Node,
    pub is_folder: bool,
    pub resolved_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_as: Option<String>,
}

/// What a strategy could not fully cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDiagnostics {
    /// Folders whose query failed after retries; their matches are missing.
    pub failed_folders: Vec<String>,
    /// Global-query hits whose ancestry could not be determined.
    pub unresolved_candidates: usize,
    /// Folders at the depth limit whose children were not explored.
    pub depth_limited_folders: usize,
    /// Listings stopped by the per-listing page ceiling.
    pub truncated_listings: usize,
    /// Whether `max_results` cut the hit list.
    pub truncated: bool,
}

impl SearchDiagnostics {
    pub fn is_complete(&self) -> bool {
        self.failed_folders.is_empty()
            && self.unresolved_candidates == 0
            && self.depth_limited_folders == 0
            && self.truncated_listings == 0
            && !self.truncated
    }
}

/// A strategy that failed before the one that produced the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFailure {
    pub strategy: Strategy,
    pub error: String,
}

/// Search results plus how they were obtained.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub query: String,
    pub root_id: String,
    pub strategy: Strategy,
    pub hits: Vec<SearchHit>,
    pub count: usize,
    pub fallbacks: Vec<StrategyFailure>,
    pub diagnostics: SearchDiagnostics,
    pub fully_explored: bool,
}

/// What the content-streaming collaborator should request for a leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum ContentRequest {
    /// Fetch the stored bytes as they are.
    Raw { id: String },
    /// Ask the store to convert the node into `mime_type`.
    Export { id: String, mime_type: String },
}
