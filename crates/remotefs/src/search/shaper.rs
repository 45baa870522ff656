//! Shaping remote metadata into search hits.

use std::collections::HashSet;

use crate::path::{join_path, UNKNOWN_PATH};
use crate::types::{Node, SearchDiagnostics, SearchHit};

/// Converts raw nodes into output records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultShaper;

impl ResultShaper {
    /// Builds the hit for `node` found under a folder whose path is `parent_path`.
    pub fn shape(node: Node, parent_path: &str) -> SearchHit {
        let resolved_path = if parent_path == UNKNOWN_PATH {
            UNKNOWN_PATH.to_string()
        } else {
            join_path(parent_path, &node.name)
        };
        let is_folder = node.is_folder();
        let export_as = if is_folder {
            None
        } else {
            node.exportable_as.clone()
        };
        SearchHit {
            node,
            is_folder,
            resolved_path,
            export_as,
        }
    }

    /// Orders hits by path, then id, so repeated runs present the same way.
    pub fn sort(hits: &mut [SearchHit]) {
        hits.sort_by(|a, b| {
            a.resolved_path
                .cmp(&b.resolved_path)
                .then_with(|| a.node.id.cmp(&b.node.id))
        });
    }
}

/// Accumulates one strategy run's hits and diagnostics.
///
/// A node id is kept once (first sighting wins) and the search root itself is
/// never a hit.
#[derive(Debug)]
pub struct HitCollector {
    root_id: String,
    seen: HashSet<String>,
    hits: Vec<SearchHit>,
    pub diagnostics: SearchDiagnostics,
}

impl HitCollector {
    pub fn new(root_id: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            seen: HashSet::new(),
            hits: Vec::new(),
            diagnostics: SearchDiagnostics::default(),
        }
    }

    pub fn push(&mut self, node: Node, parent_path: &str) -> bool {
        if node.id == self.root_id || !self.seen.insert(node.id.clone()) {
            return false;
        }
        self.hits.push(ResultShaper::shape(node, parent_path));
        true
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn fail_folder(&mut self, folder_id: &str) {
        self.diagnostics.failed_folders.push(folder_id.to_string());
    }

    /// Sorted hits, cut to `max_results` when given.
    pub fn finish(self, max_results: Option<usize>) -> (Vec<SearchHit>, SearchDiagnostics) {
        let Self {
            mut hits,
            mut diagnostics,
            ..
        } = self;
        ResultShaper::sort(&mut hits);
        if let Some(limit) = max_results {
            if hits.len() > limit {
                hits.truncate(limit);
                diagnostics.truncated = true;
            }
        }
        diagnostics.failed_folders.sort();
        diagnostics.failed_folders.dedup();
        (hits, diagnostics)
    }
}
