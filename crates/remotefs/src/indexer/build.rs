//! Bounded breadth-first discovery of the folder tree under a root.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;

use super::data::FolderIndex;
use crate::cache::{IndexKey, IndexRegistry, PathCache};
use crate::client::{RemoteCaller, RequestContext};
use crate::error::Result;
use crate::path::join_path;
use crate::types::ListQuery;

struct FrontierEntry {
    folder_id: String,
    depth: usize,
    path: String,
}

#[derive(Debug, Clone)]
pub struct StructureIndexer {
    caller: RemoteCaller,
    paths: PathCache,
    registry: Arc<IndexRegistry>,
    batch_size: usize,
}

impl StructureIndexer {
    pub fn new(
        caller: RemoteCaller,
        paths: PathCache,
        registry: Arc<IndexRegistry>,
        batch_size: usize,
    ) -> Self {
        Self {
            caller,
            paths,
            registry,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the session's index for `root_id`, building it on first use.
    ///
    /// Concurrent callers share one build. A failed or cancelled build leaves
    /// nothing behind, so the next caller starts over.
    pub async fn ensure_index(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        max_depth: usize,
    ) -> Result<Arc<FolderIndex>> {
        let slot = self.registry.slot(IndexKey {
            root_id: root_id.to_string(),
            max_depth,
        });
        let index = slot
            .get_or_try_init(|| async {
                self.build_index(ctx, root_id, max_depth)
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(index))
    }

    /// Walks child folders of `root_id` level by level, `batch_size` listings
    /// at a time. Folders at `max_depth` are indexed but never listed.
    ///
    /// Only primary-parent edges index a folder, so the index is the tree the
    /// ancestry and path resolvers see and each folder has a single depth.
    ///
    /// A failed listing counts as "no children" for that folder, except for
    /// the root: without it there is nothing to index.
    pub async fn build_index(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        max_depth: usize,
    ) -> Result<FolderIndex> {
        let started = Instant::now();
        let mut index = FolderIndex::empty(root_id, max_depth);
        let mut frontier = VecDeque::new();
        if max_depth > 0 {
            frontier.push_back(FrontierEntry {
                folder_id: root_id.to_string(),
                depth: 0,
                path: "/".to_string(),
            });
        } else {
            index.depth_limited = 1;
        }

        while !frontier.is_empty() {
            ctx.ensure_active()?;
            let take = self.batch_size.min(frontier.len());
            let batch = frontier.drain(..take).collect::<Vec<_>>();
            let listings = join_all(batch.iter().map(|entry| {
                self.caller
                    .list_bounded(ctx, ListQuery::child_folders(&entry.folder_id))
            }))
            .await;
            index.listed_folders += batch.len();

            // applied in frontier order so first discovery is deterministic
            for (entry, listing) in batch.into_iter().zip(listings) {
                let children = match listing {
                    Ok(listing) => {
                        if listing.cut_short {
                            index.truncated_listings += 1;
                        }
                        listing.nodes
                    }
                    Err(error) if error.is_fatal() || entry.depth == 0 => return Err(error),
                    Err(error) => {
                        tracing::warn!(
                            "folder listing failed folder={} depth={}: {}",
                            entry.folder_id,
                            entry.depth,
                            error
                        );
                        index.failed_folders.push(entry.folder_id);
                        continue;
                    }
                };

                for child in children.into_iter().filter(|child| child.is_folder()) {
                    // a folder belongs where its primary parent is; other
                    // parents only link it once it is known
                    if !child.is_primary_child_of(&entry.folder_id) {
                        index.link_child(&entry.folder_id, &child.id);
                        continue;
                    }
                    let depth = entry.depth + 1;
                    let path = join_path(&entry.path, &child.name);
                    if !index.record_child(&entry.folder_id, &child.id, depth, path.clone()) {
                        continue;
                    }
                    self.paths.insert_first(root_id, &child.id, path.clone());
                    if depth < max_depth {
                        frontier.push_back(FrontierEntry {
                            folder_id: child.id,
                            depth,
                            path,
                        });
                    } else {
                        index.depth_limited += 1;
                    }
                }
            }
        }

        tracing::info!(
            "folder index built root={} max_depth={} folders={} listed={} failed={} depth_limited={} truncated={} elapsed_ms={}",
            root_id,
            max_depth,
            index.len(),
            index.listed_folders,
            index.failed_folders.len(),
            index.depth_limited,
            index.truncated_listings,
            started.elapsed().as_millis(),
        );
        Ok(index)
    }
}
