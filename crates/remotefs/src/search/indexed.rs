//! Index-backed strategy: one name query per indexed folder.

use futures_util::future::join_all;

use super::shaper::HitCollector;
use crate::client::{RemoteCaller, RequestContext};
use crate::error::{RemoteError, Result};
use crate::indexer::{FolderIndexEntry, StructureIndexer};
use crate::types::{ListQuery, SearchRequest};

#[derive(Debug, Clone)]
pub struct IndexedSearch {
    caller: RemoteCaller,
    indexer: StructureIndexer,
}

impl IndexedSearch {
    pub fn new(caller: RemoteCaller, indexer: StructureIndexer) -> Self {
        Self { caller, indexer }
    }

    pub async fn run(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        request: &SearchRequest,
    ) -> Result<HitCollector> {
        let index = self
            .indexer
            .ensure_index(ctx, root_id, request.max_depth)
            .await?;
        let folders = index.folders().collect::<Vec<&FolderIndexEntry>>();

        let mut collector = HitCollector::new(root_id);
        collector.diagnostics.depth_limited_folders = index.depth_limited;
        collector.diagnostics.truncated_listings = index.truncated_listings;
        for folder_id in &index.failed_folders {
            collector.fail_folder(folder_id);
        }

        let mut failed = 0usize;
        for batch in folders.chunks(request.concurrency_limit) {
            ctx.ensure_active()?;
            let results = join_all(batch.iter().map(|entry| {
                self.caller.list_bounded(
                    ctx,
                    ListQuery::children(&entry.folder_id).with_name(&request.query),
                )
            }))
            .await;

            for (entry, result) in batch.iter().zip(results) {
                match result {
                    Ok(listing) => {
                        if listing.cut_short {
                            collector.diagnostics.truncated_listings += 1;
                        }
                        // nodes filed under a secondary parent live elsewhere
                        for node in listing.nodes {
                            if node.is_primary_child_of(&entry.folder_id) {
                                collector.push(node, &entry.resolved_path);
                            }
                        }
                    }
                    Err(error) if error.is_fatal() => return Err(error),
                    Err(error) => {
                        tracing::warn!(
                            "folder query failed folder={} path={}: {}",
                            entry.folder_id,
                            entry.resolved_path,
                            error
                        );
                        failed += 1;
                        collector.fail_folder(&entry.folder_id);
                    }
                }
            }
        }

        if failed == folders.len() {
            return Err(RemoteError::Unavailable(format!(
                "all {failed} folder queries failed under {root_id}"
            )));
        }
        tracing::debug!(
            "indexed folders={} failed={} hits={}",
            folders.len(),
            failed,
            collector.len()
        );
        Ok(collector)
    }
}
