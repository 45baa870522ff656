//! Last-resort strategy: depth-bounded recursive walk without an index.
//!
//! Each folder gets three concurrent listings (matching leaves, matching
//! folders, child folders to recurse into). Children are explored in batches
//! of the request's concurrency limit.
//!
//! Only nodes whose primary parent is the listed folder count, the same edge
//! ancestry and path resolution follow. That makes the walk a tree: every
//! folder has one depth and one path, and the visited set only breaks cycles.

use std::collections::HashSet;

use futures_util::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;

use super::shaper::HitCollector;
use crate::client::{Listing, RemoteCaller, RequestContext};
use crate::error::Result;
use crate::path::join_path;
use crate::types::{KindFilter, ListQuery, Node, SearchRequest};

#[derive(Debug, Clone)]
pub struct NaiveSearch {
    caller: RemoteCaller,
    max_depth: usize,
}

struct NaiveRun<'a> {
    ctx: &'a RequestContext,
    request: &'a SearchRequest,
    max_depth: usize,
    visited: Mutex<HashSet<String>>,
    collector: Mutex<HitCollector>,
}

impl NaiveSearch {
    pub fn new(caller: RemoteCaller, max_depth: usize) -> Self {
        Self { caller, max_depth }
    }

    pub async fn run(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        request: &SearchRequest,
    ) -> Result<HitCollector> {
        let run = NaiveRun {
            ctx,
            request,
            max_depth: request.max_depth.min(self.max_depth),
            visited: Mutex::new(HashSet::from([root_id.to_string()])),
            collector: Mutex::new(HitCollector::new(root_id)),
        };
        self.explore(&run, root_id.to_string(), "/".to_string(), 0)
            .await?;
        Ok(run.collector.into_inner())
    }

    fn explore<'a>(
        &'a self,
        run: &'a NaiveRun<'a>,
        folder_id: String,
        path: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            run.ctx.ensure_active()?;
            let query = &run.request.query;
            let matching = ListQuery::children(&folder_id).with_name(query);
            let descend = depth < run.max_depth;

            let (leaves, folders, children) = tokio::join!(
                self.caller
                    .list_bounded(run.ctx, matching.clone().with_kind(KindFilter::Leaf)),
                self.caller
                    .list_bounded(run.ctx, matching.with_kind(KindFilter::Folder)),
                async {
                    if descend {
                        self.caller
                            .list_bounded(run.ctx, ListQuery::child_folders(&folder_id))
                            .await
                    } else {
                        Ok(Listing::default())
                    }
                },
            );

            let (leaves, folders, children) = match (leaves, folders, children) {
                (Ok(leaves), Ok(folders), Ok(children)) => (leaves, folders, children),
                (leaves, folders, children) => {
                    let error = [leaves.err(), folders.err(), children.err()]
                        .into_iter()
                        .flatten()
                        .max_by_key(|error| error.is_fatal());
                    match error {
                        Some(error) if error.is_fatal() || depth == 0 => return Err(error),
                        Some(error) => {
                            tracing::warn!(
                                "naive folder query failed folder={} depth={}: {}",
                                folder_id,
                                depth,
                                error
                            );
                            run.collector.lock().fail_folder(&folder_id);
                            return Ok(());
                        }
                        None => return Ok(()),
                    }
                }
            };

            {
                let mut collector = run.collector.lock();
                collector.diagnostics.truncated_listings += [&leaves, &folders, &children]
                    .iter()
                    .filter(|listing| listing.cut_short)
                    .count();
                for node in leaves.nodes.into_iter().chain(folders.nodes) {
                    if node.is_primary_child_of(&folder_id) {
                        collector.push(node, &path);
                    }
                }
                if !descend {
                    collector.diagnostics.depth_limited_folders += 1;
                }
            }

            let unvisited = {
                let mut visited = run.visited.lock();
                children
                    .nodes
                    .into_iter()
                    .filter(|child| child.is_primary_child_of(&folder_id))
                    .filter(|child| visited.insert(child.id.clone()))
                    .collect::<Vec<Node>>()
            };
            for batch in unvisited.chunks(run.request.concurrency_limit) {
                let results = join_all(batch.iter().map(|child| {
                    self.explore(run, child.id.clone(), join_path(&path, &child.name), depth + 1)
                }))
                .await;
                for result in results {
                    result?;
                }
            }
            Ok(())
        }
        .boxed()
    }
}
