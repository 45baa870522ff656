//! Wide-query strategy: one store-wide name query, filtered by ancestry.

use futures_util::stream::{self, StreamExt};

use super::shaper::HitCollector;
use crate::ancestry::{Ancestry, AncestryResolver};
use crate::client::{RemoteCaller, RequestContext};
use crate::error::Result;
use crate::path::PathResolver;
use crate::types::{ListQuery, Node, SearchRequest};

#[derive(Debug, Clone)]
pub struct GlobalSearch {
    caller: RemoteCaller,
    ancestry: AncestryResolver,
    paths: PathResolver,
}

impl GlobalSearch {
    pub fn new(caller: RemoteCaller, ancestry: AncestryResolver, paths: PathResolver) -> Self {
        Self {
            caller,
            ancestry,
            paths,
        }
    }

    /// Fails only when the wide listing itself fails; an empty listing is a
    /// valid answer.
    pub async fn run(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        request: &SearchRequest,
    ) -> Result<HitCollector> {
        let listing = self
            .caller
            .list_bounded(ctx, ListQuery::everywhere(&request.query))
            .await?;
        let candidates = listing.nodes;
        let total = candidates.len();

        let classified = stream::iter(candidates)
            .map(|node| async move {
                let verdict = self.ancestry.classify_node(ctx, &node, root_id).await;
                (node, verdict)
            })
            .buffered(request.concurrency_limit)
            .collect::<Vec<_>>()
            .await;

        let mut collector = HitCollector::new(root_id);
        if listing.cut_short {
            collector.diagnostics.truncated_listings += 1;
        }
        let mut members: Vec<Node> = Vec::new();
        for (node, verdict) in classified {
            match verdict? {
                Ancestry::Descendant => members.push(node),
                Ancestry::Unrelated => {}
                Ancestry::Unknown => collector.diagnostics.unresolved_candidates += 1,
            }
        }

        let shaped = stream::iter(members)
            .map(|node| async move {
                let parent_path = match node.primary_parent() {
                    Some(parent) => self.paths.resolve(ctx, root_id, parent).await,
                    None => Ok("/".to_string()),
                };
                (node, parent_path)
            })
            .buffered(request.concurrency_limit)
            .collect::<Vec<_>>()
            .await;
        ctx.ensure_active()?;

        for (node, parent_path) in shaped {
            collector.push(node, &parent_path?);
        }
        tracing::debug!(
            "global candidates={} members={} unresolved={}",
            total,
            collector.len(),
            collector.diagnostics.unresolved_candidates
        );
        Ok(collector)
    }
}
