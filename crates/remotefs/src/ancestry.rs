//! Descendant checks via memoized primary-parent walks.
//!
//! A walk climbs primary parents until it meets the root (descendant), the
//! top of the store or an inaccessible ancestor (unrelated), or a cached
//! verdict. Every node on the walked chain is memoized with the final verdict.
//! Walks that stop on a transient error end as [`Ancestry::Unknown`], which is
//! reported as "not a descendant" but never cached, so a later search can
//! still confirm the node.

use crate::cache::AncestryCache;
use crate::client::{RemoteCaller, RequestContext};
use crate::error::{RemoteError, Result};
use crate::types::Node;

/// Ceiling on parent hops; deeper chains are treated as unknown.
pub const MAX_ANCESTRY_HOPS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Descendant,
    Unrelated,
    Unknown,
}

impl Ancestry {
    pub fn is_descendant(self) -> bool {
        self == Self::Descendant
    }

    fn cached(verdict: bool) -> Self {
        if verdict {
            Self::Descendant
        } else {
            Self::Unrelated
        }
    }
}

#[derive(Debug, Clone)]
pub struct AncestryResolver {
    caller: RemoteCaller,
    cache: AncestryCache,
}

impl AncestryResolver {
    pub fn new(caller: RemoteCaller, cache: AncestryCache) -> Self {
        Self { caller, cache }
    }

    pub async fn is_descendant(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        root_id: &str,
    ) -> Result<bool> {
        Ok(self.classify(ctx, node_id, None, root_id).await?.is_descendant())
    }

    /// Classifies a node whose metadata is already at hand, saving one fetch.
    pub async fn classify_node(
        &self,
        ctx: &RequestContext,
        node: &Node,
        root_id: &str,
    ) -> Result<Ancestry> {
        let parent = node.primary_parent().map(str::to_string);
        self.classify(ctx, &node.id, Some(parent), root_id).await
    }

    /// Only fatal errors (cancellation, credential exhaustion) are returned.
    pub async fn classify(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        known_parent: Option<Option<String>>,
        root_id: &str,
    ) -> Result<Ancestry> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = node_id.to_string();
        let mut known_parent = known_parent;

        let verdict = loop {
            if current == root_id {
                break Ancestry::Descendant;
            }
            if let Some(verdict) = self.cache.get(&current, root_id) {
                tracing::trace!("ancestry cache hit node={} root={}", current, root_id);
                break Ancestry::cached(verdict);
            }
            if chain.contains(&current) {
                tracing::warn!("parent cycle detected at node={}", current);
                break Ancestry::Unknown;
            }
            if chain.len() >= MAX_ANCESTRY_HOPS {
                break Ancestry::Unknown;
            }
            chain.push(current.clone());

            let parent = match known_parent.take() {
                Some(parent) => Ok(parent),
                None => self
                    .caller
                    .get_node(ctx, &current)
                    .await
                    .map(|node| node.primary_parent().map(str::to_string)),
            };
            match parent {
                Ok(Some(parent)) => current = parent,
                // top of the store reached without meeting the root
                Ok(None) => break Ancestry::Unrelated,
                Err(RemoteError::NotFound(_)) => break Ancestry::Unrelated,
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::debug!(
                        "ancestry of node={} unresolved at {}: {}",
                        node_id,
                        current,
                        error
                    );
                    break Ancestry::Unknown;
                }
            }
        };

        if verdict != Ancestry::Unknown {
            let descendant = verdict.is_descendant();
            for id in &chain {
                self.cache.insert_first(id, root_id, descendant);
            }
        }
        Ok(verdict)
    }
}
