//! SearchCoordinator - runs the strategies in priority order.

use std::time::Instant;

use super::global::GlobalSearch;
use super::indexed::IndexedSearch;
use super::naive::NaiveSearch;
use super::shaper::HitCollector;
use crate::ancestry::AncestryResolver;
use crate::cache::SessionCaches;
use crate::client::{RemoteCaller, RequestContext};
use crate::config::EngineConfig;
use crate::error::{RemoteError, Result};
use crate::indexer::StructureIndexer;
use crate::path::PathResolver;
use crate::types::{SearchOutcome, SearchRequest, Strategy, StrategyFailure};

#[derive(Debug, Clone)]
pub struct SearchCoordinator {
    caller: RemoteCaller,
    global: GlobalSearch,
    indexed: IndexedSearch,
    naive: NaiveSearch,
}

impl SearchCoordinator {
    pub fn new(caller: RemoteCaller, caches: &SessionCaches, config: &EngineConfig) -> Self {
        let ancestry = AncestryResolver::new(caller.clone(), caches.ancestry.clone());
        let paths = PathResolver::new(caller.clone(), caches.paths.clone());
        let indexer = StructureIndexer::new(
            caller.clone(),
            caches.paths.clone(),
            caches.indexes.clone(),
            config.batch_size,
        );
        Self {
            global: GlobalSearch::new(caller.clone(), ancestry, paths),
            indexed: IndexedSearch::new(caller.clone(), indexer),
            naive: NaiveSearch::new(caller.clone(), config.naive_max_depth),
            caller,
        }
    }

    /// Global, then indexed, then naive; the first strategy that does not
    /// raise an error answers.
    ///
    /// Only configuration errors, credential exhaustion and cancellation end
    /// the search early. If every strategy fails the search is `Unavailable`.
    #[tracing::instrument(skip_all, fields(query = %request.query, root = %request.root_id))]
    pub async fn search(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
    ) -> Result<SearchOutcome> {
        request.validate()?;
        ctx.ensure_active()?;
        let root_id = self.resolve_root(ctx, &request.root_id).await?;

        let mut fallbacks: Vec<StrategyFailure> = Vec::new();
        for strategy in Strategy::ORDER {
            let started = Instant::now();
            match self.run_strategy(strategy, ctx, &root_id, request).await {
                Ok(collector) => {
                    let (hits, diagnostics) = collector.finish(request.max_results);
                    tracing::info!(
                        "search done strategy={} root={} hits={} fallbacks={} elapsed_ms={}",
                        strategy,
                        root_id,
                        hits.len(),
                        fallbacks.len(),
                        started.elapsed().as_millis()
                    );
                    let fully_explored = diagnostics.is_complete();
                    return Ok(SearchOutcome {
                        query: request.query.clone(),
                        root_id,
                        strategy,
                        count: hits.len(),
                        hits,
                        fallbacks,
                        diagnostics,
                        fully_explored,
                    });
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        "search strategy failed strategy={} root={} elapsed_ms={}: {}",
                        strategy,
                        root_id,
                        started.elapsed().as_millis(),
                        error
                    );
                    fallbacks.push(StrategyFailure {
                        strategy,
                        error: error.to_string(),
                    });
                }
            }
        }

        Err(RemoteError::Unavailable(format!(
            "every search strategy failed under {root_id}"
        )))
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        ctx: &RequestContext,
        root_id: &str,
        request: &SearchRequest,
    ) -> Result<HitCollector> {
        match strategy {
            Strategy::Global => self.global.run(ctx, root_id, request).await,
            Strategy::Indexed => self.indexed.run(ctx, root_id, request).await,
            Strategy::Naive => self.naive.run(ctx, root_id, request).await,
        }
    }

    /// Canonical id of a search root; aliases such as `root` are replaced by
    /// the store's id. A missing root or a leaf is a configuration error.
    pub async fn resolve_root(&self, ctx: &RequestContext, root: &str) -> Result<String> {
        match self.caller.get_node(ctx, root).await {
            Ok(node) if node.is_folder() => Ok(node.id),
            Ok(node) => Err(RemoteError::Configuration(format!(
                "search root {} is not a folder",
                node.id
            ))),
            Err(RemoteError::NotFound(message)) => Err(RemoteError::Configuration(format!(
                "search root {root} cannot be resolved: {message}"
            ))),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => Err(RemoteError::Unavailable(format!(
                "search root {root} unreachable: {error}"
            ))),
        }
    }
}
