//! RemoteSearchEngine - main API for front ends.
//!
//! One engine is one session: it owns the session caches, the shared
//! in-flight ceiling and the search version tracker. Every operation takes the
//! caller's credential channel so credentials stay request-scoped.

use std::sync::Arc;

use crate::cache::SessionCaches;
use crate::cancel::SearchVersionTracker;
use crate::client::http::DriveHttpClient;
use crate::client::{RemoteCaller, RemoteTreeClient, RequestContext};
use crate::config::EngineConfig;
use crate::credential::CredentialChannel;
use crate::error::{RemoteError, Result};
use crate::path::PathResolver;
use crate::search::SearchCoordinator;
use crate::types::{ContentRequest, ListQuery, Node, SearchOutcome, SearchRequest};

#[derive(Debug)]
pub struct RemoteSearchEngine {
    config: EngineConfig,
    caller: RemoteCaller,
    caches: SessionCaches,
    coordinator: SearchCoordinator,
    paths: PathResolver,
    versions: SearchVersionTracker,
}

impl RemoteSearchEngine {
    pub fn new(client: Arc<dyn RemoteTreeClient>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let caller = RemoteCaller::new(client, &config);
        let caches = SessionCaches::new();
        let coordinator = SearchCoordinator::new(caller.clone(), &caches, &config);
        let paths = PathResolver::new(caller.clone(), caches.paths.clone());
        Ok(Self {
            config,
            caller,
            caches,
            coordinator,
            paths,
            versions: SearchVersionTracker::new(),
        })
    }

    /// Engine backed by the REST client at `config.api_base_url`.
    pub fn http(config: EngineConfig) -> Result<Self> {
        let client = DriveHttpClient::new(&config.api_base_url)?;
        Self::new(Arc::new(client), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn caches(&self) -> &SessionCaches {
        &self.caches
    }

    /// A request using the configured depth and fan-out.
    pub fn request(&self, query: &str, root_id: Option<&str>) -> SearchRequest {
        SearchRequest {
            query: query.trim().to_string(),
            root_id: root_id.unwrap_or(&self.config.default_root).to_string(),
            max_depth: self.config.max_depth,
            concurrency_limit: self.config.concurrency_limit,
            max_results: None,
        }
    }

    /// A context whose token is cancelled when the next one is issued.
    ///
    /// The channel's recredential wait is set from the configuration.
    pub fn superseding_context(&self, credentials: CredentialChannel) -> RequestContext {
        let (version, cancel) = self.versions.next_version();
        tracing::debug!("search version={} started", version);
        RequestContext::with_cancel(
            credentials.with_wait(self.config.recredential_wait()),
            cancel,
        )
    }

    /// Searches for `query` under `root_id` (or the default root).
    ///
    /// Starting a search cancels the previous one started through this method.
    pub async fn search(
        &self,
        credentials: CredentialChannel,
        query: &str,
        root_id: Option<&str>,
    ) -> Result<SearchOutcome> {
        let ctx = self.superseding_context(credentials);
        let request = self.request(query, root_id);
        self.search_with(&ctx, &request).await
    }

    pub async fn search_with(
        &self,
        ctx: &RequestContext,
        request: &SearchRequest,
    ) -> Result<SearchOutcome> {
        self.coordinator.search(ctx, request).await
    }

    /// Direct children of `folder_id` (or the default root).
    #[tracing::instrument(skip_all, fields(folder = folder_id.unwrap_or("<default>")))]
    pub async fn list_folder(
        &self,
        ctx: &RequestContext,
        folder_id: Option<&str>,
    ) -> Result<Vec<Node>> {
        let folder_id = folder_id.unwrap_or(&self.config.default_root);
        self.caller.list_all(ctx, ListQuery::children(folder_id)).await
    }

    /// Display path of `folder_id` relative to `root_id` (or the default root).
    #[tracing::instrument(skip_all, fields(folder = %folder_id))]
    pub async fn resolve_path(
        &self,
        ctx: &RequestContext,
        folder_id: &str,
        root_id: Option<&str>,
    ) -> Result<String> {
        let root = root_id.unwrap_or(&self.config.default_root);
        let root = self.coordinator.resolve_root(ctx, root).await?;
        let folder = self.caller.get_node(ctx, folder_id).await?;
        self.paths.try_resolve(ctx, &root, &folder.id).await
    }

    /// How the content-streaming side should fetch a leaf.
    pub async fn content_request(&self, ctx: &RequestContext, node_id: &str) -> Result<ContentRequest> {
        let node = self.caller.get_node(ctx, node_id).await?;
        if node.is_folder() {
            return Err(RemoteError::Configuration(format!(
                "{} is a folder and has no content",
                node.id
            )));
        }
        Ok(match node.exportable_as {
            Some(mime_type) => ContentRequest::Export {
                id: node.id,
                mime_type,
            },
            None => ContentRequest::Raw { id: node.id },
        })
    }

    /// Drops every cached path, ancestry verdict and index, e.g. after a
    /// known structural change.
    pub fn invalidate(&self) {
        self.caches.invalidate();
    }

    /// Cancels the search started by the latest [`Self::search`] call.
    pub fn cancel_active(&self) {
        self.versions.cancel_active();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryTree;
    use crate::credential::Credential;

    fn engine() -> (Arc<MemoryTree>, RemoteSearchEngine) {
        let tree = MemoryTree::new("top");
        tree.add_alias("root", "top");
        tree.add_folder("a", "A", "top");
        tree.add_folder("b", "B", "a");
        tree.add_leaf("x", "x.pdf", "a");
        let mut doc = Node::leaf("doc", "Plan", Some("a"));
        doc.exportable_as = Some("application/pdf".to_string());
        tree.add_node(doc);
        let tree = Arc::new(tree);
        let engine = RemoteSearchEngine::new(tree.clone(), EngineConfig::default()).unwrap();
        (tree, engine)
    }

    fn credentials() -> CredentialChannel {
        CredentialChannel::fixed(Credential::new("t"))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            batch_size: 0,
            ..EngineConfig::default()
        };
        let result = RemoteSearchEngine::new(Arc::new(MemoryTree::new("top")), config);
        assert!(matches!(result, Err(RemoteError::Configuration(_))));
    }

    #[tokio::test]
    async fn search_defaults_to_alias_root() {
        let (_, engine) = engine();
        let outcome = engine.search(credentials(), "x", None).await.unwrap();
        assert_eq!(outcome.root_id, "top");
        let paths = outcome
            .hits
            .iter()
            .map(|hit| hit.resolved_path.as_str())
            .collect::<Vec<_>>();
        assert_eq!(paths, ["/A/x.pdf"]);
    }

    #[tokio::test]
    async fn list_folder_returns_direct_children() {
        let (_, engine) = engine();
        let ctx = RequestContext::new(credentials());
        let names = engine
            .list_folder(&ctx, Some("a"))
            .await
            .unwrap()
            .into_iter()
            .map(|node| node.name)
            .collect::<Vec<_>>();
        assert_eq!(names, ["B", "Plan", "x.pdf"]);

        let top = engine.list_folder(&ctx, None).await.unwrap();
        assert_eq!(top.len(), 1);
    }

    #[tokio::test]
    async fn resolve_path_is_relative_to_root() {
        let (_, engine) = engine();
        let ctx = RequestContext::new(credentials());
        assert_eq!(engine.resolve_path(&ctx, "b", None).await.unwrap(), "/A/B");
        assert_eq!(engine.resolve_path(&ctx, "root", None).await.unwrap(), "/");
        assert_eq!(engine.resolve_path(&ctx, "b", Some("a")).await.unwrap(), "/B");
        assert!(matches!(
            engine.resolve_path(&ctx, "missing", None).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn content_request_prefers_export() {
        let (_, engine) = engine();
        let ctx = RequestContext::new(credentials());
        assert_eq!(
            engine.content_request(&ctx, "doc").await.unwrap(),
            ContentRequest::Export {
                id: "doc".to_string(),
                mime_type: "application/pdf".to_string(),
            }
        );
        assert_eq!(
            engine.content_request(&ctx, "x").await.unwrap(),
            ContentRequest::Raw {
                id: "x".to_string()
            }
        );
        assert!(matches!(
            engine.content_request(&ctx, "a").await,
            Err(RemoteError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn newer_context_cancels_older() {
        let (_, engine) = engine();
        let first = engine.superseding_context(credentials());
        let second = engine.superseding_context(credentials());
        assert!(first.cancel.is_cancelled());
        assert!(!second.cancel.is_cancelled());

        let request = engine.request("x", None);
        assert!(matches!(
            engine.search_with(&first, &request).await,
            Err(RemoteError::Cancelled)
        ));
        assert_eq!(engine.search_with(&second, &request).await.unwrap().count, 1);
    }

    #[test]
    fn superseding_context_uses_configured_recredential_wait() {
        let config = EngineConfig {
            recredential_wait_secs: 7,
            ..EngineConfig::default()
        };
        let engine = RemoteSearchEngine::new(Arc::new(MemoryTree::new("top")), config).unwrap();
        let ctx = engine.superseding_context(credentials());
        assert_eq!(ctx.credentials.wait(), std::time::Duration::from_secs(7));
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_lookups() {
        let (tree, engine) = engine();
        let ctx = RequestContext::new(credentials());
        engine.resolve_path(&ctx, "b", None).await.unwrap();
        assert!(engine.caches().paths.get("top", "b").is_some());

        engine.invalidate();
        assert!(engine.caches().paths.get("top", "b").is_none());
        tree.reset_counters();
        engine.resolve_path(&ctx, "b", None).await.unwrap();
        assert!(tree.get_calls() >= 2);
    }
}
