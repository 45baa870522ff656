use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::RemoteTreeClient;
use crate::config::{EngineConfig, RetryPolicy};
use crate::credential::{Credential, CredentialChannel};
use crate::error::{RemoteError, Result};
use crate::types::{ListQuery, Node, NodePage};

/// Per-request state threaded through every remote call of a search.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub credentials: CredentialChannel,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(credentials: CredentialChannel) -> Self {
        Self {
            credentials,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(credentials: CredentialChannel, cancel: CancellationToken) -> Self {
        Self {
            credentials,
            cancel,
        }
    }

    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(RemoteError::Cancelled)
        } else {
            Ok(())
        }
    }
}

enum PageCursor {
    Start,
    Next(String),
    Done,
}

/// Every node of a listing, or as many as the page ceiling allowed.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub nodes: Vec<Node>,
    /// The store still had pages when the ceiling was reached.
    pub cut_short: bool,
}

/// Wraps a [`RemoteTreeClient`] with the engine's call discipline.
#[derive(Clone)]
pub struct RemoteCaller {
    client: Arc<dyn RemoteTreeClient>,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    page_size: u32,
    max_pages: usize,
}

impl std::fmt::Debug for RemoteCaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCaller")
            .field("retry", &self.retry)
            .field("available_permits", &self.permits.available_permits())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl RemoteCaller {
    pub fn new(client: Arc<dyn RemoteTreeClient>, config: &EngineConfig) -> Self {
        Self {
            client,
            retry: config.retry.clone(),
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            page_size: config.page_size,
            max_pages: config.max_pages_per_listing,
        }
    }

    pub async fn get_node(&self, ctx: &RequestContext, id: &str) -> Result<Node> {
        let client = Arc::clone(&self.client);
        self.call(ctx, "get_node", |credential| {
            let client = Arc::clone(&client);
            let id = id.to_string();
            async move { client.get_node(&credential, &id).await }
        })
        .await
    }

    /// Lazily streams every node of `query`, following continuation tokens.
    ///
    /// Each page is fetched (and retried) on its own, so a failure mid-listing
    /// does not refetch earlier pages. Calling again restarts from the first page.
    pub fn children(
        &self,
        ctx: &RequestContext,
        query: ListQuery,
    ) -> BoxStream<'static, Result<Node>> {
        let caller = self.clone();
        let ctx = ctx.clone();
        stream::try_unfold((PageCursor::Start, 0usize), move |(cursor, pages)| {
            let caller = caller.clone();
            let ctx = ctx.clone();
            let query = query.clone();
            async move { caller.next_page(&ctx, &query, cursor, pages).await }
        })
        .map_ok(|nodes| stream::iter(nodes.into_iter().map(Ok::<Node, RemoteError>)))
        .try_flatten()
        .boxed()
    }

    async fn next_page(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        cursor: PageCursor,
        pages: usize,
    ) -> Result<Option<(Vec<Node>, (PageCursor, usize))>> {
        let token = match cursor {
            PageCursor::Done => return Ok(None),
            PageCursor::Start => None,
            PageCursor::Next(token) => Some(token),
        };
        if pages >= self.max_pages {
            tracing::warn!(
                "listing stopped after {} pages parent={:?}",
                pages,
                query.parent
            );
            return Ok(None);
        }
        let page = self.fetch_page(ctx, query, token).await?;
        let next = match page.next_page_token {
            Some(token) if !token.is_empty() => PageCursor::Next(token),
            _ => PageCursor::Done,
        };
        let nodes = page
            .nodes
            .into_iter()
            .filter(|node| query.accepts(node))
            .collect::<Vec<_>>();
        Ok(Some((nodes, (next, pages + 1))))
    }

    /// Collects every node of `query`.
    pub async fn list_all(&self, ctx: &RequestContext, query: ListQuery) -> Result<Vec<Node>> {
        self.children(ctx, query).try_collect().await
    }

    /// Like [`Self::list_all`], but reports whether the page ceiling cut the
    /// listing off so callers can flag their results as partial.
    pub async fn list_bounded(&self, ctx: &RequestContext, query: ListQuery) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut cursor = PageCursor::Start;
        let mut pages = 0usize;
        loop {
            if pages >= self.max_pages && matches!(cursor, PageCursor::Next(_)) {
                tracing::warn!(
                    "listing cut short after {} pages parent={:?}",
                    pages,
                    query.parent
                );
                listing.cut_short = true;
                return Ok(listing);
            }
            match self.next_page(ctx, &query, cursor, pages).await? {
                Some((nodes, (next, fetched))) => {
                    listing.nodes.extend(nodes);
                    cursor = next;
                    pages = fetched;
                }
                None => return Ok(listing),
            }
        }
    }

    async fn fetch_page(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        token: Option<String>,
    ) -> Result<NodePage> {
        let client = Arc::clone(&self.client);
        let page_size = self.page_size;
        self.call(ctx, "list_page", |credential| {
            let client = Arc::clone(&client);
            let query = query.clone();
            let token = token.clone();
            async move {
                client
                    .list_page(&credential, &query, token.as_deref(), page_size)
                    .await
            }
        })
        .await
    }

    async fn call<T, F, Fut>(&self, ctx: &RequestContext, op: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut transient_retries = 0u32;
        let mut rate_limit_retries = 0u32;
        let mut recredentials = 0u32;

        loop {
            ctx.ensure_active()?;

            let permit = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(RemoteError::Cancelled),
                permit = Arc::clone(&self.permits).acquire_owned() => permit.map_err(|_| {
                    RemoteError::Unavailable("remote call pool closed".to_string())
                })?,
            };

            let credential = ctx.credentials.current();
            let outcome = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return Err(RemoteError::Cancelled),
                outcome = tokio::time::timeout(self.retry.call_timeout(), attempt(credential.clone())) => outcome,
            };
            drop(permit);

            let error = match outcome {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => RemoteError::Transient(format!(
                    "{op} timed out after {}ms",
                    self.retry.call_timeout_ms
                )),
            };

            let error = match error {
                RemoteError::Unauthorized(message) => {
                    if recredentials >= self.retry.max_recredentials {
                        return Err(RemoteError::CredentialExhausted(format!(
                            "{op} still unauthorized after {recredentials} refreshes: {message}"
                        )));
                    }
                    recredentials += 1;
                    tracing::info!("remote {op} unauthorized, requesting new credential");
                    ctx.credentials.recredential(&credential, &ctx.cancel).await?;
                    continue;
                }
                RemoteError::RateLimited {
                    message,
                    retry_after,
                } => {
                    if rate_limit_retries < self.retry.max_rate_limit_retries {
                        let delay = retry_after
                            .unwrap_or_else(|| self.retry.backoff(rate_limit_retries))
                            .min(Duration::from_millis(self.retry.max_backoff_ms));
                        rate_limit_retries += 1;
                        tracing::debug!(
                            "remote {op} rate limited, retrying in {}ms (attempt {})",
                            delay.as_millis(),
                            rate_limit_retries
                        );
                        pause(ctx, delay).await?;
                        continue;
                    }
                    RemoteError::Transient(format!("{op} rate limited: {message}"))
                }
                other => other,
            };

            match error {
                RemoteError::Transient(message) => {
                    if transient_retries >= self.retry.max_transient_retries {
                        return Err(RemoteError::Transient(message));
                    }
                    let delay = self.retry.backoff(transient_retries);
                    transient_retries += 1;
                    tracing::debug!(
                        "remote {op} failed transiently, retrying in {}ms (attempt {}): {}",
                        delay.as_millis(),
                        transient_retries,
                        message
                    );
                    pause(ctx, delay).await?;
                }
                other => return Err(other),
            }
        }
    }
}

async fn pause(ctx: &RequestContext, delay: Duration) -> Result<()> {
    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(RemoteError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
