//! Display paths relative to a search root.

use crate::cache::PathCache;
use crate::client::{RemoteCaller, RequestContext};
use crate::error::{RemoteError, Result};

/// Returned when a path cannot be computed. Never cached.
pub const UNKNOWN_PATH: &str = "/unknown";

const MAX_PATH_HOPS: usize = 256;

/// Joins a parent path and a child name without doubling the root slash.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    caller: RemoteCaller,
    cache: PathCache,
}

impl PathResolver {
    pub fn new(caller: RemoteCaller, cache: PathCache) -> Self {
        Self { caller, cache }
    }

    /// Path of `folder_id` below `root_id`, or [`UNKNOWN_PATH`] when it
    /// cannot be computed. Fatal errors are returned as is.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        folder_id: &str,
    ) -> Result<String> {
        match self.try_resolve(ctx, root_id, folder_id).await {
            Ok(path) => Ok(path),
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                tracing::debug!("path of {} unresolved: {}", folder_id, error);
                Ok(UNKNOWN_PATH.to_string())
            }
        }
    }

    pub async fn try_resolve(
        &self,
        ctx: &RequestContext,
        root_id: &str,
        folder_id: &str,
    ) -> Result<String> {
        if folder_id == root_id {
            return Ok("/".to_string());
        }
        if let Some(path) = self.cache.get(root_id, folder_id) {
            return Ok(path);
        }

        // (id, name) from folder_id upwards, until a known path is met
        let mut chain: Vec<(String, String)> = Vec::new();
        let mut current = folder_id.to_string();
        let base = loop {
            if current == root_id {
                break "/".to_string();
            }
            if let Some(path) = self.cache.get(root_id, &current) {
                break path;
            }
            if chain.len() >= MAX_PATH_HOPS || chain.iter().any(|(id, _)| *id == current) {
                return Err(RemoteError::Unavailable(format!(
                    "no bounded parent chain from {folder_id} to {root_id}"
                )));
            }

            let node = self.caller.get_node(ctx, &current).await?;
            let parent = node.primary_parent().map(str::to_string);
            chain.push((current, node.name));
            current = parent.ok_or_else(|| {
                RemoteError::NotFound(format!("{folder_id} is not below {root_id}"))
            })?;
        };

        let mut path = base;
        for (id, name) in chain.into_iter().rev() {
            path = self.cache.insert_first(root_id, &id, join_path(&path, &name));
        }
        Ok(path)
    }
}
