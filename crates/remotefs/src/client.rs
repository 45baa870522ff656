//! Access to the remote tree store.
//!
//! - `RemoteTreeClient` - the raw, single-page API of a store
//! - `call` - `RemoteCaller`, which adds retries, backoff, timeouts, the
//!   re-credential protocol, cancellation and the in-flight ceiling
//! - `http` - Drive-style REST implementation
//! - `memory` - in-memory implementation with fault injection

mod call;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::Result;
use crate::types::{ListQuery, Node, NodePage};

pub use call::{Listing, RemoteCaller, RequestContext};

/// Read-only listing and metadata API of a remote tree store.
///
/// Implementations map store failures onto [`crate::RemoteError`]:
/// `Unauthorized`, `RateLimited`, `Transient` and `NotFound` drive the
/// caller's recovery logic.
#[async_trait]
pub trait RemoteTreeClient: Send + Sync {
    /// Fetches one page of `query`, continuing from `page_token`.
    async fn list_page(
        &self,
        credential: &Credential,
        query: &ListQuery,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<NodePage>;

    /// Fetches metadata of a single node.
    async fn get_node(&self, credential: &Credential, id: &str) -> Result<Node>;
}
