//! Name search over remote tree-structured file stores.
//!
//! This crate provides:
//! - A retrying, rate-limit-aware client layer over a paginated listing API
//! - Memoized ancestry and display-path resolution
//! - Bounded breadth-first folder indexing
//! - Search with global, indexed and naive strategies and fallback between them

pub mod ancestry;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod credential;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod path;
pub mod search;
pub mod types;

// Re-export main types
pub use ancestry::{Ancestry, AncestryResolver};
pub use cache::SessionCaches;
pub use cancel::CancellationToken;
pub use client::http::DriveHttpClient;
pub use client::memory::MemoryTree;
pub use client::{Listing, RemoteCaller, RemoteTreeClient, RequestContext};
pub use config::EngineConfig;
pub use credential::{
    Credential, CredentialChannel, CredentialPusher, NoRecredential, RecredentialHook,
};
pub use engine::RemoteSearchEngine;
pub use error::{RemoteError, Result};
pub use indexer::{FolderIndex, FolderIndexEntry, StructureIndexer};
pub use path::{PathResolver, UNKNOWN_PATH};
pub use search::{ResultShaper, SearchCoordinator};
pub use types::{
    ContentRequest, KindFilter, ListQuery, Node, NodeKind, SearchDiagnostics, SearchHit,
    SearchOutcome, SearchRequest, Strategy,
};
