//! In-memory tree store.
//!
//! Listings are sorted by name so runs are deterministic. Faults can be queued
//! per listing parent or per node id to exercise the engine's recovery paths,
//! and every call is recorded.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::RemoteTreeClient;
use crate::credential::Credential;
use crate::error::{RemoteError, Result};
use crate::types::{ListQuery, Node, NodePage};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FaultKey {
    List(Option<String>),
    Get(String),
}

#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: RwLock<BTreeMap<String, Node>>,
    aliases: RwLock<HashMap<String, String>>,
    queued_faults: Mutex<HashMap<FaultKey, VecDeque<RemoteError>>>,
    sticky_faults: Mutex<HashMap<FaultKey, RemoteError>>,
    global_search_disabled: AtomicBool,
    required_credential: RwLock<Option<String>>,
    latency: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    listed: Mutex<Vec<ListQuery>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a MemoryTree);

impl<'a> InFlight<'a> {
    fn enter(tree: &'a MemoryTree) -> Self {
        let now = tree.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        tree.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(tree)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTree {
    /// Creates a store whose top folder is `top_id`.
    pub fn new(top_id: &str) -> Self {
        let tree = Self::default();
        tree.add_node(Node::folder(top_id, top_id, None));
        tree
    }

    pub fn add_node(&self, node: Node) {
        self.nodes.write().insert(node.id.clone(), node);
    }

    pub fn add_folder(&self, id: &str, name: &str, parent: &str) {
        self.add_node(Node::folder(id, name, Some(parent)));
    }

    pub fn add_leaf(&self, id: &str, name: &str, parent: &str) {
        self.add_node(Node::leaf(id, name, Some(parent)));
    }

    /// Adds a secondary parent to an existing node.
    pub fn add_parent(&self, id: &str, parent: &str) {
        if let Some(node) = self.nodes.write().get_mut(id) {
            node.parent_ids.push(parent.to_string());
        }
    }

    /// Makes `alias` resolve to `id`, like a store's `root` shorthand.
    pub fn add_alias(&self, alias: &str, id: &str) {
        self.aliases
            .write()
            .insert(alias.to_string(), id.to_string());
    }

    pub fn disable_global_search(&self) {
        self.global_search_disabled.store(true, Ordering::SeqCst);
    }

    /// Calls made with any other bearer value fail `Unauthorized`.
    pub fn require_credential(&self, bearer: &str) {
        *self.required_credential.write() = Some(bearer.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Queues one failure for the next listing of `parent`'s children.
    pub fn fail_list(&self, parent: &str, error: RemoteError) {
        self.queue_fault(FaultKey::List(Some(parent.to_string())), error);
    }

    /// Every listing of `parent`'s children fails with `error`.
    pub fn fail_list_always(&self, parent: &str, error: RemoteError) {
        self.sticky_faults
            .lock()
            .insert(FaultKey::List(Some(parent.to_string())), error);
    }

    /// Every wide (parentless) listing fails with `error`.
    pub fn fail_global_always(&self, error: RemoteError) {
        self.sticky_faults.lock().insert(FaultKey::List(None), error);
    }

    /// Queues one failure for the next metadata fetch of `id`.
    pub fn fail_get(&self, id: &str, error: RemoteError) {
        self.queue_fault(FaultKey::Get(id.to_string()), error);
    }

    pub fn fail_get_always(&self, id: &str, error: RemoteError) {
        self.sticky_faults
            .lock()
            .insert(FaultKey::Get(id.to_string()), error);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Parents of every listing made so far, in call order.
    pub fn listed_parents(&self) -> Vec<Option<String>> {
        self.listed
            .lock()
            .iter()
            .map(|query| query.parent.clone())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.list_calls.store(0, Ordering::SeqCst);
        self.get_calls.store(0, Ordering::SeqCst);
        self.listed.lock().clear();
    }

    fn queue_fault(&self, key: FaultKey, error: RemoteError) {
        self.queued_faults
            .lock()
            .entry(key)
            .or_default()
            .push_back(error);
    }

    fn take_fault(&self, key: &FaultKey) -> Option<RemoteError> {
        if let Some(error) = self.sticky_faults.lock().get(key) {
            return Some(error.clone());
        }
        self.queued_faults
            .lock()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }

    fn resolve_alias(&self, id: &str) -> String {
        self.aliases
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }

    fn check_credential(&self, credential: &Credential) -> Result<()> {
        match self.required_credential.read().as_deref() {
            Some(required) if required != credential.bearer() => Err(RemoteError::Unauthorized(
                "credential rejected".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteTreeClient for MemoryTree {
    async fn list_page(
        &self,
        credential: &Credential,
        query: &ListQuery,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<NodePage> {
        let _in_flight = InFlight::enter(self);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.listed.lock().push(query.clone());
        self.simulate_latency().await;
        self.check_credential(credential)?;

        if let Some(error) = self.take_fault(&FaultKey::List(query.parent.clone())) {
            return Err(error);
        }
        if query.parent.is_none() && self.global_search_disabled.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable(
                "wide queries are not supported by this store".to_string(),
            ));
        }

        let parent = query.parent.as_deref().map(|id| self.resolve_alias(id));
        let mut matches = self
            .nodes
            .read()
            .values()
            .filter(|node| match &parent {
                Some(parent) => node.parent_ids.iter().any(|p| p == parent),
                None => true,
            })
            .filter(|node| query.accepts(node))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let offset = match page_token {
            Some(token) => token.parse::<usize>().map_err(|_| {
                RemoteError::Configuration(format!("invalid page token: {token}"))
            })?,
            None => 0,
        };
        let page_size = page_size.max(1) as usize;
        let end = (offset + page_size).min(matches.len());
        let nodes = matches.get(offset..end).map(<[Node]>::to_vec).unwrap_or_default();
        let next_page_token = (end < matches.len()).then(|| end.to_string());

        Ok(NodePage {
            nodes,
            next_page_token,
        })
    }

    async fn get_node(&self, credential: &Credential, id: &str) -> Result<Node> {
        let _in_flight = InFlight::enter(self);
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check_credential(credential)?;

        if let Some(error) = self.take_fault(&FaultKey::Get(id.to_string())) {
            return Err(error);
        }
        let id = self.resolve_alias(id);
        self.nodes
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("node {id}")))
    }
}
