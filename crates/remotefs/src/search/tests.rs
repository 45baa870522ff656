use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::ancestry::AncestryResolver;
use crate::cache::{IndexKey, SessionCaches};
use crate::cancel::CancellationToken;
use crate::client::memory::MemoryTree;
use crate::client::{RemoteCaller, RequestContext};
use crate::config::EngineConfig;
use crate::credential::testing::PushingHook;
use crate::credential::{Credential, CredentialChannel};
use crate::error::RemoteError;
use crate::types::{SearchOutcome, SearchRequest, Strategy};

/// top ─┬─ r (R) ─┬─ a (A) ── x.pdf
///      │         └─ b (B) ── report-x.pdf
///      └─ c (C) ── x.pdf
fn scenario_tree() -> Arc<MemoryTree> {
    let tree = MemoryTree::new("top");
    tree.add_folder("r", "R", "top");
    tree.add_folder("a", "A", "r");
    tree.add_leaf("x", "x.pdf", "a");
    tree.add_folder("b", "B", "r");
    tree.add_leaf("rx", "report-x.pdf", "b");
    tree.add_folder("c", "C", "top");
    tree.add_leaf("cx", "x.pdf", "c");
    Arc::new(tree)
}

fn quick_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.retry.max_transient_retries = 0;
    config.retry.base_backoff_ms = 1;
    config.retry.max_backoff_ms = 5;
    config
}

struct Harness {
    tree: Arc<MemoryTree>,
    caller: RemoteCaller,
    caches: SessionCaches,
    coordinator: SearchCoordinator,
}

fn harness(tree: Arc<MemoryTree>, config: EngineConfig) -> Harness {
    let caller = RemoteCaller::new(tree.clone(), &config);
    let caches = SessionCaches::new();
    let coordinator = SearchCoordinator::new(caller.clone(), &caches, &config);
    Harness {
        tree,
        caller,
        caches,
        coordinator,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new(CredentialChannel::fixed(Credential::new("t")))
}

fn request(query: &str, root_id: &str) -> SearchRequest {
    SearchRequest {
        query: query.to_string(),
        root_id: root_id.to_string(),
        max_depth: 16,
        concurrency_limit: 4,
        max_results: None,
    }
}

fn paths(outcome: &SearchOutcome) -> Vec<&str> {
    outcome
        .hits
        .iter()
        .map(|hit| hit.resolved_path.as_str())
        .collect()
}

fn ids(outcome: &SearchOutcome) -> BTreeSet<String> {
    outcome.hits.iter().map(|hit| hit.node.id.clone()).collect()
}

#[tokio::test]
async fn global_search_filters_by_ancestry() {
    let h = harness(scenario_tree(), quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Global);
    assert_eq!(paths(&outcome), ["/A/x.pdf", "/B/report-x.pdf"]);
    assert!(outcome.fallbacks.is_empty());
    assert!(outcome.fully_explored);
    assert_eq!(outcome.count, 2);

    let ancestry = AncestryResolver::new(h.caller.clone(), h.caches.ancestry.clone());
    for hit in &outcome.hits {
        assert!(ancestry.is_descendant(&ctx(), &hit.node.id, "r").await.unwrap());
    }
}

#[tokio::test]
async fn global_failure_falls_back_to_index() {
    let tree = scenario_tree();
    tree.fail_global_always(RemoteError::Transient("wide query down".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Indexed);
    assert_eq!(paths(&outcome), ["/A/x.pdf", "/B/report-x.pdf"]);
    assert_eq!(outcome.fallbacks.len(), 1);
    assert_eq!(outcome.fallbacks[0].strategy, Strategy::Global);
}

#[tokio::test]
async fn index_failure_falls_back_to_naive() {
    let tree = scenario_tree();
    tree.disable_global_search();
    // consumed by the index build's root listing
    tree.fail_list("r", RemoteError::Transient("blip".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Naive);
    assert_eq!(paths(&outcome), ["/A/x.pdf", "/B/report-x.pdf"]);
    let failed = outcome
        .fallbacks
        .iter()
        .map(|failure| failure.strategy)
        .collect::<Vec<_>>();
    assert_eq!(failed, [Strategy::Global, Strategy::Indexed]);
    assert!(h
        .caches
        .indexes
        .get(&IndexKey {
            root_id: "r".to_string(),
            max_depth: 16,
        })
        .is_none());
}

#[tokio::test]
async fn every_strategy_failing_is_unavailable() {
    let tree = scenario_tree();
    tree.disable_global_search();
    tree.fail_list_always("r", RemoteError::Transient("down".to_string()));
    let h = harness(tree, quick_config());
    let result = h.coordinator.search(&ctx(), &request("x", "r")).await;
    assert!(matches!(result, Err(RemoteError::Unavailable(_))));
}

#[tokio::test]
async fn empty_global_result_is_trusted() {
    let h = harness(scenario_tree(), quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("zzz", "r")).await.unwrap();
    assert_eq!(outcome.strategy, Strategy::Global);
    assert!(outcome.hits.is_empty());
    assert!(outcome.fallbacks.is_empty());
}

#[tokio::test]
async fn repeated_search_returns_same_nodes_and_reuses_index() {
    let tree = scenario_tree();
    tree.disable_global_search();
    let h = harness(tree, quick_config());
    let key = IndexKey {
        root_id: "r".to_string(),
        max_depth: 16,
    };

    let first = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();
    let index = h.caches.indexes.get(&key).unwrap();
    let second = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(ids(&first), ids(&second));
    assert!(Arc::ptr_eq(&index, &h.caches.indexes.get(&key).unwrap()));
}

#[tokio::test]
async fn indexed_search_respects_depth_bound() {
    // r ── a (depth 1) ── a2 (depth 2) ── deep-x.pdf
    let tree = MemoryTree::new("top");
    tree.add_folder("r", "R", "top");
    tree.add_folder("a", "A", "r");
    tree.add_leaf("ax", "a-x.txt", "a");
    tree.add_folder("a2", "A2", "a");
    tree.add_leaf("deep", "deep-x.pdf", "a2");
    tree.add_folder("a3", "A3", "a2");
    tree.disable_global_search();
    let h = harness(Arc::new(tree), quick_config());

    let mut req = request("x", "r");
    req.max_depth = 1;
    let outcome = h.coordinator.search(&ctx(), &req).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Indexed);
    assert_eq!(paths(&outcome), ["/A/a-x.txt"]);
    assert!(!h.tree.listed_parents().contains(&Some("a2".to_string())));
    assert!(!outcome.fully_explored);

    let index = h
        .caches
        .indexes
        .get(&IndexKey {
            root_id: "r".to_string(),
            max_depth: 1,
        })
        .unwrap();
    assert!(index.folders().all(|entry| entry.depth <= 1));
}

#[tokio::test]
async fn transient_folder_failure_keeps_siblings() {
    let tree = scenario_tree();
    tree.disable_global_search();
    tree.fail_list("b", RemoteError::Transient("blip".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Indexed);
    assert!(paths(&outcome).contains(&"/A/x.pdf"));
    assert!(!outcome.fully_explored);
}

#[tokio::test]
async fn one_failed_folder_drops_only_its_matches() {
    let tree = scenario_tree();
    tree.disable_global_search();
    tree.fail_list_always("b", RemoteError::Transient("down".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Indexed);
    assert_eq!(paths(&outcome), ["/A/x.pdf"]);
    assert_eq!(outcome.diagnostics.failed_folders, vec!["b".to_string()]);
}

#[tokio::test]
async fn unknown_ancestry_is_reported_not_returned() {
    let tree = scenario_tree();
    tree.fail_get("a", RemoteError::Transient("blip".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(paths(&outcome), ["/B/report-x.pdf"]);
    assert_eq!(outcome.diagnostics.unresolved_candidates, 1);
    assert!(!outcome.fully_explored);

    let again = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();
    assert_eq!(paths(&again), ["/A/x.pdf", "/B/report-x.pdf"]);
}

#[tokio::test]
async fn fatal_path_failure_fails_global_search() {
    let tree = scenario_tree();
    tree.fail_get_always("a", RemoteError::CredentialExhausted("gone".to_string()));
    let h = harness(tree, quick_config());
    // ancestry already known, so only path resolution touches `a`
    h.caches.ancestry.insert_first("x", "r", true);

    let result = h.coordinator.search(&ctx(), &request("x", "r")).await;
    assert!(matches!(result, Err(RemoteError::CredentialExhausted(_))));
}

#[tokio::test]
async fn page_ceiling_marks_outcome_incomplete() {
    let tree = MemoryTree::new("top");
    tree.add_folder("r", "R", "top");
    tree.add_folder("a", "A", "r");
    for i in 0..5 {
        tree.add_leaf(&format!("x{i}"), &format!("x{i}.txt"), "a");
    }
    let config = EngineConfig {
        page_size: 1,
        max_pages_per_listing: 2,
        ..quick_config()
    };
    let h = harness(Arc::new(tree), config);
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Global);
    assert_eq!(outcome.count, 2);
    assert_eq!(outcome.diagnostics.truncated_listings, 1);
    assert!(!outcome.fully_explored);
}

/// top ─┬─ r (R) ── a (A) ── a-x.txt
///      └─ c (C) ─┬─ s (S, also under a) ── s-x.txt
///                └─ c-x.txt (also under a)
fn secondary_parent_tree() -> Arc<MemoryTree> {
    let tree = MemoryTree::new("top");
    tree.add_folder("r", "R", "top");
    tree.add_folder("a", "A", "r");
    tree.add_leaf("ax", "a-x.txt", "a");
    tree.add_folder("c", "C", "top");
    tree.add_folder("s", "S", "c");
    tree.add_parent("s", "a");
    tree.add_leaf("sx", "s-x.txt", "s");
    tree.add_leaf("cx", "c-x.txt", "c");
    tree.add_parent("cx", "a");
    tree.disable_global_search();
    Arc::new(tree)
}

async fn assert_only_descendants(h: &Harness, outcome: &SearchOutcome) {
    assert_eq!(ids(outcome), BTreeSet::from(["ax".to_string()]));
    let ancestry = AncestryResolver::new(h.caller.clone(), h.caches.ancestry.clone());
    for hit in &outcome.hits {
        assert!(ancestry.is_descendant(&ctx(), &hit.node.id, "r").await.unwrap());
    }
}

#[tokio::test]
async fn indexed_search_ignores_secondary_parents() {
    let h = harness(secondary_parent_tree(), quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Indexed);
    assert_only_descendants(&h, &outcome).await;
    assert!(!h.tree.listed_parents().contains(&Some("s".to_string())));
}

#[tokio::test]
async fn naive_search_ignores_secondary_parents() {
    let tree = secondary_parent_tree();
    tree.fail_list("r", RemoteError::Transient("blip".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Naive);
    assert_only_descendants(&h, &outcome).await;
    assert!(!h.tree.listed_parents().contains(&Some("s".to_string())));
}

#[tokio::test]
async fn naive_search_visits_shared_folders_once() {
    let tree = scenario_tree();
    tree.add_folder("s", "Shared", "a");
    tree.add_parent("s", "b");
    tree.add_leaf("sx", "shared-x.doc", "s");
    tree.disable_global_search();
    tree.fail_list("r", RemoteError::Transient("blip".to_string()));
    let h = harness(tree, quick_config());
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Naive);
    let expected = ["rx", "sx", "x"].map(String::from);
    assert_eq!(ids(&outcome), BTreeSet::from(expected));
    let shared_listings = h
        .tree
        .listed_parents()
        .into_iter()
        .filter(|parent| parent.as_deref() == Some("s"))
        .count();
    assert_eq!(shared_listings, 3);
}

#[tokio::test]
async fn naive_search_stops_at_its_depth_bound() {
    let tree = MemoryTree::new("top");
    tree.add_folder("r", "R", "top");
    tree.add_folder("a", "A", "r");
    tree.add_folder("a2", "A2", "a");
    tree.add_leaf("deep", "deep-x.pdf", "a2");
    tree.add_leaf("ax", "a-x.txt", "a");
    tree.disable_global_search();
    tree.fail_list("r", RemoteError::Transient("blip".to_string()));
    let config = EngineConfig {
        naive_max_depth: 1,
        ..quick_config()
    };
    let h = harness(Arc::new(tree), config);
    let outcome = h.coordinator.search(&ctx(), &request("x", "r")).await.unwrap();

    assert_eq!(outcome.strategy, Strategy::Naive);
    assert_eq!(paths(&outcome), ["/A/a-x.txt"]);
    assert!(!h.tree.listed_parents().contains(&Some("a2".to_string())));
    assert_eq!(outcome.diagnostics.depth_limited_folders, 1);
}

#[tokio::test]
async fn unauthorized_mid_search_recredentials_once() {
    let tree = scenario_tree();
    tree.require_credential("fresh");
    let h = harness(tree, quick_config());
    let (credentials, hook) = PushingHook::channel("stale", &["fresh"]);
    let ctx = RequestContext::new(credentials);

    let outcome = h.coordinator.search(&ctx, &request("x", "r")).await.unwrap();
    assert_eq!(paths(&outcome), ["/A/x.pdf", "/B/report-x.pdf"]);
    assert_eq!(hook.request_count(), 1);
}

#[tokio::test]
async fn exhausted_recredential_fails_search() {
    let tree = scenario_tree();
    tree.require_credential("fresh");
    let h = harness(tree, quick_config());
    let (credentials, _hook) = PushingHook::channel("stale", &[]);
    let ctx = RequestContext::new(credentials);

    let result = h.coordinator.search(&ctx, &request("x", "r")).await;
    assert!(matches!(result, Err(RemoteError::CredentialExhausted(_))));
}

#[tokio::test]
async fn cancelled_search_leaves_caches_usable() {
    let tree = scenario_tree();
    tree.set_latency(Duration::from_millis(10));
    let h = harness(tree, quick_config());
    let cancel = CancellationToken::new();
    let cancelled = RequestContext::with_cancel(
        CredentialChannel::fixed(Credential::new("t")),
        cancel.clone(),
    );

    let req = request("x", "r");
    let (result, _) = tokio::join!(h.coordinator.search(&cancelled, &req), async {
        tokio::time::sleep(Duration::from_millis(15)).await;
        cancel.cancel();
    });
    assert!(matches!(result, Err(RemoteError::Cancelled)));

    let outcome = h.coordinator.search(&ctx(), &req).await.unwrap();
    assert_eq!(paths(&outcome), ["/A/x.pdf", "/B/report-x.pdf"]);
}

#[tokio::test]
async fn in_flight_calls_respect_ceiling() {
    let tree = scenario_tree();
    for i in 0..6 {
        let id = format!("f{i}");
        tree.add_folder(&id, &format!("F{i}"), "r");
        tree.add_leaf(&format!("{id}-x"), "x.txt", &id);
    }
    tree.disable_global_search();
    tree.set_latency(Duration::from_millis(2));
    let config = EngineConfig {
        max_in_flight: 2,
        ..quick_config()
    };
    let h = harness(tree, config);
    let mut req = request("x", "r");
    req.concurrency_limit = 8;

    let outcome = h.coordinator.search(&ctx(), &req).await.unwrap();
    assert_eq!(outcome.count, 8);
    assert!(h.tree.max_in_flight() <= 2);
}

#[tokio::test]
async fn max_results_truncates() {
    let h = harness(scenario_tree(), quick_config());
    let mut req = request("x", "r");
    req.max_results = Some(1);
    let outcome = h.coordinator.search(&ctx(), &req).await.unwrap();
    assert_eq!(paths(&outcome), ["/A/x.pdf"]);
    assert!(outcome.diagnostics.truncated);
    assert!(!outcome.fully_explored);
}

#[tokio::test]
async fn configuration_errors_are_fatal() {
    let tree = scenario_tree();
    let h = harness(tree, quick_config());

    let empty = h.coordinator.search(&ctx(), &request("  ", "r")).await;
    assert!(matches!(empty, Err(RemoteError::Configuration(_))));

    let missing = h.coordinator.search(&ctx(), &request("x", "nope")).await;
    assert!(matches!(missing, Err(RemoteError::Configuration(_))));

    let leaf = h.coordinator.search(&ctx(), &request("x", "x")).await;
    assert!(matches!(leaf, Err(RemoteError::Configuration(_))));
    assert_eq!(h.tree.list_calls(), 0);
}
