use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, Result};

pub const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

const DEFAULT_MAX_DEPTH: usize = 16;
const DEFAULT_NAIVE_MAX_DEPTH: usize = 8;
const DEFAULT_BATCH_SIZE: usize = 8;
const DEFAULT_CONCURRENCY_LIMIT: usize = 8;
const DEFAULT_MAX_IN_FLIGHT: usize = 16;
const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_PAGES_PER_LISTING: usize = 1000;
const DEFAULT_RECREDENTIAL_WAIT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Root used when a caller does not name one.
    pub default_root: String,
    /// Depth bound for the folder index (root = 0).
    pub max_depth: usize,
    /// Depth bound for the last-resort recursive strategy.
    pub naive_max_depth: usize,
    /// Frontier entries listed concurrently per BFS round.
    pub batch_size: usize,
    /// Per-request fan-out for folder queries.
    pub concurrency_limit: usize,
    /// Engine-wide ceiling on outstanding remote calls.
    pub max_in_flight: usize,
    pub page_size: u32,
    pub max_pages_per_listing: usize,
    pub recredential_wait_secs: u64,
    pub api_base_url: String,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    pub max_transient_retries: u32,
    pub max_rate_limit_retries: u32,
    pub max_recredentials: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub call_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_root: "root".to_string(),
            max_depth: DEFAULT_MAX_DEPTH,
            naive_max_depth: DEFAULT_NAIVE_MAX_DEPTH,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages_per_listing: DEFAULT_MAX_PAGES_PER_LISTING,
            recredential_wait_secs: DEFAULT_RECREDENTIAL_WAIT_SECS,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: 3,
            max_rate_limit_retries: 5,
            max_recredentials: 2,
            base_backoff_ms: 200,
            max_backoff_ms: 10_000,
            call_timeout_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff for the given zero-based attempt, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        let millis = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|error| {
            RemoteError::Configuration(format!(
                "failed to read config {}: {error}",
                path.display()
            ))
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|error| {
            RemoteError::Configuration(format!(
                "failed to parse config {}: {error}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `REMOTEFS_*` environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        self.max_depth = read_depth("REMOTEFS_MAX_DEPTH", self.max_depth);
        self.naive_max_depth = read_depth("REMOTEFS_NAIVE_MAX_DEPTH", self.naive_max_depth);
        self.batch_size = read_limit("REMOTEFS_BATCH_SIZE", self.batch_size);
        self.concurrency_limit = read_limit("REMOTEFS_CONCURRENCY_LIMIT", self.concurrency_limit);
        self.max_in_flight = read_limit("REMOTEFS_MAX_IN_FLIGHT", self.max_in_flight);
        self.page_size = read_limit("REMOTEFS_PAGE_SIZE", self.page_size as usize)
            .try_into()
            .unwrap_or(self.page_size);
        if let Some(root) = read_string("REMOTEFS_DEFAULT_ROOT") {
            self.default_root = root;
        }
        if let Some(url) = read_string("REMOTEFS_API_BASE_URL") {
            self.api_base_url = url;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("batchSize", self.batch_size),
            ("concurrencyLimit", self.concurrency_limit),
            ("maxInFlight", self.max_in_flight),
            ("pageSize", self.page_size as usize),
            ("maxPagesPerListing", self.max_pages_per_listing),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(RemoteError::Configuration(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        if self.default_root.trim().is_empty() {
            return Err(RemoteError::Configuration(
                "defaultRoot must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn recredential_wait(&self) -> Duration {
        Duration::from_secs(self.recredential_wait_secs)
    }
}

/// Depths may be zero: a zero-depth search only looks at the root's children.
fn read_depth(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn read_limit(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
