//! Scheduler configuration
//!
//! Loaded from a JSON file, with environment variable overrides for the
//! budgets operators tune most often.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable overriding `maxConcurrency`
pub const ENV_MAX_CONCURRENCY: &str = "FLOW_MAX_CONCURRENCY";
/// Environment variable overriding `runTimeoutMs`
pub const ENV_RUN_TIMEOUT_MS: &str = "FLOW_RUN_TIMEOUT_MS";
/// Environment variable overriding `nodeTimeoutMs`
pub const ENV_NODE_TIMEOUT_MS: &str = "FLOW_NODE_TIMEOUT_MS";

fn default_max_concurrency() -> usize {
    1
}

/// Limits applied to every run a scheduler starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Nodes that may execute at the same time
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Wall-clock budget for a whole run
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
    /// Budget for a single executor invocation
    #[serde(default)]
    pub node_timeout_ms: Option<u64>,
    /// Reject runs with more than one starting node
    #[serde(default)]
    pub require_single_starting_node: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            run_timeout_ms: None,
            node_timeout_ms: None,
            require_single_starting_node: false,
        }
    }
}

impl SchedulerConfig {
    /// Read a config file; fields missing from the file keep their defaults
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&raw)?;
        log::debug!("Loaded scheduler config from {}", path.display());
        Ok(config)
    }

    /// Apply `FLOW_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// Values that do not parse are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = parse_var(&lookup, ENV_MAX_CONCURRENCY) {
            self.max_concurrency = value as usize;
        }
        if let Some(value) = parse_var(&lookup, ENV_RUN_TIMEOUT_MS) {
            self.run_timeout_ms = Some(value);
        }
        if let Some(value) = parse_var(&lookup, ENV_NODE_TIMEOUT_MS) {
            self.node_timeout_ms = Some(value);
        }
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_single_starting_node(mut self) -> Self {
        self.require_single_starting_node = true;
        self
    }

    /// Concurrency limit, never below one
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.max(1)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        self.node_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring {}={:?}: {}", key, raw, e);
            None
        }
    }
}
