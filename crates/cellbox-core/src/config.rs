//! Configuration for the sandbox service.
//!
//! Every field carries a default so a minimal (or empty) document works out
//! of the box; deployments override only what they need.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::prompt_log::DEFAULT_MAX_ENTRIES;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Wall-clock bound on a single isolate invocation.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Container image the Docker runtime executes modules under.
    #[serde(default = "default_image")]
    pub image: String,
    /// Environment baseline declared to every isolate.
    #[serde(default)]
    pub environment: HashMap<String, String>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            image: default_image(),
            environment: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// File the prompt history persists to; `None` keeps it in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Retained entries; the oldest are dropped beyond this bound.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: default_max_entries(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_image() -> String {
    "node:18-slim".to_string()
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}
