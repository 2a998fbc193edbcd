use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::MAX_THREAD_DEPTH;

/// Tunables for the feed engine and its network lookups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Events requested per rule query per page
    pub batch_size: usize,
    /// Upper bound for a secondary profile lookup
    pub profile_timeout_ms: u64,
    /// Upper bound for primary content lookups (notes by id, stats)
    pub fetch_timeout_ms: u64,
    /// Subscriptions that never report end-of-stored-events are treated as
    /// complete after this long
    pub eose_timeout_ms: u64,
    pub max_thread_depth: usize,
    /// Replies shown per page on the note detail surface
    pub reply_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            profile_timeout_ms: 3_000,
            fetch_timeout_ms: 8_000,
            eose_timeout_ms: 10_000,
            max_thread_depth: MAX_THREAD_DEPTH,
            reply_page_size: 8,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse engine config: {}", path.display()))
    }

    pub fn profile_timeout(&self) -> Duration {
        Duration::from_millis(self.profile_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn eose_timeout(&self) -> Duration {
        Duration::from_millis(self.eose_timeout_ms)
    }
}
