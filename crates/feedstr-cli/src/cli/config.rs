use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use feedstr_core::constants::DEFAULT_RELAYS;
use feedstr_core::models::{Feed, FeedDefinition};
use feedstr_core::EngineConfig;
use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

/// CLI configuration that can be loaded from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Relay URLs to connect to
    pub relays: Vec<String>,

    /// User whose follows drive the feed (npub or hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,

    pub engine: EngineConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            relays: DEFAULT_RELAYS.iter().map(|r| r.to_string()).collect(),
            pubkey: None,
            engine: EngineConfig::default(),
        }
    }
}

impl CliConfig {
    /// `<config_dir>/feedstr/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("feedstr").join("config.json"))
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// An explicit path must exist; the default location is optional
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Command-line values win over the file
    pub fn apply_overrides(&mut self, pubkey: Option<String>, relays: Vec<String>) {
        if pubkey.is_some() {
            self.pubkey = pubkey;
        }
        if !relays.is_empty() {
            self.relays = relays;
        }
    }

    /// Configured pubkey as hex
    pub fn pubkey_hex(&self) -> Result<String> {
        let raw = self
            .pubkey
            .as_deref()
            .context("No pubkey configured (use --pubkey or set \"pubkey\" in the config file)")?;
        parse_pubkey(raw)
    }
}

/// Accept npub or hex and normalize to hex
pub fn parse_pubkey(value: &str) -> Result<String> {
    let pubkey = PublicKey::parse(value.trim()).with_context(|| format!("Invalid pubkey: {}", value))?;
    Ok(pubkey.to_hex())
}

/// Accept note1/nevent or hex event ids and normalize to hex
pub fn parse_event_id(value: &str) -> Result<String> {
    let id = EventId::parse(value.trim()).with_context(|| format!("Invalid event id: {}", value))?;
    Ok(id.to_hex())
}

/// Read a feed definition file (`{"version":1,"name":...,"rules":[...]}`).
/// The file stem becomes the feed id.
pub fn load_feed_file(path: &Path) -> Result<Feed> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feed file: {}", path.display()))?;
    let definition = FeedDefinition::from_json(&content)
        .with_context(|| format!("Failed to parse feed file: {}", path.display()))?;
    let id = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| definition.name.clone());
    let feed = definition.into_feed(id);
    feed.validate()
        .with_context(|| format!("Invalid feed in {}", path.display()))?;
    Ok(feed)
}
