use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use feedstr_core::models::{Feed, ProfileState};
use feedstr_core::nostr::RelayPool;
use feedstr_core::note_detail::{fetch_bare_note, fetch_full_note};
use feedstr_core::persistence::load_feeds;
use feedstr_core::thread::ThreadResolver;
use feedstr_core::{FeedEngine, Identity};
use serde::Serialize;
use tracing::{info, warn};

use super::config::{parse_event_id, CliConfig};
use super::render;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

fn emit<T: Serialize + ?Sized>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).context("Failed to serialize output"),
        OutputFormat::Text => Ok(text()),
    }
}

/// Load `pages` pages of `feed` for the configured user
pub async fn run_feed(
    pool: Arc<dyn RelayPool>,
    config: &CliConfig,
    feed: Feed,
    pages: usize,
    format: OutputFormat,
) -> Result<String> {
    let pubkey = config.pubkey_hex()?;
    let identity = Identity::load(pool.clone(), &pubkey, config.engine.fetch_timeout())
        .await
        .context("Failed to load follow list")?;

    let page_timeout = config.engine.eose_timeout() + config.engine.fetch_timeout();
    let mut engine = FeedEngine::new(pool, config.engine.clone());
    engine.set_identity(Some(identity)).await;
    engine.set_feed(feed).await;

    for page in 0..pages.max(1) {
        if page > 0 {
            if !engine.has_more() {
                info!(page, "No more history");
                break;
            }
            engine.load_more();
        }
        if !engine.wait_until_settled(page_timeout).await {
            warn!(page, "Page did not settle in time, showing partial results");
            break;
        }
        info!(page, notes = engine.store().len(), until = ?engine.until(), "Page loaded");
    }

    // profiles are best effort; give pending lookups one timeout to land
    let profile_wait = tokio::time::timeout(config.engine.profile_timeout() + Duration::from_millis(500), async {
        while engine
            .notes()
            .iter()
            .any(|item| item.author == ProfileState::Pending)
        {
            engine.next_change().await;
        }
    })
    .await;
    if profile_wait.is_err() {
        warn!("Some profiles are still pending");
    }

    let items = engine.notes();
    emit(format, &items, || render::render_feed(&items))
}

/// List the configured user's saved feeds
pub async fn run_feeds(pool: Arc<dyn RelayPool>, config: &CliConfig, format: OutputFormat) -> Result<String> {
    let pubkey = config.pubkey_hex()?;
    let feeds = load_feeds(pool.as_ref(), &pubkey, config.engine.fetch_timeout())
        .await
        .context("Failed to load saved feeds")?;
    emit(format, &feeds, || render::render_feed_list(&feeds))
}

/// Print the ancestor chain of a note
pub async fn run_thread(
    pool: Arc<dyn RelayPool>,
    config: &CliConfig,
    note_id: &str,
    format: OutputFormat,
) -> Result<String> {
    let id = parse_event_id(note_id)?;
    let resolver = ThreadResolver::new(pool.clone(), config.engine.fetch_timeout(), config.engine.max_thread_depth);
    let view = resolver.load_view(&id).await;
    let note = fetch_bare_note(pool.as_ref(), &id, &config.engine).await.ok();
    emit(format, &view, || render::render_thread(&view, note.as_ref()))
}

/// Print a note with its replies, likes and reposts
pub async fn run_note(
    pool: Arc<dyn RelayPool>,
    config: &CliConfig,
    note_id: &str,
    format: OutputFormat,
) -> Result<String> {
    let id = parse_event_id(note_id)?;
    let detail = fetch_full_note(pool, &id, &config.engine).await?;
    emit(format, &detail, || render::render_detail(&detail))
}
