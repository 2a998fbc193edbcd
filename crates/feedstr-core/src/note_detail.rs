//! Single-note fetches for a detail view: the note itself, its replies,
//! likes and reposts, and the profiles of everyone involved.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::classifier::is_like;
use crate::config::EngineConfig;
use crate::constants::kinds;
use crate::error::{FeedError, Result};
use crate::models::{display_name, Liker, Note, ProfileState, RawEvent};
use crate::nostr::{QueryFilter, RelayPool};
use crate::profile_resolver::ProfileResolver;

#[derive(Debug, Clone, Serialize)]
pub struct NoteDetail {
    /// Stats, likers and replies (oldest first) filled in
    pub note: Note,
    pub profiles: HashMap<String, ProfileState>,
}

impl NoteDetail {
    pub fn profile_state(&self, pubkey: &str) -> ProfileState {
        self.profiles
            .get(pubkey)
            .cloned()
            .unwrap_or(ProfileState::Unknown)
    }

    pub fn name_of(&self, pubkey: &str) -> String {
        display_name(pubkey, self.profiles.get(pubkey).and_then(ProfileState::profile))
    }

    pub fn replies(&self) -> &[Note] {
        self.note.replies.as_deref().unwrap_or_default()
    }
}

async fn fetch_note_event(pool: &dyn RelayPool, id: &str, timeout: Duration) -> Result<RawEvent> {
    match pool.fetch_by_id(id, timeout).await {
        Ok(Some(event)) if event.kind == kinds::TEXT_NOTE => Ok(event),
        Ok(_) => Err(FeedError::NoteNotFound { id: id.to_string() }),
        Err(e) => {
            warn!(id, "Note fetch failed: {}", e);
            Err(FeedError::NoteNotFound { id: id.to_string() })
        }
    }
}

/// The note alone, without stats or enrichment
pub async fn fetch_bare_note(pool: &dyn RelayPool, id: &str, config: &EngineConfig) -> Result<Note> {
    let event = fetch_note_event(pool, id, config.fetch_timeout()).await?;
    Ok(Note::bare(event))
}

async fn referencing(pool: &dyn RelayPool, kind: u16, id: &str, timeout: Duration) -> Vec<RawEvent> {
    let filter = QueryFilter::new().kinds([kind]).tag('e', vec![id.to_string()]);
    match pool.fetch_many(filter, timeout).await {
        Ok(events) => events,
        Err(e) => {
            debug!(id, kind, "Engagement fetch failed: {}", e);
            Vec::new()
        }
    }
}

/// Fetch a note with its replies, likes and reposts. Only a missing note is
/// an error; engagement and profile lookups degrade to empty or unknown.
pub async fn fetch_full_note(pool: Arc<dyn RelayPool>, id: &str, config: &EngineConfig) -> Result<NoteDetail> {
    let timeout = config.fetch_timeout();
    let event = fetch_note_event(pool.as_ref(), id, timeout).await?;
    let mut note = Note::bare(event);

    let (reply_events, reactions, reposts) = tokio::join!(
        referencing(pool.as_ref(), kinds::TEXT_NOTE, id, timeout),
        referencing(pool.as_ref(), kinds::REACTION, id, timeout),
        referencing(pool.as_ref(), kinds::REPOST, id, timeout),
    );

    let mut pager = ReplyPager::new(usize::MAX);
    pager.extend(reply_events.into_iter().filter(|e| e.id != note.id));
    let replies = pager.into_replies();

    let mut likers: Vec<String> = Vec::new();
    for reaction in reactions.iter().filter(|r| is_like(r)) {
        if !likers.contains(&reaction.pubkey) {
            likers.push(reaction.pubkey.clone());
        }
    }
    let repost_ids: HashSet<&str> = reposts.iter().map(|r| r.id.as_str()).collect();

    note.stats.reply_count = replies.len();
    note.stats.reaction_count = likers.len();
    note.stats.repost_count = repost_ids.len();
    note.liked_by = likers.iter().map(|pubkey| Liker { pubkey: pubkey.clone() }).collect();

    let resolver = ProfileResolver::new(pool.clone(), config.profile_timeout());
    let pubkeys = std::iter::once(note.author_pubkey.as_str())
        .chain(replies.iter().map(|r| r.author_pubkey.as_str()))
        .chain(likers.iter().map(String::as_str));
    let profiles = resolver.resolve_many(pubkeys).await;

    debug!(
        id,
        replies = replies.len(),
        likes = likers.len(),
        reposts = repost_ids.len(),
        "Fetched full note"
    );
    note.replies = Some(replies);
    Ok(NoteDetail { note, profiles })
}

/// Replies of one note, revealed a page at a time, oldest first
#[derive(Debug, Clone)]
pub struct ReplyPager {
    replies: Vec<Note>,
    seen: HashSet<String>,
    page_size: usize,
    visible: usize,
}

impl ReplyPager {
    pub fn new(page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            replies: Vec::new(),
            seen: HashSet::new(),
            page_size,
            visible: page_size,
        }
    }

    /// Add a reply event; duplicates and non-notes are ignored
    pub fn push(&mut self, event: RawEvent) -> bool {
        if self.seen.contains(&event.id) {
            return false;
        }
        let Some(note) = Note::from_event(event) else {
            return false;
        };
        self.seen.insert(note.id.clone());
        let at = self
            .replies
            .partition_point(|r| (r.created_at(), r.id.as_str()) <= (note.created_at(), note.id.as_str()));
        self.replies.insert(at, note);
        true
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = RawEvent>) {
        for event in events {
            self.push(event);
        }
    }

    pub fn total(&self) -> usize {
        self.replies.len()
    }

    pub fn visible(&self) -> &[Note] {
        &self.replies[..self.visible.min(self.replies.len())]
    }

    pub fn has_more(&self) -> bool {
        self.visible < self.replies.len()
    }

    /// Reveal the next page. Returns how many replies became visible.
    pub fn load_more(&mut self) -> usize {
        let before = self.visible().len();
        self.visible = self.visible.saturating_add(self.page_size);
        self.visible().len() - before
    }

    pub fn into_replies(self) -> Vec<Note> {
        self.replies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nostr::mock::MockRelayPool;

    fn reply(id: &str, pubkey: &str, created_at: u64) -> RawEvent {
        RawEvent::new(id, kinds::TEXT_NOTE, pubkey, created_at).with_tag(["e", "n1", "", "reply"])
    }

    fn pool() -> Arc<MockRelayPool> {
        Arc::new(MockRelayPool::with_events([
            RawEvent::new("n1", kinds::TEXT_NOTE, "A", 100),
            RawEvent::new("meta-a", kinds::METADATA, "A", 1).with_content(r#"{"name":"alice"}"#),
            reply("c2", "B", 300),
            reply("c1", "C", 200),
            RawEvent::new("r1", kinds::REACTION, "B", 150)
                .with_tag(["e", "n1"])
                .with_content("+"),
            RawEvent::new("r2", kinds::REACTION, "B", 160)
                .with_tag(["e", "n1"])
                .with_content("🔥"),
            RawEvent::new("r3", kinds::REACTION, "D", 170)
                .with_tag(["e", "n1"])
                .with_content("-"),
            RawEvent::new("s1", kinds::REPOST, "D", 180).with_tag(["e", "n1"]),
        ]))
    }

    #[tokio::test]
    async fn test_full_note_collects_engagement() {
        let pool = pool();
        let detail = fetch_full_note(pool, "n1", &EngineConfig::default()).await.unwrap();

        assert_eq!(detail.note.stats.reply_count, 2);
        assert_eq!(detail.note.stats.reaction_count, 1);
        assert_eq!(detail.note.stats.repost_count, 1);
        assert_eq!(detail.note.liked_by, vec![Liker { pubkey: "B".into() }]);

        let replies: Vec<&str> = detail.replies().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(replies, vec!["c1", "c2"]);

        assert_eq!(detail.name_of("A"), "alice");
        assert_eq!(detail.profile_state("B"), ProfileState::Unknown);
    }

    #[tokio::test]
    async fn test_missing_note_is_not_found() {
        let pool = pool();
        let err = fetch_full_note(pool.clone(), "missing", &EngineConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FeedError::NoteNotFound { ref id } if id == "missing"));

        let bare = fetch_bare_note(pool.as_ref(), "n1", &EngineConfig::default()).await.unwrap();
        assert!(bare.replies.is_none());
        assert_eq!(bare.stats.reply_count, 0);
    }

    #[test]
    fn test_reply_pager_pages_and_dedups() {
        let mut pager = ReplyPager::new(2);
        pager.extend([reply("c3", "A", 30), reply("c1", "A", 10), reply("c2", "A", 20)]);
        assert!(!pager.push(reply("c1", "A", 10)));
        assert_eq!(pager.total(), 3);

        let visible: Vec<&str> = pager.visible().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(visible, vec!["c1", "c2"]);
        assert!(pager.has_more());

        assert_eq!(pager.load_more(), 1);
        assert!(!pager.has_more());
        assert_eq!(pager.load_more(), 0);
    }
}
