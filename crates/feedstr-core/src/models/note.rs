use serde::Serialize;

use super::RawEvent;
use crate::constants::kinds;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NoteStats {
    pub reply_count: usize,
    pub reaction_count: usize,
    pub repost_count: usize,
}

/// Someone who liked a note. The profile is looked up by pubkey in the
/// store's profile cache, never copied here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liker {
    pub pubkey: String,
}

/// A text note in the aggregated feed, identified by its event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: String,
    pub event: RawEvent,
    pub author_pubkey: String,
    pub stats: NoteStats,
    pub liked_by: Vec<Liker>,
    /// Only populated on the note detail surface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<Note>>,
}

impl Note {
    /// Create a Note from a kind:1 event. Other kinds are not notes.
    pub fn from_event(event: RawEvent) -> Option<Self> {
        if event.kind != kinds::TEXT_NOTE {
            return None;
        }
        Some(Self::bare(event))
    }

    /// Wrap any event without stats or enrichment (thread ancestors).
    pub fn bare(event: RawEvent) -> Self {
        Self {
            id: event.id.clone(),
            author_pubkey: event.pubkey.clone(),
            event,
            stats: NoteStats::default(),
            liked_by: Vec::new(),
            replies: None,
        }
    }

    pub fn created_at(&self) -> u64 {
        self.event.created_at
    }

    pub fn content(&self) -> &str {
        &self.event.content
    }

    pub fn is_liked_by(&self, pubkey: &str) -> bool {
        self.liked_by.iter().any(|l| l.pubkey == pubkey)
    }
}
