use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

/// A relay event as the feed engine sees it: ids and pubkeys as hex strings,
/// tags as ordered string lists. Signatures are verified by the relay client
/// before an event is converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub kind: u16,
    pub pubkey: String,
    pub created_at: u64,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
}

impl RawEvent {
    pub fn new(
        id: impl Into<String>,
        kind: u16,
        pubkey: impl Into<String>,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            pubkey: pubkey.into(),
            created_at,
            tags: Vec::new(),
            content: String::new(),
        }
    }

    pub fn with_tag<I, S>(mut self, tag: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.push(tag.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

impl From<&Event> for RawEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.to_hex(),
            kind: event.kind.as_u16(),
            pubkey: event.pubkey.to_hex(),
            created_at: event.created_at.as_u64(),
            tags: event.tags.iter().map(|t| t.as_slice().to_vec()).collect(),
            content: event.content.clone(),
        }
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        Self::from(&event)
    }
}
