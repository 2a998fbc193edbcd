use std::collections::BTreeMap;

use nostr_sdk::prelude::*;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::FeedError;
use crate::models::RawEvent;

/// Relay query in NIP-01 shape, with ids and pubkeys kept as strings until
/// the query reaches a concrete relay client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    pub kinds: Vec<u16>,
    pub authors: Option<Vec<String>>,
    pub ids: Option<Vec<String>>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<usize>,
    /// Single-letter tag queries, e.g. `'t' -> ["image"]` for `"#t"`
    pub tags: BTreeMap<char, Vec<String>>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn authors(mut self, authors: Option<Vec<String>>) -> Self {
        self.authors = authors;
        self
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn since(mut self, since: Option<u64>) -> Self {
        self.since = since;
        self
    }

    pub fn until(mut self, until: Option<u64>) -> Self {
        self.until = until;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn tag(mut self, letter: char, values: Vec<String>) -> Self {
        self.tags.insert(letter, values);
        self
    }

    /// Client-side evaluation of the filter, used where events come from a
    /// source that did not apply it (local caches, tests).
    pub fn matches(&self, event: &RawEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }

        for (letter, values) in &self.tags {
            if values.is_empty() {
                continue;
            }
            let name = letter.to_string();
            let found = event.tags.iter().any(|t| {
                t.first() == Some(&name) && t.get(1).is_some_and(|v| values.contains(v))
            });
            if !found {
                return false;
            }
        }

        true
    }

    /// Convert into an SDK filter. Fails if an id or pubkey is not valid
    /// hex/bech32.
    pub fn to_nostr(&self) -> Result<Filter, FeedError> {
        let mut filter = Filter::new().kinds(self.kinds.iter().map(|k| Kind::from(*k)));

        if let Some(authors) = &self.authors {
            let mut keys = Vec::with_capacity(authors.len());
            for author in authors {
                keys.push(PublicKey::parse(author).map_err(invalid_filter)?);
            }
            filter = filter.authors(keys);
        }
        if let Some(ids) = &self.ids {
            let mut event_ids = Vec::with_capacity(ids.len());
            for id in ids {
                event_ids.push(EventId::parse(id).map_err(invalid_filter)?);
            }
            filter = filter.ids(event_ids);
        }
        if let Some(since) = self.since {
            filter = filter.since(Timestamp::from(since));
        }
        if let Some(until) = self.until {
            filter = filter.until(Timestamp::from(until));
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }
        for (letter, values) in &self.tags {
            let tag = SingleLetterTag::from_char(*letter).map_err(invalid_filter)?;
            filter = filter.custom_tags(tag, values.iter().cloned());
        }

        Ok(filter)
    }
}

fn invalid_filter(err: impl std::fmt::Display) -> FeedError {
    FeedError::InvalidFilter {
        message: err.to_string(),
    }
}

impl Serialize for QueryFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kinds", &self.kinds)?;
        if let Some(authors) = &self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(ids) = &self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(since) = self.since {
            map.serialize_entry("since", &since)?;
        }
        if let Some(until) = self.until {
            map.serialize_entry("until", &until)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        for (letter, values) in &self.tags {
            map.serialize_entry(&format!("#{}", letter), values)?;
        }
        map.end()
    }
}
