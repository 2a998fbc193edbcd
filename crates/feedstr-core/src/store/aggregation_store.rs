use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use super::views::{FeedItem, LikerView};
use crate::classifier::{is_reply, reply_parent};
use crate::compiler::calculate_trending_score;
use crate::models::{Liker, Note, Profile, ProfileState, RawEvent};

/// Merged view of everything the active feed's subscriptions delivered.
///
/// Notes are keyed by event id and only ever upserted. Engagement that
/// arrives before its target (likes, replies) is parked in multimaps and
/// attached when the target note shows up. Profiles live in one cache keyed
/// by pubkey; notes and likers hold only the pubkey and are joined with the
/// cache when a snapshot is taken.
#[derive(Debug, Default)]
pub struct AggregationStore {
    generation: u64,
    notes: HashMap<String, Note>,
    profiles: HashMap<String, ProfileState>,
    // target note id -> liker pubkeys, in arrival order
    likers_by_target: HashMap<String, Vec<String>>,
    // parent note id -> reply note ids
    replies_by_parent: HashMap<String, HashSet<String>>,
    // reaction and repost event ids already applied
    seen_engagement: HashSet<String>,
}

/// Canonical feed order: newest first, id ascending on ties
fn canonical_order(a: &Note, b: &Note) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| a.id.cmp(&b.id))
}

impl AggregationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incremented on every reset; async results tagged with an older
    /// generation must be discarded
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reset(&mut self) {
        self.notes.clear();
        self.profiles.clear();
        self.likers_by_target.clear();
        self.replies_by_parent.clear();
        self.seen_engagement.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Note> {
        self.notes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.notes.contains_key(id)
    }

    /// Idempotent upsert of a kind:1 event. Returns `None` for other kinds.
    pub fn add_note(&mut self, event: RawEvent) -> Option<&Note> {
        if self.notes.contains_key(&event.id) {
            return self.notes.get(&event.id);
        }
        let mut note = Note::from_event(event)?;

        if let Some(likers) = self.likers_by_target.get(&note.id) {
            note.liked_by = likers
                .iter()
                .map(|pubkey| Liker {
                    pubkey: pubkey.clone(),
                })
                .collect();
            note.stats.reaction_count = note.liked_by.len();
        }
        if let Some(replies) = self.replies_by_parent.get(&note.id) {
            note.stats.reply_count = replies.len();
        }

        if is_reply(&note.event) {
            if let Some(parent) = reply_parent(&note.event).map(String::from) {
                self.record_reply(&parent, &note.id);
            }
        }

        let id = note.id.clone();
        let stored: &Note = self.notes.entry(id).or_insert(note);
        Some(stored)
    }

    fn record_reply(&mut self, parent_id: &str, reply_id: &str) {
        let replies = self.replies_by_parent.entry(parent_id.to_string()).or_default();
        if replies.insert(reply_id.to_string()) {
            let count = replies.len();
            if let Some(parent) = self.notes.get_mut(parent_id) {
                parent.stats.reply_count = count;
            }
        }
    }

    /// Record that the author of `event` liked `target_id`, whether or not
    /// the target has arrived. Returns true if a stored note changed.
    pub fn add_like(&mut self, event: &RawEvent, target_id: &str) -> bool {
        let likers = self.likers_by_target.entry(target_id.to_string()).or_default();
        if likers.iter().any(|p| p == &event.pubkey) {
            return false;
        }
        likers.push(event.pubkey.clone());

        let Some(note) = self.notes.get_mut(target_id) else {
            return false;
        };
        note.liked_by.push(Liker {
            pubkey: event.pubkey.clone(),
        });
        note.stats.reaction_count = note.liked_by.len();
        true
    }

    /// Count a repost against a stored note. Reposts of notes not yet seen
    /// are dropped.
    pub fn add_repost(&mut self, target_id: &str) -> bool {
        match self.notes.get_mut(target_id) {
            Some(note) => {
                note.stats.repost_count += 1;
                true
            }
            None => false,
        }
    }

    /// Returns true the first time a reaction or repost event id is seen in
    /// this generation
    pub fn first_sighting(&mut self, event_id: &str) -> bool {
        self.seen_engagement.insert(event_id.to_string())
    }

    /// Store a profile and return the ids of notes that render it, either as
    /// author or as a liker
    pub fn add_profile(&mut self, pubkey: &str, profile: Profile) -> Vec<String> {
        self.profiles
            .insert(pubkey.to_string(), ProfileState::Resolved(profile));
        self.notes_mentioning(pubkey)
    }

    /// Mark a lookup as started. Returns false if the pubkey already has a
    /// cache entry in any state.
    pub fn mark_profile_pending(&mut self, pubkey: &str) -> bool {
        if self.profiles.contains_key(pubkey) {
            return false;
        }
        self.profiles
            .insert(pubkey.to_string(), ProfileState::Pending);
        true
    }

    /// A lookup failed; a profile that already resolved is kept
    pub fn mark_profile_unknown(&mut self, pubkey: &str) -> Vec<String> {
        let entry = self
            .profiles
            .entry(pubkey.to_string())
            .or_insert(ProfileState::Pending);
        if matches!(entry, ProfileState::Resolved(_)) {
            return Vec::new();
        }
        *entry = ProfileState::Unknown;
        self.notes_mentioning(pubkey)
    }

    pub fn profile_state(&self, pubkey: &str) -> ProfileState {
        self.profiles
            .get(pubkey)
            .cloned()
            .unwrap_or(ProfileState::Pending)
    }

    pub fn profile(&self, pubkey: &str) -> Option<&Profile> {
        self.profiles.get(pubkey).and_then(ProfileState::profile)
    }

    fn notes_mentioning(&self, pubkey: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .notes
            .values()
            .filter(|n| n.author_pubkey == pubkey || n.is_liked_by(pubkey))
            .map(|n| n.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// All notes, newest first with id as tiebreak. Computed on every call.
    pub fn get_sorted_projection(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.notes.values().collect();
        notes.sort_by(|a, b| canonical_order(a, b));
        notes
    }

    /// Notes ordered by engagement score at `now`, canonical order on ties.
    /// Does not change `get_sorted_projection`.
    pub fn trending_projection(&self, now: u64) -> Vec<&Note> {
        let mut scored: Vec<(f64, &Note)> = self
            .notes
            .values()
            .map(|n| (self.trending_score(n, now), n))
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| canonical_order(a, b)));
        scored.into_iter().map(|(_, n)| n).collect()
    }

    pub fn trending_score(&self, note: &Note, now: u64) -> f64 {
        let age_hours = now.saturating_sub(note.created_at()) as f64 / 3600.0;
        calculate_trending_score(
            note.stats.reaction_count,
            note.stats.repost_count,
            note.stats.reply_count,
            age_hours,
        )
    }

    /// Oldest `created_at` among stored notes
    pub fn min_created_at(&self) -> Option<u64> {
        self.notes.values().map(Note::created_at).min()
    }

    pub fn item(&self, note: &Note) -> FeedItem {
        FeedItem {
            note: note.clone(),
            author: self.profile_state(&note.author_pubkey),
            likers: note
                .liked_by
                .iter()
                .map(|l| LikerView {
                    pubkey: l.pubkey.clone(),
                    profile: self.profile_state(&l.pubkey),
                })
                .collect(),
        }
    }

    /// Rendered projection in canonical order
    pub fn snapshot(&self) -> Vec<FeedItem> {
        self.get_sorted_projection()
            .into_iter()
            .map(|n| self.item(n))
            .collect()
    }
}
