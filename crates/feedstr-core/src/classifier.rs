//! Structural classification of inbound events from their reference tags.
//!
//! Relays can narrow a query by kind, author and time, but not by shape
//! ("has at least one `e` tag"). Shape checks happen here, after delivery.

use crate::constants::{kinds, DISLIKE_CONTENT};
use crate::models::tag_utils::{first_tag_value, has_tag, last_tag_value, marked_reference};
use crate::models::{RawEvent, Subject};

/// A note that references another event is a reply
pub fn is_reply(event: &RawEvent) -> bool {
    has_tag(&event.tags, "e")
}

pub fn is_post(event: &RawEvent) -> bool {
    !is_reply(event)
}

/// Whether a note has the shape the rule's subject asks for. Pictures are
/// already narrowed relay-side by their `t` tag.
pub fn subject_matches(event: &RawEvent, subject: Subject) -> bool {
    match subject {
        Subject::Reply => is_reply(event),
        Subject::Post => is_post(event),
        Subject::Picture => true,
    }
}

/// Client-side narrowing attached to a relay query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    /// Keep text notes whose shape matches the subject
    Subject(Subject),
    /// Keep only text notes that reply to something
    RepliesOnly,
    None,
}

impl PostFilter {
    /// Only text notes are narrowed; reactions and reposts delivered on the
    /// same subscription are engagement signals and always pass.
    pub fn accepts(&self, event: &RawEvent) -> bool {
        if event.kind != kinds::TEXT_NOTE {
            return true;
        }
        match self {
            Self::Subject(subject) => subject_matches(event, *subject),
            Self::RepliesOnly => is_reply(event),
            Self::None => true,
        }
    }

    pub fn subject(&self) -> Option<Subject> {
        match self {
            Self::Subject(subject) => Some(*subject),
            _ => None,
        }
    }
}

/// NIP-25: any reaction except an explicit "-" counts as a like
pub fn is_like(event: &RawEvent) -> bool {
    event.kind == kinds::REACTION && event.content.trim() != DISLIKE_CONTENT
}

/// Note a like points at, if the event is a like with an `e` tag
pub fn like_target(event: &RawEvent) -> Option<&str> {
    if !is_like(event) {
        return None;
    }
    first_tag_value(&event.tags, "e")
}

pub fn repost_target(event: &RawEvent) -> Option<&str> {
    if event.kind != kinds::REPOST {
        return None;
    }
    first_tag_value(&event.tags, "e")
}

/// Direct parent of a reply: the `reply`-marked reference, else the
/// `root`-marked one, else the last `e` tag (deprecated positional form)
pub fn reply_parent(event: &RawEvent) -> Option<&str> {
    if event.kind != kinds::TEXT_NOTE {
        return None;
    }
    marked_reference(&event.tags, "reply")
        .or_else(|| marked_reference(&event.tags, "root"))
        .or_else(|| last_tag_value(&event.tags, "e"))
}

/// What an inbound event means to the aggregation store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventClass<'a> {
    Note,
    Like { target: &'a str },
    Repost { target: &'a str },
    Profile,
    /// Dislikes, untargeted reactions and unrelated kinds
    Ignored,
}

pub fn classify(event: &RawEvent) -> EventClass<'_> {
    match event.kind {
        kinds::TEXT_NOTE => EventClass::Note,
        kinds::METADATA => EventClass::Profile,
        kinds::REACTION => like_target(event)
            .map(|target| EventClass::Like { target })
            .unwrap_or(EventClass::Ignored),
        kinds::REPOST => repost_target(event)
            .map(|target| EventClass::Repost { target })
            .unwrap_or(EventClass::Ignored),
        _ => EventClass::Ignored,
    }
}
