use crate::models::{Profile, RawEvent};

/// Message from a background task to the engine that owns the store.
/// Every signal carries the store generation it was produced for; the engine
/// drops signals from older generations.
#[derive(Debug, Clone)]
pub struct FeedSignal {
    pub generation: u64,
    pub payload: SignalPayload,
}

#[derive(Debug, Clone)]
pub enum SignalPayload {
    /// An event delivered by a subscription branch, already post-filtered
    Event { branch: usize, event: RawEvent },
    /// A branch reached end-of-stored-events. `received` counts the events it
    /// forwarded for its primary query; fewer than `limit` means the branch
    /// has no more history.
    BranchComplete {
        round: u32,
        branch: usize,
        received: usize,
        limit: usize,
    },
    /// Outcome of a profile lookup; `None` when it failed or timed out
    ProfileLookup {
        pubkey: String,
        profile: Option<Profile>,
    },
}

impl FeedSignal {
    pub fn new(generation: u64, payload: SignalPayload) -> Self {
        Self {
            generation,
            payload,
        }
    }
}

/// What changed in the engine's view after applying signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedChange {
    NoteAdded(String),
    /// Stats or likers of a stored note changed
    NoteUpdated(String),
    ProfileUpdated {
        pubkey: String,
        note_ids: Vec<String>,
    },
    PageStarted {
        round: u32,
        until: Option<u64>,
    },
    PageSettled {
        round: u32,
        has_more: bool,
    },
    /// Store was cleared for a new feed or identity
    Reset,
}
