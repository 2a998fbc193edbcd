//! Application-wide constants
//!
//! Centralized location for protocol values and defaults that are
//! used across multiple modules.

/// Relays used when no relay list is configured
pub const DEFAULT_RELAYS: [&str; 5] = [
    "wss://relay.primal.net",
    "wss://relay.nostr.band",
    "wss://nos.lol",
    "wss://purplepag.es",
    "wss://relay.damus.io",
];

/// Kind of the (regular, non-replaceable) event that stores a feed definition
pub const FEED_DEF_KIND: u16 = 1808;

/// `d` tag identifier attached to feed definition events
pub const FEED_D_TAG: &str = "feedstr";

/// Persisted feed definition format version
pub const FEED_DEF_VERSION: u32 = 1;

/// `t` tag value that marks picture posts
pub const PICTURE_TAG: &str = "image";

/// Reaction content that marks a dislike rather than a like (NIP-25)
pub const DISLIKE_CONTENT: &str = "-";

/// Ancestor walks stop after this many hops
pub const MAX_THREAD_DEPTH: usize = 10;

/// Number of characters of a pubkey shown when no profile is known
pub const SHORT_PUBKEY_LEN: usize = 8;

// Nostr event kinds used by the feed engine
pub mod kinds {
    /// Metadata (profiles)
    pub const METADATA: u16 = 0;
    /// Text note (post or reply)
    pub const TEXT_NOTE: u16 = 1;
    /// Contact list (follows)
    pub const CONTACT_LIST: u16 = 3;
    /// Repost
    pub const REPOST: u16 = 6;
    /// Reaction (like)
    pub const REACTION: u16 = 7;
}
