pub mod feed;
pub mod note;
pub mod profile;
pub mod raw_event;
pub mod rule;
pub mod tag_utils;
pub mod time_range;

pub use feed::{Feed, FeedDefinition};
pub use note::{Liker, Note, NoteStats};
pub use profile::{display_name, short_pubkey, Profile, ProfileState};
pub use raw_event::RawEvent;
pub use rule::{FeedRule, Predicate, Subject, Verb};
pub use time_range::TimeRange;
