use serde::Serialize;

use crate::models::{display_name, Note, ProfileState};

/// A liker joined with whatever the profile cache knows about them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LikerView {
    pub pubkey: String,
    pub profile: ProfileState,
}

impl LikerView {
    pub fn name(&self) -> String {
        display_name(&self.pubkey, self.profile.profile())
    }
}

/// One row of the rendered feed: a note plus resolved author and liker
/// profiles, read from the cache at snapshot time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub note: Note,
    pub author: ProfileState,
    pub likers: Vec<LikerView>,
}

impl FeedItem {
    pub fn author_name(&self) -> String {
        display_name(&self.note.author_pubkey, self.author.profile())
    }

    pub fn id(&self) -> &str {
        &self.note.id
    }
}
