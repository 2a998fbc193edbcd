#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Note not found: {id}")]
    NoteNotFound { id: String },
    #[error("Relay error: {message}")]
    Relay { message: String },
    #[error("Invalid filter: {message}")]
    InvalidFilter { message: String },
    #[error("Timed out after {millis}ms waiting for {what}")]
    Timeout { what: String, millis: u64 },
    #[error("Malformed profile: {0}")]
    MalformedProfile(#[source] serde_json::Error),
    #[error("Malformed feed definition: {message}")]
    MalformedFeed { message: String },
    #[error("Not logged in")]
    NotLoggedIn,
}

pub type Result<T> = std::result::Result<T, FeedError>;

impl FeedError {
    pub fn relay(err: impl std::fmt::Display) -> Self {
        Self::Relay {
            message: err.to_string(),
        }
    }
}
