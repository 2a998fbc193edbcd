use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::constants::kinds;
use crate::error::Result;
use crate::models::tag_utils::all_tag_values;
use crate::nostr::{QueryFilter, RelayPool};

/// The signed-in user as the engine sees it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub pubkey: String,
    pub follows: Vec<String>,
}

impl Identity {
    pub fn new(pubkey: impl Into<String>, follows: Vec<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
            follows,
        }
    }

    /// Build an identity from the user's published contact list
    pub async fn load(pool: Arc<dyn RelayPool>, pubkey: &str, timeout: Duration) -> Result<Self> {
        let follows = fetch_follow_list(pool.as_ref(), pubkey, timeout).await?;
        info!(pubkey, follows = follows.len(), "Loaded follow list");
        Ok(Self::new(pubkey, follows))
    }
}

/// `p` tags of the newest kind:3 contact list, in order, without repeats.
/// A user with no contact list follows nobody.
pub async fn fetch_follow_list(pool: &dyn RelayPool, pubkey: &str, timeout: Duration) -> Result<Vec<String>> {
    let filter = QueryFilter::new()
        .kinds([kinds::CONTACT_LIST])
        .authors(Some(vec![pubkey.to_string()]))
        .limit(Some(1));

    let Some(contacts) = pool.fetch_one(filter, timeout).await? else {
        debug!(pubkey, "No contact list found");
        return Ok(Vec::new());
    };

    let mut follows: Vec<String> = Vec::new();
    for followed in all_tag_values(&contacts.tags, "p") {
        if !follows.iter().any(|f| f == followed) {
            follows.push(followed.to_string());
        }
    }
    Ok(follows)
}
