//! Best-effort author metadata lookups.
//!
//! Concurrent requests for one pubkey share a single fetch. Results, including
//! failures, are remembered until `clear()`, so a pubkey is never looked up
//! twice in one generation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::constants::kinds;
use crate::models::{Profile, ProfileState};
use crate::nostr::{QueryFilter, RelayPool};

pub type ProfileLookup = Shared<BoxFuture<'static, Option<Profile>>>;

#[derive(Clone)]
pub struct ProfileResolver {
    pool: Arc<dyn RelayPool>,
    timeout: Duration,
    lookups: Arc<Mutex<HashMap<String, ProfileLookup>>>,
}

impl ProfileResolver {
    pub fn new(pool: Arc<dyn RelayPool>, timeout: Duration) -> Self {
        Self {
            pool,
            timeout,
            lookups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lookup future for `pubkey`, shared with any earlier caller. Resolves
    /// to `None` on timeout, relay error, missing or malformed metadata.
    pub fn fetch_profile(&self, pubkey: &str) -> ProfileLookup {
        let mut lookups = self.lookups.lock();
        if let Some(existing) = lookups.get(pubkey) {
            return existing.clone();
        }

        let pool = self.pool.clone();
        let timeout = self.timeout;
        let key = pubkey.to_string();
        let lookup = async move {
            let filter = QueryFilter::new()
                .kinds([kinds::METADATA])
                .authors(Some(vec![key.clone()]))
                .limit(Some(1));
            let fetched = tokio::time::timeout(timeout, pool.fetch_one(filter, timeout)).await;
            match fetched {
                Ok(Ok(Some(event))) => match Profile::from_event(&event) {
                    Ok(profile) => Some(profile),
                    Err(e) => {
                        warn!(pubkey = %key, "Skipping malformed profile: {}", e);
                        None
                    }
                },
                Ok(Ok(None)) => {
                    debug!(pubkey = %key, "No profile published");
                    None
                }
                Ok(Err(e)) => {
                    debug!(pubkey = %key, "Profile lookup failed: {}", e);
                    None
                }
                Err(_) => {
                    debug!(pubkey = %key, timeout_ms = timeout.as_millis() as u64, "Profile lookup timed out");
                    None
                }
            }
        }
        .boxed()
        .shared();

        lookups.insert(pubkey.to_string(), lookup.clone());
        lookup
    }

    /// Resolve several pubkeys concurrently into cache states
    pub async fn resolve_many<I, S>(&self, pubkeys: I) -> HashMap<String, ProfileState>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keys: Vec<String> = pubkeys.into_iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let results = join_all(keys.iter().map(|k| self.fetch_profile(k))).await;
        keys.into_iter()
            .zip(results)
            .map(|(key, profile)| {
                let state = profile.map_or(ProfileState::Unknown, ProfileState::Resolved);
                (key, state)
            })
            .collect()
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.lock().len()
    }

    /// Forget every lookup. Futures already handed out still complete.
    pub fn clear(&self) {
        self.lookups.lock().clear();
    }
}
