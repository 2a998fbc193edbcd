//! In-memory `RelayPool` for tests.
//!
//! Subscriptions are recorded in open order; tests push events and EOSE into
//! them by index. `fetch_*` calls are served from a fixed set of stored
//! events, newest first.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{EventDraft, PoolFuture, QueryFilter, RelayPool, RelaySubscription, SubscriptionItem};
use crate::error::FeedError;
use crate::models::RawEvent;

#[derive(Debug, Clone)]
pub struct MockSubscription {
    pub id: String,
    pub filter: QueryFilter,
    tx: mpsc::UnboundedSender<SubscriptionItem>,
}

impl MockSubscription {
    pub fn send(&self, event: RawEvent) {
        let _ = self.tx.send(SubscriptionItem::Event(event));
    }

    pub fn eose(&self) {
        let _ = self.tx.send(SubscriptionItem::EndOfStoredEvents);
    }
}

#[derive(Default)]
struct MockState {
    subscriptions: Vec<MockSubscription>,
    unsubscribed: Vec<String>,
    stored: Vec<RawEvent>,
    published: Vec<EventDraft>,
    fetches: Vec<QueryFilter>,
    fetch_delay: Option<Duration>,
    failing_ids: HashSet<String>,
}

#[derive(Default)]
pub struct MockRelayPool {
    state: Mutex<MockState>,
}

impl MockRelayPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = RawEvent>) -> Self {
        let pool = Self::new();
        pool.state.lock().stored.extend(events);
        pool
    }

    pub fn store(&self, event: RawEvent) {
        self.state.lock().stored.push(event);
    }

    /// Delay every fetch; fetches slower than their timeout fail
    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state.lock().fetch_delay = Some(delay);
    }

    /// Fetches whose id filter contains this id fail with a relay error
    pub fn fail_id(&self, id: &str) {
        self.state.lock().failing_ids.insert(id.to_string());
    }

    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    pub fn subscriptions(&self) -> Vec<MockSubscription> {
        self.state.lock().subscriptions.clone()
    }

    /// Wait until the `index`-th subscription has been opened
    pub async fn subscription(&self, index: usize) -> MockSubscription {
        let wait = async {
            loop {
                if let Some(sub) = self.state.lock().subscriptions.get(index).cloned() {
                    return sub;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait)
            .await
            .unwrap_or_else(|_| panic!("subscription {} was never opened", index))
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn published(&self) -> Vec<EventDraft> {
        self.state.lock().published.clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches.len()
    }

    async fn matching(&self, filter: &QueryFilter, timeout: Duration) -> Result<Vec<RawEvent>, FeedError> {
        let (delay, failing) = {
            let mut state = self.state.lock();
            state.fetches.push(filter.clone());
            let failing = filter
                .ids
                .as_ref()
                .is_some_and(|ids| ids.iter().any(|id| state.failing_ids.contains(id)));
            (state.fetch_delay, failing)
        };

        if let Some(delay) = delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Err(FeedError::Timeout {
                    what: "mock fetch".to_string(),
                    millis: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(FeedError::relay("mock failure"));
        }

        let mut events: Vec<RawEvent> = self
            .state
            .lock()
            .stored
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        Ok(events)
    }
}

impl RelayPool for MockRelayPool {
    fn subscribe(&self, filter: QueryFilter) -> PoolFuture<'_, RelaySubscription> {
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut state = self.state.lock();
            let id = format!("sub-{}", state.subscriptions.len());
            state.subscriptions.push(MockSubscription {
                id: id.clone(),
                filter,
                tx,
            });
            Ok(RelaySubscription { id, items: rx })
        })
    }

    fn unsubscribe(&self, subscription_id: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unsubscribed.push(subscription_id);
        })
    }

    fn fetch_one(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Option<RawEvent>> {
        Box::pin(async move { Ok(self.matching(&filter, timeout).await?.into_iter().next()) })
    }

    fn fetch_many(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Vec<RawEvent>> {
        Box::pin(async move { self.matching(&filter, timeout).await })
    }

    fn publish(&self, draft: EventDraft) -> PoolFuture<'_, String> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.published.push(draft);
            Ok(format!("published-{}", state.published.len()))
        })
    }
}
