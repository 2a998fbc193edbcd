use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use super::QueryFilter;
use crate::error::Result;
use crate::models::RawEvent;

pub type PoolFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// Item delivered on an open subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionItem {
    Event(RawEvent),
    /// All stored events matching the filter have been sent; live events may
    /// still follow
    EndOfStoredEvents,
}

/// An open subscription. Dropping the receiver stops delivery locally;
/// `RelayPool::unsubscribe` also closes it on the relays.
#[derive(Debug)]
pub struct RelaySubscription {
    pub id: String,
    pub items: mpsc::UnboundedReceiver<SubscriptionItem>,
}

/// Unsigned event content handed to the pool for signing and publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub kind: u16,
    pub content: String,
    pub tags: Vec<Vec<String>>,
}

/// The relay network as the feed engine consumes it. Transport, signature
/// verification and relay selection are the implementor's concern.
pub trait RelayPool: Send + Sync + 'static {
    fn subscribe(&self, filter: QueryFilter) -> PoolFuture<'_, RelaySubscription>;

    fn unsubscribe(&self, subscription_id: String) -> BoxFuture<'_, ()>;

    /// Newest event matching the filter, if any relay answers in time
    fn fetch_one(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Option<RawEvent>>;

    fn fetch_many(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Vec<RawEvent>>;

    /// Sign and publish; returns the new event id
    fn publish(&self, draft: EventDraft) -> PoolFuture<'_, String>;

    fn fetch_by_id(&self, id: &str, timeout: Duration) -> PoolFuture<'_, Option<RawEvent>> {
        self.fetch_one(QueryFilter::new().ids(vec![id.to_string()]), timeout)
    }
}
