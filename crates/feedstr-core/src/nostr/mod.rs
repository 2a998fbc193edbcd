pub mod client_pool;
pub mod filter;
#[cfg(test)]
pub mod mock;
pub mod pool;

pub use client_pool::NostrRelayPool;
pub use filter::QueryFilter;
pub use pool::{EventDraft, PoolFuture, RelayPool, RelaySubscription, SubscriptionItem};
