//! `RelayPool` backed by a nostr-sdk `Client`.
//!
//! A single router task reads the client's notification stream and fans
//! events out to per-subscription channels. End-of-stored-events is reported
//! once per subscription: after every relay that accepted the REQ has sent
//! EOSE, or after `eose_timeout`, whichever comes first.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use nostr_sdk::prelude::*;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use super::{EventDraft, PoolFuture, QueryFilter, RelayPool, RelaySubscription, SubscriptionItem};
use crate::error::FeedError;
use crate::models::RawEvent;

struct Route {
    tx: mpsc::UnboundedSender<SubscriptionItem>,
    /// Relays that accepted the REQ; `None` until the subscribe call returns
    expected: Option<HashSet<String>>,
    eosed: HashSet<String>,
    eose_sent: bool,
}

impl Route {
    /// Send EOSE if every expected relay has reported. Returns true once sent.
    fn maybe_finish(&mut self) -> bool {
        if self.eose_sent {
            return true;
        }
        let Some(expected) = &self.expected else {
            return false;
        };
        if expected.iter().all(|r| self.eosed.contains(r)) {
            self.eose_sent = true;
            let _ = self.tx.send(SubscriptionItem::EndOfStoredEvents);
        }
        self.eose_sent
    }
}

type Routes = Arc<Mutex<HashMap<String, Route>>>;

pub struct NostrRelayPool {
    client: Client,
    routes: Routes,
    eose_timeout: Duration,
}

impl NostrRelayPool {
    /// Wrap an already-configured client. Must be called inside a tokio
    /// runtime: the notification router is spawned here.
    pub fn new(client: Client, eose_timeout: Duration) -> Self {
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(route_notifications(client.notifications(), routes.clone()));
        Self {
            client,
            routes,
            eose_timeout,
        }
    }

    /// Build a client for the given relays and connect. `keys` is only
    /// needed for publishing.
    pub async fn connect(
        relays: &[String],
        keys: Option<Keys>,
        eose_timeout: Duration,
    ) -> crate::error::Result<Self> {
        let client = match keys {
            Some(keys) => Client::new(keys),
            None => Client::default(),
        };
        for url in relays {
            client.add_relay(url.as_str()).await.map_err(FeedError::relay)?;
        }

        let started = std::time::Instant::now();
        if tokio::time::timeout(Duration::from_secs(10), client.connect())
            .await
            .is_err()
        {
            warn!("Relay connect did not finish within 10s, continuing with connected relays");
        }
        info!(relays = relays.len(), elapsed = ?started.elapsed(), "Relay pool connected");

        Ok(Self::new(client, eose_timeout))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn spawn_eose_timeout(&self, id: String) {
        let routes = self.routes.clone();
        let timeout = self.eose_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(route) = routes.lock().get_mut(&id) {
                if !route.eose_sent {
                    debug!(subscription = %id, "EOSE timeout, completing subscription");
                    route.eose_sent = true;
                    let _ = route.tx.send(SubscriptionItem::EndOfStoredEvents);
                }
            }
        });
    }
}

async fn route_notifications(
    mut notifications: broadcast::Receiver<RelayPoolNotification>,
    routes: Routes,
) {
    loop {
        match notifications.recv().await {
            Ok(RelayPoolNotification::Event {
                subscription_id,
                event,
                ..
            }) => {
                let key = subscription_id.to_string();
                if let Some(route) = routes.lock().get(&key) {
                    trace!(subscription = %key, id = %event.id, "event");
                    let _ = route.tx.send(SubscriptionItem::Event(RawEvent::from(event.as_ref())));
                }
            }
            Ok(RelayPoolNotification::Message { relay_url, message }) => {
                if let RelayMessage::EndOfStoredEvents(subscription_id) = message {
                    let key = subscription_id.to_string();
                    if let Some(route) = routes.lock().get_mut(&key) {
                        route.eosed.insert(relay_url.to_string());
                        route.maybe_finish();
                    }
                }
            }
            Ok(RelayPoolNotification::Shutdown) => {
                info!("Relay pool shut down, router exiting");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Notification router lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl RelayPool for NostrRelayPool {
    fn subscribe(&self, filter: QueryFilter) -> PoolFuture<'_, RelaySubscription> {
        Box::pin(async move {
            let nostr_filter = filter.to_nostr()?;
            let sub_id = SubscriptionId::generate();
            let key = sub_id.to_string();
            let (tx, rx) = mpsc::unbounded_channel();

            // Register before sending the REQ so no early event is missed
            self.routes.lock().insert(
                key.clone(),
                Route {
                    tx,
                    expected: None,
                    eosed: HashSet::new(),
                    eose_sent: false,
                },
            );

            let output = match self
                .client
                .subscribe_with_id(sub_id, nostr_filter, None)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    self.routes.lock().remove(&key);
                    return Err(FeedError::relay(e));
                }
            };

            let accepted: HashSet<String> = output.success.iter().map(|u| u.to_string()).collect();
            debug!(subscription = %key, relays = accepted.len(), "Subscribed");
            if let Some(route) = self.routes.lock().get_mut(&key) {
                route.expected = Some(accepted);
                route.maybe_finish();
            }
            self.spawn_eose_timeout(key.clone());

            Ok(RelaySubscription { id: key, items: rx })
        })
    }

    fn unsubscribe(&self, subscription_id: String) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.routes.lock().remove(&subscription_id);
            self.client
                .unsubscribe(&SubscriptionId::new(subscription_id))
                .await;
        })
    }

    fn fetch_one(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Option<RawEvent>> {
        Box::pin(async move {
            let nostr_filter = filter.to_nostr()?.limit(1);
            let events = self
                .client
                .fetch_events(nostr_filter, timeout)
                .await
                .map_err(FeedError::relay)?;
            Ok(events.into_iter().next().map(RawEvent::from))
        })
    }

    fn fetch_many(&self, filter: QueryFilter, timeout: Duration) -> PoolFuture<'_, Vec<RawEvent>> {
        Box::pin(async move {
            let nostr_filter = filter.to_nostr()?;
            let events = self
                .client
                .fetch_events(nostr_filter, timeout)
                .await
                .map_err(FeedError::relay)?;
            Ok(events.into_iter().map(RawEvent::from).collect())
        })
    }

    fn publish(&self, draft: EventDraft) -> PoolFuture<'_, String> {
        Box::pin(async move {
            let mut tags = Vec::with_capacity(draft.tags.len());
            for tag in draft.tags {
                tags.push(Tag::parse(tag).map_err(FeedError::relay)?);
            }
            let builder = EventBuilder::new(Kind::from(draft.kind), draft.content).tags(tags);

            match tokio::time::timeout(Duration::from_secs(10), self.client.send_event_builder(builder))
                .await
            {
                Ok(Ok(output)) => Ok(output.val.to_hex()),
                Ok(Err(e)) => Err(FeedError::relay(e)),
                Err(_) => Err(FeedError::Timeout {
                    what: "publish".to_string(),
                    millis: 10_000,
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> (Route, mpsc::UnboundedReceiver<SubscriptionItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Route {
                tx,
                expected: None,
                eosed: HashSet::new(),
                eose_sent: false,
            },
            rx,
        )
    }

    #[test]
    fn test_route_waits_for_every_accepting_relay() {
        let (mut route, mut rx) = route();
        route.eosed.insert("wss://a".into());
        assert!(!route.maybe_finish(), "no expectation yet");

        route.expected = Some(["wss://a".to_string(), "wss://b".to_string()].into());
        assert!(!route.maybe_finish());
        assert!(rx.try_recv().is_err());

        route.eosed.insert("wss://b".into());
        assert!(route.maybe_finish());
        assert_eq!(rx.try_recv().unwrap(), SubscriptionItem::EndOfStoredEvents);

        // Only once
        assert!(route.maybe_finish());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_route_with_no_accepting_relays_finishes_immediately() {
        let (mut route, mut rx) = route();
        route.expected = Some(HashSet::new());
        assert!(route.maybe_finish());
        assert_eq!(rx.try_recv().unwrap(), SubscriptionItem::EndOfStoredEvents);
    }
}
