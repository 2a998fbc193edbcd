//! The feed engine: one active feed, one identity, one store.
//!
//! Subscription branches and profile lookups run as tokio tasks and report
//! back over a channel. Only the engine mutates the store, inside
//! `process_pending`/`next_change`, so the store needs no lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::classifier::{classify, EventClass};
use crate::config::EngineConfig;
use crate::events::{FeedChange, FeedSignal, SignalPayload};
use crate::identity::Identity;
use crate::models::{Feed, Profile, RawEvent};
use crate::nostr::RelayPool;
use crate::pagination::{PageState, PaginationController};
use crate::profile_resolver::ProfileResolver;
use crate::store::{AggregationStore, FeedItem};
use crate::subscription::{SubscribeRequest, SubscriptionCoordinator};

pub struct FeedEngine {
    config: EngineConfig,
    store: AggregationStore,
    coordinator: SubscriptionCoordinator,
    pagination: PaginationController,
    profiles: ProfileResolver,
    signals_tx: mpsc::UnboundedSender<FeedSignal>,
    signals_rx: mpsc::UnboundedReceiver<FeedSignal>,
    pending_changes: Vec<FeedChange>,
    identity: Option<Identity>,
    feed: Option<Feed>,
    group_members: Option<Vec<String>>,
}

impl FeedEngine {
    pub fn new(pool: Arc<dyn RelayPool>, config: EngineConfig) -> Self {
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Self {
            coordinator: SubscriptionCoordinator::new(pool.clone(), signals_tx.clone()),
            profiles: ProfileResolver::new(pool, config.profile_timeout()),
            config,
            store: AggregationStore::new(),
            pagination: PaginationController::new(),
            signals_tx,
            signals_rx,
            pending_changes: Vec::new(),
            identity: None,
            feed: None,
            group_members: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn feed(&self) -> Option<&Feed> {
        self.feed.as_ref()
    }

    pub fn store(&self) -> &AggregationStore {
        &self.store
    }

    /// Switch user. Returns true if the identity or its follow list changed,
    /// in which case the feed restarts from scratch.
    pub async fn set_identity(&mut self, identity: Option<Identity>) -> bool {
        if self.identity == identity {
            return false;
        }
        info!(pubkey = ?identity.as_ref().map(|i| i.pubkey.as_str()), "Identity changed");
        self.identity = identity;
        self.restart().await;
        true
    }

    /// Make `feed` the active feed. Rules are compared structurally; only a
    /// change in rules resets the store.
    pub async fn set_feed(&mut self, feed: Feed) -> bool {
        let unchanged = self.feed.as_ref().is_some_and(|f| f.rules == feed.rules);
        if unchanged {
            self.feed = Some(feed);
            return false;
        }
        info!(feed = %feed.name, rules = feed.rules.len(), "Active feed changed");
        self.feed = Some(feed);
        self.restart().await;
        true
    }

    /// Members used by `Group` predicates; without them those rules fall
    /// back to the follow list
    pub async fn set_group_members(&mut self, members: Option<Vec<String>>) -> bool {
        if self.group_members == members {
            return false;
        }
        self.group_members = members;
        self.restart().await;
        true
    }

    async fn restart(&mut self) {
        self.coordinator.unsubscribe_all().await;
        self.store.reset();
        self.profiles.clear();
        self.pagination.reset();
        self.pending_changes.clear();
        self.pending_changes.push(FeedChange::Reset);
        debug!(generation = self.store.generation(), "Feed state reset");
        self.load_more();
    }

    /// Start the next page. No-op while a page is loading or before both an
    /// identity and a feed are set.
    pub fn load_more(&mut self) -> bool {
        let (Some(identity), Some(feed)) = (&self.identity, &self.feed) else {
            debug!("load_more ignored: no identity or feed");
            return false;
        };
        if self.pagination.is_loading() {
            trace!("load_more ignored: page still loading");
            return false;
        }

        let until = self.pagination.next_until(self.store.min_created_at());
        let Some(round) = self.pagination.begin_round(until) else {
            return false;
        };
        let branches = self.coordinator.subscribe(SubscribeRequest {
            rules: &feed.rules,
            followed_pubkeys: &identity.follows,
            group_members: self.group_members.as_deref(),
            until: self.pagination.until(),
            batch_size: self.config.batch_size,
            generation: self.store.generation(),
            round,
        });
        self.pagination.expect_branches(branches);

        self.pending_changes.push(FeedChange::PageStarted {
            round,
            until: self.pagination.until(),
        });
        if self.pagination.state() == PageState::Settled {
            self.pending_changes.push(FeedChange::PageSettled {
                round,
                has_more: self.pagination.has_more(),
            });
        }
        true
    }

    /// Apply every signal already queued and return what changed
    pub fn process_pending(&mut self) -> Vec<FeedChange> {
        while let Ok(signal) = self.signals_rx.try_recv() {
            self.apply_signal(signal);
        }
        std::mem::take(&mut self.pending_changes)
    }

    /// Wait for at least one signal, then apply everything queued
    pub async fn next_change(&mut self) -> Vec<FeedChange> {
        if self.pending_changes.is_empty() {
            if let Some(signal) = self.signals_rx.recv().await {
                self.apply_signal(signal);
            }
        }
        self.process_pending()
    }

    /// Process signals until the current page settles. Returns false on
    /// timeout.
    pub async fn wait_until_settled(&mut self, timeout: Duration) -> bool {
        let settled = tokio::time::timeout(timeout, async {
            while self.pagination.is_loading() {
                self.next_change().await;
            }
        })
        .await;
        self.process_pending();
        settled.is_ok()
    }

    fn apply_signal(&mut self, signal: FeedSignal) {
        if signal.generation != self.store.generation() {
            trace!(
                signal_generation = signal.generation,
                generation = self.store.generation(),
                "Dropping stale signal"
            );
            return;
        }
        match signal.payload {
            SignalPayload::Event { branch, event } => {
                trace!(branch, id = %event.id, kind = event.kind, "Event");
                self.apply_event(event);
            }
            SignalPayload::BranchComplete {
                round,
                branch,
                received,
                limit,
            } => {
                if self.pagination.on_branch_complete(round, branch, received, limit) {
                    self.pending_changes.push(FeedChange::PageSettled {
                        round,
                        has_more: self.pagination.has_more(),
                    });
                }
            }
            SignalPayload::ProfileLookup { pubkey, profile } => self.apply_profile(pubkey, profile),
        }
    }

    fn apply_event(&mut self, event: RawEvent) {
        match classify(&event) {
            EventClass::Note => {
                if self.store.contains(&event.id) {
                    return;
                }
                let author = event.pubkey.clone();
                if self.store.add_note(event.clone()).is_some() {
                    self.pending_changes.push(FeedChange::NoteAdded(event.id.clone()));
                    self.request_profile(&author);
                }
            }
            EventClass::Like { target } => {
                if !self.store.first_sighting(&event.id) {
                    return;
                }
                if self.store.add_like(&event, target) {
                    self.pending_changes.push(FeedChange::NoteUpdated(target.to_string()));
                }
                self.request_profile(&event.pubkey);
            }
            EventClass::Repost { target } => {
                if self.store.first_sighting(&event.id) && self.store.add_repost(target) {
                    self.pending_changes.push(FeedChange::NoteUpdated(target.to_string()));
                }
            }
            EventClass::Profile => match Profile::from_event(&event) {
                Ok(profile) => self.apply_profile(event.pubkey.clone(), Some(profile)),
                Err(e) => warn!(pubkey = %event.pubkey, "Skipping malformed profile: {}", e),
            },
            EventClass::Ignored => trace!(id = %event.id, kind = event.kind, "Ignored event"),
        }
    }

    fn apply_profile(&mut self, pubkey: String, profile: Option<Profile>) {
        let note_ids = match profile {
            Some(profile) => self.store.add_profile(&pubkey, profile),
            None => self.store.mark_profile_unknown(&pubkey),
        };
        if !note_ids.is_empty() {
            self.pending_changes.push(FeedChange::ProfileUpdated { pubkey, note_ids });
        }
    }

    fn request_profile(&mut self, pubkey: &str) {
        if !self.store.mark_profile_pending(pubkey) {
            return;
        }
        let lookup = self.profiles.fetch_profile(pubkey);
        let signals = self.signals_tx.clone();
        let generation = self.store.generation();
        let pubkey = pubkey.to_string();
        tokio::spawn(async move {
            let profile = lookup.await;
            let _ = signals.send(FeedSignal::new(
                generation,
                SignalPayload::ProfileLookup { pubkey, profile },
            ));
        });
    }

    /// Rendered feed in canonical order
    pub fn notes(&self) -> Vec<FeedItem> {
        self.store.snapshot()
    }

    /// Rendered feed ordered by trending score at `now`
    pub fn trending_notes(&self, now: u64) -> Vec<FeedItem> {
        self.store
            .trending_projection(now)
            .into_iter()
            .map(|n| self.store.item(n))
            .collect()
    }

    pub fn loading(&self) -> bool {
        self.pagination.is_loading()
    }

    pub fn has_more(&self) -> bool {
        self.pagination.has_more()
    }

    pub fn state(&self) -> PageState {
        self.pagination.state()
    }

    pub fn until(&self) -> Option<u64> {
        self.pagination.until()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::kinds;
    use crate::models::{FeedRule, Predicate, ProfileState, Subject, TimeRange, Verb};
    use crate::nostr::mock::{MockRelayPool, MockSubscription};

    fn rule(verb: Verb) -> FeedRule {
        FeedRule::new(Subject::Post, verb, Predicate::Follows, TimeRange::TwentyFourHours, 100)
    }

    fn note(id: &str, pubkey: &str, created_at: u64) -> RawEvent {
        RawEvent::new(id, kinds::TEXT_NOTE, pubkey, created_at)
    }

    fn identity() -> Identity {
        Identity::new("me", vec!["A".to_string(), "B".to_string()])
    }

    async fn engine_with(pool: Arc<MockRelayPool>, verb: Verb, batch_size: usize) -> FeedEngine {
        let config = EngineConfig {
            batch_size,
            profile_timeout_ms: 200,
            ..Default::default()
        };
        let mut engine = FeedEngine::new(pool, config);
        engine.set_identity(Some(identity())).await;
        engine.set_feed(Feed::new("test", vec![rule(verb)])).await;
        engine
    }

    fn ids(engine: &FeedEngine) -> Vec<String> {
        engine.notes().into_iter().map(|i| i.note.id).collect()
    }

    async fn settle(engine: &mut FeedEngine) {
        assert!(engine.wait_until_settled(Duration::from_secs(2)).await, "page never settled");
    }

    /// Wait for all `count` subscriptions and pick the one querying `kind`
    async fn subscription_for(pool: &MockRelayPool, count: usize, kind: u16) -> MockSubscription {
        pool.subscription(count - 1).await;
        pool.subscriptions()
            .into_iter()
            .find(|s| s.filter.kinds == vec![kind])
            .expect("no subscription for kind")
    }

    #[tokio::test]
    async fn test_posted_feed_is_newest_first() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        assert!(engine.loading());

        let sub = pool.subscription(0).await;
        assert_eq!(sub.filter.authors, Some(vec!["A".to_string(), "B".to_string()]));
        sub.send(note("n1", "A", 100));
        sub.send(note("n2", "B", 200));
        sub.eose();
        settle(&mut engine).await;

        assert_eq!(ids(&engine), vec!["n2", "n1"]);
        assert_eq!(engine.state(), PageState::Settled);
        assert!(!engine.has_more());
    }

    #[tokio::test]
    async fn test_liked_feed_dereferences_targets() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Liked, 10).await;

        let reactions = pool.subscription(0).await;
        reactions.send(
            RawEvent::new("r1", kinds::REACTION, "A", 60)
                .with_tag(["e", "n1"])
                .with_content("+"),
        );
        reactions.eose();

        let notes = pool.subscription(1).await;
        assert_eq!(notes.filter.ids, Some(vec!["n1".to_string()]));
        notes.send(note("n1", "C", 50));
        notes.eose();
        settle(&mut engine).await;

        let items = engine.notes();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].note.id, "n1");
        assert_eq!(items[0].note.stats.reaction_count, 1);
        assert_eq!(items[0].likers.len(), 1);
        assert_eq!(items[0].likers[0].pubkey, "A");
    }

    #[tokio::test]
    async fn test_like_arriving_before_its_note() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Interacted, 10).await;

        let reactions = subscription_for(&pool, 3, kinds::REACTION).await;
        let notes = subscription_for(&pool, 3, kinds::TEXT_NOTE).await;
        let reposts = subscription_for(&pool, 3, kinds::REPOST).await;

        reactions.send(
            RawEvent::new("r1", kinds::REACTION, "B", 10)
                .with_tag(["e", "x"])
                .with_content("+"),
        );
        reactions.send(
            RawEvent::new("r2", kinds::REACTION, "A", 10)
                .with_tag(["e", "x"])
                .with_content("-"),
        );
        reactions.eose();
        // let the like land before the note
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.process_pending();

        notes.send(note("x", "A", 5));
        notes.eose();
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.process_pending();

        reposts.send(RawEvent::new("s1", kinds::REPOST, "B", 11).with_tag(["e", "x"]));
        reposts.send(RawEvent::new("s1", kinds::REPOST, "B", 11).with_tag(["e", "x"]));
        reposts.eose();
        settle(&mut engine).await;

        let item = &engine.notes()[0];
        assert_eq!(item.note.stats.reaction_count, 1);
        assert_eq!(item.likers[0].pubkey, "B");
        assert_eq!(item.note.stats.repost_count, 1);
    }

    #[tokio::test]
    async fn test_reposted_feed_counts_the_repost_that_found_the_note() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Reposted, 10).await;

        let reposts = pool.subscription(0).await;
        assert_eq!(reposts.filter.kinds, vec![kinds::REPOST]);
        reposts.send(RawEvent::new("s1", kinds::REPOST, "A", 60).with_tag(["e", "n1"]));
        reposts.eose();

        let notes = pool.subscription(1).await;
        assert_eq!(notes.filter.ids, Some(vec!["n1".to_string()]));
        notes.send(note("n1", "C", 50));
        notes.eose();
        settle(&mut engine).await;

        let items = engine.notes();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].note.id, "n1");
        assert_eq!(items[0].note.stats.repost_count, 1);
    }

    #[tokio::test]
    async fn test_group_members_restart_with_members_as_authors() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = FeedEngine::new(pool.clone(), EngineConfig::default());
        engine.set_identity(Some(identity())).await;
        let group_rule = FeedRule::new(Subject::Post, Verb::Posted, Predicate::Group, TimeRange::OneHour, 100);
        engine.set_feed(Feed::new("group", vec![group_rule])).await;

        let before = pool.subscription(0).await;
        assert_eq!(before.filter.authors, Some(vec!["A".to_string(), "B".to_string()]));

        assert!(engine.set_group_members(Some(vec!["G".to_string()])).await);
        assert_eq!(pool.unsubscribed(), vec!["sub-0"]);
        let after = pool.subscription(1).await;
        assert_eq!(after.filter.authors, Some(vec!["G".to_string()]));

        assert!(!engine.set_group_members(Some(vec!["G".to_string()])).await);
        assert_eq!(pool.subscription_count(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        let sub = pool.subscription(0).await;
        for _ in 0..3 {
            sub.send(note("n1", "A", 100));
        }
        sub.eose();
        settle(&mut engine).await;
        assert_eq!(ids(&engine), vec!["n1"]);
    }

    #[tokio::test]
    async fn test_load_more_moves_cursor_back() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 2).await;
        assert!(!engine.load_more(), "second round must wait for the first");

        let first = pool.subscription(0).await;
        assert_eq!(first.filter.until, None);
        first.send(note("n1", "A", 300));
        first.send(note("n2", "B", 200));
        first.eose();
        settle(&mut engine).await;
        assert!(engine.has_more());

        assert!(engine.load_more());
        let second = pool.subscription(1).await;
        assert_eq!(second.filter.until, Some(199));
        second.send(note("n3", "A", 150));
        second.eose();
        settle(&mut engine).await;
        assert!(!engine.has_more());

        assert!(engine.load_more());
        let third = pool.subscription(2).await;
        assert_eq!(third.filter.until, Some(149));

        let watermarks: Vec<u64> = [&second, &third].iter().filter_map(|s| s.filter.until).collect();
        assert!(watermarks.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(ids(&engine), vec!["n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_rule_change_resets_immediately() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        let sub = pool.subscription(0).await;
        sub.send(note("n1", "A", 100));
        sub.eose();
        settle(&mut engine).await;
        assert_eq!(engine.notes().len(), 1);

        // same rules, new feed value: nothing happens
        let mut same = engine.feed().unwrap().clone();
        same.name = "renamed".into();
        assert!(!engine.set_feed(same.clone()).await);
        assert_eq!(engine.notes().len(), 1);

        let mut changed = same;
        changed.rules[0].time_range = TimeRange::OneHour;
        assert!(engine.set_feed(changed).await);
        assert!(engine.notes().is_empty());
        assert_eq!(pool.unsubscribed(), vec!["sub-0"]);

        // a late event on the closed subscription never reaches the new store
        sub.send(note("late", "A", 500));
        let fresh = pool.subscription(1).await;
        fresh.eose();
        settle(&mut engine).await;
        assert!(engine.notes().is_empty());
    }

    #[tokio::test]
    async fn test_stale_generation_signals_are_dropped() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        let stale = engine.store().generation() - 1;
        engine.apply_signal(FeedSignal::new(
            stale,
            SignalPayload::Event {
                branch: 0,
                event: note("old", "A", 1),
            },
        ));
        assert!(engine.notes().is_empty());
    }

    #[tokio::test]
    async fn test_profiles_resolve_into_rendered_notes() {
        let pool = Arc::new(MockRelayPool::with_events([RawEvent::new(
            "meta",
            kinds::METADATA,
            "A",
            1,
        )
        .with_content(r#"{"name":"alice"}"#)]));
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        let sub = pool.subscription(0).await;
        sub.send(note("n1", "A", 100));
        sub.send(note("n2", "B", 90));
        sub.eose();
        settle(&mut engine).await;

        let resolved = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let items = engine.notes();
                let done = items.iter().all(|i| i.author != ProfileState::Pending);
                if done {
                    return items;
                }
                engine.next_change().await;
            }
        })
        .await
        .expect("profiles never resolved");

        assert_eq!(resolved[0].author_name(), "alice");
        assert_eq!(resolved[1].author, ProfileState::Unknown);
        assert_eq!(resolved[1].author_name(), "B...");
    }

    #[tokio::test]
    async fn test_malformed_profile_event_is_skipped() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = engine_with(pool.clone(), Verb::Posted, 10).await;
        let sub = pool.subscription(0).await;
        sub.send(note("n1", "A", 100));
        sub.send(RawEvent::new("m", kinds::METADATA, "A", 1).with_content("{oops"));
        sub.eose();
        settle(&mut engine).await;
        assert_eq!(engine.notes().len(), 1);
        assert!(engine.store().profile("A").is_none());
    }

    #[tokio::test]
    async fn test_nothing_loads_without_identity() {
        let pool = Arc::new(MockRelayPool::new());
        let mut engine = FeedEngine::new(pool.clone(), EngineConfig::default());
        engine.set_feed(Feed::new("test", vec![rule(Verb::Posted)])).await;
        assert!(!engine.load_more());
        assert_eq!(engine.state(), PageState::Idle);
        assert_eq!(pool.subscription_count(), 0);
    }
}
