//! Subscription fan-out for a feed's rules.
//!
//! Each query descriptor becomes one branch running on its own tokio task.
//! Branches never touch the store: they forward post-filtered events and a
//! single completion signal per round over the engine's channel.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::classifier::PostFilter;
use crate::compiler::{compile, CompileContext, Dereference, QueryDescriptor};
use crate::events::{FeedSignal, SignalPayload};
use crate::models::{FeedRule, RawEvent, Subject};
use crate::nostr::{RelayPool, RelaySubscription, SubscriptionItem};

/// Parameters for one round of subscriptions
#[derive(Debug, Clone, Copy)]
pub struct SubscribeRequest<'a> {
    pub rules: &'a [FeedRule],
    pub followed_pubkeys: &'a [String],
    pub group_members: Option<&'a [String]>,
    pub until: Option<u64>,
    pub batch_size: usize,
    pub generation: u64,
    pub round: u32,
}

/// Subscription ids opened since the last teardown. `epoch` counts
/// teardowns; a branch opened under an older epoch closes its own
/// subscription instead of registering it.
#[derive(Debug, Default)]
struct OpenSubscriptions {
    epoch: u64,
    ids: HashSet<String>,
}

pub struct SubscriptionCoordinator {
    pool: Arc<dyn RelayPool>,
    signals: mpsc::UnboundedSender<FeedSignal>,
    open: Arc<Mutex<OpenSubscriptions>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionCoordinator {
    pub fn new(pool: Arc<dyn RelayPool>, signals: mpsc::UnboundedSender<FeedSignal>) -> Self {
        Self {
            pool,
            signals,
            open: Arc::new(Mutex::new(OpenSubscriptions::default())),
            tasks: Vec::new(),
        }
    }

    /// Compile every rule and open one branch per descriptor. Earlier rounds
    /// stay open. Returns the number of branches started.
    pub fn subscribe(&mut self, request: SubscribeRequest<'_>) -> usize {
        let ctx = CompileContext {
            followed_pubkeys: request.followed_pubkeys,
            group_members: request.group_members,
            limit: request.batch_size,
            until: request.until,
            since: None,
        };

        let descriptors: Vec<QueryDescriptor> = request
            .rules
            .iter()
            .flat_map(|rule| compile(rule, &ctx))
            .collect();

        let epoch = self.open.lock().epoch;
        for (branch, descriptor) in descriptors.iter().cloned().enumerate() {
            debug!(
                branch,
                round = request.round,
                label = descriptor.label,
                chained = descriptor.dereference.is_some(),
                "Opening subscription branch"
            );
            let task = BranchTask {
                pool: self.pool.clone(),
                signals: self.signals.clone(),
                open: self.open.clone(),
                epoch,
                generation: request.generation,
                round: request.round,
                branch,
            };
            self.tasks.push(tokio::spawn(task.run(descriptor)));
        }
        descriptors.len()
    }

    /// Stop every branch task and close every subscription opened so far
    pub async fn unsubscribe_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let ids: Vec<String> = {
            let mut open = self.open.lock();
            open.epoch += 1;
            std::mem::take(&mut open.ids).into_iter().collect()
        };
        debug!(count = ids.len(), "Closing subscriptions");
        for id in ids {
            self.pool.unsubscribe(id).await;
        }
    }

    pub fn open_subscription_count(&self) -> usize {
        self.open.lock().ids.len()
    }
}

impl Drop for SubscriptionCoordinator {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// State of a chained (liked/reposted) branch
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChainState {
    /// Collecting target ids from engagement events
    AwaitingTargets { targets: Vec<String> },
    /// Dereference subscription is open
    AwaitingNotes,
    Complete,
}

struct BranchTask {
    pool: Arc<dyn RelayPool>,
    signals: mpsc::UnboundedSender<FeedSignal>,
    open: Arc<Mutex<OpenSubscriptions>>,
    epoch: u64,
    generation: u64,
    round: u32,
    branch: usize,
}

impl BranchTask {
    async fn run(self, descriptor: QueryDescriptor) {
        match descriptor.dereference {
            Some(dereference) => self.run_chained(descriptor, dereference).await,
            None => self.run_direct(descriptor).await,
        }
    }

    async fn open(&self, descriptor: &QueryDescriptor) -> Option<RelaySubscription> {
        match self.pool.subscribe(descriptor.filter.clone()).await {
            Ok(subscription) => {
                let registered = {
                    let mut open = self.open.lock();
                    let current = open.epoch == self.epoch;
                    if current {
                        open.ids.insert(subscription.id.clone());
                    }
                    current
                };
                if !registered {
                    debug!(branch = self.branch, id = %subscription.id, "Subscription opened after teardown, closing");
                    self.pool.unsubscribe(subscription.id).await;
                    return None;
                }
                Some(subscription)
            }
            Err(e) => {
                warn!(branch = self.branch, label = descriptor.label, "Failed to open subscription: {}", e);
                None
            }
        }
    }

    fn forward(&self, event: RawEvent) {
        let signal = FeedSignal::new(
            self.generation,
            SignalPayload::Event {
                branch: self.branch,
                event,
            },
        );
        if self.signals.send(signal).is_err() {
            trace!(branch = self.branch, "Engine gone, dropping event");
        }
    }

    fn complete(&self, received: usize, limit: usize) {
        debug!(branch = self.branch, round = self.round, received, limit, "Branch complete");
        let signal = FeedSignal::new(
            self.generation,
            SignalPayload::BranchComplete {
                round: self.round,
                branch: self.branch,
                received,
                limit,
            },
        );
        if self.signals.send(signal).is_err() {
            trace!(branch = self.branch, "Engine gone, dropping completion");
        }
    }

    /// Release engagement events held back during step one, then signal
    /// completion
    fn finish(&self, held: &mut Vec<RawEvent>, received: usize, limit: usize) {
        for event in held.drain(..) {
            self.forward(event);
        }
        self.complete(received, limit);
    }

    /// Forward events until end-of-stored-events, signal completion, then
    /// keep forwarding live events until the subscription closes
    async fn run_direct(self, descriptor: QueryDescriptor) {
        let limit = descriptor.filter.limit.unwrap_or(0);
        let Some(mut subscription) = self.open(&descriptor).await else {
            self.complete(0, limit);
            return;
        };

        let mut received = 0;
        let mut completed = false;
        while let Some(item) = subscription.items.recv().await {
            match item {
                SubscriptionItem::Event(event) => {
                    if !descriptor.post_filter.accepts(&event) {
                        trace!(branch = self.branch, id = %event.id, "Dropped by post-filter");
                        continue;
                    }
                    if !completed {
                        received += 1;
                    }
                    self.forward(event);
                }
                SubscriptionItem::EndOfStoredEvents => {
                    if !completed {
                        completed = true;
                        self.complete(received, limit);
                    }
                }
            }
        }
        if !completed {
            self.complete(received, limit);
        }
    }

    /// Two-step branch: engagement events first, then the notes they point
    /// at. Completion is signalled once, after the second step's
    /// end-of-stored-events, or right away when step one found no targets.
    ///
    /// Stored reposts are held until their notes have been forwarded, since
    /// a repost only counts against a note that is already in the store.
    /// Likes are forwarded straight away.
    async fn run_chained(self, descriptor: QueryDescriptor, dereference: Dereference) {
        let limit = descriptor.filter.limit.unwrap_or(0);
        let subject = descriptor.post_filter.subject().unwrap_or(Subject::Post);
        let Some(mut engagement) = self.open(&descriptor).await else {
            self.complete(0, limit);
            return;
        };

        let mut notes: Option<RelaySubscription> = None;
        let mut engagement_open = true;
        let mut received = 0;
        let hold_engagement = dereference == Dereference::RepostedNotes;
        let mut held: Vec<RawEvent> = Vec::new();
        let mut state = ChainState::AwaitingTargets {
            targets: Vec::new(),
        };

        loop {
            let step_one_done = tokio::select! {
                item = engagement.items.recv(), if engagement_open => match item {
                    Some(SubscriptionItem::Event(event)) => {
                        let collecting = match &mut state {
                            ChainState::AwaitingTargets { targets } => {
                                received += 1;
                                if let Some(target) = dereference.target(&event) {
                                    if !targets.iter().any(|t| t == target) {
                                        targets.push(target.to_string());
                                    }
                                }
                                true
                            }
                            _ => false,
                        };
                        if collecting && hold_engagement {
                            held.push(event);
                        } else {
                            self.forward(event);
                        }
                        false
                    }
                    Some(SubscriptionItem::EndOfStoredEvents) => true,
                    None => {
                        engagement_open = false;
                        true
                    }
                },
                item = next_item(&mut notes), if notes.is_some() => {
                    match item {
                        Some(SubscriptionItem::Event(event)) => {
                            if PostFilter::Subject(subject).accepts(&event) {
                                self.forward(event);
                            }
                        }
                        Some(SubscriptionItem::EndOfStoredEvents) => {
                            if state == ChainState::AwaitingNotes {
                                state = ChainState::Complete;
                                self.finish(&mut held, received, limit);
                            }
                        }
                        None => {
                            notes = None;
                            if state == ChainState::AwaitingNotes {
                                state = ChainState::Complete;
                                self.finish(&mut held, received, limit);
                            }
                        }
                    }
                    false
                },
                else => break,
            };

            if step_one_done {
                if let ChainState::AwaitingTargets { targets } = &mut state {
                    let targets = std::mem::take(targets);
                    state = match self.dereference(dereference, subject, targets).await {
                        Some(subscription) => {
                            notes = Some(subscription);
                            ChainState::AwaitingNotes
                        }
                        None => {
                            self.finish(&mut held, received, limit);
                            ChainState::Complete
                        }
                    };
                }
            }
        }
    }

    /// Open the second step. `None` when there is nothing to look up or the
    /// subscription could not be opened.
    async fn dereference(
        &self,
        dereference: Dereference,
        subject: Subject,
        targets: Vec<String>,
    ) -> Option<RelaySubscription> {
        if targets.is_empty() {
            debug!(branch = self.branch, "No targets to dereference");
            return None;
        }

        debug!(branch = self.branch, targets = targets.len(), ?dereference, "Dereferencing targets");
        let step_two = QueryDescriptor {
            label: "targets",
            filter: dereference.filter(targets, subject),
            post_filter: PostFilter::Subject(subject),
            dereference: None,
        };
        self.open(&step_two).await
    }
}

async fn next_item(subscription: &mut Option<RelaySubscription>) -> Option<SubscriptionItem> {
    match subscription {
        Some(sub) => sub.items.recv().await,
        None => std::future::pending().await,
    }
}
