use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::models::tag_utils::{all_tag_values, marked_reference};
use crate::models::{Note, RawEvent};
use crate::nostr::RelayPool;

/// Ancestors of a note, keyed by id. `truncated` is set when the walk hit
/// the depth bound with references still unexplored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadAncestors {
    pub parents: HashMap<String, Note>,
    pub truncated: bool,
}

/// Thread state as a note-detail view reads it
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadView {
    pub parent_notes: HashMap<String, Note>,
    pub loading: bool,
    pub error: Option<String>,
    pub truncated: bool,
}

impl ThreadView {
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Default::default()
        }
    }

    /// Ancestors oldest first, the order a thread is read in
    pub fn chain(&self) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self.parent_notes.values().collect();
        notes.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id.cmp(&b.id)));
        notes
    }
}

/// Ids to walk up to from `event`. With NIP-10 markers that is the root and
/// the direct parent; without markers every `e` tag is a candidate.
pub fn ancestor_refs(event: &RawEvent) -> Vec<&str> {
    let root = marked_reference(&event.tags, "root");
    let reply = marked_reference(&event.tags, "reply");
    if root.is_none() && reply.is_none() {
        return all_tag_values(&event.tags, "e");
    }
    let mut refs: Vec<&str> = root.into_iter().chain(reply).collect();
    refs.dedup();
    refs
}

pub struct ThreadResolver {
    pool: Arc<dyn RelayPool>,
    timeout: Duration,
    max_depth: usize,
}

impl ThreadResolver {
    pub fn new(pool: Arc<dyn RelayPool>, timeout: Duration, max_depth: usize) -> Self {
        Self {
            pool,
            timeout,
            max_depth,
        }
    }

    /// Walk reference tags upward, one level of fetches at a time. A note
    /// that names a root stops the walk at that root. Failed fetches end
    /// only their own branch.
    pub async fn resolve_ancestors(&self, event: &RawEvent) -> ThreadAncestors {
        let mut visited: HashSet<String> = HashSet::from([event.id.clone()]);
        let mut parents = HashMap::new();
        let mut frontier = unvisited(ancestor_refs(event), &mut visited);
        let mut depth = 0;

        while !frontier.is_empty() {
            if depth >= self.max_depth {
                debug!(note = %event.id, depth, remaining = frontier.len(), "Thread walk truncated");
                return ThreadAncestors {
                    parents,
                    truncated: true,
                };
            }
            depth += 1;

            let fetches = frontier.iter().map(|id| self.pool.fetch_by_id(id, self.timeout));
            let results = join_all(fetches).await;

            let mut next = Vec::new();
            for (id, result) in frontier.iter().zip(results) {
                match result {
                    Ok(Some(ancestor)) => {
                        let refs = match marked_reference(&ancestor.tags, "root") {
                            Some(root) => vec![root],
                            None => ancestor_refs(&ancestor),
                        };
                        next.extend(unvisited(refs, &mut visited));
                        parents.insert(id.clone(), Note::bare(ancestor));
                    }
                    Ok(None) => debug!(id = %id, "Ancestor not found"),
                    Err(e) => debug!(id = %id, "Ancestor fetch failed: {}", e),
                }
            }
            frontier = next;
        }

        ThreadAncestors {
            parents,
            truncated: false,
        }
    }

    /// Fetch a note by id and resolve its ancestors into a view. A missing
    /// note is the one error surfaced.
    pub async fn load_view(&self, note_id: &str) -> ThreadView {
        let event = match self.pool.fetch_by_id(note_id, self.timeout).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                return ThreadView {
                    error: Some(FeedError::NoteNotFound { id: note_id.to_string() }.to_string()),
                    ..Default::default()
                }
            }
            Err(e) => {
                warn!(id = note_id, "Failed to fetch thread note: {}", e);
                return ThreadView {
                    error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let ancestors = self.resolve_ancestors(&event).await;
        ThreadView {
            parent_notes: ancestors.parents,
            loading: false,
            error: None,
            truncated: ancestors.truncated,
        }
    }
}

fn unvisited(refs: Vec<&str>, visited: &mut HashSet<String>) -> Vec<String> {
    refs.into_iter()
        .filter(|id| visited.insert(id.to_string()))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::kinds;
    use crate::nostr::mock::MockRelayPool;

    fn note(id: &str, created_at: u64) -> RawEvent {
        RawEvent::new(id, kinds::TEXT_NOTE, "A", created_at)
    }

    fn resolver(pool: Arc<MockRelayPool>, depth: usize) -> ThreadResolver {
        ThreadResolver::new(pool, Duration::from_secs(1), depth)
    }

    fn keys(ancestors: &ThreadAncestors) -> Vec<&str> {
        let mut keys: Vec<&str> = ancestors.parents.keys().map(String::as_str).collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_walk_stops_at_root() {
        let pool = Arc::new(MockRelayPool::with_events([
            note("root1", 1),
            note("parent1", 2).with_tag(["e", "root1", "", "root"]),
        ]));
        let start = note("leaf", 3)
            .with_tag(["e", "root1", "", "root"])
            .with_tag(["e", "parent1", "", "reply"]);

        let ancestors = resolver(pool.clone(), 10).resolve_ancestors(&start).await;
        assert_eq!(keys(&ancestors), vec!["parent1", "root1"]);
        assert!(!ancestors.truncated);
        assert_eq!(pool.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let pool = Arc::new(MockRelayPool::with_events([
            note("a", 1).with_tag(["e", "b"]),
            note("b", 2).with_tag(["e", "a"]),
        ]));
        let start = note("c", 3).with_tag(["e", "a"]);
        let ancestors = resolver(pool, 10).resolve_ancestors(&start).await;
        assert_eq!(keys(&ancestors), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_depth_bound_truncates() {
        let mut events = Vec::new();
        for i in 0..15u64 {
            let mut e = note(&format!("n{}", i), i);
            if i > 0 {
                e = e.with_tag(["e".to_string(), format!("n{}", i - 1)]);
            }
            events.push(e);
        }
        let pool = Arc::new(MockRelayPool::with_events(events));
        let start = note("leaf", 100).with_tag(["e", "n14"]);

        let ancestors = resolver(pool, 10).resolve_ancestors(&start).await;
        assert_eq!(ancestors.parents.len(), 10);
        assert!(ancestors.truncated);
        assert!(ancestors.parents.contains_key("n5"));
        assert!(!ancestors.parents.contains_key("n4"));
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_stop_siblings() {
        let pool = Arc::new(MockRelayPool::with_events([
            note("root1", 1),
            note("parent1", 2).with_tag(["e", "root1", "", "root"]),
        ]));
        pool.fail_id("parent1");
        let start = note("leaf", 3)
            .with_tag(["e", "root1", "", "root"])
            .with_tag(["e", "parent1", "", "reply"]);

        let ancestors = resolver(pool, 10).resolve_ancestors(&start).await;
        assert_eq!(keys(&ancestors), vec!["root1"]);
    }

    #[tokio::test]
    async fn test_view_reports_missing_note() {
        let pool = Arc::new(MockRelayPool::new());
        let view = resolver(pool, 10).load_view("nope").await;
        assert!(view.error.unwrap().contains("nope"));
        assert!(!view.loading);
        assert!(view.parent_notes.is_empty());

        assert!(ThreadView::loading().loading);
    }

    #[tokio::test]
    async fn test_view_orders_chain_oldest_first() {
        let pool = Arc::new(MockRelayPool::with_events([
            note("root1", 1),
            note("parent1", 2).with_tag(["e", "root1", "", "root"]),
            note("leaf", 3)
                .with_tag(["e", "root1", "", "root"])
                .with_tag(["e", "parent1", "", "reply"]),
        ]));
        let view = resolver(pool, 10).load_view("leaf").await;
        let chain: Vec<&str> = view.chain().into_iter().map(|n| n.id.as_str()).collect();
        assert_eq!(chain, vec!["root1", "parent1"]);
    }
}
