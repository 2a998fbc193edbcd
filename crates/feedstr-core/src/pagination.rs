use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    /// No subscription round has started
    Idle,
    /// At least one branch of the current round has not completed
    Loading,
    /// Every branch of the current round completed
    Settled,
}

/// Backfill cursor and per-round completion bookkeeping.
///
/// `until` is the watermark for the next round. It only ever moves back in
/// time for a given feed; `None` means "up to now".
#[derive(Debug)]
pub struct PaginationController {
    state: PageState,
    until: Option<u64>,
    round: u32,
    pending: HashSet<usize>,
    // any branch of the current round filled its limit
    any_full: bool,
    has_more: bool,
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new()
    }
}

impl PaginationController {
    pub fn new() -> Self {
        Self {
            state: PageState::Idle,
            until: None,
            round: 0,
            pending: HashSet::new(),
            any_full: false,
            has_more: true,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn is_loading(&self) -> bool {
        self.state == PageState::Loading
    }

    pub fn until(&self) -> Option<u64> {
        self.until
    }

    /// False once every branch of the last settled round came back short
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Back to `Idle` with an open cursor. The round counter keeps counting
    /// so completions from before the reset never match a new round.
    pub fn reset(&mut self) {
        self.state = PageState::Idle;
        self.until = None;
        self.pending.clear();
        self.any_full = false;
        self.has_more = true;
    }

    /// Watermark for the next round. The first round is unbounded; later
    /// rounds ask for events strictly older than the oldest note held.
    pub fn next_until(&self, oldest: Option<u64>) -> Option<u64> {
        if self.state == PageState::Idle {
            return self.until;
        }
        let Some(oldest) = oldest else {
            return self.until;
        };
        let candidate = oldest.saturating_sub(1);
        Some(self.until.map_or(candidate, |current| current.min(candidate)))
    }

    /// Enter `Loading` for a new round. Returns the round number, or `None`
    /// if a round is already loading. Call `expect_branches` once the
    /// round's subscriptions are open.
    pub fn begin_round(&mut self, until: Option<u64>) -> Option<u32> {
        if self.state == PageState::Loading {
            return None;
        }
        self.round += 1;
        self.until = match (self.until, until) {
            (Some(current), Some(next)) => Some(current.min(next)),
            (current, next) => next.or(current),
        };
        self.pending.clear();
        self.any_full = false;
        self.state = PageState::Loading;
        debug!(round = self.round, until = ?self.until, "Page round started");
        Some(self.round)
    }

    /// Number of branches the current round waits for. A round with no
    /// branches settles immediately.
    pub fn expect_branches(&mut self, branches: usize) {
        self.pending = (0..branches).collect();
        if branches == 0 && self.state == PageState::Loading {
            self.settle();
        }
    }

    /// Record one branch's completion. Returns true when this completion
    /// settled the round.
    pub fn on_branch_complete(&mut self, round: u32, branch: usize, received: usize, limit: usize) -> bool {
        if round != self.round || self.state != PageState::Loading {
            return false;
        }
        if !self.pending.remove(&branch) {
            return false;
        }
        if limit > 0 && received >= limit {
            self.any_full = true;
        }
        if self.pending.is_empty() {
            self.settle();
            return true;
        }
        false
    }

    fn settle(&mut self) {
        self.state = PageState::Settled;
        self.has_more = self.any_full;
        debug!(round = self.round, has_more = self.has_more, "Page round settled");
    }
}
