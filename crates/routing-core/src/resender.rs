//! Time-ordered retry scheduling for whole trees. One `Resender` serves
//! every tree created against the same protocol instance; each tree enters
//! and leaves its queue independently of the others.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, ErrorCode};
use crate::policy::RetryPolicy;
use crate::tree::RoutingTree;

struct QueueEntry {
    at: Instant,
    tree: Arc<Mutex<RoutingTree>>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// Reversed, so the `BinaryHeap` (a max-heap) pops the earliest-due
    /// entry first.
    fn cmp(&self, other: &Self) -> Ordering {
        other.at.cmp(&self.at)
    }
}

/// Schedules and replays retries for trees whose root carries only
/// retryable errors. Owns a queue mutex distinct from any tree's own, so
/// that scheduling a retry never has to re-lock the tree it was just handed
/// already-locked.
pub struct Resender {
    policy: Arc<dyn RetryPolicy>,
    queue: Mutex<BinaryHeap<QueueEntry>>,
}

impl Resender {
    #[must_use]
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Arc<Self> {
        Arc::new(Self { policy, queue: Mutex::new(BinaryHeap::new()) })
    }

    #[must_use]
    pub fn can_retry(&self, code: ErrorCode) -> bool {
        self.policy.can_retry(code)
    }

    /// Attempts to schedule another attempt for `tree`'s root. `tree` is
    /// already locked by the caller (typically mid-`notifyParent` on the
    /// root) and `handle` is the `Arc` that guards it; scheduling pushes
    /// `handle` onto the internal queue without taking `tree`'s own lock
    /// again. Returns whether scheduling succeeded — `false` means the
    /// caller should fall back to delivering whatever reply is already set.
    pub(crate) fn try_schedule_retry(&self, tree: &mut RoutingTree, handle: Arc<Mutex<RoutingTree>>) -> bool {
        if !tree.message().retry_enabled() {
            return false;
        }
        let root = tree.root;
        let attempt = tree.message().retry() + 1;
        let override_delay = tree.nodes[root.0].reply.as_ref().map(|r| r.retry_delay()).unwrap_or(-1.0);
        let delay_secs = if override_delay >= 0.0 { override_delay } else { self.policy.delay(attempt) };
        let delay = Duration::from_secs_f64(delay_secs.max(0.0));

        if tree.message().time_remaining_now() <= delay {
            tree.set_error(root, Error::new(ErrorCode::TIMEOUT, "Timed out waiting for the next retry."));
            return false;
        }

        tree.prepare_for_retry(root);
        tree.message.set_retry(attempt);
        let at = Instant::now() + delay;
        self.queue.lock().expect("resender queue mutex poisoned").push(QueueEntry { at, tree: handle });
        true
    }

    /// Pops every entry whose scheduled time has arrived and re-sends it.
    /// Meant to be polled periodically by the surrounding runtime (an
    /// interval task, a timer wheel tick — this crate is agnostic to which).
    pub fn resend_scheduled(&self) {
        let due = {
            let mut queue = self.queue.lock().expect("resender queue mutex poisoned");
            let now = Instant::now();
            let mut due = Vec::new();
            while matches!(queue.peek(), Some(entry) if entry.at <= now) {
                due.push(queue.pop().expect("just peeked").tree);
            }
            due
        };
        for tree in due {
            RoutingTree::send(&tree);
        }
    }

    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.queue.lock().expect("resender queue mutex poisoned").len()
    }

    /// Spawns a background task that calls [`Self::resend_scheduled`] on a
    /// fixed tick, for callers that would rather hand the resender a runtime
    /// than poll it themselves. The returned handle outlives neither `self`
    /// nor the runtime it was spawned on; aborting it (or dropping the last
    /// `Arc<Resender>`) stops the polling, it does not flush the queue —
    /// any trees still pending get their reply delivered by
    /// [`Resender`]'s `Drop` impl instead.
    pub fn spawn_poll_task(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let resender = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                resender.resend_scheduled();
            }
        })
    }
}

impl Drop for Resender {
    /// Trees still queued at this point never get their scheduled retry;
    /// each is discarded instead of silently dropped, so its discard
    /// handler (if any) still runs.
    fn drop(&mut self) {
        let mut queue = self.queue.lock().expect("resender queue mutex poisoned");
        while let Some(entry) = queue.pop() {
            RoutingTree::discard(&entry.tree);
        }
    }
}
