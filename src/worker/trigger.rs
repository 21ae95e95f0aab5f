//! Per-chat single-flight table.
//!
//! Each chat id maps to at most one [`TriggerState`]. Check-and-set happens
//! under the map's entry lock, so two requests for the same chat can never
//! both acquire it. A [`TriggerGuard`] clears its own in-flight marker when
//! dropped, on every exit path.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    InFlight { run_id: Uuid, started_at: Instant },
    Completed { finished_at: Instant },
}

/// Outcome of a check-and-set attempt.
#[derive(Debug)]
pub enum Acquire {
    Acquired(TriggerGuard),
    AlreadyRunning,
    AlreadySummarized,
}

#[derive(Debug)]
struct Inner {
    states: DashMap<String, TriggerState>,
    released: Notify,
    stale_after: Duration,
    dedup_window: Duration,
}

#[derive(Debug, Clone)]
pub struct TriggerTable {
    inner: Arc<Inner>,
}

impl TriggerTable {
    #[must_use]
    pub fn new(stale_after: Duration, dedup_window: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                states: DashMap::new(),
                released: Notify::new(),
                stale_after,
                dedup_window,
            }),
        }
    }

    /// Atomically check the chat's marker and claim it if allowed.
    ///
    /// Refused while a run is in flight or completed inside the dedup window.
    /// An in-flight marker older than the stale timeout is treated as absent
    /// and replaced.
    #[must_use]
    pub fn try_acquire(&self, chat_id: &str) -> Acquire {
        match self.claim(chat_id, false) {
            Ok(guard) => Acquire::Acquired(guard),
            Err(TriggerState::InFlight { .. }) => Acquire::AlreadyRunning,
            Err(TriggerState::Completed { .. }) => Acquire::AlreadySummarized,
        }
    }

    /// Like [`try_acquire`](Self::try_acquire) but ignores completion
    /// markers. Returns `None` while another run is in flight.
    #[must_use]
    pub fn try_acquire_forced(&self, chat_id: &str) -> Option<TriggerGuard> {
        self.claim(chat_id, true).ok()
    }

    /// Drop completion markers whose dedup window has passed. Returns how
    /// many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.inner.dedup_window;
        let before = self.inner.states.len();
        self.inner.states.retain(|_, state| match *state {
            TriggerState::Completed { finished_at } => now.duration_since(finished_at) < window,
            TriggerState::InFlight { .. } => true,
        });
        before.saturating_sub(self.inner.states.len())
    }

    /// Number of chats holding any marker.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.states.is_empty()
    }

    /// Err carries the marker that blocked the claim.
    fn claim(&self, chat_id: &str, forced: bool) -> Result<TriggerGuard, TriggerState> {
        self.prune_expired();

        let now = Instant::now();
        let run_id = Uuid::new_v4();
        let claim = TriggerState::InFlight {
            run_id,
            started_at: now,
        };

        match self.inner.states.entry(chat_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(claim);
            }
            Entry::Occupied(mut slot) => {
                let current = *slot.get();
                match current {
                    TriggerState::InFlight { started_at, .. }
                        if now.duration_since(started_at) < self.inner.stale_after =>
                    {
                        return Err(current);
                    }
                    TriggerState::InFlight {
                        run_id: stale,
                        started_at,
                    } => {
                        warn!(
                            chat_id,
                            stale_run_id = %stale,
                            age_secs = now.duration_since(started_at).as_secs(),
                            "Replacing stale in-flight marker"
                        );
                        slot.insert(claim);
                    }
                    TriggerState::Completed { finished_at }
                        if !forced && now.duration_since(finished_at) < self.inner.dedup_window =>
                    {
                        return Err(current);
                    }
                    TriggerState::Completed { .. } => {
                        slot.insert(claim);
                    }
                }
            }
        }

        Ok(TriggerGuard {
            table: self.clone(),
            chat_id: chat_id.to_string(),
            run_id,
            succeeded: false,
        })
    }

    /// Current marker for a chat, if any.
    #[must_use]
    pub fn state(&self, chat_id: &str) -> Option<TriggerState> {
        self.inner.states.get(chat_id).map(|s| *s)
    }

    /// Number of chats with a live in-flight marker.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner
            .states
            .iter()
            .filter(|s| matches!(*s.value(), TriggerState::InFlight { .. }))
            .count()
    }

    /// Resolves after some guard has been released, or after `max_wait`.
    pub async fn wait_for_release(&self, max_wait: Duration) {
        let _ = tokio::time::timeout(max_wait, self.inner.released.notified()).await;
    }

    fn release(&self, chat_id: &str, run_id: Uuid, succeeded: bool) {
        if let Entry::Occupied(mut slot) = self.inner.states.entry(chat_id.to_string()) {
            let ours = matches!(
                *slot.get(),
                TriggerState::InFlight { run_id: current, .. } if current == run_id
            );
            // A stale takeover owns the marker now; leave it alone.
            if ours {
                if succeeded && !self.inner.dedup_window.is_zero() {
                    slot.insert(TriggerState::Completed {
                        finished_at: Instant::now(),
                    });
                } else {
                    slot.remove();
                }
            }
        }
        self.inner.released.notify_waiters();
    }
}

/// Claim on a chat id. Dropping it clears the in-flight marker.
#[derive(Debug)]
pub struct TriggerGuard {
    table: TriggerTable,
    chat_id: String,
    run_id: Uuid,
    succeeded: bool,
}

impl TriggerGuard {
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Record a completed run so repeats inside the dedup window are refused.
    pub fn mark_succeeded(&mut self) {
        self.succeeded = true;
    }
}

impl Drop for TriggerGuard {
    fn drop(&mut self) {
        self.table.release(&self.chat_id, self.run_id, self.succeeded);
    }
}
