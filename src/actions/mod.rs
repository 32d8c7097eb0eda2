//! Action-synchronization tracking
//!
//! The intercepted API reconciles pending input state through a per-session
//! synchronization call, and certain events are only legal to deliver
//! within a window opened by that call. This module tracks that window as
//! an atomic tri-state on the session, so the event-polling path can
//! read and update it without taking the session lock:
//!
//! - `NotCalledSinceQueueExhaust`: the event queue has been drained and no
//!   synchronization has completed since
//! - `CalledSinceQueueExhaust`: a synchronization call finished after the
//!   last drain
//! - `Ongoing`: a synchronization call is currently in flight
//!
//! Draining the queue only moves `CalledSinceQueueExhaust` back to
//! `NotCalledSinceQueueExhaust` via compare-and-swap; while a sync is
//! `Ongoing` the drain is a no-op so it cannot clobber the in-flight call.
//! Under true concurrency this is a best-effort heuristic: a sync racing a
//! drain may leave the window open one poll longer than strictly implied.
//! That approximation is part of the tracked contract and is deliberately
//! not strengthened.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::api::{ActionKind, ApiResult};
use crate::report::Reporter;

/// Tri-state of the input-synchronization window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncPhase {
    NotCalledSinceQueueExhaust = 0,
    CalledSinceQueueExhaust = 1,
    Ongoing = 2,
}

impl SyncPhase {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SyncPhase::NotCalledSinceQueueExhaust,
            1 => SyncPhase::CalledSinceQueueExhaust,
            _ => SyncPhase::Ongoing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::NotCalledSinceQueueExhaust => "NOT_CALLED_SINCE_QUEUE_EXHAUST",
            SyncPhase::CalledSinceQueueExhaust => "CALLED_SINCE_QUEUE_EXHAUST",
            SyncPhase::Ongoing => "ONGOING",
        }
    }
}

/// Atomic holder of the session's [`SyncPhase`].
pub struct SyncStatus(AtomicU8);

impl SyncStatus {
    pub fn new() -> Self {
        Self(AtomicU8::new(SyncPhase::NotCalledSinceQueueExhaust as u8))
    }

    pub fn load(&self) -> SyncPhase {
        SyncPhase::from_raw(self.0.load(Ordering::Acquire))
    }

    /// A synchronization call entered the runtime.
    pub fn begin_sync(&self) {
        self.0.store(SyncPhase::Ongoing as u8, Ordering::Release);
    }

    /// The synchronization call returned, with any outcome.
    pub fn finish_sync(&self) {
        self.0
            .store(SyncPhase::CalledSinceQueueExhaust as u8, Ordering::Release);
    }

    /// The event queue was polled to exhaustion. Only closes the window if
    /// a completed sync opened it; an in-flight sync is left alone.
    pub fn on_queue_exhausted(&self) {
        let _ = self.0.compare_exchange(
            SyncPhase::CalledSinceQueueExhaust as u8,
            SyncPhase::NotCalledSinceQueueExhaust as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Whether delivering an interaction-sources-changed event is legal
    /// right now.
    pub fn interaction_event_allowed(&self) -> bool {
        self.load() != SyncPhase::NotCalledSinceQueueExhaust
    }

    /// Validate delivery of the interaction-sources-changed event.
    pub fn check_interaction_event(&self, call: &str, reporter: &Reporter) {
        if !self.interaction_event_allowed() {
            reporter.nonconformant(
                call,
                "interaction-sources-changed event delivered, but no input \
                 synchronization has completed since the event queue was last exhausted",
            );
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom state for an action-set handle.
pub struct ActionSetTracker {
    last_sync_result: Mutex<Option<ApiResult>>,
}

impl ActionSetTracker {
    pub fn new() -> Self {
        Self {
            last_sync_result: Mutex::new(None),
        }
    }

    /// Record the outcome of a synchronization call that included this set.
    pub fn record_sync_result(&self, result: ApiResult) {
        *self.last_sync_result.lock() = Some(result);
    }

    pub fn last_sync_result(&self) -> Option<ApiResult> {
        *self.last_sync_result.lock()
    }
}

impl Default for ActionSetTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom state for an action handle: the declared kind and the raw value
/// of the set it was created under, kept for creation-time cross-checks.
pub struct ActionTracker {
    kind: ActionKind,
    owner_set: u64,
}

impl ActionTracker {
    pub fn new(kind: ActionKind, owner_set: u64) -> Self {
        Self { kind, owner_set }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn owner_set(&self) -> u64 {
        self.owner_set
    }
}
