//! Session lifecycle state machine
//!
//! Tracks one session's observed lifecycle and cross-checks every related
//! call against it. The tracker mirrors the runtime rather than
//! gate-keeping it: an illegal transition is flagged but still recorded as
//! the new current phase, so later checks judge the runtime against what
//! it actually reported.
//!
//! All mutable fields live under a single per-session mutex. The one
//! exception is the input-synchronization tri-state, which is a separate
//! atomic so the event path can consult it without the session lock
//! (see [`crate::actions`]).
//!
//! The end-frame wrapper deliberately holds the session lock across the
//! forwarded call: the frame-counter increment must be atomic with respect
//! to concurrently delivered phase-change notifications.

use log::debug;
use parking_lot::Mutex;
use std::fmt::Display;

use crate::actions::SyncStatus;
use crate::api::{ApiResult, ReferenceSpaceKind, RuntimeDuration, RuntimeTime, SessionPhase};
use crate::report::Reporter;

/// Legal phase transitions besides the universal edge into `LossPending`.
pub fn transition_allowed(from: SessionPhase, to: SessionPhase) -> bool {
    use SessionPhase::*;
    if to == LossPending {
        return true;
    }
    matches!(
        (from, to),
        (Unknown, Idle)
            | (Idle, Ready)
            | (Ready, Synchronized)
            | (Ready, Idle)
            | (Synchronized, Idle)
            | (Synchronized, Visible)
            | (Visible, Focused)
            | (Focused, Visible)
            | (Visible, Synchronized)
            | (Synchronized, Stopping)
            | (Stopping, Idle)
            | (Idle, Exiting)
    )
}

#[derive(Debug)]
struct SessionFields {
    phase: SessionPhase,
    begun: bool,
    exit_requested: bool,
    frame_begun: bool,
    headless: bool,
    last_predicted_display_time: RuntimeTime,
    last_predicted_period: RuntimeDuration,
    frame_count: u64,
    reference_spaces: Option<Vec<ReferenceSpaceKind>>,
    swapchain_formats: Option<Vec<i64>>,
}

/// Custom state for a session handle.
pub struct SessionTracker {
    inner: Mutex<SessionFields>,
    sync_status: SyncStatus,
}

impl SessionTracker {
    pub fn new(headless: bool) -> Self {
        Self {
            inner: Mutex::new(SessionFields {
                phase: SessionPhase::Unknown,
                begun: false,
                exit_requested: false,
                frame_begun: false,
                headless,
                last_predicted_display_time: 0,
                last_predicted_period: 0,
                frame_count: 0,
                reference_spaces: None,
                swapchain_formats: None,
            }),
            sync_status: SyncStatus::new(),
        }
    }

    /// The input-synchronization tri-state, readable without the session
    /// lock.
    pub fn sync_status(&self) -> &SyncStatus {
        &self.sync_status
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock().phase
    }

    pub fn frame_count(&self) -> u64 {
        self.inner.lock().frame_count
    }

    pub fn is_begun(&self) -> bool {
        self.inner.lock().begun
    }

    /// Handle an observed phase-change notification.
    pub fn on_phase_changed(&self, call: &str, new_phase: SessionPhase, reporter: &Reporter) {
        let mut fields = self.inner.lock();
        let old_phase = fields.phase;

        if !transition_allowed(old_phase, new_phase) {
            reporter.nonconformant(
                call,
                format!(
                    "illegal session phase transition {} -> {}",
                    old_phase, new_phase
                ),
            );
        }

        match new_phase {
            SessionPhase::Synchronized => {
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "session reached SYNCHRONIZED without ever being begun",
                    );
                } else if fields.frame_count == 0 && !fields.exit_requested && !fields.headless {
                    reporter.possibly_nonconformant(
                        call,
                        "session reached SYNCHRONIZED with zero submitted frames",
                    );
                }
            }
            SessionPhase::Idle => {
                if fields.begun {
                    reporter.nonconformant(call, "session returned to IDLE while still begun");
                }
            }
            _ => {}
        }

        debug!("session phase {} -> {}", old_phase, new_phase);
        fields.phase = new_phase;
    }

    /// Cross-check the result of a begin-session call.
    pub fn on_begin(&self, call: &str, result: ApiResult, reporter: &Reporter) {
        let mut fields = self.inner.lock();
        match result {
            r if r.is_success() => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "begin succeeded while the session was already begun \
                         (expected ERROR_SESSION_RUNNING)",
                    );
                }
                if fields.phase != SessionPhase::Ready {
                    reporter.possibly_nonconformant(
                        call,
                        format!(
                            "begin succeeded while the last observed phase was {} \
                             (expected READY)",
                            fields.phase
                        ),
                    );
                }
                fields.begun = true;
                fields.frame_count = 0;
                fields.exit_requested = false;
            }
            ApiResult::ErrorSessionRunning => {
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_RUNNING but the session was not begun",
                    );
                }
            }
            ApiResult::ErrorSessionNotReady => {
                if fields.phase == SessionPhase::Ready {
                    reporter.possibly_nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_READY while the last \
                         observed phase was READY",
                    );
                }
            }
            _ => {}
        }
    }

    /// Cross-check the result of an end-session call.
    pub fn on_end(&self, call: &str, result: ApiResult, reporter: &Reporter) {
        let mut fields = self.inner.lock();
        match result {
            r if r.is_success() => {
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "end succeeded while the session was not begun \
                         (expected ERROR_SESSION_NOT_RUNNING)",
                    );
                }
                if fields.phase != SessionPhase::Stopping {
                    reporter.possibly_nonconformant(
                        call,
                        format!(
                            "end succeeded while the last observed phase was {} \
                             (expected STOPPING)",
                            fields.phase
                        ),
                    );
                }
                fields.begun = false;
                fields.frame_begun = false;
                fields.exit_requested = false;
            }
            ApiResult::ErrorSessionNotRunning => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_RUNNING but the session was begun",
                    );
                }
            }
            _ => {}
        }
    }

    /// Cross-check the result of a request-exit call.
    pub fn on_request_exit(&self, call: &str, result: ApiResult, reporter: &Reporter) {
        let mut fields = self.inner.lock();
        match result {
            r if r.is_success() => {
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "exit request succeeded while the session was not begun \
                         (expected ERROR_SESSION_NOT_RUNNING)",
                    );
                }
                fields.exit_requested = true;
            }
            ApiResult::ErrorSessionNotRunning => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_RUNNING but the session was begun",
                    );
                }
            }
            _ => {}
        }
    }

    /// Cross-check the result of a wait-frame call. The predicted display
    /// time must strictly advance between successful calls.
    pub fn on_wait_frame(
        &self,
        call: &str,
        result: ApiResult,
        predicted_display_time: RuntimeTime,
        predicted_period: RuntimeDuration,
        reporter: &Reporter,
    ) {
        let mut fields = self.inner.lock();
        match result {
            r if r.is_success() => {
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "wait-frame succeeded while the session was not begun",
                    );
                }
                if predicted_display_time <= 0 {
                    reporter.nonconformant(
                        call,
                        format!(
                            "non-positive predicted display time {}",
                            predicted_display_time
                        ),
                    );
                } else if fields.last_predicted_display_time != 0
                    && predicted_display_time <= fields.last_predicted_display_time
                {
                    reporter.nonconformant(
                        call,
                        format!(
                            "predicted display time did not advance: {} after {}",
                            predicted_display_time, fields.last_predicted_display_time
                        ),
                    );
                }
                fields.last_predicted_display_time = predicted_display_time;
                fields.last_predicted_period = predicted_period;
            }
            ApiResult::ErrorSessionNotRunning => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_RUNNING but the session was begun",
                    );
                }
            }
            _ => {}
        }
    }

    /// Cross-check the result of a begin-frame call.
    pub fn on_begin_frame(&self, call: &str, result: ApiResult, reporter: &Reporter) {
        let mut fields = self.inner.lock();
        match result {
            ApiResult::Success => {
                if fields.frame_begun {
                    reporter.nonconformant(
                        call,
                        "begin-frame returned SUCCESS while a frame was already begun \
                         (expected FRAME_DISCARDED)",
                    );
                }
                if !fields.begun {
                    reporter.nonconformant(
                        call,
                        "begin-frame succeeded while the session was not begun",
                    );
                }
                fields.frame_begun = true;
            }
            ApiResult::FrameDiscarded => {
                if !fields.frame_begun {
                    reporter.nonconformant(
                        call,
                        "begin-frame returned FRAME_DISCARDED but no frame was begun",
                    );
                }
                fields.frame_begun = true;
            }
            ApiResult::ErrorSessionNotRunning => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_RUNNING but the session was begun",
                    );
                }
            }
            _ => {}
        }
    }

    /// Run the forwarded end-frame call and cross-check its result. The
    /// session lock is held for the whole forwarded call so the frame
    /// counter increments atomically with respect to concurrently
    /// delivered phase-change notifications.
    pub fn end_frame<F: FnOnce() -> ApiResult>(
        &self,
        call: &str,
        forward: F,
        reporter: &Reporter,
    ) -> ApiResult {
        let mut fields = self.inner.lock();
        let result = forward();
        match result {
            r if r.is_success() => {
                if !fields.frame_begun {
                    reporter.nonconformant(
                        call,
                        "end-frame succeeded with no begun frame \
                         (expected ERROR_CALL_ORDER_INVALID)",
                    );
                }
                fields.frame_begun = false;
                fields.frame_count += 1;
            }
            ApiResult::ErrorCallOrderInvalid => {
                if fields.frame_begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_CALL_ORDER_INVALID but a frame was begun",
                    );
                }
            }
            ApiResult::ErrorSessionNotRunning => {
                if fields.begun {
                    reporter.nonconformant(
                        call,
                        "runtime reported ERROR_SESSION_NOT_RUNNING but the session was begun",
                    );
                }
            }
            _ => {}
        }
        result
    }

    /// Idempotency-check a reference-space enumeration result.
    pub fn on_enumerate_reference_spaces(
        &self,
        call: &str,
        result: ApiResult,
        spaces: &[ReferenceSpaceKind],
        reporter: &Reporter,
    ) {
        if !result.is_success() {
            return;
        }
        let mut fields = self.inner.lock();

        if !spaces.contains(&ReferenceSpaceKind::Local) {
            reporter.nonconformant(call, "required reference space LOCAL not enumerated");
        }
        if !spaces.contains(&ReferenceSpaceKind::View) {
            reporter.nonconformant(call, "required reference space VIEW not enumerated");
        }

        check_enumeration(call, "reference space", &mut fields.reference_spaces, spaces, reporter);
    }

    /// Idempotency-check a swapchain-format enumeration result.
    pub fn on_enumerate_swapchain_formats(
        &self,
        call: &str,
        result: ApiResult,
        formats: &[i64],
        reporter: &Reporter,
    ) {
        if !result.is_success() {
            return;
        }
        let mut fields = self.inner.lock();
        check_enumeration(call, "swapchain format", &mut fields.swapchain_formats, formats, reporter);
    }
}

/// Shared idempotency logic for cached enumerations: duplicates within one
/// call are always flagged; the first successful call caches the set; any
/// later call must return the same set, order-independent.
fn check_enumeration<T: Ord + Copy + Display>(
    call: &str,
    what: &str,
    cache: &mut Option<Vec<T>>,
    items: &[T],
    reporter: &Reporter,
) {
    let mut sorted: Vec<T> = items.to_vec();
    sorted.sort();

    for pair in sorted.windows(2) {
        if pair[0] == pair[1] {
            reporter.nonconformant(call, format!("duplicate {} {} in enumeration", what, pair[0]));
        }
    }
    sorted.dedup();

    match cache {
        None => *cache = Some(sorted),
        Some(cached) => {
            if *cached != sorted {
                reporter.nonconformant(
                    call,
                    format!(
                        "{} enumeration changed between calls ({} entries, previously {})",
                        what,
                        sorted.len(),
                        cached.len()
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests;
