//! Unit tests for the session lifecycle state machine

use super::*;
use crate::report::CollectingSink;
use std::sync::Arc;

fn tracker_with_sink(headless: bool) -> (SessionTracker, Reporter, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let reporter = Reporter::new(sink.clone());
    (SessionTracker::new(headless), reporter, sink)
}

/// Walk a session through Idle, Ready, and a successful begin so frame
/// and enumeration checks start from a running session.
fn running_session(headless: bool) -> (SessionTracker, Reporter, Arc<CollectingSink>) {
    let (tracker, reporter, sink) = tracker_with_sink(headless);
    tracker.on_phase_changed("pollEvent", SessionPhase::Idle, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Ready, &reporter);
    tracker.on_begin("beginSession", ApiResult::Success, &reporter);
    assert_eq!(sink.findings().len(), 0);
    (tracker, reporter, sink)
}

#[test]
fn full_legal_lifecycle_walk_is_clean() {
    let (tracker, reporter, sink) = running_session(true);

    for phase in [
        SessionPhase::Synchronized,
        SessionPhase::Visible,
        SessionPhase::Focused,
        SessionPhase::Visible,
        SessionPhase::Synchronized,
        SessionPhase::Stopping,
    ] {
        tracker.on_phase_changed("pollEvent", phase, &reporter);
    }
    tracker.on_end("endSession", ApiResult::Success, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Idle, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Exiting, &reporter);

    assert_eq!(sink.findings(), vec![]);
    assert_eq!(tracker.phase(), SessionPhase::Exiting);
}

#[test]
fn edge_missing_from_table_yields_exactly_one_violation() {
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_phase_changed("pollEvent", SessionPhase::Idle, &reporter);
    assert_eq!(sink.findings().len(), 0);

    tracker.on_phase_changed("pollEvent", SessionPhase::Focused, &reporter);
    assert_eq!(sink.error_count(), 1);
    assert_eq!(sink.warning_count(), 0);
    // The illegal phase is still recorded.
    assert_eq!(tracker.phase(), SessionPhase::Focused);
}

#[test]
fn loss_pending_is_reachable_from_every_phase() {
    use SessionPhase::*;
    for from in [
        Unknown,
        Idle,
        Ready,
        Synchronized,
        Visible,
        Focused,
        Stopping,
        LossPending,
        Exiting,
    ] {
        assert!(
            transition_allowed(from, LossPending),
            "LOSS_PENDING must be reachable from {}",
            from
        );
    }

    let (tracker, reporter, sink) = tracker_with_sink(false);
    tracker.on_phase_changed("pollEvent", SessionPhase::LossPending, &reporter);
    assert_eq!(sink.findings().len(), 0);
}

#[test]
fn synchronized_without_begin_is_flagged() {
    let (tracker, reporter, sink) = tracker_with_sink(false);
    tracker.on_phase_changed("pollEvent", SessionPhase::Idle, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Ready, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Synchronized, &reporter);

    let findings = sink.findings();
    assert_eq!(findings.len(), 1);
    assert!(findings[0].message.contains("without ever being begun"));
}

#[test]
fn synchronized_with_zero_frames_warns_unless_headless() {
    let (tracker, reporter, sink) = running_session(false);
    tracker.on_phase_changed("pollEvent", SessionPhase::Synchronized, &reporter);
    assert_eq!(sink.warning_count(), 1);
    assert_eq!(sink.error_count(), 0);

    let (tracker, reporter, sink) = running_session(true);
    tracker.on_phase_changed("pollEvent", SessionPhase::Synchronized, &reporter);
    assert_eq!(sink.findings().len(), 0);
}

#[test]
fn idle_while_begun_is_flagged() {
    let (tracker, reporter, sink) = running_session(true);
    tracker.on_phase_changed("pollEvent", SessionPhase::Synchronized, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Idle, &reporter);

    assert_eq!(sink.error_count(), 1);
    assert!(sink.findings()[0].message.contains("IDLE while still begun"));
}

#[test]
fn begin_success_while_already_begun_is_flagged() {
    let (tracker, reporter, sink) = running_session(true);

    tracker.on_begin("beginSession", ApiResult::Success, &reporter);
    let findings = sink.findings();
    assert_eq!(findings.len(), 1);
    assert!(findings[0].message.contains("already begun"));
}

#[test]
fn error_session_running_requires_begun() {
    let (tracker, reporter, sink) = tracker_with_sink(false);
    tracker.on_begin("beginSession", ApiResult::ErrorSessionRunning, &reporter);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn end_not_running_failure_requires_not_begun() {
    let (tracker, reporter, sink) = tracker_with_sink(false);
    // Not begun: the failure is consistent, nothing to flag.
    tracker.on_end("endSession", ApiResult::ErrorSessionNotRunning, &reporter);
    assert_eq!(sink.findings().len(), 0);

    let (tracker, reporter, sink) = running_session(true);
    tracker.on_end("endSession", ApiResult::ErrorSessionNotRunning, &reporter);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn end_success_while_not_begun_is_flagged() {
    let (tracker, reporter, sink) = tracker_with_sink(false);
    tracker.on_end("endSession", ApiResult::Success, &reporter);
    assert!(sink.error_count() >= 1);
}

#[test]
fn request_exit_marks_session_and_suppresses_zero_frame_warning() {
    let (tracker, reporter, sink) = running_session(false);
    tracker.on_request_exit("requestExitSession", ApiResult::Success, &reporter);
    tracker.on_phase_changed("pollEvent", SessionPhase::Synchronized, &reporter);
    // exit_requested suppresses the zero-frame warning.
    assert_eq!(sink.findings().len(), 0);
}

#[test]
fn predicted_display_time_must_strictly_advance() {
    let (tracker, reporter, sink) = running_session(true);

    tracker.on_wait_frame("waitFrame", ApiResult::Success, 1_000, 16_000_000, &reporter);
    assert_eq!(sink.findings().len(), 0);

    tracker.on_wait_frame("waitFrame", ApiResult::Success, 2_000, 16_000_000, &reporter);
    assert_eq!(sink.findings().len(), 0);

    tracker.on_wait_frame("waitFrame", ApiResult::Success, 2_000, 16_000_000, &reporter);
    assert_eq!(sink.error_count(), 1);
    assert!(sink.findings()[0].message.contains("did not advance"));

    tracker.on_wait_frame("waitFrame", ApiResult::Success, 1_500, 16_000_000, &reporter);
    assert_eq!(sink.error_count(), 2);
}

#[test]
fn non_positive_predicted_time_is_flagged() {
    let (tracker, reporter, sink) = running_session(true);
    tracker.on_wait_frame("waitFrame", ApiResult::Success, 0, 0, &reporter);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn frame_loop_cross_checks() {
    let (tracker, reporter, sink) = running_session(true);

    tracker.on_begin_frame("beginFrame", ApiResult::Success, &reporter);
    assert_eq!(sink.findings().len(), 0);

    let result = tracker.end_frame("endFrame", || ApiResult::Success, &reporter);
    assert_eq!(result, ApiResult::Success);
    assert_eq!(sink.findings().len(), 0);
    assert_eq!(tracker.frame_count(), 1);

    // A second SUCCESS begin-frame without an intervening discard is fine;
    // SUCCESS while a frame is begun is not.
    tracker.on_begin_frame("beginFrame", ApiResult::Success, &reporter);
    tracker.on_begin_frame("beginFrame", ApiResult::Success, &reporter);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn frame_discarded_requires_a_begun_frame() {
    let (tracker, reporter, sink) = running_session(true);

    tracker.on_begin_frame("beginFrame", ApiResult::FrameDiscarded, &reporter);
    assert_eq!(sink.error_count(), 1);

    tracker.on_begin_frame("beginFrame", ApiResult::FrameDiscarded, &reporter);
    // A frame is begun now, so the discard outcome is consistent.
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn end_frame_without_begun_frame_is_flagged() {
    let (tracker, reporter, sink) = running_session(true);

    let result = tracker.end_frame("endFrame", || ApiResult::Success, &reporter);
    assert_eq!(result, ApiResult::Success);
    assert_eq!(sink.error_count(), 1);
    assert_eq!(tracker.frame_count(), 1);
}

#[test]
fn call_order_failure_with_begun_frame_is_flagged() {
    let (tracker, reporter, sink) = running_session(true);
    tracker.on_begin_frame("beginFrame", ApiResult::Success, &reporter);

    let result = tracker.end_frame("endFrame", || ApiResult::ErrorCallOrderInvalid, &reporter);
    assert_eq!(result, ApiResult::ErrorCallOrderInvalid);
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn reference_space_enumeration_is_order_independent() {
    use ReferenceSpaceKind::*;
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[Local, View],
        &reporter,
    );
    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[View, Local],
        &reporter,
    );
    assert_eq!(sink.findings().len(), 0);
}

#[test]
fn missing_required_reference_space_is_flagged() {
    use ReferenceSpaceKind::*;
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[Local],
        &reporter,
    );
    assert_eq!(sink.error_count(), 1);
    assert!(sink.findings()[0].message.contains("VIEW"));
}

#[test]
fn duplicate_reference_space_is_flagged() {
    use ReferenceSpaceKind::*;
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[Local, View, Local],
        &reporter,
    );
    assert_eq!(sink.error_count(), 1);
    assert!(sink.findings()[0].message.contains("duplicate"));
}

#[test]
fn changed_enumeration_between_calls_is_flagged() {
    use ReferenceSpaceKind::*;
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[Local, View],
        &reporter,
    );
    tracker.on_enumerate_reference_spaces(
        "enumerateReferenceSpaces",
        ApiResult::Success,
        &[Local, View, Stage],
        &reporter,
    );
    assert_eq!(sink.error_count(), 1);
    assert!(sink.findings()[0].message.contains("changed between calls"));
}

#[test]
fn swapchain_format_enumeration_caches_first_result() {
    let (tracker, reporter, sink) = tracker_with_sink(false);

    tracker.on_enumerate_swapchain_formats(
        "enumerateSwapchainFormats",
        ApiResult::Success,
        &[37, 43, 50],
        &reporter,
    );
    tracker.on_enumerate_swapchain_formats(
        "enumerateSwapchainFormats",
        ApiResult::Success,
        &[50, 37, 43],
        &reporter,
    );
    assert_eq!(sink.findings().len(), 0);

    tracker.on_enumerate_swapchain_formats(
        "enumerateSwapchainFormats",
        ApiResult::Success,
        &[37, 43],
        &reporter,
    );
    assert_eq!(sink.error_count(), 1);
}

#[test]
fn failed_enumeration_results_are_ignored() {
    let (tracker, reporter, sink) = tracker_with_sink(false);
    tracker.on_enumerate_swapchain_formats(
        "enumerateSwapchainFormats",
        ApiResult::ErrorRuntimeFailure,
        &[],
        &reporter,
    );
    assert_eq!(sink.findings().len(), 0);
}
