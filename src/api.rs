//! API surface model shared with the generated interception layer
//!
//! This module defines the vocabulary the interceptor marshals into the
//! validators: object-type tags, result codes, session phases, event
//! payloads, and the extension struct-chain header. The validators never
//! see raw ABI structures beyond what is declared here; the generated
//! trampolines are responsible for lowering the real API's types into
//! these.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanosecond timestamp as reported by the runtime (monotonic, origin
/// unspecified by the API).
pub type RuntimeTime = i64;

/// Nanosecond duration used for timeouts and predicted display periods.
pub type RuntimeDuration = i64;

/// Category of a handle, part of the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Instance,
    Session,
    Swapchain,
    Space,
    ActionSet,
    Action,
}

impl ObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Instance => "Instance",
            ObjectType::Session => "Session",
            ObjectType::Swapchain => "Swapchain",
            ObjectType::Space => "Space",
            ObjectType::ActionSet => "ActionSet",
            ObjectType::Action => "Action",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result codes crossing the ABI boundary. Non-negative values are
/// success-class, negative values are errors, matching the convention of
/// the intercepted API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ApiResult {
    Success = 0,
    TimeoutExpired = 1,
    SessionLossPending = 3,
    EventUnavailable = 4,
    FrameDiscarded = 6,
    SessionNotFocused = 8,
    ErrorValidationFailure = -1,
    ErrorRuntimeFailure = -2,
    ErrorHandleInvalid = -12,
    ErrorCallOrderInvalid = -37,
    ErrorSessionNotReady = -28,
    ErrorSessionNotStopping = -29,
    ErrorSessionNotRunning = -16,
    ErrorSessionRunning = -14,
    ErrorSwapchainRectInvalid = -44,
}

impl ApiResult {
    /// Whether this code is success-class (non-negative at the ABI level).
    pub fn is_success(&self) -> bool {
        (*self as i32) >= 0
    }

    /// Unqualified success, excluding qualified codes like
    /// [`ApiResult::FrameDiscarded`] or [`ApiResult::SessionLossPending`].
    pub fn is_unqualified_success(&self) -> bool {
        matches!(self, ApiResult::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiResult::Success => "SUCCESS",
            ApiResult::TimeoutExpired => "TIMEOUT_EXPIRED",
            ApiResult::SessionLossPending => "SESSION_LOSS_PENDING",
            ApiResult::EventUnavailable => "EVENT_UNAVAILABLE",
            ApiResult::FrameDiscarded => "FRAME_DISCARDED",
            ApiResult::SessionNotFocused => "SESSION_NOT_FOCUSED",
            ApiResult::ErrorValidationFailure => "ERROR_VALIDATION_FAILURE",
            ApiResult::ErrorRuntimeFailure => "ERROR_RUNTIME_FAILURE",
            ApiResult::ErrorHandleInvalid => "ERROR_HANDLE_INVALID",
            ApiResult::ErrorCallOrderInvalid => "ERROR_CALL_ORDER_INVALID",
            ApiResult::ErrorSessionNotReady => "ERROR_SESSION_NOT_READY",
            ApiResult::ErrorSessionNotStopping => "ERROR_SESSION_NOT_STOPPING",
            ApiResult::ErrorSessionNotRunning => "ERROR_SESSION_NOT_RUNNING",
            ApiResult::ErrorSessionRunning => "ERROR_SESSION_RUNNING",
            ApiResult::ErrorSwapchainRectInvalid => "ERROR_SWAPCHAIN_RECT_INVALID",
        }
    }
}

impl fmt::Display for ApiResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle phases as reported through state-change events.
///
/// `Unknown` is the tracker's initial value before any event has been
/// observed; the runtime itself never reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    LossPending,
    Exiting,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Unknown => "UNKNOWN",
            SessionPhase::Idle => "IDLE",
            SessionPhase::Ready => "READY",
            SessionPhase::Synchronized => "SYNCHRONIZED",
            SessionPhase::Visible => "VISIBLE",
            SessionPhase::Focused => "FOCUSED",
            SessionPhase::Stopping => "STOPPING",
            SessionPhase::LossPending => "LOSS_PENDING",
            SessionPhase::Exiting => "EXITING",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known reference space categories a session can enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReferenceSpaceKind {
    View,
    Local,
    Stage,
    LocalFloor,
}

impl ReferenceSpaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceSpaceKind::View => "VIEW",
            ReferenceSpaceKind::Local => "LOCAL",
            ReferenceSpaceKind::Stage => "STAGE",
            ReferenceSpaceKind::LocalFloor => "LOCAL_FLOOR",
        }
    }
}

impl fmt::Display for ReferenceSpaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared kind of an action at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    BooleanInput,
    FloatInput,
    Vector2Input,
    PoseInput,
    VibrationOutput,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::BooleanInput => "BOOLEAN_INPUT",
            ActionKind::FloatInput => "FLOAT_INPUT",
            ActionKind::Vector2Input => "VECTOR2_INPUT",
            ActionKind::PoseInput => "POSE_INPUT",
            ActionKind::VibrationOutput => "VIBRATION_OUTPUT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events the interceptor hands to the validators after a successful
/// event-queue poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The runtime moved a session to a new lifecycle phase.
    SessionPhaseChanged {
        session: u64,
        phase: SessionPhase,
        time: RuntimeTime,
    },
    /// The set of bound interaction sources for a session changed.
    InteractionSourcesChanged { session: u64 },
}

/// Header layout shared by every extension structure in a struct chain.
///
/// Extension structures all begin with a 32-bit structure-type
/// discriminator and a pointer to the next element; the guard in
/// [`crate::chain`] walks chains through this view of them.
#[repr(C)]
#[derive(Debug)]
pub struct ChainHeader {
    pub struct_type: u32,
    pub next: *mut ChainHeader,
}
