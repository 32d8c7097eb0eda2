//! Per-call entry points for the generated interception layer
//!
//! [`VigilLayer`] owns the handle registry and the reporter and wires the
//! per-object validators together. The generated trampolines resolve each
//! intercepted call to one method here, passing the marshalled arguments
//! plus the result already obtained from the real implementation; the
//! layer inspects, reports, and hands the result back unchanged.
//!
//! Two calls take the forward as a closure instead of a finished result:
//! end-frame (the session lock must be held across it) and wait-image
//! (wall-clock time must be measured around it). For those, a lookup miss
//! means the forward never runs and the invalid-handle result is returned
//! directly.
//!
//! A lookup miss anywhere is translated into the API's invalid-handle
//! result. A duplicate registration or a custom-state tag mismatch is a
//! bug in the validator itself and aborts the process; it must never be
//! mistaken for a finding about the implementation under test.

use log::{debug, error, info};
use std::sync::Arc;

use crate::actions::{ActionSetTracker, ActionTracker};
use crate::api::{
    ActionKind, ApiResult, ChainHeader, Event, ObjectType, ReferenceSpaceKind, RuntimeDuration,
    RuntimeTime,
};
use crate::chain::ChainGuard;
use crate::config::{ChecksConfig, VigilConfig};
use crate::registry::{CustomState, HandleKey, HandleNode, HandleRegistry, RegistryError};
use crate::report::{FailureSink, NullSink, Reporter};
use crate::session::SessionTracker;
use crate::swapchain::SwapchainTracker;

/// The validation layer: handle registry, per-object validators, and the
/// reporter findings leave through.
pub struct VigilLayer {
    registry: HandleRegistry,
    reporter: Reporter,
    /// Reporter for disabled validator families: tracking still runs so
    /// later calls judge against accurate state, findings are discarded.
    muted: Reporter,
    checks: ChecksConfig,
}

impl VigilLayer {
    /// Create a layer with the sink the configuration asks for.
    pub fn new(config: &VigilConfig) -> anyhow::Result<Self> {
        let sink = crate::logging::build_sink(&config.logging)?;
        Ok(Self::with_sink(config, sink))
    }

    /// Create a layer reporting into the supplied sink.
    pub fn with_sink(config: &VigilConfig, sink: Arc<dyn FailureSink>) -> Self {
        info!("🛡️ initializing vigil validation layer");
        Self {
            registry: HandleRegistry::new(),
            reporter: Reporter::new(sink).with_strict(config.general.strict),
            muted: Reporter::new(Arc::new(NullSink)),
            checks: config.checks.clone(),
        }
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    fn fatal(&self, message: &str) -> ! {
        error!("fatal validator error: {}", message);
        std::process::abort();
    }

    fn reporter_for(&self, enabled: bool) -> &Reporter {
        if enabled {
            &self.reporter
        } else {
            &self.muted
        }
    }

    /// Resolve a raw handle or produce the invalid-handle result for the
    /// boundary.
    fn resolve(&self, raw: u64, object_type: ObjectType) -> Result<Arc<HandleNode>, ApiResult> {
        self.registry
            .lookup(HandleKey::new(raw, object_type))
            .map_err(|e| {
                debug!("{}", e);
                ApiResult::ErrorHandleInvalid
            })
    }

    fn session_of<'a>(&self, node: &'a HandleNode) -> &'a SessionTracker {
        match node.session() {
            Some(tracker) => tracker,
            None => self.fatal("session handle carries no session state"),
        }
    }

    fn swapchain_of<'a>(&self, node: &'a HandleNode) -> &'a SwapchainTracker {
        match node.swapchain() {
            Some(tracker) => tracker,
            None => self.fatal("swapchain handle carries no swapchain state"),
        }
    }

    fn register(&self, node: Arc<HandleNode>) {
        match self.registry.register(node) {
            Ok(()) => {}
            Err(e @ RegistryError::DuplicateHandle(_)) => self.fatal(&e.to_string()),
            Err(RegistryError::UnknownHandle(_)) => unreachable!(),
        }
    }

    fn attach(&self, node: &HandleNode, state: CustomState) {
        if node.attach_state(state).is_err() {
            self.fatal("custom state attached twice to one handle");
        }
    }

    // ---- registration boundary -------------------------------------------

    /// A top-level instance was created.
    pub fn on_instance_created(&self, result: ApiResult, instance: u64) -> ApiResult {
        if result.is_success() {
            self.register(HandleNode::root(instance, ObjectType::Instance));
        }
        result
    }

    /// A session was created under `instance`. `headless` records whether
    /// the session renders to no display, captured here because later
    /// lifecycle checks depend on it.
    pub fn on_session_created(
        &self,
        result: ApiResult,
        instance: u64,
        session: u64,
        headless: bool,
    ) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        let parent = match self.resolve(instance, ObjectType::Instance) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let node = self
            .registry
            .child_node(&parent, session, ObjectType::Session);
        self.register(node.clone());
        self.attach(&node, CustomState::Session(SessionTracker::new(headless)));
        result
    }

    /// A swapchain was created under `session`. `is_static` records
    /// whether the swapchain exposes a single immutable image.
    pub fn on_swapchain_created(
        &self,
        result: ApiResult,
        session: u64,
        swapchain: u64,
        is_static: bool,
    ) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        let parent = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let node = self
            .registry
            .child_node(&parent, swapchain, ObjectType::Swapchain);
        self.register(node.clone());
        self.attach(
            &node,
            CustomState::Swapchain(SwapchainTracker::new(is_static)),
        );
        result
    }

    /// A space was created under `session`. Spaces carry no custom state.
    pub fn on_space_created(&self, result: ApiResult, session: u64, space: u64) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        let parent = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let node = self.registry.child_node(&parent, space, ObjectType::Space);
        self.register(node);
        result
    }

    /// An action set was created under `instance`.
    pub fn on_action_set_created(
        &self,
        result: ApiResult,
        instance: u64,
        action_set: u64,
    ) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        let parent = match self.resolve(instance, ObjectType::Instance) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let node = self
            .registry
            .child_node(&parent, action_set, ObjectType::ActionSet);
        self.register(node.clone());
        self.attach(&node, CustomState::ActionSet(ActionSetTracker::new()));
        result
    }

    /// An action was created under `action_set`.
    pub fn on_action_created(
        &self,
        result: ApiResult,
        action_set: u64,
        action: u64,
        kind: ActionKind,
    ) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        let parent = match self.resolve(action_set, ObjectType::ActionSet) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let node = self.registry.child_node(&parent, action, ObjectType::Action);
        self.register(node.clone());
        self.attach(
            &node,
            CustomState::Action(ActionTracker::new(kind, action_set)),
        );
        result
    }

    /// Any handle was destroyed. The node and every descendant leave the
    /// registry before the result is returned to the application.
    pub fn on_destroyed(&self, result: ApiResult, raw: u64, object_type: ObjectType) -> ApiResult {
        if !result.is_success() {
            return result;
        }
        match self.registry.unregister(HandleKey::new(raw, object_type)) {
            Ok(()) => result,
            Err(e) => {
                debug!("{}", e);
                ApiResult::ErrorHandleInvalid
            }
        }
    }

    // ---- session lifecycle ----------------------------------------------

    pub fn begin_session(&self, session: u64, result: ApiResult) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_begin(
            "beginSession",
            result,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    pub fn end_session(&self, session: u64, result: ApiResult) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node)
            .on_end("endSession", result, self.reporter_for(self.checks.sessions));
        result
    }

    pub fn request_exit_session(&self, session: u64, result: ApiResult) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_request_exit(
            "requestExitSession",
            result,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    pub fn wait_frame(
        &self,
        session: u64,
        result: ApiResult,
        predicted_display_time: RuntimeTime,
        predicted_period: RuntimeDuration,
    ) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_wait_frame(
            "waitFrame",
            result,
            predicted_display_time,
            predicted_period,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    pub fn begin_frame(&self, session: u64, result: ApiResult) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_begin_frame(
            "beginFrame",
            result,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    /// Forward an end-frame call. The session lock is held across the
    /// forward so the frame counter increments atomically with respect to
    /// concurrently delivered phase-change notifications.
    pub fn end_frame<F: FnOnce() -> ApiResult>(&self, session: u64, forward: F) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).end_frame(
            "endFrame",
            forward,
            self.reporter_for(self.checks.sessions),
        )
    }

    pub fn enumerate_reference_spaces(
        &self,
        session: u64,
        result: ApiResult,
        spaces: &[ReferenceSpaceKind],
    ) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_enumerate_reference_spaces(
            "enumerateReferenceSpaces",
            result,
            spaces,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    pub fn enumerate_swapchain_formats(
        &self,
        session: u64,
        result: ApiResult,
        formats: &[i64],
    ) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.session_of(&node).on_enumerate_swapchain_formats(
            "enumerateSwapchainFormats",
            result,
            formats,
            self.reporter_for(self.checks.sessions),
        );
        result
    }

    // ---- event queue -----------------------------------------------------

    /// Handle the outcome of an event-queue poll on `instance`: dispatch a
    /// delivered event to the owning session's validators, or fan the
    /// queue-exhaust signal out to every live session when the queue
    /// reports empty.
    pub fn poll_event(&self, instance: u64, result: ApiResult, event: Option<Event>) -> ApiResult {
        let instance_node = match self.resolve(instance, ObjectType::Instance) {
            Ok(node) => node,
            Err(r) => return r,
        };

        match result {
            ApiResult::EventUnavailable => {
                // A session mid-creation on another thread may be
                // registered without its state yet; it has no sync window
                // to close.
                for session in self
                    .registry
                    .children_of(instance_node.key(), ObjectType::Session)
                {
                    if let Some(tracker) = session.session() {
                        tracker.sync_status().on_queue_exhausted();
                    }
                }
            }
            r if r.is_success() => match event {
                Some(Event::SessionPhaseChanged { session, phase, .. }) => {
                    match self.resolve(session, ObjectType::Session) {
                        Ok(node) => {
                            if let Some(tracker) = node.session() {
                                tracker.on_phase_changed(
                                    "pollEvent",
                                    phase,
                                    self.reporter_for(self.checks.sessions),
                                );
                            }
                        }
                        Err(_) => self.reporter.nonconformant(
                            "pollEvent",
                            "session phase-change event references an unknown session",
                        ),
                    }
                }
                Some(Event::InteractionSourcesChanged { session }) => {
                    match self.resolve(session, ObjectType::Session) {
                        Ok(node) => {
                            if let Some(tracker) = node.session() {
                                tracker.sync_status().check_interaction_event(
                                    "pollEvent",
                                    self.reporter_for(self.checks.actions),
                                );
                            }
                        }
                        Err(_) => self.reporter.nonconformant(
                            "pollEvent",
                            "interaction-sources-changed event references an unknown session",
                        ),
                    }
                }
                None => {}
            },
            _ => {}
        }
        result
    }

    // ---- input synchronization ------------------------------------------

    /// Forward an input-synchronization call for `session` covering
    /// `action_sets`. The sync window opens on entry and is marked
    /// called-since-exhaust on exit regardless of the outcome.
    pub fn sync_actions<F: FnOnce() -> ApiResult>(
        &self,
        session: u64,
        action_sets: &[u64],
        forward: F,
    ) -> ApiResult {
        let node = match self.resolve(session, ObjectType::Session) {
            Ok(node) => node,
            Err(r) => return r,
        };
        let tracker = self.session_of(&node);

        tracker.sync_status().begin_sync();
        let result = forward();
        tracker.sync_status().finish_sync();

        for raw in action_sets {
            match self.resolve(*raw, ObjectType::ActionSet) {
                Ok(set_node) => {
                    if let Some(set) = set_node.action_set() {
                        set.record_sync_result(result);
                    }
                }
                Err(_) => debug!("sync covered unknown action set {:#x}", raw),
            }
        }
        result
    }

    // ---- swapchain image protocol ---------------------------------------

    pub fn enumerate_swapchain_images(
        &self,
        swapchain: u64,
        result: ApiResult,
        count: usize,
    ) -> ApiResult {
        let node = match self.resolve(swapchain, ObjectType::Swapchain) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.swapchain_of(&node).on_enumerate(
            "enumerateSwapchainImages",
            result,
            count,
            self.reporter_for(self.checks.swapchains),
        );
        result
    }

    /// Handle an acquire result. `query_count` lets the tracker enumerate
    /// internally when the application acquires before ever enumerating.
    pub fn acquire_image<Q: FnOnce() -> Option<usize>>(
        &self,
        swapchain: u64,
        result: ApiResult,
        index: u32,
        query_count: Q,
    ) -> ApiResult {
        let node = match self.resolve(swapchain, ObjectType::Swapchain) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.swapchain_of(&node).on_acquire(
            "acquireImage",
            result,
            index,
            query_count,
            self.reporter_for(self.checks.swapchains),
        );
        result
    }

    /// Forward a wait-image call, measuring wall-clock time around it for
    /// the timeout check. The swapchain lock is not held across the
    /// forward.
    pub fn wait_image<F: FnOnce() -> ApiResult>(
        &self,
        swapchain: u64,
        timeout: RuntimeDuration,
        forward: F,
    ) -> ApiResult {
        let node = match self.resolve(swapchain, ObjectType::Swapchain) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.swapchain_of(&node).wait_image(
            "waitImage",
            timeout,
            forward,
            self.reporter_for(self.checks.swapchains),
        )
    }

    pub fn release_image(&self, swapchain: u64, result: ApiResult) -> ApiResult {
        let node = match self.resolve(swapchain, ObjectType::Swapchain) {
            Ok(node) => node,
            Err(r) => return r,
        };
        self.swapchain_of(&node).on_release(
            "releaseImage",
            result,
            self.reporter_for(self.checks.swapchains),
        );
        result
    }

    // ---- struct chains ---------------------------------------------------

    /// Snapshot the struct chain of a mutable call argument for the
    /// duration of the call.
    ///
    /// # Safety
    ///
    /// `head` must be null or point to a valid chain that stays live until
    /// the returned guard is dropped.
    pub unsafe fn chain_guard(&self, call: &'static str, head: *const ChainHeader) -> ChainGuard {
        ChainGuard::capture(call, head, self.reporter_for(self.checks.struct_chains))
    }
}
