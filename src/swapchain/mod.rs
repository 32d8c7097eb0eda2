//! Swapchain image acquire/wait/release state machine
//!
//! Each image of a swapchain moves Created -> Acquired -> Waited ->
//! Released; only dynamic swapchains may cycle an image back from
//! Released to Acquired, a static swapchain passes through the cycle
//! exactly once. Images must be waited and released in the order they
//! were acquired, tracked by a FIFO of acquired indices.
//!
//! The per-swapchain lock is re-entrant: the acquire path sizes the image
//! array on demand by re-entering the enumerate handler within the same
//! logical operation. The lock is never held across the forwarded
//! wait call itself, only around the bookkeeping on either side of it.

use log::debug;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

use crate::api::{ApiResult, RuntimeDuration};
use crate::report::Reporter;

/// Protocol state of one swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePhase {
    Created,
    Acquired,
    Waited,
    Released,
}

impl ImagePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImagePhase::Created => "CREATED",
            ImagePhase::Acquired => "ACQUIRED",
            ImagePhase::Waited => "WAITED",
            ImagePhase::Released => "RELEASED",
        }
    }
}

impl fmt::Display for ImagePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct ImageStates {
    /// Sized by the first successful enumeration; `None` until then.
    images: Option<Vec<ImagePhase>>,
    /// Indices acquired but not yet released, in acquire order.
    acquired: VecDeque<usize>,
}

/// Custom state for a swapchain handle.
pub struct SwapchainTracker {
    is_static: bool,
    inner: ReentrantMutex<RefCell<ImageStates>>,
}

impl SwapchainTracker {
    pub fn new(is_static: bool) -> Self {
        Self {
            is_static,
            inner: ReentrantMutex::new(RefCell::new(ImageStates::default())),
        }
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Reported image count, once known.
    pub fn image_count(&self) -> Option<usize> {
        let guard = self.inner.lock();
        let states = guard.borrow();
        states.images.as_ref().map(|v| v.len())
    }

    /// Phase of one image, for embedders and tests.
    pub fn image_phase(&self, index: usize) -> Option<ImagePhase> {
        let guard = self.inner.lock();
        let states = guard.borrow();
        states.images.as_ref().and_then(|v| v.get(index).copied())
    }

    /// Handle an image-enumeration result. The first successful call sizes
    /// the per-image state array; later calls must report the same count.
    pub fn on_enumerate(&self, call: &str, result: ApiResult, count: usize, reporter: &Reporter) {
        if !result.is_success() {
            return;
        }
        let guard = self.inner.lock();

        if count == 0 {
            reporter.nonconformant(call, "swapchain enumerated zero images");
        }
        if self.is_static && count != 1 {
            reporter.nonconformant(
                call,
                format!("static swapchain must expose exactly one image, reported {}", count),
            );
        }

        let mut states = guard.borrow_mut();
        match &states.images {
            None => {
                debug!("swapchain image array sized to {}", count);
                states.images = Some(vec![ImagePhase::Created; count]);
            }
            Some(existing) => {
                if existing.len() != count {
                    reporter.nonconformant(
                        call,
                        format!(
                            "swapchain image count changed between enumerations: \
                             {} then {}",
                            existing.len(),
                            count
                        ),
                    );
                }
            }
        }
    }

    /// Handle an acquire result. If the image array has not been sized yet
    /// the tracker enumerates internally through `query_count` first,
    /// re-entering [`Self::on_enumerate`] under the same lock.
    pub fn on_acquire<Q: FnOnce() -> Option<usize>>(
        &self,
        call: &str,
        result: ApiResult,
        index: u32,
        query_count: Q,
        reporter: &Reporter,
    ) {
        if !result.is_success() {
            return;
        }
        let guard = self.inner.lock();

        let needs_enumerate = guard.borrow().images.is_none();
        if needs_enumerate {
            if let Some(count) = query_count() {
                self.on_enumerate(call, ApiResult::Success, count, reporter);
            }
        }

        let mut states = guard.borrow_mut();
        let Some(images) = states.images.as_mut() else {
            // Count query failed; nothing to validate against.
            return;
        };

        let index = index as usize;
        if index >= images.len() {
            reporter.nonconformant(
                call,
                format!(
                    "acquired image index {} out of range for count {}",
                    index,
                    images.len()
                ),
            );
            return;
        }

        match images[index] {
            ImagePhase::Acquired | ImagePhase::Waited => {
                reporter.nonconformant(
                    call,
                    format!("image {} acquired while already {}", index, images[index]),
                );
            }
            ImagePhase::Released if self.is_static => {
                reporter.nonconformant(
                    call,
                    format!("static swapchain image {} acquired a second time", index),
                );
            }
            _ => {}
        }

        images[index] = ImagePhase::Acquired;
        states.acquired.push_back(index);
    }

    /// Run the forwarded wait call and validate its outcome. Wall-clock
    /// time is measured around the forward; the lock is taken only
    /// afterwards for the bookkeeping.
    pub fn wait_image<F: FnOnce() -> ApiResult>(
        &self,
        call: &str,
        timeout: RuntimeDuration,
        forward: F,
        reporter: &Reporter,
    ) -> ApiResult {
        let start = Instant::now();
        let result = forward();
        let elapsed = start.elapsed();

        match result {
            ApiResult::Success => {
                let guard = self.inner.lock();
                let mut states = guard.borrow_mut();
                let front = states.acquired.front().copied();
                match front {
                    None => reporter.nonconformant(
                        call,
                        "wait succeeded but no image was acquired",
                    ),
                    Some(index) => {
                        if let Some(images) = states.images.as_mut() {
                            if images[index] != ImagePhase::Acquired {
                                reporter.nonconformant(
                                    call,
                                    format!(
                                        "image {} at the front of the acquire queue was {}, \
                                         expected ACQUIRED",
                                        index, images[index]
                                    ),
                                );
                            }
                            images[index] = ImagePhase::Waited;
                        }
                    }
                }
            }
            ApiResult::TimeoutExpired => {
                if timeout >= 0 && (elapsed.as_nanos() as i128) < timeout as i128 {
                    reporter.nonconformant(
                        call,
                        format!(
                            "wait reported TIMEOUT_EXPIRED after {:?}, before the \
                             requested timeout of {} ns elapsed",
                            elapsed, timeout
                        ),
                    );
                }
            }
            _ => {}
        }
        result
    }

    /// Handle a release result: the image at the front of the acquire
    /// queue must have been waited; it transitions to Released and leaves
    /// the queue.
    pub fn on_release(&self, call: &str, result: ApiResult, reporter: &Reporter) {
        if !result.is_success() {
            return;
        }
        let guard = self.inner.lock();
        let mut states = guard.borrow_mut();

        let Some(index) = states.acquired.pop_front() else {
            reporter.nonconformant(call, "release succeeded but no image was acquired");
            return;
        };
        if let Some(images) = states.images.as_mut() {
            if images[index] != ImagePhase::Waited {
                reporter.nonconformant(
                    call,
                    format!(
                        "released image {} was {}, expected WAITED",
                        index, images[index]
                    ),
                );
            }
            images[index] = ImagePhase::Released;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::CollectingSink;
    use std::sync::Arc;

    fn tracker(is_static: bool) -> (SwapchainTracker, Reporter, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let reporter = Reporter::new(sink.clone());
        (SwapchainTracker::new(is_static), reporter, sink)
    }

    fn acquire(t: &SwapchainTracker, index: u32, count: usize, r: &Reporter) {
        t.on_acquire("acquireImage", ApiResult::Success, index, || Some(count), r);
    }

    fn wait(t: &SwapchainTracker, r: &Reporter) -> ApiResult {
        t.wait_image("waitImage", 1_000_000, || ApiResult::Success, r)
    }

    #[test]
    fn dynamic_fifo_cycle_is_clean() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 3, &r);

        for i in 0..3 {
            acquire(&t, i, 3, &r);
        }
        for _ in 0..3 {
            wait(&t, &r);
            t.on_release("releaseImage", ApiResult::Success, &r);
        }

        assert_eq!(sink.findings(), vec![]);
        for i in 0..3 {
            assert_eq!(t.image_phase(i), Some(ImagePhase::Released));
        }
    }

    #[test]
    fn wait_without_acquire_yields_exactly_one_violation() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 3, &r);

        wait(&t, &r);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("no image was acquired"));
    }

    #[test]
    fn release_of_unwaited_image_yields_one_violation() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 3, &r);

        acquire(&t, 0, 3, &r);
        t.on_release("releaseImage", ApiResult::Success, &r);

        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("expected WAITED"));
    }

    #[test]
    fn static_swapchain_cycles_exactly_once() {
        let (t, r, sink) = tracker(true);
        t.on_enumerate("enumerateImages", ApiResult::Success, 1, &r);

        acquire(&t, 0, 1, &r);
        wait(&t, &r);
        t.on_release("releaseImage", ApiResult::Success, &r);
        assert_eq!(sink.findings().len(), 0);

        acquire(&t, 0, 1, &r);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("second time"));
    }

    #[test]
    fn dynamic_swapchain_may_reacquire_released_images() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 1, &r);

        for _ in 0..2 {
            acquire(&t, 0, 1, &r);
            wait(&t, &r);
            t.on_release("releaseImage", ApiResult::Success, &r);
        }
        assert_eq!(sink.findings(), vec![]);
    }

    #[test]
    fn zero_image_count_is_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 0, &r);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn static_swapchain_with_multiple_images_is_flagged() {
        let (t, r, sink) = tracker(true);
        t.on_enumerate("enumerateImages", ApiResult::Success, 2, &r);
        assert_eq!(sink.error_count(), 1);
    }

    #[test]
    fn changed_image_count_is_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 3, &r);
        t.on_enumerate("enumerateImages", ApiResult::Success, 4, &r);
        assert_eq!(sink.error_count(), 1);
        assert_eq!(t.image_count(), Some(3));
    }

    #[test]
    fn acquire_triggers_internal_enumerate() {
        let (t, r, sink) = tracker(false);
        assert_eq!(t.image_count(), None);

        acquire(&t, 1, 3, &r);
        assert_eq!(t.image_count(), Some(3));
        assert_eq!(t.image_phase(1), Some(ImagePhase::Acquired));
        assert_eq!(sink.findings().len(), 0);
    }

    #[test]
    fn out_of_range_acquire_index_is_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 2, &r);

        acquire(&t, 5, 2, &r);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("out of range"));
    }

    #[test]
    fn double_acquire_of_same_image_is_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 2, &r);

        acquire(&t, 0, 2, &r);
        acquire(&t, 0, 2, &r);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("already ACQUIRED"));
    }

    #[test]
    fn early_timeout_is_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 1, &r);
        acquire(&t, 0, 1, &r);

        // The forward returns instantly, far sooner than one minute.
        let result = t.wait_image(
            "waitImage",
            60_000_000_000,
            || ApiResult::TimeoutExpired,
            &r,
        );
        assert_eq!(result, ApiResult::TimeoutExpired);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.findings()[0].message.contains("TIMEOUT_EXPIRED"));
    }

    #[test]
    fn honest_timeout_is_not_flagged() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::Success, 1, &r);
        acquire(&t, 0, 1, &r);

        let result = t.wait_image("waitImage", 0, || ApiResult::TimeoutExpired, &r);
        assert_eq!(result, ApiResult::TimeoutExpired);
        assert_eq!(sink.findings().len(), 0);
    }

    #[test]
    fn failed_results_do_not_advance_state() {
        let (t, r, sink) = tracker(false);
        t.on_enumerate("enumerateImages", ApiResult::ErrorRuntimeFailure, 3, &r);
        assert_eq!(t.image_count(), None);

        t.on_acquire(
            "acquireImage",
            ApiResult::ErrorRuntimeFailure,
            0,
            || Some(3),
            &r,
        );
        assert_eq!(t.image_count(), None);
        assert_eq!(sink.findings().len(), 0);
    }
}
