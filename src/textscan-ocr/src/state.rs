//! Operation state shared between the worker running an operation and the
//! threads that may cancel it.

use crate::geometry::Region;
use crate::listener::OcrListener;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, warn};

/// Lifecycle phase derived from the listener slot and the cancellation flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Active,
    Cancelling,
}

/// State of the single in-flight operation.
///
/// The state is valid while a listener is registered and no cancellation
/// has been requested. Every event relay checks validity first, because the
/// engine keeps reporting for a while after a cancel.
pub struct OperationState {
    listener: RwLock<Option<Arc<dyn OcrListener>>>,
    cancelled: AtomicBool,
    last_progress: AtomicI32,
    current_region: Mutex<Option<Region>>,
}

impl OperationState {
    pub fn new() -> Self {
        Self {
            listener: RwLock::new(None),
            cancelled: AtomicBool::new(false),
            last_progress: AtomicI32::new(0),
            current_region: Mutex::new(None),
        }
    }

    /// Register `listener` and reset cancellation and progress.
    ///
    /// Beginning while another operation is active replaces its listener.
    pub fn begin(&self, listener: Arc<dyn OcrListener>) {
        let mut slot = self.listener.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("operation started while another one is active, replacing its listener");
        }
        *slot = Some(listener);
        self.cancelled.store(false, Ordering::SeqCst);
        self.last_progress.store(0, Ordering::SeqCst);
        debug!("operation state active");
    }

    /// Drop the listener and clear all per-operation fields. Idempotent.
    pub fn end(&self) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.cancelled.store(false, Ordering::SeqCst);
        self.last_progress.store(0, Ordering::SeqCst);
        *self.current_region.lock().unwrap_or_else(PoisonError::into_inner) = None;
        debug!("operation state idle");
    }

    /// Request cancellation of the current operation.
    ///
    /// The listener is detached immediately so no further events reach the
    /// caller. Returns true only for the request that set the flag.
    pub fn request_cancel(&self) -> bool {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = None;
        let first = !self.cancelled.swap(true, Ordering::SeqCst);
        if first {
            debug!("cancellation requested");
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_cancelled() && self.has_listener()
    }

    pub fn phase(&self) -> Phase {
        if self.is_cancelled() {
            Phase::Cancelling
        } else if self.has_listener() {
            Phase::Active
        } else {
            Phase::Idle
        }
    }

    /// Listener to deliver to, if the state is still valid
    pub fn listener(&self) -> Option<Arc<dyn OcrListener>> {
        let slot = self.listener.read().unwrap_or_else(PoisonError::into_inner);
        if self.is_cancelled() {
            debug!("state is cancelled");
            return None;
        }
        slot.clone()
    }

    /// Run `deliver` against the listener if the state is valid.
    /// Returns whether the event was delivered.
    pub fn dispatch<F>(&self, deliver: F) -> bool
    where
        F: FnOnce(&dyn OcrListener),
    {
        match self.listener() {
            Some(listener) => {
                deliver(listener.as_ref());
                true
            }
            None => false,
        }
    }

    pub fn last_progress(&self) -> i32 {
        self.last_progress.load(Ordering::SeqCst)
    }

    /// Raise the last reported progress; lower values are ignored
    pub(crate) fn raise_progress(&self, progress: i32) {
        self.last_progress.fetch_max(progress, Ordering::SeqCst);
    }

    pub fn current_region(&self) -> Option<Region> {
        *self.current_region.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `region` as the area being scanned until the guard drops
    pub fn scan_region(&self, region: Region) -> RegionGuard<'_> {
        *self.current_region.lock().unwrap_or_else(PoisonError::into_inner) = Some(region);
        RegionGuard { state: self }
    }

    fn has_listener(&self) -> bool {
        self.listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl Default for OperationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Ends the operation when dropped, on every exit path
pub struct OperationGuard {
    state: Arc<OperationState>,
}

impl OperationGuard {
    pub fn begin(state: &Arc<OperationState>, listener: Arc<dyn OcrListener>) -> Self {
        state.begin(listener);
        Self {
            state: Arc::clone(state),
        }
    }

    pub fn state(&self) -> &OperationState {
        &self.state
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.state.end();
    }
}

/// Clears the current region when dropped
pub struct RegionGuard<'a> {
    state: &'a OperationState,
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        *self
            .state
            .current_region
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Cloneable handle for cancelling operations from another thread
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<OperationState>,
}

impl CancelHandle {
    pub(crate) fn new(state: Arc<OperationState>) -> Self {
        Self { state }
    }

    /// Cancel the running operation. Returns true for the first request
    /// since the operation began.
    pub fn cancel(&self) -> bool {
        self.state.request_cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::Message;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        messages: AtomicUsize,
    }

    impl OcrListener for Counter {
        fn on_progress_text(&self, _message: Message) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_valid_only_between_begin_and_cancel() {
        let state = OperationState::new();
        assert!(!state.is_valid());
        assert_eq!(state.phase(), Phase::Idle);

        state.begin(Arc::new(Counter::default()));
        assert!(state.is_valid());
        assert_eq!(state.phase(), Phase::Active);

        assert!(state.request_cancel());
        assert!(!state.is_valid());
        assert_eq!(state.phase(), Phase::Cancelling);

        state.end();
        assert!(!state.is_valid());
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_cancel_reports_first_request_only() {
        let state = OperationState::new();
        state.begin(Arc::new(Counter::default()));
        assert!(state.request_cancel());
        assert!(!state.request_cancel());
        assert!(!state.request_cancel());

        state.end();
        state.begin(Arc::new(Counter::default()));
        assert!(state.request_cancel());
    }

    #[test]
    fn test_end_is_idempotent() {
        let state = OperationState::new();
        state.begin(Arc::new(Counter::default()));
        state.end();
        state.end();
        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.last_progress(), 0);
    }

    #[test]
    fn test_dispatch_stops_after_cancel() {
        let counter = Arc::new(Counter::default());
        let state = OperationState::new();
        state.begin(counter.clone());

        assert!(state.dispatch(|l| l.on_progress_text(Message::Ocr)));
        state.request_cancel();
        assert!(!state.dispatch(|l| l.on_progress_text(Message::Ocr)));
        assert_eq!(counter.messages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_begin_replaces_active_listener() {
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        let state = OperationState::new();
        state.begin(first.clone());
        state.begin(second.clone());
        state.dispatch(|l| l.on_progress_text(Message::Ocr));
        assert_eq!(first.messages.load(Ordering::SeqCst), 0);
        assert_eq!(second.messages.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_begin_clears_previous_cancellation() {
        let state = OperationState::new();
        state.request_cancel();
        assert!(state.is_cancelled());
        state.begin(Arc::new(Counter::default()));
        assert!(!state.is_cancelled());
        assert!(state.is_valid());
    }

    #[test]
    fn test_guards_reset_state() {
        let state = Arc::new(OperationState::new());
        {
            let guard = OperationGuard::begin(&state, Arc::new(Counter::default()));
            let _region = guard.state().scan_region(Region::new(1, 2, 3, 4));
            assert_eq!(state.current_region(), Some(Region::new(1, 2, 3, 4)));
            assert!(state.is_valid());
        }
        assert_eq!(state.current_region(), None);
        assert_eq!(state.phase(), Phase::Idle);
    }

    #[test]
    fn test_raise_progress_is_monotonic() {
        let state = OperationState::new();
        state.raise_progress(30);
        state.raise_progress(10);
        assert_eq!(state.last_progress(), 30);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let state = Arc::new(OperationState::new());
        state.begin(Arc::new(Counter::default()));
        let handle = CancelHandle::new(Arc::clone(&state));

        let first = std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert!(first);
        assert!(state.is_cancelled());
        assert!(!state.is_valid());
    }
}
