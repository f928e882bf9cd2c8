// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Run-loop: the engine. Owns a set of named modes, a platform wait
//! backend, and runs the algorithm in [`engine::run_in_modes`] (spec §4.2).

mod engine;

use crate::activity::{Activity, RunResult};
use crate::clock::MonotonicMillis;
use crate::error::RunLoopError;
use crate::mode::{DEFAULT_MODE_NAME, Mode};
use crate::observer::{Observer, ObserverId};
use crate::source::{Source, SourceId};
use crate::wait::{PlatformReactor, PlatformWait, Waker};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub(crate) struct RunLoopInner {
    modes: Mutex<IndexMap<String, Mode>>,
    reactor: Mutex<PlatformReactor>,
    waker: Arc<dyn Waker>,
    /// Descriptor sources registered with the platform wait backend, keyed
    /// by the token the backend hands back on readiness. Populated/cleared
    /// alongside `modes`, but kept separate so the engine's wait-outcome
    /// step (§4.2.f) doesn't need to search every mode to resolve a token.
    descriptor_index: Mutex<HashMap<SourceId, Source>>,
    stopped: AtomicBool,
    sleeping: AtomicBool,
    /// Set for the duration of a `run_in_modes` call; empty otherwise (spec
    /// §3 Run-loop "current-modes set").
    current_modes: Mutex<Vec<String>>,
}

impl RunLoopInner {
    fn new() -> Result<Arc<Self>, RunLoopError> {
        let reactor = PlatformReactor::new()?;
        let waker: Arc<dyn Waker> = Arc::from(reactor.waker());
        Ok(Arc::new(RunLoopInner {
            modes: Mutex::new(IndexMap::new()),
            reactor: Mutex::new(reactor),
            waker,
            descriptor_index: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
            sleeping: AtomicBool::new(false),
            current_modes: Mutex::new(Vec::new()),
        }))
    }
}

/// A handle to a per-thread run-loop (spec §2 item 4, §6.1 "Run-loop").
///
/// Cheap to clone; all clones refer to the same engine. Only the thread that
/// obtained it via [`RunLoopHandle::current`] should call `run`/`run_in_modes`
/// — every other operation (`add_source`, `signal`, `wake_up`, `stop`, ...)
/// is safe to call from any thread (spec §3 Run-loop invariant).
#[derive(Clone)]
pub struct RunLoopHandle(pub(crate) Arc<RunLoopInner>);

impl PartialEq for RunLoopHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for RunLoopHandle {}

impl std::fmt::Debug for RunLoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopHandle")
            .field("stopped", &self.0.stopped.load(Ordering::Relaxed))
            .field("sleeping", &self.0.sleeping.load(Ordering::Relaxed))
            .finish()
    }
}

impl RunLoopHandle {
    pub(crate) fn from_inner(inner: Arc<RunLoopInner>) -> Self {
        RunLoopHandle(inner)
    }

    /// Creates a fresh, unregistered run-loop. Exposed crate-wide so the
    /// thread-local registry (the sole public entry point, via `current()`)
    /// can construct one per thread; also used directly by tests that want
    /// a loop not tied to the calling thread's registry slot.
    pub(crate) fn new_for_thread() -> Result<Self, RunLoopError> {
        Ok(RunLoopHandle(RunLoopInner::new()?))
    }

    pub(crate) fn downgrade(&self) -> Weak<RunLoopInner> {
        Arc::downgrade(&self.0)
    }

    /// The calling thread's run-loop, created on first access (spec §2 item
    /// 5, §6.1 `current()`).
    #[must_use]
    pub fn current() -> RunLoopHandle {
        crate::registry::current()
    }

    fn mode_entry<'a>(modes: &'a mut IndexMap<String, Mode>, name: &str) -> &'a mut Mode {
        modes
            .entry(name.to_string())
            .or_insert_with(|| Mode::new(name))
    }

    /// Adds `source` to `mode_name` on this loop (spec §4.1 "Scheduling hook").
    /// Errors with [`RunLoopError::AlreadyScheduled`] if the source is bound
    /// elsewhere.
    pub fn add_source(&self, source: &Source, mode_name: &str) -> Result<(), RunLoopError> {
        let kind = source.kind_snapshot();
        if let crate::source::SourceKind::Descriptor { handle, .. } = kind {
            // Wake any in-progress wait before taking the reactor lock: the
            // wait call holds that lock for its whole blocking duration, so
            // without an unconditional wake first a wait with no timers and
            // no other traffic would never release it (spec §4.2 "Add/remove
            // under concurrency... Implementations may always wake").
            let _ = self.wake_up();
            let mut reactor = self.0.reactor.lock().unwrap();
            reactor.register(source.id(), handle)?;
            drop(reactor);
            self.0
                .descriptor_index
                .lock()
                .unwrap()
                .insert(source.id(), source.clone());
        }

        {
            let mut modes = self.0.modes.lock().unwrap();
            let mode = Self::mode_entry(&mut modes, mode_name);
            mode.insert_source(source.clone());
        }

        source.bind(&self.downgrade(), mode_name)?;
        let _ = self.wake_up();
        Ok(())
    }

    /// Removes `source` from `mode_name`, invoking its delegate's `cancel`
    /// hook (spec §4.1 "Cancellation hook").
    pub fn remove_source(&self, source: &Source, mode_name: &str) {
        {
            let mut modes = self.0.modes.lock().unwrap();
            if let Some(mode) = modes.get_mut(mode_name) {
                mode.remove_source(source);
            }
        }
        if source.kind_snapshot().is_descriptor() {
            self.0.descriptor_index.lock().unwrap().remove(&source.id());
            let mut reactor = self.0.reactor.lock().unwrap();
            reactor.deregister(source.id());
        }
        source.unbind_and_notify(self, mode_name);
    }

    #[must_use]
    pub fn contains_source(&self, source: &Source, mode_name: &str) -> bool {
        self.0
            .modes
            .lock()
            .unwrap()
            .get(mode_name)
            .is_some_and(|mode| mode.contains_source(source))
    }

    pub fn add_observer(&self, observer: &Observer, mode_name: &str) {
        let mut modes = self.0.modes.lock().unwrap();
        Self::mode_entry(&mut modes, mode_name).insert_observer(observer.clone());
    }

    pub fn remove_observer(&self, observer: &Observer, mode_name: &str) {
        if let Some(mode) = self.0.modes.lock().unwrap().get_mut(mode_name) {
            mode.remove_observer_id(observer.id());
        }
    }

    /// Names of every mode this loop currently knows about (spec §6.1
    /// `get_copy_of_modes`).
    #[must_use]
    pub fn get_copy_of_modes(&self) -> Vec<String> {
        self.0.modes.lock().unwrap().keys().cloned().collect()
    }

    /// The mode currently being processed by a `run`/`run_in_modes` call on
    /// the owning thread, if any (spec §6.1 `get_current_mode_name`).
    #[must_use]
    pub fn get_current_mode_name(&self) -> Option<String> {
        self.0.current_modes.lock().unwrap().first().cloned()
    }

    /// Pokes the self-wakeup handle without setting `stopped` (spec §4.2
    /// "Stop and wake").
    pub fn wake_up(&self) -> Result<(), RunLoopError> {
        self.0.waker.wake()
    }

    /// Atomically requests termination and pokes the self-wakeup handle
    /// (spec §4.2 "Stop and wake"). Asynchronous: the loop exits at its next
    /// exit-check boundary (spec §5 "Cancellation / timeouts").
    pub fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
        let _ = self.wake_up();
    }

    #[must_use]
    pub fn is_sleeping(&self) -> bool {
        self.0.sleeping.load(Ordering::Relaxed)
    }

    /// Runs the default mode until stopped or finished (spec §6.1 `run()`).
    pub fn run(&self) -> RunResult {
        self.run_in_modes(&[DEFAULT_MODE_NAME], None, false)
    }

    /// Runs the named modes until one of the exit conditions in spec §4.2
    /// step h holds (spec §6.1 `run_in_modes`).
    ///
    /// `deadline_ms` is an absolute [`MonotonicMillis`] timestamp (`None` =
    /// no deadline). `return_after_handle`, when set, makes the function
    /// return [`RunResult::SourceHandled`] as soon as the first batch of
    /// custom/descriptor sources in an iteration has been dispatched.
    pub fn run_in_modes(
        &self,
        modes: &[&str],
        deadline_ms: Option<MonotonicMillis>,
        return_after_handle: bool,
    ) -> RunResult {
        engine::run_in_modes(self, modes, deadline_ms, return_after_handle)
    }

    pub(crate) fn fire_observers(&self, activity: Activity, mode_names: &[String]) {
        let modes = self.0.modes.lock().unwrap();
        let mut observers: Vec<Observer> = Vec::new();
        for name in mode_names {
            if let Some(mode) = modes.get(name) {
                observers.extend(mode.observers().cloned());
            }
        }
        drop(modes);
        // Ascending priority within an activity (spec §4.2 "Ordering and
        // tie-breaks"), stable so same-priority ties keep insertion order.
        observers.sort_by_key(Observer::priority);
        for observer in observers {
            observer.fire_if_applicable(activity, mode_names.first().map_or("", String::as_str));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Source;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn add_then_contains_then_remove() {
        let handle = RunLoopHandle::new_for_thread().unwrap();
        let source = Source::create_custom(0, None);
        source.activate().unwrap();
        handle.add_source(&source, "TestMode").unwrap();
        assert!(handle.contains_source(&source, "TestMode"));
        handle.remove_source(&source, "TestMode");
        assert!(!handle.contains_source(&source, "TestMode"));
    }

    #[test]
    fn run_in_modes_finishes_when_mode_empty() {
        let handle = RunLoopHandle::new_for_thread().unwrap();
        let result = handle.run_in_modes(&["Empty"], None, false);
        assert_eq!(result, RunResult::Finished);
    }

    #[test]
    fn stop_from_same_thread_returns_stopped() {
        let handle = RunLoopHandle::new_for_thread().unwrap();
        let source = Source::create_timer(5, 0, 0);
        handle.add_source(&source, DEFAULT_MODE_NAME).unwrap();
        source.activate().unwrap();
        handle.stop();
        let result = handle.run_in_modes(&[DEFAULT_MODE_NAME], None, false);
        assert_eq!(result, RunResult::Stopped);
    }

    #[test]
    fn custom_source_dispatch_marks_signaled_false_after_perform() {
        let handle = RunLoopHandle::new_for_thread().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        let delegate = Arc::new(crate::source::FnDelegate(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        let source = Source::create_custom(0, Some(delegate));
        source.activate().unwrap();
        handle.add_source(&source, DEFAULT_MODE_NAME).unwrap();
        source.signal();
        let result = handle.run_in_modes(&[DEFAULT_MODE_NAME], None, true);
        assert_eq!(result, RunResult::SourceHandled);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!source.is_signaled());
    }
}
