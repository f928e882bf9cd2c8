// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Observer: a non-dispatch callback invoked at lifecycle points of a
//! run-loop iteration (spec §2/§3, item 2).

use crate::activity::Activity;
use std::sync::{Arc, Mutex};

/// Stable identity for an observer, mirroring [`crate::source::SourceId`].
pub type ObserverId = usize;

/// The callback an [`Observer`] invokes. Takes the activity that triggered
/// it and the name of the mode the run-loop is currently processing.
pub trait ObserverCallback: Send + Sync {
    fn call(&self, activity: Activity, mode_name: &str);
}

impl<F: Fn(Activity, &str) + Send + Sync> ObserverCallback for F {
    fn call(&self, activity: Activity, mode_name: &str) {
        self(activity, mode_name);
    }
}

struct ObserverState {
    valid: bool,
    /// Part of the data model (§3 "flags {valid, signaled}") but never set
    /// by any operation in this module — mirrors the generic object info-bit
    /// layout shared across all run-loop object kinds. Kept for data-model
    /// fidelity; firing is gated on `valid` alone (spec §3 Observer
    /// invariant).
    #[allow(dead_code)]
    signaled: bool,
}

struct ObserverInner {
    activities: u32,
    priority: i32,
    callback: Arc<dyn ObserverCallback>,
    state: Mutex<ObserverState>,
}

/// A lifecycle observer: fires when its activity mask intersects the
/// run-loop's current activity and it is valid (spec §3 Observer invariant).
#[derive(Clone)]
pub struct Observer(Arc<ObserverInner>);

impl PartialEq for Observer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Observer {}

impl std::hash::Hash for Observer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Observer {
    /// Creates an observer (spec §4.1/§6.1 `create_observer`). `activities`
    /// is the OR of [`Activity`] bits (spec §6.2).
    #[must_use]
    pub fn new(activities: u32, priority: i32, callback: impl ObserverCallback + 'static) -> Self {
        Observer(Arc::new(ObserverInner {
            activities,
            priority,
            callback: Arc::new(callback),
            state: Mutex::new(ObserverState {
                valid: true,
                signaled: false,
            }),
        }))
    }

    #[must_use]
    pub fn id(&self) -> ObserverId {
        Arc::as_ptr(&self.0) as usize
    }

    #[must_use]
    pub fn priority(&self) -> i32 {
        self.0.priority
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.state.lock().unwrap().valid
    }

    /// Idempotent (spec §7 "Cancellation is idempotent and never errors").
    pub fn cancel(&self) {
        self.0.state.lock().unwrap().valid = false;
    }

    /// Fires the callback if `activity` intersects this observer's mask and
    /// it is still valid (spec §3 Observer invariant).
    pub(crate) fn fire_if_applicable(&self, activity: Activity, mode_name: &str) {
        if self.0.activities & activity.bit() == 0 {
            return;
        }
        if !self.is_valid() {
            return;
        }
        self.0.callback.call(activity, mode_name);
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id())
            .field("activities", &self.0.activities)
            .field("priority", &self.0.priority)
            .field("valid", &self.is_valid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_only_on_matching_activity() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let observer = Observer::new(Activity::Entry | Activity::Exit, 0, move |_a, _m| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        observer.fire_if_applicable(Activity::BeforeWaiting, "Default");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        observer.fire_if_applicable(Activity::Entry, "Default");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_observer_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let observer = Observer::new(Activity::Entry.bit(), 0, move |_a, _m| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        observer.cancel();
        observer.fire_if_applicable(Activity::Entry, "Default");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!observer.is_valid());
    }
}
