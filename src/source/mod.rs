// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Source: a uniform handle over three variants — custom (software-signaled),
//! descriptor (OS-waitable handle), timer (fires at a deadline). See
//! spec §3/§4.1.
//!
//! Modeled as an `Arc`-backed handle around a `Mutex`-guarded [`SourceState`],
//! replacing the original's per-class vtable (init/copy/cleanup/equal/hash)
//! with an enum + trait object, per spec §9's redesign note.

mod delegate;
mod raw;

pub use delegate::{FnDelegate, SourceDelegate};
pub use raw::RawDescriptor;

use crate::clock::{MonotonicMillis, now_ms};
use crate::error::RunLoopError;
use crate::run_loop::RunLoopHandle;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Stable identity for a source within a single process, used as the map key
/// in [`crate::mode::Mode`]'s sets and in the platform wait backend's
/// token→source table. Derived from the source's `Arc` address.
pub type SourceId = usize;

/// Which of the three kinds a [`Source`] is, and its variant-specific data
/// (spec §3 "Variant tag ∈ {Custom, Descriptor, Timer}").
#[derive(Debug, Clone)]
pub enum SourceKind {
    Custom {
        priority: i32,
        timeout_ms: i64,
    },
    Descriptor {
        priority: i32,
        timeout_ms: i64,
        handle: RawDescriptor,
    },
    Timer {
        fire_time_ms: MonotonicMillis,
        period_ms: i64,
        leeway_ms: i64,
    },
}

impl SourceKind {
    #[must_use]
    pub fn is_timer(&self) -> bool {
        matches!(self, SourceKind::Timer { .. })
    }

    #[must_use]
    pub fn is_descriptor(&self) -> bool {
        matches!(self, SourceKind::Descriptor { .. })
    }
}

/// Mutable state behind a single source's lock (spec §3: "a lock").
struct SourceState {
    kind: SourceKind,
    initialized: bool,
    valid: bool,
    signaled: bool,
    delegate: Option<Arc<dyn SourceDelegate>>,
    /// The (run-loop, mode) this source is currently scheduled into, if any.
    /// A source is bound to at most one run-loop (spec §3 invariant).
    binding: Option<(Weak<crate::run_loop::RunLoopInner>, String)>,
}

struct SourceInner {
    state: Mutex<SourceState>,
}

/// A uniform handle over a custom, descriptor, or timer source (spec §2/§3).
///
/// Cheap to clone (an `Arc` bump); equality and hashing are by identity, not
/// by contents, matching the object-runtime `equal`/`hash` contract mapped
/// onto Rust's ownership model (spec §6.5).
#[derive(Clone)]
pub struct Source(Arc<SourceInner>);

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.lock().unwrap();
        f.debug_struct("Source")
            .field("id", &self.id())
            .field("kind", &state.kind)
            .field("valid", &state.valid)
            .field("signaled", &state.signaled)
            .finish()
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Source {}

impl std::hash::Hash for Source {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Source {
    fn from_kind(kind: SourceKind, delegate: Option<Arc<dyn SourceDelegate>>) -> Self {
        Source(Arc::new(SourceInner {
            state: Mutex::new(SourceState {
                kind,
                initialized: true,
                valid: false,
                signaled: false,
                delegate,
                binding: None,
            }),
        }))
    }

    /// Creates a custom source: user-signaled readiness, no OS handle
    /// involved (spec §4.1 `create_custom`).
    #[must_use]
    pub fn create_custom(timeout_ms: i64, delegate: Option<Arc<dyn SourceDelegate>>) -> Self {
        Self::from_kind(
            SourceKind::Custom {
                priority: 0,
                timeout_ms,
            },
            delegate,
        )
    }

    /// Creates a descriptor source bound to a kernel-waitable handle (spec
    /// §4.1 `create_descriptor`).
    #[must_use]
    pub fn create_descriptor(
        handle: RawDescriptor,
        timeout_ms: i64,
        delegate: Option<Arc<dyn SourceDelegate>>,
    ) -> Self {
        Self::from_kind(
            SourceKind::Descriptor {
                priority: 0,
                timeout_ms,
                handle,
            },
            delegate,
        )
    }

    /// Creates a timer source. `period_ms == 0` means one-shot (spec §3, §4.1
    /// `create_timer`).
    #[must_use]
    pub fn create_timer(delay_ms: i64, period_ms: i64, leeway_ms: i64) -> Self {
        Self::from_kind(
            SourceKind::Timer {
                fire_time_ms: now_ms().saturating_add(delay_ms),
                period_ms,
                leeway_ms,
            },
            None,
        )
    }

    /// Stable identity for map keys and equality checks, independent of the
    /// source's variant or mutable state.
    #[must_use]
    pub fn id(&self) -> SourceId {
        Arc::as_ptr(&self.0) as usize
    }

    /// Replaces the delegate. Valid for any variant (spec §4.1 `set_delegate`).
    pub fn set_delegate(&self, delegate: Option<Arc<dyn SourceDelegate>>) {
        let mut state = self.0.state.lock().unwrap();
        state.delegate = delegate;
    }

    /// Rebinds a descriptor source to a new handle. Errors with
    /// [`RunLoopError::WrongVariant`] on a non-descriptor source (spec §4.1
    /// `set_descriptor`).
    pub fn set_descriptor(&self, handle: RawDescriptor) -> Result<(), RunLoopError> {
        let mut state = self.0.state.lock().unwrap();
        match &mut state.kind {
            SourceKind::Descriptor { handle: h, .. } => {
                *h = handle;
                state.initialized = true;
                Ok(())
            }
            _ => Err(RunLoopError::WrongVariant),
        }
    }

    /// Rewrites a timer's schedule. Errors with [`RunLoopError::WrongVariant`]
    /// on a non-timer source (spec §4.1 `set_timer`).
    pub fn set_timer(&self, delay_ms: i64, period_ms: i64, leeway_ms: i64) -> Result<(), RunLoopError> {
        let mut state = self.0.state.lock().unwrap();
        match &mut state.kind {
            SourceKind::Timer {
                fire_time_ms,
                period_ms: p,
                leeway_ms: l,
            } => {
                *fire_time_ms = now_ms().saturating_add(delay_ms);
                *p = period_ms;
                *l = leeway_ms;
                state.initialized = true;
                Ok(())
            }
            _ => Err(RunLoopError::WrongVariant),
        }
    }

    /// Marks the source valid. Only an initialized source may be activated
    /// (spec §4.1 `activate`).
    pub fn activate(&self) -> Result<(), RunLoopError> {
        let mut state = self.0.state.lock().unwrap();
        if !state.initialized {
            return Err(RunLoopError::NotInitialized);
        }
        state.valid = true;
        Ok(())
    }

    /// Clears `valid` without detaching from any run-loop (spec §4.1
    /// `deactivate`).
    pub fn deactivate(&self) {
        self.0.state.lock().unwrap().valid = false;
    }

    /// Marks work pending. Legal from any thread on a valid source — the
    /// cross-thread notification primitive (spec §3, §4.1 `signal`).
    /// A no-op if the source is not valid.
    pub fn signal(&self) {
        let mut state = self.0.state.lock().unwrap();
        if state.valid {
            state.signaled = true;
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.state.lock().unwrap().valid
    }

    #[must_use]
    pub fn is_signaled(&self) -> bool {
        self.0.state.lock().unwrap().signaled
    }

    /// Idempotent: invalidates the source and, if scheduled, detaches it from
    /// its run-loop/mode, invoking the delegate's `cancel` hook exactly once
    /// (spec §3 "Cancellation is idempotent").
    pub fn cancel(&self) {
        let binding = {
            let mut state = self.0.state.lock().unwrap();
            if !state.valid && state.binding.is_none() {
                return;
            }
            state.valid = false;
            state.binding.take()
        };
        if let Some((weak_loop, mode_name)) = binding {
            if let Some(inner) = weak_loop.upgrade() {
                let handle = RunLoopHandle::from_inner(inner);
                handle.remove_source(self, &mode_name);
            }
        }
    }

    /// Returns the priority for custom/descriptor sources. Errors with
    /// [`RunLoopError::WrongVariant`] on a timer source (spec §4.1
    /// `get_priority`).
    pub fn priority(&self) -> Result<i32, RunLoopError> {
        match self.0.state.lock().unwrap().kind {
            SourceKind::Custom { priority, .. } | SourceKind::Descriptor { priority, .. } => {
                Ok(priority)
            }
            SourceKind::Timer { .. } => Err(RunLoopError::WrongVariant),
        }
    }

    /// Sets the priority for custom/descriptor sources (spec §4.1
    /// `set_priority`). Lower value runs first (spec §4.2 "lower integer =
    /// higher priority").
    pub fn set_priority(&self, new_priority: i32) -> Result<(), RunLoopError> {
        let mut state = self.0.state.lock().unwrap();
        match &mut state.kind {
            SourceKind::Custom { priority, .. } | SourceKind::Descriptor { priority, .. } => {
                *priority = new_priority;
                Ok(())
            }
            SourceKind::Timer { .. } => Err(RunLoopError::WrongVariant),
        }
    }

    /// The current binding, if any (spec §4.1 `get_run_loop`).
    #[must_use]
    pub fn run_loop(&self) -> Option<RunLoopHandle> {
        let state = self.0.state.lock().unwrap();
        state
            .binding
            .as_ref()
            .and_then(|(weak, _)| weak.upgrade())
            .map(RunLoopHandle::from_inner)
    }

    #[must_use]
    pub fn mode_name(&self) -> Option<String> {
        self.0.state.lock().unwrap().binding.as_ref().map(|(_, m)| m.clone())
    }

    /// Copies out the current variant tag and data, for the engine to read
    /// without holding the source lock across a callout (spec §4.2 "Lock
    /// order": copy-and-retain to a local buffer, drop the mode lock, then
    /// process).
    #[must_use]
    pub fn kind_snapshot(&self) -> SourceKind {
        self.0.state.lock().unwrap().kind.clone()
    }

    /// Internal scheduling hook (spec §4.1 "Scheduling hook (internal)"):
    /// binds this source to `loop_inner`/`mode_name` and invokes the
    /// delegate's `schedule` callout. Called by [`RunLoopHandle::add_source`]
    /// after the mode's own bookkeeping (and any platform registration) is
    /// done, but *not* while holding the mode lock (spec §4.2 lock order).
    pub(crate) fn bind(
        &self,
        loop_inner: &Weak<crate::run_loop::RunLoopInner>,
        mode_name: &str,
    ) -> Result<(), RunLoopError> {
        let delegate = {
            let mut state = self.0.state.lock().unwrap();
            if state.binding.is_some() {
                return Err(RunLoopError::AlreadyScheduled);
            }
            state.binding = Some((loop_inner.clone(), mode_name.to_string()));
            state.delegate.clone()
        };
        // Callout happens with the source lock released, so a delegate that
        // re-enters this source (e.g. cancels itself) cannot deadlock.
        if let Some(delegate) = delegate {
            if let Some(runloop) = loop_inner.upgrade() {
                let handle = RunLoopHandle::from_inner(runloop);
                delegate.schedule(&handle, mode_name);
            }
        }
        Ok(())
    }

    /// Internal cancellation hook's delegate callout and binding clear,
    /// called by [`RunLoopHandle::remove_source`] (spec §4.1 "Cancellation
    /// hook (internal)").
    pub(crate) fn unbind_and_notify(&self, loop_handle: &RunLoopHandle, mode_name: &str) {
        let delegate = {
            let mut state = self.0.state.lock().unwrap();
            state.binding = None;
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.cancel(loop_handle, mode_name);
        }
    }

    /// Clears `signaled` under the source lock and invokes `perform` (spec
    /// §4.2 step a: "clear `signaled` under source-lock, invoke
    /// `perform(info)` synchronously").
    pub(crate) fn clear_signal_and_perform(&self) {
        let delegate = {
            let mut state = self.0.state.lock().unwrap();
            state.signaled = false;
            state.delegate.clone()
        };
        if let Some(delegate) = delegate {
            delegate.perform();
        }
    }

    /// Advances a periodic timer past `now_ms` by whole `period` multiples
    /// (scheduled-drift policy, spec §4.2 step g), or returns `false` if the
    /// timer was one-shot and should be cancelled by the caller.
    pub(crate) fn advance_timer(&self, now: MonotonicMillis) -> bool {
        let mut state = self.0.state.lock().unwrap();
        match &mut state.kind {
            SourceKind::Timer {
                fire_time_ms,
                period_ms,
                ..
            } => {
                if *period_ms <= 0 {
                    false
                } else {
                    while *fire_time_ms <= now {
                        *fire_time_ms += *period_ms;
                    }
                    true
                }
            }
            _ => true,
        }
    }
}
