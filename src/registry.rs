// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Thread-local run-loop registry (spec §2 item 5, §9 "Global mutable
//! state": "the thread-local is a platform TLS slot").

use crate::run_loop::RunLoopHandle;
use std::cell::RefCell;

thread_local! {
    static CURRENT: RefCell<Option<RunLoopHandle>> = const { RefCell::new(None) };
}

/// Returns this thread's run-loop, lazily creating one on first access
/// (spec §6.1 `current()`). Every call on the same thread returns a handle
/// to the same engine.
///
/// Construction only fails if the platform wait backend itself can't be
/// created (e.g. the process is out of file descriptors for the self-wake
/// socketpair) — a condition every other object-creation API in this crate
/// also can't recover from, so this mirrors `CFRunLoopGetCurrent`'s
/// infallible signature and panics rather than threading a `Result` through
/// every call site that merely wants "my loop".
pub fn current() -> RunLoopHandle {
    CURRENT.with(|cell| {
        let mut slot = cell.borrow_mut();
        if let Some(handle) = slot.as_ref() {
            return handle.clone();
        }
        let handle = RunLoopHandle::new_for_thread()
            .expect("failed to initialize the platform wait backend for this thread's run-loop");
        *slot = Some(handle.clone());
        handle
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_is_stable_within_a_thread() {
        let a = current();
        let b = current();
        assert_eq!(a, b);
    }

    #[test]
    fn different_threads_get_different_loops() {
        let a = current();
        let b = std::thread::spawn(current).join().unwrap();
        assert_ne!(a, b);
    }
}
