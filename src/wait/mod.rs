// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! The platform wait primitive (spec §4.3): blocks the calling thread until
//! a registered descriptor is ready, a timeout elapses, or the run-loop is
//! woken explicitly.
//!
//! One backend per platform family, selected at compile time. Both share the
//! same `PlatformReactor` surface so [`crate::run_loop`] never branches on
//! `cfg(unix)`/`cfg(windows)` itself.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixReactor as PlatformReactor;
#[cfg(windows)]
pub use windows::WindowsReactor as PlatformReactor;

use crate::error::RunLoopError;
use crate::source::RawDescriptor;
use std::time::Duration;

/// The maximum number of descriptor sources a single run-loop may register
/// at once. POSIX backends could grow past this, but Windows'
/// `MsgWaitForMultipleObjects` caps at `MAXIMUM_WAIT_OBJECTS` (64) minus one
/// slot reserved for the self-wake handle, so both backends share the limit
/// for behavioral parity across platforms (spec §4.3).
pub const MAX_DESCRIPTORS: usize = 63;

/// Why [`PlatformReactor::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One or more registered descriptors are ready; the engine reads which
    /// via [`PlatformWait::ready_tokens`].
    Ready,
    /// Woken via a [`Waker`] rather than descriptor readiness or timeout.
    Woken,
    /// The requested timeout elapsed with nothing ready.
    TimedOut,
}

/// Platform wait primitive: register/deregister descriptor sources, block
/// until one is ready or `timeout` elapses, and support an explicit
/// cross-thread wake-up (spec §4.3).
pub trait PlatformWait: Send {
    /// Registers `handle` for readability, associated with `token` (an
    /// opaque id the caller uses to look itself back up after `wait`
    /// returns). Errors with [`RunLoopError::TooManyDescriptors`] past
    /// [`MAX_DESCRIPTORS`].
    fn register(&mut self, token: usize, handle: RawDescriptor) -> Result<(), RunLoopError>;

    fn deregister(&mut self, token: usize);

    /// Blocks until a registered descriptor is ready, `wake` is called from
    /// another thread, or `timeout` elapses (`None` = wait forever).
    fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome, RunLoopError>;

    /// Tokens observed ready by the most recent `wait` call returning
    /// `Ready`.
    fn ready_tokens(&self) -> Vec<usize>;

    /// A cloneable handle that can interrupt a concurrent/future `wait` call
    /// from any thread (spec §4.3 "explicit wake").
    fn waker(&self) -> Box<dyn Waker>;
}

/// Cross-thread handle to interrupt a [`PlatformWait::wait`] call in
/// progress, or the next one to start (spec §3 "wake_up").
pub trait Waker: Send + Sync {
    fn wake(&self) -> Result<(), RunLoopError>;
}
