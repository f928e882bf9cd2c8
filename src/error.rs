// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Error types for the run-loop engine and the message-port layer. See
//! [`RunLoopError`] and [`PortError`].

/// Errors surfaced by run-loop operations (source/observer/timer/mode
/// management, `run`/`run_in_modes`, `wake_up`, `stop`).
///
/// Argument-validation failures never mutate state (spec §7).
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum RunLoopError {
    /// Operation attempted on a source/observer/timer that has been cancelled
    /// (`valid == false`).
    #[error("operation attempted on an invalid (cancelled) handle")]
    #[diagnostic(
        code(core_run_loop::invalid),
        help("the source, observer, or timer was already cancelled; create a new one")
    )]
    Invalid,

    /// `activate()` called on a source whose required fields were never set
    /// (`initialized == false`).
    #[error("source is not initialized; set its descriptor/timer/delegate fields first")]
    #[diagnostic(code(core_run_loop::not_initialized))]
    NotInitialized,

    /// A setter or `set_priority`/`set_descriptor`/`set_timer` call was made
    /// against a source of the wrong variant (e.g. `set_timer` on a custom
    /// source).
    #[error("operation is not valid for this source variant")]
    #[diagnostic(code(core_run_loop::wrong_variant))]
    WrongVariant,

    /// The source is already scheduled in a (run-loop, mode) pair; a source
    /// may be bound to at most one run-loop at a time (spec §3 invariant).
    #[error("source is already scheduled on a run-loop")]
    #[diagnostic(code(core_run_loop::already_scheduled))]
    AlreadyScheduled,

    /// A mode's descriptor-source count would exceed the platform's
    /// per-call wait-handle limit (spec §4.3/§7: document the cap, do not
    /// silently truncate).
    #[error("mode would exceed the platform wait-handle limit ({limit})")]
    #[diagnostic(
        code(core_run_loop::too_many_descriptors),
        help("split descriptor sources across more modes, or multiple run-loops")
    )]
    TooManyDescriptors {
        /// The platform per-call limit that was exceeded.
        limit: usize,
    },

    /// The platform wait primitive (`poll`/`epoll_wait`/
    /// `MsgWaitForMultipleObjects`) returned an unexpected error (not
    /// `EINTR`, which is retried transparently).
    #[error("platform wait backend failed")]
    #[diagnostic(code(core_run_loop::wait_backend))]
    WaitBackend(#[source] std::io::Error),

    /// `current()` was called on a thread with no run-loop yet and creation
    /// failed (OS resource exhaustion creating the self-wake descriptor).
    #[error("failed to create the thread's run-loop")]
    #[diagnostic(code(core_run_loop::create_failed))]
    CreateFailed(#[source] std::io::Error),
}

/// Errors (and one reserved-but-unproduced variant) from message-port
/// operations. `Success` is not represented here — `send_request` returns
/// `Ok(Option<Vec<u8>>)` on success.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum PortError {
    /// Reserved: documented as "currently not available" upstream. This
    /// crate produces it only when a non-zero `send_timeout` is passed to
    /// `send_request` (spec §9 "Ambiguities to preserve intent on, not
    /// guess").
    #[error("send_timeout is not supported; pass 0")]
    #[diagnostic(code(core_run_loop::port::send_timeout_unsupported))]
    SendTimeout,

    /// `recv_timeout` elapsed before a reply arrived.
    #[error("timed out waiting for a reply")]
    #[diagnostic(code(core_run_loop::port::receive_timeout))]
    ReceiveTimeout,

    /// The port (client or server) became invalid while a request was
    /// in flight.
    #[error("the port was invalidated")]
    #[diagnostic(code(core_run_loop::port::transport_error))]
    TransportError,

    /// The operation was attempted on the wrong role (e.g. sending a reply
    /// through a server port) or with a malformed argument.
    #[error("invalid message-port operation")]
    #[diagnostic(code(core_run_loop::port::invalid))]
    Invalid,
}
