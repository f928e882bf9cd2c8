// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Client port: resolves a named server and posts requests, optionally
//! spinning the calling thread's run-loop for a reply (spec §3 "Client",
//! §4.4 "Client creation"/"Send request").

use super::message::{Message, Payload, PrivateId};
use super::server::Server;
use crate::clock::{deadline_from_now, now_ms};
use crate::error::PortError;
use crate::run_loop::RunLoopHandle;
use crate::source::{FnDelegate, Source};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

struct ClientState {
    server: Option<Server>,
    next_counter: i64,
    replies: HashMap<PrivateId, Option<Payload>>,
    reply_source: Option<Source>,
}

struct ClientInner {
    name: String,
    state: Mutex<ClientState>,
}

/// A client port (spec §3 "Client").
#[derive(Clone)]
pub struct Client(Arc<ClientInner>);

impl PartialEq for Client {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Weak handle a server holds per in-flight request so it can deliver a
/// reply without keeping the client alive (spec §3 Message "sender port").
#[derive(Clone)]
pub(crate) struct ClientHandle(Weak<ClientInner>);

impl ClientHandle {
    /// Writes `payload` into the client's replies map and wakes whatever
    /// loop the client's reply source is scheduled on (spec §4.4 "Send
    /// reply").
    pub(crate) fn deliver_reply(&self, private_id: PrivateId, payload: Payload) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        let (source, loop_handle) = {
            let mut state = inner.state.lock().unwrap();
            if let Some(slot) = state.replies.get_mut(&private_id) {
                *slot = Some(payload);
            }
            let source = state.reply_source.clone();
            (source.clone(), source.and_then(|s| s.run_loop()))
        };
        if let Some(source) = source {
            source.signal();
        }
        if let Some(loop_handle) = loop_handle {
            let _ = loop_handle.wake_up();
        }
    }
}

impl Client {
    /// Creates a client for `name`, resolving the server now if it already
    /// exists (resolution is retried on first request otherwise) (spec §4.4
    /// "Client creation").
    #[must_use]
    pub fn create(name: &str) -> Client {
        let server = super::registry::lookup_server(name);
        Client(Arc::new(ClientInner {
            name: name.to_string(),
            state: Mutex::new(ClientState {
                server,
                next_counter: 0,
                replies: HashMap::new(),
                reply_source: None,
            }),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    fn resolve_server(&self) -> Option<Server> {
        let mut state = self.0.state.lock().unwrap();
        if state.server.is_none() {
            state.server = super::registry::lookup_server(&self.0.name);
        }
        state.server.clone()
    }

    fn handle(&self) -> ClientHandle {
        ClientHandle(Arc::downgrade(&self.0))
    }

    /// Posts a request, optionally waiting for a reply (spec §4.4 "Send
    /// request", steps 1-7).
    ///
    /// `send_timeout_ms` must be `0`: resolving the "currently not
    /// available" ambiguity (spec §9), this crate rejects non-zero values
    /// with [`PortError::SendTimeout`] rather than implementing
    /// enqueue-timeout semantics the original never shipped.
    /// `recv_timeout_ms < 0` means "no reply expected" (`reply_expected =
    /// false`); otherwise it is the reply wait's relative deadline.
    pub fn send_request(
        &self,
        run_loop: &RunLoopHandle,
        msg_id: i32,
        payload: &[u8],
        send_timeout_ms: i64,
        recv_timeout_ms: i64,
        reply_mode: &str,
    ) -> Result<Option<Payload>, PortError> {
        if send_timeout_ms != 0 {
            return Err(PortError::SendTimeout);
        }

        // 1. Resolve server if not yet resolved.
        let server = self.resolve_server().ok_or(PortError::TransportError)?;

        // 2. Allocate message with a fresh private id.
        let reply_expected = recv_timeout_ms >= 0;
        let private_id = {
            let mut state = self.0.state.lock().unwrap();
            state.next_counter += 1;
            -(state.next_counter)
        };

        // 3. If reply expected: lazily create reply source, register the
        // pending slot, schedule the source if not already scheduled.
        let mut scheduled_here = false;
        let reply_source = if reply_expected {
            let mut state = self.0.state.lock().unwrap();
            if state.reply_source.is_none() {
                let source = Source::create_custom(0, Some(Arc::new(FnDelegate(|| {}))));
                source.activate().map_err(|_| PortError::TransportError)?;
                state.reply_source = Some(source);
            }
            let source = state.reply_source.clone().unwrap();
            state.replies.insert(private_id, None);
            let already_scheduled = source.run_loop().is_some();
            drop(state);
            if !already_scheduled {
                run_loop
                    .add_source(&source, reply_mode)
                    .map_err(|_| PortError::TransportError)?;
                scheduled_here = true;
            }
            Some(source)
        } else {
            None
        };

        // 4. Enqueue on the server; signal + wake happens inside enqueue.
        let message = Message {
            private_id,
            msg_id,
            reply_expected,
            sender: self.0.name.clone(),
            payload: payload.to_vec(),
        };
        let reply_to = if reply_expected { Some(self.handle()) } else { None };
        server.enqueue(message, reply_to);

        // 5. No reply expected: return immediately.
        if !reply_expected {
            return Ok(None);
        }

        // 6. Spin the calling thread's run-loop in `reply_mode` until the
        // reply arrives or the deadline passes.
        let deadline = deadline_from_now(recv_timeout_ms);
        let outcome = loop {
            {
                let mut state = self.0.state.lock().unwrap();
                if let Some(slot) = state.replies.get_mut(&private_id) {
                    if slot.is_some() {
                        break Ok(slot.take());
                    }
                }
            }
            if now_ms() >= deadline {
                break Err(PortError::ReceiveTimeout);
            }
            run_loop.run_in_modes(&[reply_mode], Some(deadline), false);
        };

        // 7. Clean up: unschedule if we scheduled it, always drop the entry.
        self.0.state.lock().unwrap().replies.remove(&private_id);
        if scheduled_here {
            if let Some(source) = reply_source {
                run_loop.remove_source(&source, reply_mode);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_loop::RunLoopHandle;

    #[test]
    fn send_without_reply_expected_never_waits() {
        let run_loop = RunLoopHandle::new_for_thread().unwrap();
        let server = Server::create("core_run_loop::tests::fire_and_forget", |_id, payload| {
            Some(payload.to_vec())
        });
        server.schedule_in_run_loop(&run_loop, "Default").unwrap();
        let client = Client::create("core_run_loop::tests::fire_and_forget");
        let result = client.send_request(&run_loop, 1, b"ping", 0, -1, "Default");
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn unresolved_server_returns_transport_error() {
        let run_loop = RunLoopHandle::new_for_thread().unwrap();
        let client = Client::create("core_run_loop::tests::nonexistent_server");
        let result = client.send_request(&run_loop, 1, b"ping", 0, -1, "Default");
        assert_eq!(result, Err(PortError::TransportError));
    }
}
