// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Server port: a named inbound queue backed by a custom source on some
//! run-loop (spec §3 "Server", §4.4 "Server creation"/"Schedule on loop").

use super::client::ClientHandle;
use super::message::Message;
use crate::config::MESSAGE_DRAIN_BATCH;
use crate::error::RunLoopError;
use crate::run_loop::RunLoopHandle;
use crate::source::{Source, SourceDelegate};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// The server-side callback: receives each drained message's id and payload,
/// optionally producing a reply payload (spec §4.4 "calls the server
/// callback for each").
pub trait ServerCallback: Send + Sync {
    fn handle(&self, msg_id: i32, payload: &[u8]) -> Option<Vec<u8>>;
}

impl<F> ServerCallback for F
where
    F: Fn(i32, &[u8]) -> Option<Vec<u8>> + Send + Sync,
{
    fn handle(&self, msg_id: i32, payload: &[u8]) -> Option<Vec<u8>> {
        self(msg_id, payload)
    }
}

struct QueuedMessage {
    message: Message,
    reply_to: Option<ClientHandle>,
}

struct ServerState {
    queue: VecDeque<QueuedMessage>,
    source: Option<Source>,
    scheduled_loop: Option<RunLoopHandle>,
}

struct ServerInner {
    name: String,
    callback: Arc<dyn ServerCallback>,
    state: Mutex<ServerState>,
}

/// A named server port (spec §3 "Server"). Cloning yields another handle to
/// the same process-wide server.
#[derive(Clone)]
pub struct Server(Arc<ServerInner>);

impl PartialEq for Server {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server").field("name", &self.0.name).finish()
    }
}

impl Server {
    /// Atomically looks up or creates the named server in the process-wide
    /// registry (spec §4.4 "Server creation": "on hit, retain and return
    /// existing; on miss, create").
    #[must_use]
    pub fn create(name: &str, callback: impl ServerCallback + 'static) -> Server {
        super::registry::get_or_create_server(name, Arc::new(callback))
    }

    pub(crate) fn new_inner(name: String, callback: Arc<dyn ServerCallback>) -> Server {
        Server(Arc::new(ServerInner {
            name,
            callback,
            state: Mutex::new(ServerState {
                queue: VecDeque::new(),
                source: None,
                scheduled_loop: None,
            }),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Lazily builds the server's backing custom source and schedules it on
    /// `run_loop` under `mode_name` (spec §4.4 "Schedule on loop").
    pub fn schedule_in_run_loop(&self, run_loop: &RunLoopHandle, mode_name: &str) -> Result<(), RunLoopError> {
        let source = {
            let mut state = self.0.state.lock().unwrap();
            if state.source.is_none() {
                let delegate: Arc<dyn SourceDelegate> = Arc::new(ServerSourceDelegate {
                    server: Arc::downgrade(&self.0),
                });
                let source = Source::create_custom(0, Some(delegate));
                source.activate()?;
                state.source = Some(source);
            }
            state.scheduled_loop = Some(run_loop.clone());
            state.source.clone().unwrap()
        };
        run_loop.add_source(&source, mode_name)
    }

    /// Appends `message` to the pending queue; if it was empty, signals the
    /// backing source and wakes its loop (spec §4.4 "Send request" step 4).
    pub(crate) fn enqueue(&self, message: Message, reply_to: Option<ClientHandle>) {
        let (source, scheduled_loop) = {
            let mut state = self.0.state.lock().unwrap();
            let was_empty = state.queue.is_empty();
            state.queue.push_back(QueuedMessage { message, reply_to });
            if was_empty {
                (state.source.clone(), state.scheduled_loop.clone())
            } else {
                (None, None)
            }
        };
        if let Some(source) = source {
            source.signal();
        }
        if let Some(loop_handle) = scheduled_loop {
            let _ = loop_handle.wake_up();
        }
    }

    /// Drains up to [`MESSAGE_DRAIN_BATCH`] messages, invoking the callback
    /// for each and delivering replies to callers that asked for one (spec
    /// §4.4 "Fairness": bounded work per turn, re-signal if more remain).
    fn drain(&self) {
        let (drained, more_remain, source, scheduled_loop) = {
            let mut state = self.0.state.lock().unwrap();
            let mut drained = Vec::with_capacity(MESSAGE_DRAIN_BATCH);
            for _ in 0..MESSAGE_DRAIN_BATCH {
                match state.queue.pop_front() {
                    Some(item) => drained.push(item),
                    None => break,
                }
            }
            let more_remain = !state.queue.is_empty();
            (drained, more_remain, state.source.clone(), state.scheduled_loop.clone())
        };

        for queued in drained {
            let reply = self.0.callback.handle(queued.message.msg_id, &queued.message.payload);
            if queued.message.reply_expected {
                if let (Some(reply_to), Some(reply_payload)) = (queued.reply_to, reply) {
                    reply_to.deliver_reply(queued.message.private_id, reply_payload);
                }
            }
        }

        if more_remain {
            if let Some(source) = source {
                source.signal();
            }
            if let Some(loop_handle) = scheduled_loop {
                let _ = loop_handle.wake_up();
            }
        }
    }
}

struct ServerSourceDelegate {
    server: Weak<ServerInner>,
}

impl SourceDelegate for ServerSourceDelegate {
    fn perform(&self) {
        if let Some(inner) = self.server.upgrade() {
            Server(inner).drain();
        }
    }
}
