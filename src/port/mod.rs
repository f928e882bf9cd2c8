// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Inter-thread message port: a server/client pair built entirely on top of
//! custom sources (spec §2 item 6, §4.4). The canonical consumer of the
//! run-loop's custom-source contract — cross-thread wake-up, request
//! queuing, reply matching, and timeout semantics all exercise it.

mod client;
mod message;
mod registry;
mod server;

pub use client::Client;
pub use message::{Message, Payload, PrivateId};
pub use server::{Server, ServerCallback};
