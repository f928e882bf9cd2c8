// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! A per-thread reactor run-loop: custom/descriptor/timer sources, lifecycle
//! observers, mode-partitioned registries, a platform wait primitive, and an
//! inter-thread message-port layer built on top of it.
//!
//! Each OS thread gets its own run-loop, lazily created on first access via
//! [`RunLoopHandle::current`](run_loop::RunLoopHandle::current). Sources and
//! observers are scheduled into named [`Mode`](mode::Mode)s; a `run_in_modes`
//! call only considers the sources/timers/observers of the modes it names.
//!
//! ```no_run
//! use core_run_loop::run_loop::RunLoopHandle;
//! use core_run_loop::source::{FnDelegate, Source};
//! use std::sync::Arc;
//!
//! let run_loop = RunLoopHandle::current();
//! let source = Source::create_custom(0, Some(Arc::new(FnDelegate(|| {
//!     println!("fired");
//! }))));
//! source.activate().unwrap();
//! run_loop.add_source(&source, "Default").unwrap();
//! source.signal();
//! run_loop.run_in_modes(&["Default"], None, true);
//! ```

pub mod activity;
pub mod clock;
pub mod config;
pub mod error;
pub mod log;
pub mod mode;
pub mod observer;
pub mod port;
pub mod run_loop;
pub mod source;

mod registry;
mod wait;

pub use activity::{Activity, RunResult};
pub use error::{PortError, RunLoopError};
pub use run_loop::RunLoopHandle;
