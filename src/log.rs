// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Tracing setup, trimmed down from a richer TUI-oriented version. A
//! file-appender/`SharedWriter` layer doesn't apply to a plain library
//! crate; this keeps just the `fmt` + `EnvFilter` layer.

use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global `tracing` subscriber writing to stderr, honoring
/// `RUST_LOG` if set, defaulting to `debug` for this crate's own target and
/// `info` everywhere else. Idempotent: a second call is a no-op (mirrors
/// `tracing_subscriber`'s own `set_global_default` semantics, which errors
/// if a subscriber is already installed; that error is swallowed here since
/// re-initialization is routinely harmless in tests).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("core_run_loop=debug,info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
