// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Compile-time constants. This crate has no runtime configuration surface
//! (spec addition, AMBIENT STACK §1.1): the few knobs it has are fixed at
//! build time rather than read from a config file or environment.

/// Messages drained per server source `perform` callout before re-signaling
/// and yielding back to the loop (spec §4.4 "Fairness"). Confirmed against
/// `CoreMessagePort.c`'s dispatch loop, which counts up to the same fixed
/// limit.
pub const MESSAGE_DRAIN_BATCH: usize = 32;

/// Re-exported for convenience; see [`crate::mode::DEFAULT_MODE_NAME`].
pub use crate::mode::DEFAULT_MODE_NAME;

/// Upper bound on descriptor sources a single run-loop may register with the
/// platform wait backend at once; see [`crate::wait::MAX_DESCRIPTORS`].
pub use crate::wait::MAX_DESCRIPTORS;
