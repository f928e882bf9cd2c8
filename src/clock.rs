// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Monotonic millisecond clock used for timer fire-times and message-port
//! deadlines (spec §3, §4.2, §5: "absolute deadlines computed from a
//! monotonic millisecond clock").

use std::time::Instant;

/// Milliseconds since an arbitrary but fixed epoch (the process's monotonic
/// clock origin). Never goes backwards, unaffected by wall-clock
/// adjustments.
pub type MonotonicMillis = i64;

/// Returns the current time in monotonic milliseconds, relative to a
/// process-wide origin established on first use.
#[must_use]
pub fn now_ms() -> MonotonicMillis {
    use std::sync::OnceLock;
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    let origin = *ORIGIN.get_or_init(Instant::now);
    origin.elapsed().as_millis() as MonotonicMillis
}

/// Adds `delay_ms` (which may be negative, treated as already-elapsed) to
/// [`now_ms`], producing an absolute fire-time.
#[must_use]
pub fn deadline_from_now(delay_ms: i64) -> MonotonicMillis {
    now_ms().saturating_add(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_monotonic_non_decreasing() {
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn deadline_from_now_adds_delay() {
        let before = now_ms();
        let deadline = deadline_from_now(1_000);
        assert!(deadline >= before + 1_000);
    }
}
