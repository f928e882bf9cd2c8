// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! The run algorithm itself (spec §4.2 "Core algorithm"). Kept apart from
//! [`super::RunLoopHandle`]'s public surface so the step-by-step structure
//! mirrors the algorithm's lettered steps directly.

use super::RunLoopHandle;
use crate::activity::{Activity, RunResult};
use crate::clock::{MonotonicMillis, now_ms};
use crate::source::{Source, SourceKind};
use crate::wait::{PlatformWait, WaitOutcome};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::trace;

pub(super) fn run_in_modes(
    handle: &RunLoopHandle,
    modes: &[&str],
    deadline_ms: Option<MonotonicMillis>,
    return_after_handle: bool,
) -> RunResult {
    let mode_names: Vec<String> = modes.iter().map(|s| s.to_string()).collect();
    {
        let mut current = handle.0.current_modes.lock().unwrap();
        *current = mode_names.clone();
        for name in &mode_names {
            super::RunLoopHandle::mode_entry(&mut handle.0.modes.lock().unwrap(), name);
        }
    }
    handle.0.stopped.store(false, Ordering::SeqCst);
    handle.fire_observers(Activity::Entry, &mode_names);

    let result = loop {
        // --- a. BeforeSources + custom-source dispatch ---
        handle.fire_observers(Activity::BeforeSources, &mode_names);
        let due_custom = collect_due_custom_sources(handle, &mode_names);
        let mut poll_mode = false;
        let mut handled_any = false;
        for source in &due_custom {
            source.clear_signal_and_perform();
            handled_any = true;
        }
        if return_after_handle && handled_any {
            poll_mode = true;
        }

        // --- b/c. BeforeWaiting + sleep budget ---
        if !poll_mode {
            handle.fire_observers(Activity::BeforeWaiting, &mode_names);
        }
        handle.0.sleeping.store(true, Ordering::SeqCst);

        let now = now_ms();
        let earliest_timer = earliest_timer_deadline(handle, &mode_names);
        let mut sleep_ms = match (deadline_ms, earliest_timer) {
            (Some(d), Some(t)) => (d.min(t) - now).max(0),
            (Some(d), None) => (d - now).max(0),
            (None, Some(t)) => (t - now).max(0),
            (None, None) => -1, // wait indefinitely
        };
        if poll_mode {
            sleep_ms = 0;
        }
        let timeout = if sleep_ms < 0 {
            None
        } else {
            Some(Duration::from_millis(sleep_ms as u64))
        };

        // --- d. platform wait ---
        let outcome = {
            let mut reactor = handle.0.reactor.lock().unwrap();
            reactor.wait(timeout)
        };

        // --- e. AfterWaiting ---
        handle.0.sleeping.store(false, Ordering::SeqCst);
        handle.fire_observers(Activity::AfterWaiting, &mode_names);

        match outcome {
            Ok(WaitOutcome::Ready) => {
                let tokens = handle.0.reactor.lock().unwrap().ready_tokens();
                for token in tokens {
                    let source = handle.0.descriptor_index.lock().unwrap().get(&token).cloned();
                    if let Some(source) = source {
                        if source.mode_name().as_deref().is_some_and(|m| mode_names.iter().any(|n| n == m)) {
                            source.signal();
                            source.clear_signal_and_perform();
                            handled_any = true;
                        }
                    }
                }
            }
            Ok(WaitOutcome::Woken | WaitOutcome::TimedOut) => {}
            Err(e) => {
                trace!(error = %e, "platform wait returned an error");
                if handle.0.stopped.load(Ordering::SeqCst) {
                    break RunResult::Stopped;
                }
            }
        }

        // --- g. BeforeTimers + due-timer dispatch ---
        handle.fire_observers(Activity::BeforeTimers, &mode_names);
        let now = now_ms();
        let due_timers = collect_due_timers(handle, &mode_names, now);
        for source in &due_timers {
            source.clear_signal_and_perform();
            if !source.advance_timer(now) {
                source.cancel();
            }
        }

        if let Some(exit) = check_exit(handle, deadline_ms, handled_any, return_after_handle) {
            break exit;
        }
    };

    handle.fire_observers(Activity::Exit, &mode_names);
    handle.0.current_modes.lock().unwrap().clear();
    result
}

/// Exit conditions in spec §4.2 step h, checked in the documented order.
fn check_exit(
    handle: &RunLoopHandle,
    deadline_ms: Option<MonotonicMillis>,
    handled_any: bool,
    return_after_handle: bool,
) -> Option<RunResult> {
    if handle.0.stopped.load(Ordering::SeqCst) {
        return Some(RunResult::Stopped);
    }
    if handled_any && return_after_handle {
        return Some(RunResult::SourceHandled);
    }
    if let Some(deadline) = deadline_ms {
        if now_ms() >= deadline {
            return Some(RunResult::TimedOut);
        }
    }
    if all_current_modes_empty(handle) {
        return Some(RunResult::Finished);
    }
    None
}

fn all_current_modes_empty(handle: &RunLoopHandle) -> bool {
    let current = handle.0.current_modes.lock().unwrap();
    let modes = handle.0.modes.lock().unwrap();
    current
        .iter()
        .all(|name| modes.get(name).map_or(true, crate::mode::Mode::is_empty))
}

/// Copy-and-retain: collect eligible custom sources with the mode lock held
/// only long enough to clone handles out, then drop it before any callout
/// (spec §4.2 "Lock order").
fn collect_due_custom_sources(handle: &RunLoopHandle, mode_names: &[String]) -> Vec<Source> {
    let modes = handle.0.modes.lock().unwrap();
    let mut candidates: Vec<(i32, Source)> = Vec::new();
    for name in mode_names {
        let Some(mode) = modes.get(name) else { continue };
        for source in mode.sources() {
            if let SourceKind::Custom { priority, .. } = source.kind_snapshot() {
                if source.is_valid() && source.is_signaled() {
                    candidates.push((priority, source.clone()));
                }
            }
        }
    }
    drop(modes);
    // Ascending priority (lower integer = higher priority), stable so
    // same-priority ties preserve insertion order (spec §4.2).
    candidates.sort_by_key(|(priority, _)| *priority);
    candidates.into_iter().map(|(_, source)| source).collect()
}

fn earliest_timer_deadline(handle: &RunLoopHandle, mode_names: &[String]) -> Option<MonotonicMillis> {
    let modes = handle.0.modes.lock().unwrap();
    let mut earliest: Option<MonotonicMillis> = None;
    for name in mode_names {
        let Some(mode) = modes.get(name) else { continue };
        for source in mode.timers() {
            if !source.is_valid() {
                continue;
            }
            if let SourceKind::Timer { fire_time_ms, .. } = source.kind_snapshot() {
                earliest = Some(earliest.map_or(fire_time_ms, |e| e.min(fire_time_ms)));
            }
        }
    }
    earliest
}

fn collect_due_timers(handle: &RunLoopHandle, mode_names: &[String], now: MonotonicMillis) -> Vec<Source> {
    let modes = handle.0.modes.lock().unwrap();
    let mut candidates: Vec<(MonotonicMillis, Source)> = Vec::new();
    for name in mode_names {
        let Some(mode) = modes.get(name) else { continue };
        for source in mode.timers() {
            if !source.is_valid() {
                continue;
            }
            if let SourceKind::Timer { fire_time_ms, .. } = source.kind_snapshot() {
                if fire_time_ms <= now {
                    candidates.push((fire_time_ms, source.clone()));
                }
            }
        }
    }
    drop(modes);
    // Ascending fire-time; equal fire-times tie-broken by this stable sort
    // preserving insertion order (spec §4.2 "Ordering and tie-breaks").
    candidates.sort_by_key(|(fire_time, _)| *fire_time);
    candidates.into_iter().map(|(_, source)| source).collect()
}
