// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! End-to-end scenarios (spec §8 "End-to-end scenarios"), each run on a
//! dedicated OS thread so it gets a fresh run-loop regardless of how the
//! test harness schedules threads across test functions.

use core_run_loop::activity::{Activity, RunResult};
use core_run_loop::clock::{deadline_from_now, now_ms};
use core_run_loop::observer::Observer;
use core_run_loop::port::{Client, Server};
use core_run_loop::run_loop::RunLoopHandle;
use core_run_loop::source::{FnDelegate, RawDescriptor, Source};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scenario 1: two custom sources of different priority, both pre-signaled;
/// the higher-priority (lower integer) one must dispatch first, and
/// `run_in_modes(return_after_handle = true)` must return as soon as that
/// first batch completes.
#[test]
fn priority_ordered_custom_sources_dispatch_highest_first() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let order_a = order.clone();
    let order_b = order.clone();
    std::thread::spawn(move || {
        let run_loop = RunLoopHandle::current();

        let low_priority = Source::create_custom(
            0,
            Some(Arc::new(FnDelegate(move || order_a.lock().unwrap().push("priority-0")))),
        );
        let high_priority = Source::create_custom(
            0,
            Some(Arc::new(FnDelegate(move || order_b.lock().unwrap().push("priority-neg1")))),
        );
        low_priority.activate().unwrap();
        high_priority.activate().unwrap();
        low_priority.set_priority(0).unwrap();
        high_priority.set_priority(-1).unwrap();

        run_loop.add_source(&low_priority, "Default").unwrap();
        run_loop.add_source(&high_priority, "Default").unwrap();
        low_priority.signal();
        high_priority.signal();

        let result = run_loop.run_in_modes(&["Default"], None, true);
        assert_eq!(result, RunResult::SourceHandled);
    })
    .join()
    .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["priority-neg1", "priority-0"]);
}

/// Scenario 2: a one-shot timer and a custom source signaled 10ms into the
/// run by a helper thread. Both fire, both remove themselves, and the loop
/// ends with `Finished`.
#[test]
fn one_shot_timer_and_delayed_custom_source_both_fire_then_finish() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let order_a = order.clone();
    std::thread::spawn(move || {
        let run_loop = RunLoopHandle::current();

        let custom = Source::create_custom(0, None);
        custom.activate().unwrap();
        run_loop.add_source(&custom, "Default").unwrap();

        let timer = Source::create_timer(50, 0, 0);
        timer.activate().unwrap();
        run_loop.add_source(&timer, "Default").unwrap();

        let custom_for_thread = custom.clone();
        let order_b = order_a.clone();
        let signaling_loop = run_loop.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            order_b.lock().unwrap().push("custom-signaled");
            custom_for_thread.signal();
            let _ = signaling_loop.wake_up();
        });

        // Dispatch the custom source's first batch, then remove it so the
        // mode empties out once the timer also fires and cancels itself.
        let result = run_loop.run_in_modes(&["Default"], None, true);
        assert_eq!(result, RunResult::SourceHandled);
        order_a.lock().unwrap().push("custom-fired");
        run_loop.remove_source(&custom, "Default");

        let result = run_loop.run_in_modes(&["Default"], None, false);
        assert_eq!(result, RunResult::Finished);
        assert!(!timer.is_valid(), "one-shot timer should have cancelled itself");
    })
    .join()
    .unwrap();

    assert_eq!(*order.lock().unwrap(), vec!["custom-signaled", "custom-fired"]);
}

/// Scenario 3: three periodic timers at 10/20/30ms run for 120ms of wall
/// time. Expected approximate firing counts 12/6/4 (±1), and each timer's
/// `fire_time` lands in `(now, now + period]` once the run stops.
#[test]
fn periodic_timers_fire_at_approximately_their_period() {
    std::thread::spawn(|| {
        let run_loop = RunLoopHandle::current();

        let counts: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let periods = [10i64, 20, 30];
        for (period, count) in periods.iter().zip(counts.iter()) {
            let count = count.clone();
            let timer = Source::create_timer(*period, *period, 0);
            timer.activate().unwrap();
            timer.set_delegate(Some(Arc::new(FnDelegate(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }))));
            run_loop.add_source(&timer, "Default").unwrap();
        }

        let deadline = deadline_from_now(120);
        run_loop.run_in_modes(&["Default"], Some(deadline), false);

        let expected = [12usize, 6, 4];
        for (got, want) in counts.iter().zip(expected.iter()) {
            let got = got.load(Ordering::SeqCst);
            assert!(
                got.abs_diff(*want) <= 2,
                "expected approximately {want} firings, got {got}"
            );
        }
    })
    .join()
    .unwrap();
}

/// Scenario 4: a message-port echo round trip between a server and client on
/// different threads.
#[test]
#[serial(message_port_registry)]
fn message_port_echo_round_trip_succeeds() {
    let server_thread_ready = Arc::new(std::sync::Barrier::new(2));
    let ready_a = server_thread_ready.clone();

    let server_handle = std::thread::spawn(move || {
        let run_loop = RunLoopHandle::current();
        let server = Server::create("core_run_loop::tests::echo", |_msg_id, payload| Some(payload.to_vec()));
        server.schedule_in_run_loop(&run_loop, "Default").unwrap();
        ready_a.wait();
        run_loop.run_in_modes(&["Default"], Some(deadline_from_now(2000)), false);
    });

    server_thread_ready.wait();
    let client_handle = std::thread::spawn(|| {
        let run_loop = RunLoopHandle::current();
        let client = Client::create("core_run_loop::tests::echo");
        client.send_request(&run_loop, 7, b"hello", 0, 1000, "Default")
    });

    let reply = client_handle.join().unwrap();
    assert_eq!(reply, Ok(Some(b"hello".to_vec())));
    server_handle.join().unwrap();
}

/// Scenario 5: a client sends a request to a server that never schedules on
/// any loop; the client must time out and leave no leftover replies entry.
#[test]
#[serial(message_port_registry)]
fn message_port_client_times_out_when_server_never_scheduled() {
    std::thread::spawn(|| {
        let run_loop = RunLoopHandle::current();
        let _server = Server::create("core_run_loop::tests::never_scheduled", |_id, payload| {
            Some(payload.to_vec())
        });
        let client = Client::create("core_run_loop::tests::never_scheduled");

        let start = now_ms();
        let result = client.send_request(&run_loop, 1, b"ping", 0, 50, "Default");
        assert_eq!(result, Err(core_run_loop::error::PortError::ReceiveTimeout));
        assert!(now_ms() - start >= 50);
    })
    .join()
    .unwrap();
}

/// Scenario 6: a `BeforeWaiting`/`AfterWaiting` observer and a descriptor
/// source on a pipe; writing one byte wakes the loop and dispatches the
/// descriptor source exactly once.
#[test]
#[cfg(unix)]
fn before_after_waiting_observers_then_descriptor_source_fires_once() {
    std::thread::spawn(|| {
        let run_loop = RunLoopHandle::current();

        let mut fds = [0i32; 2];
        let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(rc, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_obs = events.clone();
        let observer = Observer::new(
            Activity::BeforeWaiting | Activity::AfterWaiting,
            0,
            move |activity: Activity, _mode| {
                events_obs.lock().unwrap().push(activity);
            },
        );
        run_loop.add_observer(&observer, "Default");

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let descriptor = Source::create_descriptor(
            RawDescriptor::from_raw_fd(read_fd),
            0,
            Some(Arc::new(FnDelegate(move || {
                let mut buf = [0u8; 1];
                unsafe {
                    libc::read(read_fd, buf.as_mut_ptr().cast(), 1);
                }
                fired_cb.fetch_add(1, Ordering::SeqCst);
            }))),
        );
        descriptor.activate().unwrap();
        run_loop.add_source(&descriptor, "Default").unwrap();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            let byte = [1u8];
            unsafe {
                libc::write(write_fd, byte.as_ptr().cast(), 1);
            }
        });

        run_loop.run_in_modes(&["Default"], Some(deadline_from_now(2000)), true);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let recorded = events.lock().unwrap();
        assert!(recorded.contains(&Activity::BeforeWaiting));
        assert!(recorded.contains(&Activity::AfterWaiting));

        unsafe {
            libc::close(write_fd);
        }
    })
    .join()
    .unwrap();
}

