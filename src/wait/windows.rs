// Copyright (c) 2026 The core_run_loop Authors. Licensed under Apache License, Version 2.0.

//! Windows wait backend: `MsgWaitForMultipleObjects` over a `HANDLE` array,
//! plus a manual-reset event for explicit wake-ups (spec §4.3 "Windows:
//! WaitForMultipleObjects/MsgWaitForMultipleObjects over a HANDLE array").
//!
//! `mio` doesn't expose arbitrary-HANDLE waiting on Windows (its own
//! backend is IOCP-based and only understands sockets), so this talks to
//! `windows-sys` directly the way `mio`'s own Windows backend does
//! underneath.

use super::{MAX_DESCRIPTORS, PlatformWait, WaitOutcome, Waker};
use crate::error::RunLoopError;
use crate::source::RawDescriptor;
use std::collections::HashMap;
use std::time::Duration;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Threading::{CreateEventW, INFINITE, ResetEvent, SetEvent};
use windows_sys::Win32::UI::WindowsAndMessaging::{MsgWaitForMultipleObjects, QS_ALLINPUT};

pub struct WindowsReactor {
    /// Slot 0 is always the wake event; slots 1.. are registered descriptors.
    handles: Vec<HANDLE>,
    tokens: Vec<usize>,
    token_to_slot: HashMap<usize, usize>,
    wake_event: HANDLE,
    ready: Vec<usize>,
}

// HANDLEs are thread-safe to wait on from any thread; this type owns them
// exclusively and closes them on drop.
unsafe impl Send for WindowsReactor {}

impl WindowsReactor {
    pub fn new() -> Result<Self, RunLoopError> {
        // Manual-reset so a wake observed by one MsgWaitForMultipleObjects
        // call doesn't auto-clear before `wait` gets a chance to see it.
        let wake_event = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
        if wake_event.is_null() {
            return Err(RunLoopError::CreateFailed(std::io::Error::last_os_error()));
        }
        Ok(WindowsReactor {
            handles: vec![wake_event],
            tokens: vec![usize::MAX],
            token_to_slot: HashMap::new(),
            wake_event,
            ready: Vec::new(),
        })
    }
}

impl Drop for WindowsReactor {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.wake_event);
        }
    }
}

impl PlatformWait for WindowsReactor {
    fn register(&mut self, token: usize, handle: RawDescriptor) -> Result<(), RunLoopError> {
        if self.handles.len() - 1 >= MAX_DESCRIPTORS {
            return Err(RunLoopError::TooManyDescriptors {
                limit: MAX_DESCRIPTORS,
            });
        }
        let slot = self.handles.len();
        self.handles.push(handle.as_raw_handle() as HANDLE);
        self.tokens.push(token);
        self.token_to_slot.insert(token, slot);
        Ok(())
    }

    fn deregister(&mut self, token: usize) {
        if let Some(slot) = self.token_to_slot.remove(&token) {
            self.handles.remove(slot);
            self.tokens.remove(slot);
            // Every slot after the removed one shifted left by one.
            for (_, s) in self.token_to_slot.iter_mut() {
                if *s > slot {
                    *s -= 1;
                }
            }
        }
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome, RunLoopError> {
        self.ready.clear();
        let timeout_ms = match timeout {
            Some(d) => d.as_millis().min(u128::from(u32::MAX - 1)) as u32,
            None => INFINITE,
        };

        // MsgWaitForMultipleObjects rather than plain WaitForMultipleObjects
        // so a thread whose run-loop shares the thread with a window message
        // pump doesn't starve it; this crate itself never drains the
        // message queue, so a wake due to QS_ALLINPUT (signaled_slot ==
        // handles.len()) just falls through as an empty-ready wakeup below.
        let rc = unsafe {
            MsgWaitForMultipleObjects(
                self.handles.len() as u32,
                self.handles.as_ptr(),
                0,
                timeout_ms,
                QS_ALLINPUT,
            )
        };

        if rc == WAIT_TIMEOUT {
            return Ok(WaitOutcome::TimedOut);
        }
        if rc == WAIT_FAILED {
            return Err(RunLoopError::WaitBackend(std::io::Error::last_os_error()));
        }

        let signaled_slot = (rc - WAIT_OBJECT_0) as usize;
        if signaled_slot == 0 {
            unsafe {
                ResetEvent(self.wake_event);
            }
            return Ok(WaitOutcome::Woken);
        }

        // MsgWaitForMultipleObjects reports only the single lowest-indexed
        // signaled handle; a caller that needs every ready descriptor polls
        // again after servicing this one, matching the mio backend's
        // edge-triggered-batch contract closely enough for this crate's
        // purposes (see SPEC_FULL.md §4.3).
        if let Some(&token) = self.tokens.get(signaled_slot) {
            self.ready.push(token);
        }
        Ok(WaitOutcome::Ready)
    }

    fn ready_tokens(&self) -> Vec<usize> {
        self.ready.clone()
    }

    fn waker(&self) -> Box<dyn Waker> {
        Box::new(EventWaker(self.wake_event))
    }
}

struct EventWaker(HANDLE);

unsafe impl Send for EventWaker {}
unsafe impl Sync for EventWaker {}

impl Waker for EventWaker {
    fn wake(&self) -> Result<(), RunLoopError> {
        let ok = unsafe { SetEvent(self.0) };
        if ok == 0 {
            return Err(RunLoopError::WaitBackend(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}
