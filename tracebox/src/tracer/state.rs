//! Shared state between the caller, monitor and watchdog threads.
//!
//! The monitor thread is the only writer of the counters; the watchdog and
//! caller read them with relaxed ordering. Staleness of up to one watchdog
//! wake interval is tolerated, so no heavier synchronisation is needed. The
//! two [`Event`]s are one-shot and level-triggered: `spawned_or_errored`
//! fires once the fork/exec attempt has concluded either way, `died` fires
//! as the monitor's last action.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::errors::TraceboxError;

/// One-shot level-triggered event. Once set it stays set; waiters past that
/// point return immediately.
pub(crate) struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut set = self.state.lock();
        *set = true;
        self.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.state.lock()
    }

    /// Block until the event fires.
    pub fn wait(&self) {
        let mut set = self.state.lock();
        if !*set {
            self.cond.wait_while(&mut set, |set| !*set);
        }
    }

    /// Block until the event fires or `timeout` elapses. Returns whether the
    /// event is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut set = self.state.lock();
        if !*set {
            self.cond.wait_while_for(&mut set, |set| !*set, timeout);
        }
        *set
    }
}

/// Record of a policy-denied syscall, kept for the judge layer to explain
/// why the tracee was killed.
#[derive(Debug, Clone, Serialize)]
pub struct ProtectionFault {
    /// Native syscall number, or -1 when the registers could not be read.
    pub syscall: i64,
    /// Canonical name ("unknown" for unmapped numbers, "ptrace fail" for
    /// register read failures).
    pub name: &'static str,
    /// The six unsigned syscall arguments as captured at the stop.
    pub args: [u64; 6],
    /// Errno observed at the stop, when the fault was recorded at syscall
    /// exit (where errno is meaningful) or on a ptrace read failure.
    pub errno: Option<i32>,
}

const RETURN_CODE_UNSET: i64 = i64::MIN;

/// Counters and flags shared across the three threads of a traced process.
pub(crate) struct SharedState {
    pub pid: AtomicI32,
    return_code: AtomicI64,
    /// Cumulative CPU time of the tracee (user + system), in milliseconds.
    pub execution_time_ms: AtomicU64,
    /// Wall-clock time since the spawn attempt, in milliseconds.
    pub wall_time_ms: AtomicU64,
    /// Peak resident set size, in KiB.
    pub max_memory_kib: AtomicU64,
    pub was_initialized: AtomicBool,
    pub tle: AtomicBool,
    pub ole: AtomicBool,
    fault: Mutex<Option<ProtectionFault>>,
    spawn_error: Mutex<Option<TraceboxError>>,
    pub spawned_or_errored: Event,
    pub died: Event,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            pid: AtomicI32::new(0),
            return_code: AtomicI64::new(RETURN_CODE_UNSET),
            execution_time_ms: AtomicU64::new(0),
            wall_time_ms: AtomicU64::new(0),
            max_memory_kib: AtomicU64::new(0),
            was_initialized: AtomicBool::new(false),
            tle: AtomicBool::new(false),
            ole: AtomicBool::new(false),
            fault: Mutex::new(None),
            spawn_error: Mutex::new(None),
            spawned_or_errored: Event::new(),
            died: Event::new(),
        }
    }

    /// Exit code of the tracee (negative signal number when killed by a
    /// signal), or None while it is still running.
    pub fn return_code(&self) -> Option<i32> {
        match self.return_code.load(Ordering::Relaxed) {
            RETURN_CODE_UNSET => None,
            code => Some(code as i32),
        }
    }

    pub fn set_return_code(&self, code: i32) {
        self.return_code.store(code as i64, Ordering::Relaxed);
    }

    /// First fault wins; a kill may race the tracee into further denied
    /// syscalls and the original cause is the one worth reporting.
    pub fn record_fault(&self, fault: ProtectionFault) {
        let mut slot = self.fault.lock();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    pub fn fault(&self) -> Option<ProtectionFault> {
        self.fault.lock().clone()
    }

    pub fn store_spawn_error(&self, err: TraceboxError) {
        *self.spawn_error.lock() = Some(err);
    }

    pub fn take_spawn_error(&self) -> Option<TraceboxError> {
        self.spawn_error.lock().take()
    }
}
