//! Per-syscall policy: what the supervisor does when the tracee enters a
//! system call.
//!
//! Callers describe policy sparsely, keyed by canonical [`Syscall`]; absent
//! entries default to [`Handler::Deny`]. Before spawning, the sparse map is
//! compiled into a dense `[abi][native number]` action table so the monitor
//! loop dispatches with two array indexes and no hashing. The dense table
//! costs a few tens of KiB and is paid once per traced process.

#[cfg(target_os = "linux")]
pub(crate) mod seccomp;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::abi::{ABI_COUNT, Abi};
use crate::syscalls::{self, Syscall};
use crate::tracer::Debugger;

/// Verdict-producing callback invoked with the tracee stopped at
/// syscall entry. Returns true to let the call proceed.
pub type SyscallCallback = Arc<dyn Fn(&mut Debugger) -> bool + Send + Sync>;

/// Disposition of one canonical syscall.
#[derive(Clone)]
pub enum Handler {
    /// Let the call through. On the native ABI this becomes a seccomp
    /// fast-path entry and costs no ptrace stop.
    Allow,
    /// Kill the tracee and record a protection fault.
    Deny,
    /// Stop the tracee and ask the callback. Always forces a ptrace stop
    /// because the decision reads register contents.
    Callback(SyscallCallback),
}

impl Handler {
    /// Wrap a closure as a callback handler.
    pub fn callback<F>(f: F) -> Handler
    where
        F: Fn(&mut Debugger) -> bool + Send + Sync + 'static,
    {
        Handler::Callback(Arc::new(f))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Allow => f.write_str("Allow"),
            Handler::Deny => f.write_str("Deny"),
            Handler::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Sparse caller-facing policy, keyed by canonical syscall.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    handlers: HashMap<Syscall, Handler>,
}

impl Policy {
    /// Empty policy: every syscall is denied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow one canonical syscall (builder pattern).
    pub fn allow(mut self, sys: Syscall) -> Self {
        self.handlers.insert(sys, Handler::Allow);
        self
    }

    /// Allow a batch of canonical syscalls.
    pub fn allow_all<I: IntoIterator<Item = Syscall>>(mut self, list: I) -> Self {
        for sys in list {
            self.handlers.insert(sys, Handler::Allow);
        }
        self
    }

    /// Explicitly deny one canonical syscall. Equivalent to leaving it out;
    /// useful to override an earlier `allow_all`.
    pub fn deny(mut self, sys: Syscall) -> Self {
        self.handlers.insert(sys, Handler::Deny);
        self
    }

    /// Route one canonical syscall through a verdict callback.
    pub fn intercept<F>(mut self, sys: Syscall, f: F) -> Self
    where
        F: Fn(&mut Debugger) -> bool + Send + Sync + 'static,
    {
        self.handlers.insert(sys, Handler::callback(f));
        self
    }

    /// Install a prebuilt handler.
    pub fn set(mut self, sys: Syscall, handler: Handler) -> Self {
        self.handlers.insert(sys, handler);
        self
    }

    /// The handler for `sys` (Deny when absent).
    pub fn handler(&self, sys: Syscall) -> &Handler {
        static DENY: Handler = Handler::Deny;
        self.handlers.get(&sys).unwrap_or(&DENY)
    }
}

/// Outcome of the dense table lookup, before callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
    Allow,
    Deny,
    Callback,
}

/// Dense action table derived from a [`Policy`], one column per ABI, one
/// slot per native syscall number.
pub struct CompiledPolicy {
    actions: Vec<Box<[Decision]>>,
    callbacks: Vec<HashMap<u32, SyscallCallback>>,
}

impl CompiledPolicy {
    /// Upper bound (exclusive) on native syscall numbers the dense table
    /// covers. Everything at or above it is denied unless it falls into the
    /// ARM-private window.
    pub const MAX_NATIVE_SYSCALL: usize = 1024;

    pub fn compile(policy: &Policy) -> Self {
        let mut actions: Vec<Box<[Decision]>> = (0..ABI_COUNT)
            .map(|_| vec![Decision::Deny; Self::MAX_NATIVE_SYSCALL].into_boxed_slice())
            .collect();
        let mut callbacks: Vec<HashMap<u32, SyscallCallback>> =
            (0..ABI_COUNT).map(|_| HashMap::new()).collect();

        for abi in Abi::SUPPORTED {
            let idx = abi.table_index().expect("supported ABI has a column");
            for &sys in Syscall::ALL {
                let handler = policy.handler(sys);
                for &native in syscalls::native_for(abi, sys) {
                    let slot = native as usize;
                    debug_assert!(slot < Self::MAX_NATIVE_SYSCALL);
                    match handler {
                        Handler::Allow => actions[idx][slot] = Decision::Allow,
                        Handler::Deny => actions[idx][slot] = Decision::Deny,
                        Handler::Callback(cb) => {
                            actions[idx][slot] = Decision::Callback;
                            callbacks[idx].insert(native, Arc::clone(cb));
                        }
                    }
                }
            }
        }

        Self { actions, callbacks }
    }

    /// Table lookup without invoking callbacks. Out-of-range numbers are
    /// denied except inside the ARM-private window, which is implicitly
    /// allowed (the kernel needs it for cache flush and TLS setup).
    pub(crate) fn decide(&self, abi: Abi, native: u64) -> Decision {
        if syscalls::is_arm_private(abi, native) {
            return Decision::Allow;
        }
        let Some(idx) = abi.table_index() else {
            return Decision::Deny;
        };
        if native >= Self::MAX_NATIVE_SYSCALL as u64 {
            return Decision::Deny;
        }
        self.actions[idx][native as usize]
    }

    /// Full dispatch at a syscall-entry stop: true to continue the tracee,
    /// false to kill it and record a protection fault.
    pub fn on_syscall(&self, abi: Abi, native: u64, debugger: &mut Debugger) -> bool {
        match self.decide(abi, native) {
            Decision::Allow => true,
            Decision::Deny => false,
            Decision::Callback => {
                let idx = abi.table_index().expect("callback implies a column");
                match self.callbacks[idx].get(&(native as u32)) {
                    Some(cb) => cb(debugger),
                    None => false,
                }
            }
        }
    }

    /// True when at least one handler needs a ptrace stop, i.e. the monitor
    /// cannot rely on seccomp alone.
    pub fn has_callbacks(&self) -> bool {
        self.callbacks.iter().any(|m| !m.is_empty())
    }

    /// Seccomp whitelist over native numbers of the tracer's own ABI: true
    /// iff the handler is `Allow`. `exit` and `exit_group` stay false so at
    /// least the final syscall traps and the tracer observes termination.
    pub fn seccomp_whitelist(&self) -> Vec<bool> {
        let abi = Abi::native();
        let idx = abi.table_index().expect("native ABI has a column");
        let mut whitelist: Vec<bool> = self.actions[idx]
            .iter()
            .map(|d| *d == Decision::Allow)
            .collect();
        for sys in [Syscall::Exit, Syscall::ExitGroup] {
            for &native in syscalls::native_for(abi, sys) {
                whitelist[native as usize] = false;
            }
        }
        whitelist
    }
}

impl fmt::Debug for CompiledPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allowed: usize = self
            .actions
            .iter()
            .map(|col| col.iter().filter(|d| **d == Decision::Allow).count())
            .sum();
        let callbacks: usize = self.callbacks.iter().map(|m| m.len()).sum();
        f.debug_struct("CompiledPolicy")
            .field("allowed_slots", &allowed)
            .field("callback_slots", &callbacks)
            .finish()
    }
}
