//! The process supervisor: spawn, trace, limit and reap one untrusted child.
//!
//! Three threads cooperate per traced process. The caller constructs a
//! [`TracedProcess`] and blocks in [`TracedProcess::wait`]; the monitor
//! thread owns the ptrace session from fork to reap; the watchdog thread
//! enforces time limits. Two one-shot events order their lifecycles:
//! `spawned_or_errored` fires when the fork/exec attempt concludes (either
//! way) and `died` fires as the monitor's last action. Counters published
//! after `died` are stable, because no writer remains.

mod debugger;
mod monitor;
mod spawn;
mod state;
mod streams;
mod watchdog;

pub use debugger::{Debugger, Registers};
pub use spawn::{
    SPAWN_FAIL_CHDIR, SPAWN_FAIL_EXECVE, SPAWN_FAIL_NO_NEW_PRIVS, SPAWN_FAIL_SECCOMP,
    SPAWN_FAIL_TRACEME,
};
pub use state::ProtectionFault;
pub use streams::StdioSpec;

pub(crate) use watchdog::wake_signal;

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::errors::{TraceboxError, TraceboxResult};
use crate::policy::{CompiledPolicy, Policy};
use monitor::Monitor;
use spawn::{RlimitSet, SpawnConfig};
use state::SharedState;
use streams::StreamSet;
use watchdog::Watchdog;

/// How far above the CPU limit the kernel's own RLIMIT_CPU backstop sits,
/// in seconds. If the supervisor misbehaves, the kernel still ends the
/// tracee.
const CPU_HARD_CAP_GRACE_SECS: u64 = 5;

/// Wall-clock limit defaults to this multiple of the CPU limit.
const WALL_CLOCK_DEFAULT_FACTOR: u64 = 3;

/// Everything a spawn needs. Plain fields plus `Default`, in the style of a
/// builder-less options struct: `TraceOptions { argv: ..., ..Default::default() }`.
#[derive(Debug)]
pub struct TraceOptions {
    /// Command and arguments. Must be non-empty.
    pub argv: Vec<String>,
    /// Explicit executable path; `argv[0]` is resolved via PATH otherwise.
    pub executable: Option<PathBuf>,
    /// Exact environment for the child; None inherits the supervisor's.
    pub env: Option<HashMap<String, String>>,
    /// Working directory for the child; None runs it where the supervisor is.
    pub cwd: Option<PathBuf>,
    /// CPU limit in seconds. Zero disables the watchdog entirely.
    pub cpu_time: u64,
    /// Wall-clock limit in seconds; defaults to three times `cpu_time`.
    pub wall_time: Option<u64>,
    /// Memory limit in KiB. Zero means unlimited.
    pub memory: u64,
    /// KiB added on top of `memory` for the address-space rlimit.
    pub address_grace: u64,
    /// KiB added on top of `memory` for the data-segment rlimit.
    pub data_grace: u64,
    /// RLIMIT_NPROC value; zero leaves it unlimited.
    pub nproc: u64,
    /// RLIMIT_FSIZE value in bytes; zero leaves it unlimited.
    pub fsize: u64,
    /// Personality bits applied in the child (ADDR_NO_RANDOMIZE and friends).
    pub personality: u64,
    /// Syscall policy. None disables tracing entirely: no syscall filtering,
    /// no seccomp, no protection faults.
    pub security: Option<Policy>,
    /// Force every syscall through ptrace even where seccomp could shortcut.
    pub avoid_seccomp: bool,
    pub stdin: StdioSpec,
    pub stdout: StdioSpec,
    pub stderr: StdioSpec,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            argv: Vec::new(),
            executable: None,
            env: None,
            cwd: None,
            cpu_time: 0,
            wall_time: None,
            memory: 0,
            address_grace: 4096,
            data_grace: 0,
            nproc: 0,
            fsize: 0,
            personality: 0,
            security: None,
            avoid_seccomp: false,
            stdin: StdioSpec::Pipe,
            stdout: StdioSpec::Pipe,
            stderr: StdioSpec::Inherit,
        }
    }
}

/// A child process running under trace.
///
/// Constructed by [`TracedProcess::spawn`]; the constructor only returns
/// once the fork/exec attempt has concluded, re-raising any spawn error.
/// Observable results (return code, counters, flags, protection fault)
/// become stable once [`TracedProcess::wait`] returns.
pub struct TracedProcess {
    shared: Arc<SharedState>,
    stdin: Option<File>,
    stdout: Option<File>,
    stderr: Option<File>,
    memory_limit_kib: u64,
    monitor: Option<thread::JoinHandle<()>>,
    watchdog: Option<thread::JoinHandle<()>>,
}

impl fmt::Debug for TracedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedProcess")
            .field("pid", &self.shared.pid)
            .finish_non_exhaustive()
    }
}

impl TracedProcess {
    /// Spawn `options.argv` under trace.
    pub fn spawn(options: TraceOptions) -> TraceboxResult<TracedProcess> {
        if options.argv.is_empty() {
            return Err(TraceboxError::Config("argv must not be empty".into()));
        }

        let exe = spawn::resolve_executable(options.executable.as_deref(), &options.argv[0])?;

        let policy = options
            .security
            .as_ref()
            .map(|p| Arc::new(CompiledPolicy::compile(p)));

        #[cfg(target_os = "linux")]
        let seccomp_filter = match &policy {
            Some(compiled) if !options.avoid_seccomp => {
                crate::policy::seccomp::build_filter(&compiled.seccomp_whitelist())?
            }
            _ => None,
        };
        #[cfg(target_os = "linux")]
        let use_seccomp = seccomp_filter.is_some();
        #[cfg(not(target_os = "linux"))]
        let use_seccomp = false;

        let exe_c = CString::new(exe.as_os_str().as_bytes())?;
        let argv_c = options
            .argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let envp_c = build_env(options.env.as_ref())?;
        let cwd_c = match &options.cwd {
            Some(path) if !path.as_os_str().is_empty() => {
                Some(CString::new(path.as_os_str().as_bytes())?)
            }
            _ => None,
        };

        let rlimits = RlimitSet {
            address_bytes: if options.memory > 0 {
                (options.memory + options.address_grace) * 1024
            } else {
                0
            },
            data_bytes: (options.memory + options.data_grace) * 1024,
            nproc: options.nproc,
            fsize_bytes: options.fsize,
            cpu_seconds: if options.cpu_time > 0 {
                options.cpu_time + CPU_HARD_CAP_GRACE_SECS
            } else {
                0
            },
        };

        let mut streams = StreamSet::prepare(options.stdin, options.stdout, options.stderr)?;
        let stdin = streams.stdin.take();
        let stdout = streams.stdout.take();
        let stderr = streams.stderr.take();

        let config = SpawnConfig {
            exe: exe_c,
            argv: argv_c,
            envp: envp_c,
            cwd: cwd_c,
            personality: options.personality,
            rlimits,
            stdio_fds: streams.child_fds,
            #[cfg(target_os = "linux")]
            seccomp: seccomp_filter,
        };

        let shared = Arc::new(SharedState::new());

        let watchdog = if options.cpu_time > 0 {
            let wall_time = options
                .wall_time
                .unwrap_or(options.cpu_time * WALL_CLOCK_DEFAULT_FACTOR);
            Some(Watchdog::new(Arc::clone(&shared), options.cpu_time, wall_time).spawn())
        } else {
            None
        };

        let monitor = Monitor::new(
            Arc::clone(&shared),
            policy,
            use_seccomp,
            config,
            streams,
            options.cpu_time,
        );
        let monitor = thread::Builder::new()
            .name("tracebox-monitor".into())
            .spawn(move || monitor.run())
            .map_err(|e| TraceboxError::Internal(format!("failed to spawn monitor: {}", e)))?;

        shared.spawned_or_errored.wait();
        if let Some(err) = shared.take_spawn_error() {
            // the monitor has already set `died`; reap the helpers
            let _ = monitor.join();
            return Err(err);
        }

        Ok(TracedProcess {
            shared,
            stdin,
            stdout,
            stderr,
            memory_limit_kib: options.memory,
            monitor: Some(monitor),
            watchdog,
        })
    }

    /// Block until the tracee is gone, then return its exit code (negative
    /// signal number when killed by a signal).
    ///
    /// Spawn-stage failures surface here as typed errors; in particular a
    /// traceme failure points at Yama `ptrace_scope` and the container
    /// `SYS_PTRACE` capability.
    pub fn wait(&self) -> TraceboxResult<i32> {
        self.shared.died.wait();
        let code = self.shared.return_code();
        if !self.was_initialized() {
            if let Some(code) = code {
                if let Some(err) = spawn::spawn_failure(code) {
                    return Err(err);
                }
                if code >= 0 {
                    return Err(TraceboxError::SpawnUnknown(code));
                }
            }
        }
        code.ok_or_else(|| TraceboxError::Internal("tracee vanished without an exit status".into()))
    }

    /// Non-blocking result probe: the exit code once the tracee has died.
    pub fn poll(&self) -> Option<i32> {
        if self.shared.died.is_set() {
            self.shared.return_code()
        } else {
            None
        }
    }

    /// Best-effort SIGKILL of the tracee's process group. Safe from any
    /// thread; may race a natural exit, and under pid reuse could in
    /// principle signal an unrelated group. Accepted limitation.
    pub fn kill(&self) {
        let pid = self.shared.pid.load(Ordering::Relaxed);
        if pid <= 0 {
            return;
        }
        if self.shared.return_code().is_some() {
            tracing::warn!(pid, "skipping kill, tracee already exited");
            return;
        }
        tracing::warn!(pid, "requesting kill of traced process");
        if let Err(err) = signal::killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            tracing::warn!(pid, error = %err, "kill failed");
        }
    }

    /// Pid of the tracee, once forked.
    pub fn pid(&self) -> Option<i32> {
        match self.shared.pid.load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// True once the tracee executed at least one instruction past `execve`.
    pub fn was_initialized(&self) -> bool {
        self.shared.was_initialized.load(Ordering::Relaxed)
    }

    /// Exit code, or None while running. Negative means killed by a signal.
    pub fn return_code(&self) -> Option<i32> {
        self.shared.return_code()
    }

    /// Cumulative CPU time (user + system) of the tracee.
    pub fn execution_time(&self) -> Duration {
        Duration::from_millis(self.shared.execution_time_ms.load(Ordering::Relaxed))
    }

    /// Wall-clock time since the spawn.
    pub fn wall_clock_time(&self) -> Duration {
        Duration::from_millis(self.shared.wall_time_ms.load(Ordering::Relaxed))
    }

    /// Peak resident set size of the tracee, in KiB.
    pub fn max_memory(&self) -> u64 {
        self.shared.max_memory_kib.load(Ordering::Relaxed)
    }

    /// Time limit exceeded (CPU or wall clock).
    pub fn is_tle(&self) -> bool {
        self.shared.tle.load(Ordering::Relaxed)
    }

    /// Memory limit exceeded: peak RSS above the configured limit.
    pub fn is_mle(&self) -> bool {
        self.memory_limit_kib > 0 && self.max_memory() > self.memory_limit_kib
    }

    /// Output limit exceeded, as flagged by the stream-consuming layer.
    pub fn is_ole(&self) -> bool {
        self.shared.ole.load(Ordering::Relaxed)
    }

    /// The caller's stream pump observed too much output.
    pub fn mark_output_limit_exceeded(&self) {
        self.shared.ole.store(true, Ordering::Relaxed);
    }

    /// Runtime error: died on a signal, or never produced an exit code.
    pub fn is_rte(&self) -> bool {
        match self.return_code() {
            None => true,
            Some(code) => code < 0,
        }
    }

    /// Invalid return: exited by itself with a nonzero code.
    pub fn is_ir(&self) -> bool {
        matches!(self.return_code(), Some(code) if code > 0)
    }

    /// The policy violation that got the tracee killed, if any.
    pub fn protection_fault(&self) -> Option<ProtectionFault> {
        self.shared.fault()
    }

    /// Write end of the tracee's stdin, when spawned with `StdioSpec::Pipe`.
    /// Takes ownership; drop it to deliver EOF.
    pub fn stdin(&mut self) -> Option<File> {
        self.stdin.take()
    }

    /// Read end of the tracee's stdout, when spawned with `StdioSpec::Pipe`.
    pub fn stdout(&mut self) -> Option<File> {
        self.stdout.take()
    }

    /// Read end of the tracee's stderr, when spawned with `StdioSpec::Pipe`.
    pub fn stderr(&mut self) -> Option<File> {
        self.stderr.take()
    }

    /// Join the helper threads after death. Not required; threads also end
    /// on their own once the tracee is gone.
    pub fn reap_threads(&mut self) {
        if !self.shared.died.is_set() {
            return;
        }
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}

fn build_env(env: Option<&HashMap<String, String>>) -> TraceboxResult<Vec<CString>> {
    let mut out = Vec::new();
    match env {
        Some(map) => {
            for (key, value) in map {
                out.push(CString::new(format!("{}={}", key, value))?);
            }
        }
        None => {
            for (key, value) in std::env::vars() {
                out.push(CString::new(format!("{}={}", key, value))?);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_mirror_the_judge_defaults() {
        let options = TraceOptions::default();
        assert_eq!(options.address_grace, 4096);
        assert_eq!(options.cpu_time, 0);
        assert!(options.wall_time.is_none());
        assert!(options.security.is_none());
        assert!(matches!(options.stdin, StdioSpec::Pipe));
        assert!(matches!(options.stderr, StdioSpec::Inherit));
    }

    #[test]
    fn empty_argv_is_rejected() {
        let err = TracedProcess::spawn(TraceOptions::default()).unwrap_err();
        assert!(matches!(err, TraceboxError::Config(_)));
    }

    #[test]
    fn explicit_env_is_used_verbatim() {
        let mut env = HashMap::new();
        env.insert("A".to_string(), "1".to_string());
        let built = build_env(Some(&env)).unwrap();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].to_str().unwrap(), "A=1");
    }

    #[test]
    fn inherited_env_is_not_empty() {
        // the test runner always carries at least PATH
        assert!(!build_env(None).unwrap().is_empty());
    }
}
