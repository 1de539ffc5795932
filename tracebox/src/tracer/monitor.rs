//! The monitor thread: owns the ptrace session end to end.
//!
//! A ptrace session may only be driven from the thread that attached, so the
//! monitor thread performs the fork itself and stays pinned to the tracee
//! for its whole life. It is the sole writer of the shared counters; the
//! watchdog and caller observe them with relaxed loads.
//!
//! The loop consumes group-wait events: syscall stops feed the policy table,
//! signal stops are reinjected (except the benign wake signal), resource
//! signals set result flags, exec events flip `was_initialized`, and exit
//! events record the return code and end the loop. A failed register read is
//! fatal to the tracee; continuing it would let an unpoliced syscall through.

use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::ptrace::{self, Options};
use nix::sys::signal::{self, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::policy::CompiledPolicy;
use crate::tracer::debugger::Debugger;
use crate::tracer::spawn::{self, SpawnConfig};
use crate::tracer::state::{ProtectionFault, SharedState};
use crate::tracer::streams::StreamSet;
use crate::tracer::wake_signal;

pub(crate) struct Monitor {
    shared: Arc<SharedState>,
    policy: Option<Arc<CompiledPolicy>>,
    /// A seccomp filter is installed, so allowed syscalls never stop and the
    /// monitor resumes with plain continues instead of syscall-stepping.
    use_seccomp: bool,
    config: SpawnConfig,
    streams: StreamSet,
    cpu_limit_secs: u64,
    started: Instant,
    in_syscall: bool,
    options_set: bool,
}

impl Monitor {
    pub fn new(
        shared: Arc<SharedState>,
        policy: Option<Arc<CompiledPolicy>>,
        use_seccomp: bool,
        config: SpawnConfig,
        streams: StreamSet,
        cpu_limit_secs: u64,
    ) -> Self {
        Self {
            shared,
            policy,
            use_seccomp,
            config,
            streams,
            cpu_limit_secs,
            started: Instant::now(),
            in_syscall: false,
            options_set: false,
        }
    }

    /// Entry point of the monitor thread. Always sets `spawned_or_errored`,
    /// then `died`, in that order, no matter how spawning went.
    pub fn run(mut self) {
        self.started = Instant::now();
        let spawn_result = spawn::spawn_child(&self.config);

        // parent copies of the child stream ends are useless past this point
        self.streams.close_child_ends();

        let child = match spawn_result {
            Ok(child) => child,
            Err(err) => {
                tracing::error!(error = %err, "failed to fork tracee");
                self.shared.store_spawn_error(err);
                self.shared.spawned_or_errored.set();
                self.shared.died.set();
                return;
            }
        };

        self.shared.pid.store(child.as_raw(), Ordering::Relaxed);

        // both sides race to put the child into its own group, so the very
        // first group-directed wait cannot miss
        let _ = nix::unistd::setpgid(child, child);

        spawn::oom_score_adj(child);
        self.shared.spawned_or_errored.set();

        self.monitor_loop(child);

        if self.cpu_limit_secs > 0 {
            let cpu_ms = self.shared.execution_time_ms.load(Ordering::Relaxed);
            if cpu_ms > self.cpu_limit_secs * 1000 {
                self.shared.tle.store(true, Ordering::Relaxed);
            }
        }

        self.shared.died.set();
    }

    fn trace_syscalls(&self) -> bool {
        self.policy.is_some()
    }

    fn monitor_loop(&mut self, child: Pid) {
        let wake = wake_signal();

        loop {
            let mut status: libc::c_int = 0;
            let mut usage: libc::rusage = unsafe { mem::zeroed() };
            let waited = unsafe {
                libc::wait4(-child.as_raw(), &mut status, libc::__WALL, &mut usage)
            };
            if waited < 0 {
                match Errno::last() {
                    Errno::EINTR => continue,
                    errno => {
                        // nothing left to wait for and no exit event seen
                        tracing::error!(error = %errno, "wait4 failed, abandoning monitor loop");
                        break;
                    }
                }
            }

            let pid = Pid::from_raw(waited);
            self.refresh_counters(&usage);

            let event = match WaitStatus::from_raw(pid, status) {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(status, error = %err, "undecodable wait status");
                    continue;
                }
            };

            match event {
                WaitStatus::Exited(pid, code) if pid == child => {
                    self.shared.set_return_code(code);
                    break;
                }
                WaitStatus::Signaled(pid, sig, _) if pid == child => {
                    self.shared.set_return_code(-(sig as i32));
                    break;
                }
                // stray group members; nothing to police
                WaitStatus::Exited(..) | WaitStatus::Signaled(..) => {}

                WaitStatus::PtraceSyscall(pid) => {
                    self.in_syscall = !self.in_syscall;
                    if self.in_syscall {
                        self.handle_syscall_entry(pid, child);
                    }
                    // syscall-exit stops exist only to republish counters
                    self.resume(pid, None);
                }

                WaitStatus::PtraceEvent(pid, _, ev) if ev == libc::PTRACE_EVENT_SECCOMP => {
                    self.handle_syscall_entry(pid, child);
                    self.resume(pid, None);
                }

                WaitStatus::PtraceEvent(pid, _, ev) if ev == libc::PTRACE_EVENT_EXEC => {
                    self.shared.was_initialized.store(true, Ordering::Relaxed);
                    self.resume(pid, None);
                }

                WaitStatus::PtraceEvent(pid, ..) => self.resume(pid, None),

                WaitStatus::Stopped(pid, sig) => {
                    if !self.options_set {
                        // the child's post-traceme SIGSTOP; install options
                        // before its first filtered syscall
                        self.set_trace_options(pid);
                        self.options_set = true;
                        self.resume(pid, None);
                    } else if sig == wake {
                        // the shocker's nudge; exists only so this loop runs
                        self.resume(pid, None);
                    } else if sig == Signal::SIGXCPU {
                        tracing::warn!(pid = pid.as_raw(), "SIGXCPU in tracee");
                        self.shared.tle.store(true, Ordering::Relaxed);
                        self.kill_group(child);
                        self.resume(pid, Some(sig));
                    } else {
                        self.resume(pid, Some(sig));
                    }
                }

                _ => {}
            }
        }
    }

    /// Policy dispatch at a syscall-entry stop (trap or seccomp event).
    fn handle_syscall_entry(&mut self, pid: Pid, child: Pid) {
        let Some(policy) = self.policy.clone() else {
            return;
        };

        let mut debugger = Debugger::at_stop(pid);
        let nr = debugger.syscall();

        if nr == -1 {
            // Registers unreadable: we no longer know what the tracee is
            // doing, and continuing would let an unpoliced syscall through.
            match debugger.last_errno() {
                Some(errno) => tracing::error!(pid = pid.as_raw(), errno, "ptrace register read failed"),
                None => tracing::error!(pid = pid.as_raw(), "ptrace failed with unknown error"),
            }
            self.shared.record_fault(ProtectionFault {
                syscall: -1,
                name: "ptrace fail",
                args: [0; 6],
                errno: debugger.last_errno(),
            });
            self.kill_group(child);
            return;
        }

        let abi = debugger.abi();
        if policy.on_syscall(abi, nr as u64, &mut debugger) {
            // callback register edits must land before the tracee resumes
            if let Err(err) = debugger.flush() {
                tracing::warn!(pid = pid.as_raw(), error = %err, "failed to write back registers");
            }
        } else {
            let name = debugger.syscall_name();
            tracing::warn!(
                pid = pid.as_raw(),
                abi = %abi,
                syscall = nr,
                name,
                "syscall denied by policy"
            );
            self.shared.record_fault(ProtectionFault {
                syscall: nr,
                name,
                args: debugger.uargs(),
                errno: None,
            });
            self.kill_group(child);
        }
    }

    fn set_trace_options(&self, pid: Pid) {
        let mut options = Options::PTRACE_O_EXITKILL | Options::PTRACE_O_TRACEEXEC;
        if self.trace_syscalls() {
            options |= Options::PTRACE_O_TRACESYSGOOD;
            if self.use_seccomp {
                options |= Options::PTRACE_O_TRACESECCOMP;
            }
        }
        if let Err(err) = ptrace::setoptions(pid, options) {
            tracing::warn!(pid = pid.as_raw(), error = %err, "failed to set ptrace options");
        }
    }

    /// Resume a stopped tracee, optionally delivering a signal. With seccomp
    /// (or no tracing at all) a plain continue suffices; otherwise step to
    /// the next syscall boundary.
    fn resume(&self, pid: Pid, sig: Option<Signal>) {
        let result = if self.trace_syscalls() && !self.use_seccomp {
            ptrace::syscall(pid, sig)
        } else {
            ptrace::cont(pid, sig)
        };
        if let Err(err) = result {
            // the tracee may have been killed out from under us
            tracing::debug!(pid = pid.as_raw(), error = %err, "failed to resume tracee");
        }
    }

    fn kill_group(&self, child: Pid) {
        if self.shared.return_code().is_some() {
            tracing::warn!(
                pid = child.as_raw(),
                "skipping kill of process group, it already exited"
            );
            return;
        }
        tracing::warn!(pid = child.as_raw(), "requesting kill of process group");
        if let Err(err) = signal::killpg(child, Signal::SIGKILL) {
            tracing::warn!(pid = child.as_raw(), error = %err, "failed to kill process group");
        }
    }

    fn refresh_counters(&self, usage: &libc::rusage) {
        let cpu_ms = timeval_ms(usage.ru_utime) + timeval_ms(usage.ru_stime);
        self.shared.execution_time_ms.store(cpu_ms, Ordering::Relaxed);
        // ru_maxrss is KiB on Linux
        store_max(&self.shared.max_memory_kib, usage.ru_maxrss as u64);
        self.shared
            .wall_time_ms
            .store(self.started.elapsed().as_millis() as u64, Ordering::Relaxed);
    }
}

fn timeval_ms(tv: libc::timeval) -> u64 {
    tv.tv_sec as u64 * 1000 + tv.tv_usec as u64 / 1000
}

/// Monotonic max; the monitor is the only writer, so load-then-store is
/// race-free.
fn store_max(slot: &AtomicU64, value: u64) {
    if value > slot.load(Ordering::Relaxed) {
        slot.store(value, Ordering::Relaxed);
    }
}
