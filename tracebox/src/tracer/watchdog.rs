//! The "shocker": time-limit watchdog for a traced process.
//!
//! A CPU-spinning tracee that never enters the kernel produces no ptrace
//! stops, so the monitor would never refresh its counters. The shocker wakes
//! once a second and nudges the process group with a benign signal; the
//! resulting signal stop makes the monitor's `wait4` return and republish
//! the counters. When a limit is exceeded it escalates to a group SIGKILL.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::tracer::state::SharedState;

/// The benign wake signal. On Linux an ignored signal still produces a
/// ptrace notification, so harmless SIGWINCH does the job. On FreeBSD an
/// ignored signal would not wake `wait4`, so SIGSTOP (which the monitor
/// swallows) is used instead.
pub(crate) fn wake_signal() -> Signal {
    if cfg!(target_os = "freebsd") {
        Signal::SIGSTOP
    } else {
        Signal::SIGWINCH
    }
}

pub(crate) struct Watchdog {
    shared: Arc<SharedState>,
    cpu_limit_ms: u64,
    wall_limit_ms: u64,
}

impl Watchdog {
    pub fn new(shared: Arc<SharedState>, cpu_limit_secs: u64, wall_limit_secs: u64) -> Self {
        Self {
            shared,
            cpu_limit_ms: cpu_limit_secs * 1000,
            wall_limit_ms: wall_limit_secs * 1000,
        }
    }

    pub fn spawn(self) -> thread::JoinHandle<()> {
        thread::Builder::new()
            .name("tracebox-shocker".into())
            .spawn(move || self.run())
            .expect("failed to spawn watchdog thread")
    }

    fn run(self) {
        let wake = wake_signal();
        self.shared.spawned_or_errored.wait();

        while !self.shared.died.wait_timeout(Duration::from_secs(1)) {
            let pid = self.shared.pid.load(Ordering::Relaxed);
            if pid <= 0 {
                // spawn errored before a child existed
                return;
            }

            let cpu_ms = self.shared.execution_time_ms.load(Ordering::Relaxed);
            let wall_ms = self.shared.wall_time_ms.load(Ordering::Relaxed);
            if cpu_ms > self.cpu_limit_ms || wall_ms > self.wall_limit_ms {
                tracing::warn!(
                    pid,
                    cpu_ms,
                    wall_ms,
                    "shocker activated, killing process group"
                );
                self.kill_group(Pid::from_raw(pid));
                self.shared.tle.store(true, Ordering::Relaxed);
                return;
            }

            // Nudge the group so the monitor re-evaluates elapsed time.
            // Delivery failures mean the tracee just exited; nothing to do.
            let _ = signal::killpg(Pid::from_raw(pid), wake);
        }
    }

    fn kill_group(&self, pid: Pid) {
        // This races with natural exit; under pid reuse the wrong group
        // could be signalled. Known limitation, kept best-effort.
        if self.shared.return_code().is_some() {
            tracing::warn!(pid = pid.as_raw(), "tracee already exited, skipping kill");
            return;
        }
        if let Err(err) = signal::killpg(pid, Signal::SIGKILL) {
            tracing::warn!(pid = pid.as_raw(), error = %err, "watchdog kill failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_signal_is_benign_on_this_platform() {
        let sig = wake_signal();
        if cfg!(target_os = "freebsd") {
            assert_eq!(sig, Signal::SIGSTOP);
        } else {
            assert_eq!(sig, Signal::SIGWINCH);
        }
    }

    #[test]
    fn watchdog_exits_when_spawn_errors() {
        // pid stays 0: the thread must terminate instead of spinning
        let shared = Arc::new(SharedState::new());
        shared.spawned_or_errored.set();
        let handle = Watchdog::new(Arc::clone(&shared), 1, 3).spawn();
        // died never fires, but the pid guard returns after one tick
        handle.join().unwrap();
    }

    #[test]
    fn watchdog_exits_on_death() {
        let shared = Arc::new(SharedState::new());
        shared.pid.store(std::process::id() as i32, Ordering::Relaxed);
        shared.spawned_or_errored.set();
        let handle = Watchdog::new(Arc::clone(&shared), 1000, 3000).spawn();
        shared.died.set();
        handle.join().unwrap();
        assert!(!shared.tle.load(Ordering::Relaxed));
    }
}
