//! Fork/exec of the tracee with tracing, limits and sandboxing applied.
//!
//! Everything the child runs between `fork` and `execve` is async-signal-safe:
//! raw libc calls on pre-built buffers, no allocation, no locks, and `_exit`
//! with a stage-specific sentinel code on failure. The parent recognises the
//! sentinels through `was_initialized == false` and turns them into typed
//! errors in `wait()`.

use std::ffi::CString;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use nix::unistd::{ForkResult, Pid, fork};

use crate::errors::{TraceboxError, TraceboxResult};

/// Exit codes reserved for spawn-stage failures. They are positive so the
/// child can actually exit with them; `was_initialized == false` is what
/// distinguishes them from a tracee that chose the same code.
pub const SPAWN_FAIL_NO_NEW_PRIVS: i32 = 202;
pub const SPAWN_FAIL_SECCOMP: i32 = 203;
pub const SPAWN_FAIL_TRACEME: i32 = 204;
pub const SPAWN_FAIL_EXECVE: i32 = 205;
pub const SPAWN_FAIL_CHDIR: i32 = 206;

/// Map a spawn-stage sentinel to its error, if the code is one.
pub(crate) fn spawn_failure(code: i32) -> Option<TraceboxError> {
    match code {
        SPAWN_FAIL_NO_NEW_PRIVS => Some(TraceboxError::SpawnNoNewPrivs),
        SPAWN_FAIL_SECCOMP => Some(TraceboxError::SpawnSeccomp),
        SPAWN_FAIL_TRACEME => Some(TraceboxError::SpawnTraceme),
        SPAWN_FAIL_EXECVE => Some(TraceboxError::SpawnExecve),
        SPAWN_FAIL_CHDIR => Some(TraceboxError::SpawnChdir),
        _ => None,
    }
}

/// Resource ceilings applied in the child before exec. Zero means "leave
/// unlimited".
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RlimitSet {
    pub address_bytes: u64,
    pub data_bytes: u64,
    pub nproc: u64,
    pub fsize_bytes: u64,
    /// Soft and hard CPU cap in seconds; the kernel delivers SIGXCPU and
    /// eventually SIGKILL if the watchdog never gets there.
    pub cpu_seconds: u64,
}

/// Everything the child needs, prepared in the parent where allocation is
/// still allowed.
pub(crate) struct SpawnConfig {
    pub exe: CString,
    pub argv: Vec<CString>,
    pub envp: Vec<CString>,
    pub cwd: Option<CString>,
    pub personality: u64,
    pub rlimits: RlimitSet,
    /// Descriptors to install as the child's 0/1/2; -1 keeps the parent's.
    pub stdio_fds: [RawFd; 3],
    #[cfg(target_os = "linux")]
    pub seccomp: Option<seccompiler::BpfProgram>,
}

/// Fork and run the child-side spawn sequence. Returns the child pid in the
/// parent; the child never returns.
pub(crate) fn spawn_child(config: &SpawnConfig) -> TraceboxResult<Pid> {
    // raw pointer arrays must exist before fork; the child may not allocate
    let mut argv_ptrs: Vec<*const libc::c_char> =
        config.argv.iter().map(|arg| arg.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());
    let mut envp_ptrs: Vec<*const libc::c_char> =
        config.envp.iter().map(|env| env.as_ptr()).collect();
    envp_ptrs.push(std::ptr::null());

    match unsafe { fork() }? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => child_run(config, &argv_ptrs, &envp_ptrs),
    }
}

fn child_run(
    config: &SpawnConfig,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
) -> ! {
    unsafe {
        if config.personality != 0 {
            // best effort; an unsupported persona is not worth dying over
            libc::personality(config.personality as libc::c_ulong);
        }

        apply_rlimits_raw(&config.rlimits);
        redirect_stdio_raw(&config.stdio_fds);

        // own process group, so group-directed waits and kills reach us
        libc::setpgid(0, 0);

        if let Some(cwd) = &config.cwd {
            if libc::chdir(cwd.as_ptr()) != 0 {
                libc::_exit(SPAWN_FAIL_CHDIR);
            }
        }

        let null = std::ptr::null_mut::<libc::c_void>();
        if libc::ptrace(libc::PTRACE_TRACEME, 0 as libc::pid_t, null, null) == -1 {
            libc::_exit(SPAWN_FAIL_TRACEME);
        }

        // Synchronise with the tracer: stop here so it can install its
        // ptrace options before the first filtered syscall. Without this the
        // initial execve would hit SECCOMP_RET_TRACE with no listener and
        // fail with ENOSYS.
        libc::raise(libc::SIGSTOP);

        if libc::prctl(
            libc::PR_SET_NO_NEW_PRIVS,
            1 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
            0 as libc::c_ulong,
        ) != 0
        {
            libc::_exit(SPAWN_FAIL_NO_NEW_PRIVS);
        }

        #[cfg(target_os = "linux")]
        if let Some(filter) = &config.seccomp {
            if seccompiler::apply_filter(filter).is_err() {
                libc::_exit(SPAWN_FAIL_SECCOMP);
            }
        }

        libc::execve(config.exe.as_ptr(), argv.as_ptr(), envp.as_ptr());
        libc::_exit(SPAWN_FAIL_EXECVE);
    }
}

/// Child-side rlimit application. Failures are deliberately ignored: a
/// missing limit degrades enforcement but the watchdog still covers it.
unsafe fn apply_rlimits_raw(limits: &RlimitSet) {
    unsafe fn set(resource: libc::__rlimit_resource_t, value: u64) {
        let limit = libc::rlimit {
            rlim_cur: value,
            rlim_max: value,
        };
        unsafe {
            libc::setrlimit(resource, &limit);
        }
    }

    unsafe {
        set(libc::RLIMIT_CORE, 0);
        if limits.address_bytes > 0 {
            set(libc::RLIMIT_AS, limits.address_bytes);
        }
        if limits.data_bytes > 0 {
            set(libc::RLIMIT_DATA, limits.data_bytes);
        }
        if limits.nproc > 0 {
            set(libc::RLIMIT_NPROC, limits.nproc);
        }
        if limits.fsize_bytes > 0 {
            set(libc::RLIMIT_FSIZE, limits.fsize_bytes);
        }
        if limits.cpu_seconds > 0 {
            set(libc::RLIMIT_CPU, limits.cpu_seconds);
        }
    }
}

/// Child-side stdio redirection: dup2 the prepared ends onto 0/1/2. The
/// originals carry O_CLOEXEC and vanish at exec.
unsafe fn redirect_stdio_raw(fds: &[RawFd; 3]) {
    for (target, &fd) in fds.iter().enumerate() {
        if fd >= 0 {
            unsafe {
                libc::dup2(fd, target as RawFd);
            }
        }
    }
}

/// Make the tracee the OOM killer's first pick, so memory pressure claims it
/// before the judge. Linux only; FreeBSD has no equivalent knob. Best effort.
pub(crate) fn oom_score_adj(pid: Pid) {
    #[cfg(target_os = "linux")]
    {
        let path = format!("/proc/{}/oom_score_adj", pid.as_raw());
        if let Err(err) = std::fs::write(&path, "1000") {
            tracing::warn!(pid = pid.as_raw(), error = %err, "failed to adjust OOM score");
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
    }
}

/// Resolve the executable: explicit path wins, a bare name is searched in
/// PATH, anything with a separator is used as given.
pub(crate) fn resolve_executable(
    explicit: Option<&Path>,
    argv0: &str,
) -> TraceboxResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if argv0.contains('/') {
        return Ok(PathBuf::from(argv0));
    }
    find_exe_in_path(argv0).ok_or_else(|| TraceboxError::ExecutableNotFound(argv0.to_string()))
}

fn find_exe_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_map_to_distinct_errors() {
        let codes = [
            SPAWN_FAIL_NO_NEW_PRIVS,
            SPAWN_FAIL_SECCOMP,
            SPAWN_FAIL_TRACEME,
            SPAWN_FAIL_EXECVE,
            SPAWN_FAIL_CHDIR,
        ];
        for code in codes {
            assert!(spawn_failure(code).is_some(), "code {} must map", code);
        }
        assert!(spawn_failure(0).is_none());
        assert!(spawn_failure(1).is_none());
        assert!(spawn_failure(42).is_none());
    }

    #[test]
    fn traceme_failure_mentions_yama() {
        let err = spawn_failure(SPAWN_FAIL_TRACEME).unwrap();
        let text = err.to_string();
        assert!(text.contains("Yama"));
        assert!(text.contains("SYS_PTRACE"));
    }

    #[test]
    fn explicit_executable_wins() {
        let path = resolve_executable(Some(Path::new("/opt/custom/prog")), "prog").unwrap();
        assert_eq!(path, PathBuf::from("/opt/custom/prog"));
    }

    #[test]
    fn relative_argv0_with_separator_is_kept() {
        let path = resolve_executable(None, "./a.out").unwrap();
        assert_eq!(path, PathBuf::from("./a.out"));
    }

    #[test]
    fn bare_names_are_searched_in_path() {
        // `sh` exists on any Unix this crate builds on
        let path = resolve_executable(None, "sh").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn missing_executables_are_reported() {
        let err = resolve_executable(None, "definitely-not-a-real-binary-xyz").unwrap_err();
        assert!(matches!(err, TraceboxError::ExecutableNotFound(_)));
    }
}
