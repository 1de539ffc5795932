//! Integration tests for process supervision (spawn, policy, limits, kill).
//!
//! These drive real tracees (`true`, `cat`, `sh`, `sleep`) under ptrace, so
//! they are Linux-only and need a kernel that permits ptrace of children
//! (Yama `ptrace_scope` <= 1, or `SYS_PTRACE` in containers).
#![cfg(target_os = "linux")]

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracebox::{Policy, StdioSpec, Syscall, TraceOptions, TraceboxError, TracedProcess};

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// A policy that allows every canonical syscall; individual tests deny or
/// intercept on top of it.
fn permissive_policy() -> Policy {
    Policy::new().allow_all(Syscall::ALL.iter().copied())
}

fn run_to_completion(options: TraceOptions) -> (TracedProcess, Result<i32, TraceboxError>) {
    let process = TracedProcess::spawn(options).expect("spawn failed");
    let result = process.wait();
    (process, result)
}

// ============================================================================
// BASELINE BEHAVIOUR
// ============================================================================

#[test]
fn allow_everything_runs_true_to_completion() {
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["true".into()],
        security: Some(permissive_policy()),
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), 0);
    assert!(process.was_initialized());
    assert!(!process.is_rte());
    assert!(!process.is_ir());
    assert!(!process.is_tle());
    assert!(process.protection_fault().is_none());
}

#[test]
fn allow_everything_runs_true_without_seccomp_shortcut() {
    // every syscall through ptrace: exercises the entry/exit stop toggling
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["true".into()],
        security: Some(permissive_policy()),
        avoid_seccomp: true,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), 0);
    assert!(process.protection_fault().is_none());
}

#[test]
fn no_security_means_no_filtering() {
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["true".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), 0);
    assert!(process.protection_fault().is_none());
}

#[test]
fn nonzero_exit_is_invalid_return_not_rte() {
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["sh".into(), "-c".into(), "exit 42".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), 42);
    assert!(process.is_ir());
    assert!(!process.is_rte());
}

#[test]
fn poll_reports_only_after_death() {
    let process = TracedProcess::spawn(TraceOptions {
        argv: vec!["true".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    })
    .unwrap();
    let code = process.wait().unwrap();
    assert_eq!(process.poll(), Some(code));
}

// ============================================================================
// STREAM PLUMBING
// ============================================================================

#[test]
fn pipes_round_trip_through_the_tracee() {
    let mut process = TracedProcess::spawn(TraceOptions {
        argv: vec!["cat".into()],
        security: None,
        stdin: StdioSpec::Pipe,
        stdout: StdioSpec::Pipe,
        ..Default::default()
    })
    .unwrap();

    let mut stdin = process.stdin().expect("stdin pipe");
    let mut stdout = process.stdout().expect("stdout pipe");
    stdin.write_all(b"hello tracee").unwrap();
    drop(stdin); // EOF lets cat finish

    assert_eq!(process.wait().unwrap(), 0);

    let mut output = String::new();
    stdout.read_to_string(&mut output).unwrap();
    assert_eq!(output, "hello tracee");
}

#[test]
fn output_limit_is_caller_driven() {
    let process = TracedProcess::spawn(TraceOptions {
        argv: vec!["true".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    })
    .unwrap();
    assert!(!process.is_ole());
    process.mark_output_limit_exceeded();
    assert!(process.is_ole());
    process.wait().unwrap();
}

// ============================================================================
// POLICY ENFORCEMENT
// ============================================================================

#[test]
fn denied_syscall_kills_and_records_a_fault() {
    let target = tempfile::tempdir().unwrap();
    let victim = target.path().join("never-created");

    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["mkdir".into(), victim.to_str().unwrap().into()],
        security: Some(permissive_policy().deny(Syscall::Mkdir).deny(Syscall::Mkdirat)),
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    // killed by the supervisor's SIGKILL
    assert_eq!(result.unwrap(), -(libc::SIGKILL));
    assert!(process.is_rte());

    let fault = process.protection_fault().expect("fault must be recorded");
    assert!(
        fault.name == "mkdir" || fault.name == "mkdirat",
        "unexpected fault: {:?}",
        fault
    );
    assert!(fault.errno.is_none());
}

#[test]
fn callback_sees_the_path_and_vetoes_selectively() {
    let allowed = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(allowed.path(), "ok\n").unwrap();
    let forbidden = allowed.path().with_extension("forbidden");
    std::fs::write(&forbidden, "secret\n").unwrap();

    let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let observed_in_callback = Arc::clone(&observed);

    // open() takes the path in arg0, openat() in arg1
    let veto = move |debugger: &mut tracebox::Debugger, arg: usize| {
        let path = match debugger.read_str(debugger.uarg(arg), 4096) {
            Ok(Some(path)) => path,
            Ok(None) => return false,
            Err(_) => return false,
        };
        observed_in_callback.lock().push(path.clone());
        !path.ends_with(".forbidden")
    };
    let veto_open = veto.clone();

    let (process, result) = run_to_completion(TraceOptions {
        argv: vec![
            "cat".into(),
            allowed.path().to_str().unwrap().into(),
            forbidden.to_str().unwrap().into(),
        ],
        security: Some(
            permissive_policy()
                .intercept(Syscall::Open, move |d| veto_open(d, 0))
                .intercept(Syscall::Openat, move |d| veto(d, 1)),
        ),
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Pipe,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), -(libc::SIGKILL));

    let fault = process.protection_fault().expect("fault must be recorded");
    assert!(fault.name == "open" || fault.name == "openat");
    // the recorded args are the raw registers; the path pointer is non-null
    assert!(fault.args.iter().any(|&arg| arg != 0));

    let seen = observed.lock();
    assert!(
        seen.iter().any(|path| path.ends_with(".forbidden")),
        "callback never saw the forbidden path: {:?}",
        *seen
    );

    let _ = std::fs::remove_file(&forbidden);
}

#[test]
fn callback_denials_work_without_seccomp_too() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_callback = Arc::clone(&hits);

    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["mkdir".into(), "/tmp/tracebox-denied-dir".into()],
        security: Some(
            permissive_policy()
                .intercept(Syscall::Mkdir, {
                    let hits = Arc::clone(&hits_in_callback);
                    move |_d| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        false
                    }
                })
                .intercept(Syscall::Mkdirat, move |_d| {
                    hits_in_callback.fetch_add(1, Ordering::SeqCst);
                    false
                }),
        ),
        avoid_seccomp: true,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), -(libc::SIGKILL));
    assert!(hits.load(Ordering::SeqCst) >= 1);
    assert!(process.protection_fault().is_some());
}

#[test]
fn overlong_strings_surface_as_faults_not_crashes() {
    let dir = tempfile::tempdir().unwrap();
    let long_name = dir.path().join("a-path-well-past-eight-bytes");
    std::fs::write(&long_name, "x").unwrap();

    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["cat".into(), long_name.to_str().unwrap().into()],
        security: Some(
            permissive_policy()
                .intercept(Syscall::Open, |d| {
                    // a bounded read refuses paths with no NUL inside 8 bytes
                    d.read_str(d.uarg(0), 8).is_ok()
                })
                .intercept(Syscall::Openat, |d| d.read_str(d.uarg(1), 8).is_ok()),
        ),
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), -(libc::SIGKILL));
    let fault = process.protection_fault().expect("fault must be recorded");
    assert!(fault.name == "open" || fault.name == "openat");
}

// ============================================================================
// TIME LIMITS
// ============================================================================

#[test]
fn cpu_spinner_is_shocked_to_death() {
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["sh".into(), "-c".into(), "while :; do :; done".into()],
        security: None,
        cpu_time: 1,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), -(libc::SIGKILL));
    assert!(process.is_tle());
    assert!(process.is_rte());
    assert!(process.execution_time() >= Duration::from_secs(1));
}

#[test]
fn sleeper_hits_the_wall_clock_limit() {
    let (process, result) = run_to_completion(TraceOptions {
        argv: vec!["sleep".into(), "10".into()],
        security: None,
        cpu_time: 1,
        wall_time: Some(2),
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });

    assert_eq!(result.unwrap(), -(libc::SIGKILL));
    assert!(process.is_tle());
    // asleep, not computing
    assert!(process.execution_time() < Duration::from_secs(1));
    assert!(process.wall_clock_time() >= Duration::from_secs(2));
}

#[test]
fn kill_is_callable_from_the_caller_thread() {
    let process = TracedProcess::spawn(TraceOptions {
        argv: vec!["sleep".into(), "30".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    })
    .unwrap();

    // give the tracee a moment to reach its sleep
    std::thread::sleep(Duration::from_millis(200));
    process.kill();

    assert_eq!(process.wait().unwrap(), -(libc::SIGKILL));
    assert!(process.is_rte());
}

// ============================================================================
// SPAWN FAILURES
// ============================================================================

#[test]
fn missing_executable_fails_wait_with_execve() {
    let process = TracedProcess::spawn(TraceOptions {
        argv: vec!["/nonexistent/tracebox-test-binary".into()],
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    })
    .unwrap();

    let err = process.wait().unwrap_err();
    assert!(matches!(err, TraceboxError::SpawnExecve), "got {:?}", err);
    assert!(!process.was_initialized());
}

#[test]
fn unresolvable_name_fails_at_spawn() {
    let err = TracedProcess::spawn(TraceOptions {
        argv: vec!["tracebox-no-such-command".into()],
        security: None,
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, TraceboxError::ExecutableNotFound(_)));
}

#[test]
fn bad_working_directory_fails_wait_with_chdir() {
    let process = TracedProcess::spawn(TraceOptions {
        argv: vec!["true".into()],
        cwd: Some("/nonexistent/tracebox-cwd".into()),
        security: None,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    })
    .unwrap();

    let err = process.wait().unwrap_err();
    assert!(matches!(err, TraceboxError::SpawnChdir), "got {:?}", err);
}

// ============================================================================
// LIFECYCLE ORDERING
// ============================================================================

#[test]
fn results_are_stable_after_wait() {
    let (mut process, result) = run_to_completion(TraceOptions {
        argv: vec!["true".into()],
        security: Some(permissive_policy()),
        cpu_time: 5,
        stdin: StdioSpec::Inherit,
        stdout: StdioSpec::Inherit,
        ..Default::default()
    });
    let code = result.unwrap();

    // no writer remains after `died`; repeated reads agree
    let first = (
        process.return_code(),
        process.execution_time(),
        process.wall_clock_time(),
        process.max_memory(),
    );
    process.reap_threads();
    let second = (
        process.return_code(),
        process.execution_time(),
        process.wall_clock_time(),
        process.max_memory(),
    );
    assert_eq!(first, second);
    assert_eq!(process.return_code(), Some(code));
}
