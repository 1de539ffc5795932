//! Tracebox: the tracer core of a contest-judge sandbox.
//!
//! This crate supervises one untrusted child process at a time: it spawns
//! the child under ptrace with a seccomp fast path, enforces a per-syscall
//! policy while the child is stopped at syscall boundaries, and terminates
//! the child when it exceeds CPU, wall-clock, memory or output limits.
//!
//! The pieces map onto the public API like this: [`Policy`] describes what
//! each canonical [`Syscall`] may do, [`TracedProcess`] spawns and
//! supervises the child, [`Debugger`] is the handle policy callbacks receive
//! at a stop, and the result flags (`is_tle`, `is_mle`, ...) plus
//! [`ProtectionFault`] are what the judge layer reads once the child died.
//!
//! Higher layers own everything else: compiling submissions, assembling test
//! cases, comparing output, and talking to a judge controller.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub mod abi;
pub mod errors;
pub mod policy;
pub mod syscalls;
pub mod tracer;

pub use abi::Abi;
pub use errors::{TraceboxError, TraceboxResult};
pub use policy::{CompiledPolicy, Handler, Policy, SyscallCallback};
pub use syscalls::Syscall;
pub use tracer::{
    Debugger, ProtectionFault, Registers, SPAWN_FAIL_CHDIR, SPAWN_FAIL_EXECVE,
    SPAWN_FAIL_NO_NEW_PRIVS, SPAWN_FAIL_SECCOMP, SPAWN_FAIL_TRACEME, StdioSpec, TraceOptions,
    TracedProcess,
};

static LOG_INIT: OnceLock<()> = OnceLock::new();

/// Initialize tracing for tracebox.
///
/// Uses the `RUST_LOG` environment variable for filtering (defaults to
/// `info`) and writes to stderr. Idempotent, and a no-op when the host
/// process already installed a global subscriber.
pub fn init_logging() {
    LOG_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        // If a global default subscriber is already set, this returns an
        // error; ignore it to avoid interfering with host-configured tracing.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
