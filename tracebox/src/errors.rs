//! Error types used across the tracer core.

use thiserror::Error;

/// Result type for tracebox operations.
pub type TraceboxResult<T> = Result<T, TraceboxError>;

#[derive(Debug, Error)]
pub enum TraceboxError {
    #[error("failed to call prctl(PR_SET_NO_NEW_PRIVS)")]
    SpawnNoNewPrivs,

    #[error("failed to set up seccomp policy")]
    SpawnSeccomp,

    #[error(
        "failed to ptrace child, check Yama config \
         (https://www.kernel.org/doc/Documentation/security/Yama.txt, should be at most 1); \
         if running in Docker, must run container with `--cap-add=SYS_PTRACE`"
    )]
    SpawnTraceme,

    #[error("failed to spawn child (execve)")]
    SpawnExecve,

    #[error("failed to change into working directory")]
    SpawnChdir,

    #[error("process failed to initialize with unknown exit code: {0}")]
    SpawnUnknown(i32),

    #[error("executable not found: {0}")]
    ExecutableNotFound(String),

    #[error("string in tracee memory exceeded maximum length of {max} bytes")]
    StringLengthExceeded { max: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("seccomp filter error: {0}")]
    Seccomp(String),

    #[error("system error: {0}")]
    Os(#[from] nix::errno::Errno),

    #[error("internal error: {0}")]
    Internal(String),
}

// Implement From for common error types to enable `?` operator
impl From<std::io::Error> for TraceboxError {
    fn from(err: std::io::Error) -> Self {
        TraceboxError::Internal(format!("I/O error: {}", err))
    }
}

impl From<std::ffi::NulError> for TraceboxError {
    fn from(err: std::ffi::NulError) -> Self {
        TraceboxError::Config(format!("argument contains interior NUL byte: {}", err))
    }
}
