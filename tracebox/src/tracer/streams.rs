//! Standard-stream plumbing between the supervisor and the tracee.
//!
//! Parent ends of any created pipes are handed to the caller as `File`s and
//! the opposite ends are closed as soon as the spawn attempt concludes, so
//! EOF propagates the moment the tracee exits.

use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;

use crate::errors::TraceboxResult;

/// Destination of one of the tracee's standard descriptors.
pub enum StdioSpec {
    /// Create a pipe; the supervisor keeps the parent end.
    Pipe,
    /// Redirect to an existing descriptor owned by the caller.
    Fd(OwnedFd),
    /// Inherit the supervisor's own descriptor.
    Inherit,
}

impl From<File> for StdioSpec {
    fn from(file: File) -> Self {
        StdioSpec::Fd(file.into())
    }
}

impl From<OwnedFd> for StdioSpec {
    fn from(fd: OwnedFd) -> Self {
        StdioSpec::Fd(fd)
    }
}

impl std::fmt::Debug for StdioSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StdioSpec::Pipe => f.write_str("Pipe"),
            StdioSpec::Fd(fd) => write!(f, "Fd({})", fd.as_raw_fd()),
            StdioSpec::Inherit => f.write_str("Inherit"),
        }
    }
}

/// Both sides of the stream setup for one spawn.
pub(crate) struct StreamSet {
    /// Raw descriptors the child dup2s onto 0/1/2; -1 means inherit.
    pub child_fds: [RawFd; 3],
    /// Descriptors only the child uses; closed in the parent after fork.
    child_owned: Vec<OwnedFd>,
    /// Caller-provided descriptors; also closed in the parent after fork.
    caller_owned: Vec<OwnedFd>,
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

impl StreamSet {
    /// Materialise the three stdio specs into concrete descriptors.
    pub fn prepare(stdin: StdioSpec, stdout: StdioSpec, stderr: StdioSpec) -> TraceboxResult<Self> {
        let mut set = StreamSet {
            child_fds: [-1; 3],
            child_owned: Vec::new(),
            caller_owned: Vec::new(),
            stdin: None,
            stdout: None,
            stderr: None,
        };

        // stdin: parent writes, child reads
        match stdin {
            StdioSpec::Pipe => {
                let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
                set.child_fds[0] = read.as_raw_fd();
                set.child_owned.push(read);
                set.stdin = Some(unsafe { File::from_raw_fd(write.into_raw_fd()) });
            }
            StdioSpec::Fd(fd) => {
                set.child_fds[0] = fd.as_raw_fd();
                set.caller_owned.push(fd);
            }
            StdioSpec::Inherit => {}
        }

        // stdout/stderr: child writes, parent reads
        for (slot, spec) in [(1usize, stdout), (2usize, stderr)] {
            match spec {
                StdioSpec::Pipe => {
                    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
                    set.child_fds[slot] = write.as_raw_fd();
                    set.child_owned.push(write);
                    let file = unsafe { File::from_raw_fd(read.into_raw_fd()) };
                    if slot == 1 {
                        set.stdout = Some(file);
                    } else {
                        set.stderr = Some(file);
                    }
                }
                StdioSpec::Fd(fd) => {
                    set.child_fds[slot] = fd.as_raw_fd();
                    set.caller_owned.push(fd);
                }
                StdioSpec::Inherit => {}
            }
        }

        Ok(set)
    }

    /// Drop the parent's copies of the child-side descriptors. Must run once
    /// the spawn attempt has concluded, whether it succeeded or not; EOF on
    /// the parent ends depends on it. Close failures are not actionable
    /// here, so they are logged and swallowed.
    pub fn close_child_ends(&mut self) {
        for fd in self.child_owned.drain(..).chain(self.caller_owned.drain(..)) {
            let raw = fd.into_raw_fd();
            if unsafe { libc::close(raw) } < 0 {
                let err = std::io::Error::last_os_error();
                tracing::warn!(fd = raw, error = %err, "failed to close child stream end");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn inherit_produces_no_descriptors() {
        let set =
            StreamSet::prepare(StdioSpec::Inherit, StdioSpec::Inherit, StdioSpec::Inherit).unwrap();
        assert_eq!(set.child_fds, [-1, -1, -1]);
        assert!(set.stdin.is_none() && set.stdout.is_none() && set.stderr.is_none());
    }

    #[test]
    fn pipes_are_created_and_connected() {
        let mut set =
            StreamSet::prepare(StdioSpec::Pipe, StdioSpec::Pipe, StdioSpec::Inherit).unwrap();
        assert!(set.child_fds[0] >= 0);
        assert!(set.child_fds[1] >= 0);
        assert_eq!(set.child_fds[2], -1);

        // the parent's stdin end reaches the child's read end
        let mut writer = set.stdin.take().unwrap();
        writer.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        let read_end = unsafe { std::os::fd::BorrowedFd::borrow_raw(set.child_fds[0]) };
        let mut reader = File::from(nix::unistd::dup(read_end).unwrap());
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn close_child_ends_leaves_parent_ends_usable() {
        let mut set =
            StreamSet::prepare(StdioSpec::Inherit, StdioSpec::Pipe, StdioSpec::Inherit).unwrap();
        set.close_child_ends();
        // with the write end gone, reads see EOF instead of blocking
        let mut out = Vec::new();
        set.stdout.take().unwrap().read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
