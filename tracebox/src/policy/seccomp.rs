//! Seccomp BPF generation from a compiled policy whitelist.
//!
//! Whitelisted syscalls return `SECCOMP_RET_ALLOW` in-kernel and never cost
//! a ptrace stop. Everything else returns `SECCOMP_RET_TRACE`, which stops
//! the tracee with `PTRACE_EVENT_SECCOMP` so the monitor can consult the
//! policy table. Denied calls are therefore *not* killed by the kernel; the
//! supervisor owns the kill so it can record the protection fault first.
//!
//! The filter is compiled in the parent with the `seccompiler` crate and
//! installed by the forked child between `PR_SET_NO_NEW_PRIVS` and `execve`.

use std::collections::BTreeMap;

use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule};

use crate::errors::{TraceboxError, TraceboxResult};

/// Build the BPF program for a whitelist indexed by native syscall number.
///
/// Returns `None` when nothing is whitelisted: a filter that traces every
/// syscall adds nothing over plain ptrace interception (and seccompiler
/// refuses an empty rule map anyway).
pub(crate) fn build_filter(whitelist: &[bool]) -> TraceboxResult<Option<BpfProgram>> {
    // Empty rule vector = unconditional match for that syscall number.
    let rules: BTreeMap<i64, Vec<SeccompRule>> = whitelist
        .iter()
        .enumerate()
        .filter(|(_, allowed)| **allowed)
        .map(|(nr, _)| (nr as i64, vec![]))
        .collect();

    if rules.is_empty() {
        tracing::debug!("no whitelisted syscalls, skipping seccomp filter");
        return Ok(None);
    }

    tracing::debug!(
        whitelisted = rules.len(),
        "building seccomp filter (default: trace)"
    );

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Trace(0), // default: deliver PTRACE_EVENT_SECCOMP
        SeccompAction::Allow,    // match: allow without stopping
        target_arch(),
    )
    .map_err(|e| TraceboxError::Seccomp(format!("failed to create seccomp filter: {}", e)))?;

    let bpf: BpfProgram = filter.try_into().map_err(|e: seccompiler::BackendError| {
        TraceboxError::Seccomp(format!("failed to compile seccomp filter to BPF: {}", e))
    })?;
    Ok(Some(bpf))
}

fn target_arch() -> seccompiler::TargetArch {
    #[cfg(target_arch = "x86_64")]
    {
        seccompiler::TargetArch::x86_64
    }
    #[cfg(target_arch = "aarch64")]
    {
        seccompiler::TargetArch::aarch64
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        compile_error!("unsupported architecture for seccomp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{CompiledPolicy, Policy};
    use crate::syscalls::Syscall;

    #[test]
    fn filter_builds_from_a_real_whitelist() {
        let compiled = CompiledPolicy::compile(
            &Policy::new()
                .allow(Syscall::Read)
                .allow(Syscall::Write)
                .allow(Syscall::ExitGroup),
        );
        let bpf = build_filter(&compiled.seccomp_whitelist()).unwrap().unwrap();
        assert!(!bpf.is_empty(), "BPF program should not be empty");
    }

    #[test]
    fn empty_whitelist_yields_no_filter() {
        // deny-everything degrades to pure ptrace interception
        assert!(build_filter(&[false; 16]).unwrap().is_none());
    }
}
