//! Instruction-set ABI identification for the tracee.
//!
//! The meaning of a native syscall number depends on the ABI the tracee is
//! executing under at the moment of a stop. A single 64-bit tracer can
//! observe several ABIs from one process image (e.g. an x86-64 binary that
//! far-jumps into 32-bit code), so the ABI is re-read from the register set
//! at every stop rather than fixed at spawn.

use serde::{Deserialize, Serialize};

/// Number of translation-table columns (one per supported ABI).
pub const ABI_COUNT: usize = 6;

/// Instruction-set and calling-convention profile of the tracee.
///
/// `Invalid` is reported when the register set could not be read; it has no
/// table column and every policy decision for it is a refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Abi {
    X86,
    X64,
    X32,
    Arm,
    Arm64,
    FreebsdX64,
    Invalid,
}

impl Abi {
    /// All ABIs with a translation-table column, in column order.
    pub const SUPPORTED: [Abi; ABI_COUNT] = [
        Abi::X86,
        Abi::X64,
        Abi::X32,
        Abi::Arm,
        Abi::FreebsdX64,
        Abi::Arm64,
    ];

    /// Column of this ABI in the syscall translation table.
    ///
    /// Total for every ABI except `Invalid`.
    pub fn table_index(self) -> Option<usize> {
        match self {
            Abi::X86 => Some(0),
            Abi::X64 => Some(1),
            Abi::X32 => Some(2),
            Abi::Arm => Some(3),
            Abi::FreebsdX64 => Some(4),
            Abi::Arm64 => Some(5),
            Abi::Invalid => None,
        }
    }

    /// Pointer width of the ABI in bits.
    pub fn address_bits(self) -> Option<u32> {
        match self {
            Abi::X86 | Abi::X32 | Abi::Arm => Some(32),
            Abi::X64 | Abi::Arm64 | Abi::FreebsdX64 => Some(64),
            Abi::Invalid => None,
        }
    }

    /// True for ABIs whose pointer arguments arrive in 64-bit registers but
    /// are only 32 bits wide and must be masked before dereferencing.
    pub fn is_32_bit(self) -> bool {
        self.address_bits() == Some(32)
    }

    /// The ABI the tracer itself was compiled for. Seccomp filtering applies
    /// to this ABI only; foreign-ABI syscalls always reach the tracer.
    pub fn native() -> Abi {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            Abi::X64
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            Abi::Arm64
        }
        #[cfg(all(target_os = "freebsd", target_arch = "x86_64"))]
        {
            Abi::FreebsdX64
        }
        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "freebsd", target_arch = "x86_64"),
        )))]
        {
            compile_error!("unsupported tracer platform")
        }
    }
}

impl std::fmt::Display for Abi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Abi::X86 => "x86",
            Abi::X64 => "x86_64",
            Abi::X32 => "x32",
            Abi::Arm => "arm",
            Abi::Arm64 => "arm64",
            Abi::FreebsdX64 => "freebsd_x64",
            Abi::Invalid => "invalid",
        };
        write!(f, "{}", name)
    }
}
