//! Canonical syscall identifiers and the per-ABI translation table.
//!
//! A canonical [`Syscall`] names a logical kernel operation independently of
//! the tracee's ABI. The translation table maps each canonical id to the set
//! of native numbers that invoke it on every supported ABI: the set may be
//! empty (the ABI never had the call, e.g. `open` on arm64) or carry several
//! entries (legacy and 64-suffixed variants share one policy, e.g. `mmap`
//! and `mmap2` on x86).
//!
//! The table is a process-wide read-only structure; nothing mutates it after
//! program start.

mod table;

pub use table::Syscall;
pub(crate) use table::TRANSLATOR;

use crate::abi::Abi;

/// x32 syscall numbers carry this marker bit in `orig_rax`. The table stores
/// numbers unbiased; the debugger strips the bit before lookup.
pub const X32_SYSCALL_BIT: u64 = 0x4000_0000;

/// ARM-private syscalls live in the open interval (0xF0000, 0xF0006). The
/// kernel uses them for cache maintenance and TLS setup, so policy treats the
/// whole window as implicitly allowed.
const ARM_PRIVATE_BASE: u64 = 0xF0000;
const ARM_PRIVATE_END: u64 = 0xF0006;

/// True when `native` falls into the ARM-private window on the ARM ABI.
pub fn is_arm_private(abi: Abi, native: u64) -> bool {
    abi == Abi::Arm && native > ARM_PRIVATE_BASE && native < ARM_PRIVATE_END
}

fn arm_private_name(native: u64) -> Option<&'static str> {
    match native {
        0xF0001 => Some("breakpoint"),
        0xF0002 => Some("cacheflush"),
        0xF0003 => Some("usr26"),
        0xF0004 => Some("usr32"),
        0xF0005 => Some("set_tls"),
        _ => None,
    }
}

/// Native numbers invoking `canonical` on `abi`. Empty when the ABI has no
/// such call (or for `Abi::Invalid`).
pub fn native_for(abi: Abi, canonical: Syscall) -> &'static [u32] {
    match abi.table_index() {
        Some(idx) => TRANSLATOR[canonical as usize][idx],
        None => &[],
    }
}

/// Canonical id of the native number `native` on `abi`, if the table knows it.
pub fn canonical_of(abi: Abi, native: u64) -> Option<Syscall> {
    let idx = abi.table_index()?;
    let native = u32::try_from(native).ok()?;
    Syscall::ALL
        .iter()
        .copied()
        .find(|&sys| TRANSLATOR[sys as usize][idx].contains(&native))
}

/// Human-readable name of the native number `native` on `abi`.
///
/// Unknown numbers resolve to `"unknown"`; an unreadable register set
/// (`Abi::Invalid`) resolves to a diagnostic string of its own.
pub fn name_of(abi: Abi, native: i64) -> &'static str {
    if abi == Abi::Invalid {
        return "failed to read registers";
    }
    if native < 0 {
        return "unknown";
    }
    let native = native as u64;
    if let Some(name) = arm_private_name(native).filter(|_| is_arm_private(abi, native)) {
        return name;
    }
    match canonical_of(abi, native) {
        Some(sys) => sys.name(),
        None => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ABI_COUNT;

    #[test]
    fn translator_has_one_row_per_canonical() {
        assert_eq!(TRANSLATOR.len(), Syscall::COUNT);
        for row in TRANSLATOR.iter() {
            assert_eq!(row.len(), ABI_COUNT);
        }
    }

    #[test]
    fn well_known_numbers_translate() {
        assert_eq!(native_for(Abi::X64, Syscall::Read), &[0]);
        assert_eq!(native_for(Abi::X64, Syscall::Write), &[1]);
        assert_eq!(native_for(Abi::X64, Syscall::Execve), &[59]);
        assert_eq!(native_for(Abi::X86, Syscall::Open), &[5]);
        assert_eq!(native_for(Abi::Arm, Syscall::Read), &[3]);
        assert_eq!(native_for(Abi::Arm64, Syscall::Read), &[63]);
        assert_eq!(native_for(Abi::Arm64, Syscall::ExitGroup), &[94]);
        assert_eq!(native_for(Abi::FreebsdX64, Syscall::Getpid), &[20]);
    }

    #[test]
    fn some_abis_lack_some_calls() {
        // arm64 is an *at-only ABI
        assert!(native_for(Abi::Arm64, Syscall::Open).is_empty());
        assert!(native_for(Abi::Arm64, Syscall::Fork).is_empty());
        // the x86 TLS calls exist nowhere else
        assert!(native_for(Abi::Arm, Syscall::SetThreadArea).is_empty());
    }

    #[test]
    fn one_canonical_may_map_to_several_numbers() {
        // mmap and mmap2 share a policy on x86
        assert_eq!(native_for(Abi::X86, Syscall::Mmap), &[90, 192]);
        // getuid and getuid32
        assert_eq!(native_for(Abi::X86, Syscall::Getuid), &[24, 199]);
    }

    #[test]
    fn canonical_of_inverts_native_for() {
        for abi in Abi::SUPPORTED {
            for &sys in Syscall::ALL {
                for &native in native_for(abi, sys) {
                    assert_eq!(
                        canonical_of(abi, native as u64),
                        Some(sys),
                        "{:?}/{} should translate back to {:?}",
                        abi,
                        native,
                        sys
                    );
                }
            }
        }
    }

    #[test]
    fn native_numbers_are_unique_within_each_abi() {
        use std::collections::HashMap;
        for abi in Abi::SUPPORTED {
            let mut seen: HashMap<u32, Syscall> = HashMap::new();
            for &sys in Syscall::ALL {
                for &native in native_for(abi, sys) {
                    if let Some(prev) = seen.insert(native, sys) {
                        panic!("{:?}/{} claimed by {:?} and {:?}", abi, native, prev, sys);
                    }
                }
            }
        }
    }

    #[test]
    fn getpid_exists_on_every_abi() {
        // noop_syscall_id depends on it
        for abi in Abi::SUPPORTED {
            assert!(
                !native_for(abi, Syscall::Getpid).is_empty(),
                "getpid missing on {:?}",
                abi
            );
        }
    }

    #[test]
    fn name_lookup_and_fallbacks() {
        assert_eq!(name_of(Abi::X64, 0), "read");
        assert_eq!(name_of(Abi::X64, 59), "execve");
        assert_eq!(name_of(Abi::X86, 5), "open");
        assert_eq!(name_of(Abi::X64, 99_999), "unknown");
        assert_eq!(name_of(Abi::X64, -1), "unknown");
        assert_eq!(name_of(Abi::Invalid, 0), "failed to read registers");
    }

    #[test]
    fn arm_private_window_bounds() {
        assert!(!is_arm_private(Abi::Arm, 0xF0000));
        assert!(is_arm_private(Abi::Arm, 0xF0001));
        assert!(is_arm_private(Abi::Arm, 0xF0002));
        assert!(is_arm_private(Abi::Arm, 0xF0005));
        assert!(!is_arm_private(Abi::Arm, 0xF0006));
        // window is ARM-only
        assert!(!is_arm_private(Abi::X64, 0xF0002));
        assert!(!is_arm_private(Abi::Arm64, 0xF0002));
    }

    #[test]
    fn arm_private_names() {
        assert_eq!(name_of(Abi::Arm, 0xF0002), "cacheflush");
        assert_eq!(name_of(Abi::Arm, 0xF0005), "set_tls");
        // same numbers are meaningless elsewhere
        assert_eq!(name_of(Abi::X64, 0xF0002), "unknown");
    }
}
