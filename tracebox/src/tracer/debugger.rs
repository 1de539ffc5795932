//! Register and memory access to a stopped tracee.
//!
//! A [`Debugger`] is constructed at every policed stop and is only valid
//! while the tracee stays stopped. It decodes the register set once, derives
//! the ABI from what the kernel actually returned (a 64-bit tracer sees
//! 32-bit register layouts from compat tracees, and the x32 marker bit in
//! the syscall slot), and gives policy callbacks a narrow surface: syscall
//! number, the six unsigned arguments, string reads from tracee memory, and
//! register rewrites.

use std::mem;

use nix::errno::Errno;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::abi::Abi;
use crate::errors::{TraceboxError, TraceboxResult};
use crate::syscalls::{self, Syscall, X32_SYSCALL_BIT};

#[cfg(target_arch = "x86_64")]
mod arch {
    use super::*;

    /// 64-bit register file as returned for NT_PRSTATUS.
    pub type NativeRegs = libc::user_regs_struct;

    /// i386 `user_regs_struct`, reported for 32-bit tracees. Not exposed by
    /// libc on 64-bit hosts, so it is spelled out here.
    #[repr(C)]
    #[derive(Debug, Copy, Clone)]
    pub struct CompatRegs {
        pub ebx: u32,
        pub ecx: u32,
        pub edx: u32,
        pub esi: u32,
        pub edi: u32,
        pub ebp: u32,
        pub eax: u32,
        pub xds: u32,
        pub xes: u32,
        pub xfs: u32,
        pub xgs: u32,
        pub orig_eax: u32,
        pub eip: u32,
        pub xcs: u32,
        pub eflags: u32,
        pub esp: u32,
        pub xss: u32,
    }

    pub fn classify(regs: &super::Registers) -> Abi {
        match regs {
            super::Registers::Native(native) => {
                if native.orig_rax & X32_SYSCALL_BIT != 0 {
                    Abi::X32
                } else {
                    Abi::X64
                }
            }
            super::Registers::Compat(_) => Abi::X86,
        }
    }

    pub fn syscall_number(regs: &super::Registers) -> i64 {
        match regs {
            super::Registers::Native(native) => (native.orig_rax & !X32_SYSCALL_BIT) as i64,
            super::Registers::Compat(compat) => compat.orig_eax as i32 as i64,
        }
    }

    pub fn set_syscall_number(_pid: Pid, regs: &mut super::Registers, nr: u64) -> nix::Result<bool> {
        match regs {
            super::Registers::Native(native) => {
                let bit = native.orig_rax & X32_SYSCALL_BIT;
                native.orig_rax = nr | bit;
            }
            super::Registers::Compat(compat) => compat.orig_eax = nr as u32,
        }
        // flushed with the rest of the register file
        Ok(true)
    }

    pub fn arg(regs: &super::Registers, index: usize) -> u64 {
        match regs {
            super::Registers::Native(native) => match index {
                0 => native.rdi,
                1 => native.rsi,
                2 => native.rdx,
                3 => native.r10,
                4 => native.r8,
                _ => native.r9,
            },
            super::Registers::Compat(compat) => {
                let arg = match index {
                    0 => compat.ebx,
                    1 => compat.ecx,
                    2 => compat.edx,
                    3 => compat.esi,
                    4 => compat.edi,
                    _ => compat.ebp,
                };
                arg as u64
            }
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arch {
    use super::*;

    /// arm64 `user_pt_regs` as returned for NT_PRSTATUS.
    pub type NativeRegs = libc::user_regs_struct;

    /// AArch32 `user_pt_regs`, reported for compat tracees.
    #[repr(C)]
    #[derive(Debug, Copy, Clone)]
    pub struct CompatRegs {
        pub uregs: [u32; 18],
    }

    /// Regset that rewrites the syscall number on arm64; writing x8 alone
    /// is not honoured at syscall entry.
    const NT_ARM_SYSTEM_CALL: libc::c_int = 0x404;

    pub fn classify(regs: &super::Registers) -> Abi {
        match regs {
            super::Registers::Native(_) => Abi::Arm64,
            super::Registers::Compat(_) => Abi::Arm,
        }
    }

    pub fn syscall_number(regs: &super::Registers) -> i64 {
        match regs {
            super::Registers::Native(native) => native.regs[8] as i64,
            super::Registers::Compat(compat) => compat.uregs[7] as i32 as i64,
        }
    }

    pub fn set_syscall_number(pid: Pid, regs: &mut super::Registers, nr: u64) -> nix::Result<bool> {
        match regs {
            super::Registers::Native(native) => {
                native.regs[8] = nr;
                let mut sysno = nr as libc::c_int;
                let mut iov = libc::iovec {
                    iov_base: (&mut sysno as *mut libc::c_int).cast(),
                    iov_len: mem::size_of::<libc::c_int>(),
                };
                let res = unsafe {
                    libc::ptrace(
                        libc::PTRACE_SETREGSET,
                        libc::pid_t::from(pid.as_raw()),
                        NT_ARM_SYSTEM_CALL as usize as *mut libc::c_void,
                        &mut iov as *mut libc::iovec,
                    )
                };
                Errno::result(res).map(|_| false)
            }
            super::Registers::Compat(compat) => {
                compat.uregs[7] = nr as u32;
                Ok(true)
            }
        }
    }

    pub fn arg(regs: &super::Registers, index: usize) -> u64 {
        match regs {
            super::Registers::Native(native) => native.regs[index.min(5)],
            super::Registers::Compat(compat) => compat.uregs[index.min(5)] as u64,
        }
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("unsupported tracer architecture");

/// Bulk register snapshot of a stopped tracee, in whichever layout the
/// kernel reported.
#[derive(Debug, Copy, Clone)]
pub enum Registers {
    Native(arch::NativeRegs),
    Compat(arch::CompatRegs),
}

fn getregset(pid: Pid) -> Result<Registers, Errno> {
    let mut buf = [0u8; mem::size_of::<arch::NativeRegs>()];
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_GETREGSET,
            libc::pid_t::from(pid.as_raw()),
            libc::NT_PRSTATUS as usize as *mut libc::c_void,
            &mut iov as *mut libc::iovec,
        )
    };
    Errno::result(res)?;
    if iov.iov_len == mem::size_of::<arch::CompatRegs>() {
        // the kernel reported the 32-bit layout
        let compat = unsafe { buf.as_ptr().cast::<arch::CompatRegs>().read_unaligned() };
        Ok(Registers::Compat(compat))
    } else {
        let native = unsafe { buf.as_ptr().cast::<arch::NativeRegs>().read_unaligned() };
        Ok(Registers::Native(native))
    }
}

fn setregset(pid: Pid, regs: &Registers) -> Result<(), Errno> {
    let (base, len): (*const u8, usize) = match regs {
        Registers::Native(native) => (
            (native as *const arch::NativeRegs).cast(),
            mem::size_of::<arch::NativeRegs>(),
        ),
        Registers::Compat(compat) => (
            (compat as *const arch::CompatRegs).cast(),
            mem::size_of::<arch::CompatRegs>(),
        ),
    };
    let mut iov = libc::iovec {
        iov_base: base.cast_mut().cast(),
        iov_len: len,
    };
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_SETREGSET,
            libc::pid_t::from(pid.as_raw()),
            libc::NT_PRSTATUS as usize as *mut libc::c_void,
            &mut iov as *mut libc::iovec,
        )
    };
    Errno::result(res).map(drop)
}

/// Register and memory access to one stopped tracee.
pub struct Debugger {
    pid: Pid,
    abi: Abi,
    regs: Option<Registers>,
    dirty: bool,
    last_errno: Option<Errno>,
}

impl Debugger {
    /// Snapshot the register set of a stopped tracee. A failed read does not
    /// error: it yields a debugger with `Abi::Invalid` and `syscall() == -1`
    /// so the monitor can record the mandatory "ptrace fail" fault.
    pub(crate) fn at_stop(pid: Pid) -> Debugger {
        match getregset(pid) {
            Ok(regs) => Debugger {
                pid,
                abi: arch::classify(&regs),
                regs: Some(regs),
                dirty: false,
                last_errno: None,
            },
            Err(errno) => Debugger {
                pid,
                abi: Abi::Invalid,
                regs: None,
                dirty: false,
                last_errno: Some(errno),
            },
        }
    }

    /// Pid of the tracee this debugger is attached to.
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }

    /// ABI the tracee was executing under at this stop.
    pub fn abi(&self) -> Abi {
        self.abi
    }

    /// Native syscall number at this stop (x32 marker bit stripped), or -1
    /// when the register set could not be read.
    pub fn syscall(&self) -> i64 {
        match &self.regs {
            Some(regs) => arch::syscall_number(regs),
            None => -1,
        }
    }

    /// Canonical name of the current syscall.
    pub fn syscall_name(&self) -> &'static str {
        syscalls::name_of(self.abi, self.syscall())
    }

    /// Unsigned syscall argument `index` (0..=5).
    pub fn uarg(&self, index: usize) -> u64 {
        match &self.regs {
            Some(regs) => arch::arg(regs, index),
            None => 0,
        }
    }

    pub fn uarg0(&self) -> u64 {
        self.uarg(0)
    }
    pub fn uarg1(&self) -> u64 {
        self.uarg(1)
    }
    pub fn uarg2(&self) -> u64 {
        self.uarg(2)
    }
    pub fn uarg3(&self) -> u64 {
        self.uarg(3)
    }
    pub fn uarg4(&self) -> u64 {
        self.uarg(4)
    }
    pub fn uarg5(&self) -> u64 {
        self.uarg(5)
    }

    /// All six unsigned arguments, as recorded in protection faults.
    pub fn uargs(&self) -> [u64; 6] {
        [
            self.uarg(0),
            self.uarg(1),
            self.uarg(2),
            self.uarg(3),
            self.uarg(4),
            self.uarg(5),
        ]
    }

    /// A syscall number the kernel will accept on the current ABI whose
    /// effect is trivial (getpid). Callbacks use it to neutralise a syscall
    /// by rewriting its number instead of killing the tracee.
    pub fn noop_syscall_id(&self) -> Option<u32> {
        syscalls::native_for(self.abi, Syscall::Getpid).first().copied()
    }

    /// Rewrite the syscall number the kernel will execute when the tracee is
    /// continued.
    pub fn set_syscall(&mut self, nr: u32) -> TraceboxResult<()> {
        let regs = self
            .regs
            .as_mut()
            .ok_or_else(|| TraceboxError::Internal("registers unavailable".into()))?;
        if arch::set_syscall_number(self.pid, regs, nr as u64)? {
            self.dirty = true;
        }
        Ok(())
    }

    /// Bulk register snapshot.
    pub fn registers(&self) -> Option<Registers> {
        self.regs
    }

    /// Replace the tracee's registers when it is continued.
    pub fn set_registers(&mut self, regs: Registers) {
        self.regs = Some(regs);
        self.dirty = true;
    }

    /// Read a NUL-terminated string of at most `max_size` bytes from tracee
    /// memory.
    ///
    /// Returns `Ok(None)` when the address is unreadable, and
    /// [`TraceboxError::StringLengthExceeded`] when no NUL terminator shows
    /// up within the limit. Pointers from 32-bit ABIs arrive sign-extended
    /// in 64-bit registers and are masked down before use.
    pub fn read_str(&self, address: u64, max_size: usize) -> TraceboxResult<Option<String>> {
        let mut address = address;
        if self.abi.is_32_bit() {
            address &= 0xFFFF_FFFF;
        }

        let word = mem::size_of::<libc::c_long>() as u64;
        let mut bytes: Vec<u8> = Vec::new();
        // the peek primitive is word-aligned; start low and skip the lead-in
        let mut cursor = address & !(word - 1);
        let mut skip = (address - cursor) as usize;

        loop {
            let data = match ptrace::read(self.pid, cursor as ptrace::AddressType) {
                Ok(data) => data,
                Err(_) => return Ok(None),
            };
            for &byte in &data.to_ne_bytes()[skip..] {
                if byte == 0 {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                if bytes.len() >= max_size {
                    return Err(TraceboxError::StringLengthExceeded { max: max_size });
                }
                bytes.push(byte);
            }
            skip = 0;
            cursor = cursor.wrapping_add(word);
        }
    }

    /// Errno of the failed register read, if any. Feeds the "ptrace fail"
    /// protection fault.
    pub(crate) fn last_errno(&self) -> Option<i32> {
        self.last_errno.map(|e| e as i32)
    }

    /// Push any register edits back into the tracee. Must happen before the
    /// tracee is continued; callbacks' writes are ordered before resume.
    pub(crate) fn flush(&mut self) -> Result<(), Errno> {
        if !self.dirty {
            return Ok(());
        }
        let regs = self.regs.as_ref().expect("dirty implies registers");
        setregset(self.pid, regs)?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(err) = self.flush() {
                tracing::warn!(pid = self.pid.as_raw(), error = %err, "failed to flush tracee registers");
            }
        }
    }
}
