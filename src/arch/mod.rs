//! Reading the frame pointer register.

use core::arch::asm;

/// The frame pointer of the calling function.
#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub fn fp() -> usize {
    let fp: usize;
    unsafe {
        asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

#[cfg(target_arch = "x86")]
#[inline(always)]
pub fn fp() -> usize {
    let fp: usize;
    unsafe {
        asm!("mov {}, ebp", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn fp() -> usize {
    let fp: usize;
    unsafe {
        asm!("mov {}, x29", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[inline(always)]
pub fn fp() -> usize {
    let fp: usize;
    unsafe {
        asm!("mv {}, s0", out(reg) fp, options(nomem, nostack, preserves_flags));
    }
    fp
}

/// No frame pointer register is known; walks starting here fail on the first
/// read.
#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "aarch64",
    target_arch = "riscv32",
    target_arch = "riscv64"
)))]
#[inline(always)]
pub fn fp() -> usize {
    0
}
