//! Supervisor CSR accessors.

use core::arch::asm;

bitflags::bitflags! {
    /// Bits of `sstatus` the kernel touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sstatus: usize {
        /// Supervisor interrupt enable.
        const SIE  = 1 << 1;
        /// Interrupt enable restored by `sret`.
        const SPIE = 1 << 5;
        /// Privilege restored by `sret` (set = supervisor).
        const SPP  = 1 << 8;
        /// Floating-point unit state (2 bits).
        const FS   = 0b11 << 13;
        /// `FS = Initial`: FP unit usable, nothing dirty yet.
        const FS_INITIAL = 0b01 << 13;
    }
}

bitflags::bitflags! {
    /// Bits of `sie`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sie: usize {
        const SSIE = 1 << 1;
        const STIE = 1 << 5;
        const SEIE = 1 << 9;
    }
}

pub mod sstatus {
    use super::*;

    #[inline]
    pub fn read() -> Sstatus {
        let bits: usize;
        unsafe { asm!("csrr {}, sstatus", out(reg) bits) };
        Sstatus::from_bits_retain(bits)
    }

    #[inline]
    pub fn set(flags: Sstatus) {
        unsafe { asm!("csrs sstatus, {}", in(reg) flags.bits()) };
    }

    #[inline]
    pub fn clear(flags: Sstatus) {
        unsafe { asm!("csrc sstatus, {}", in(reg) flags.bits()) };
    }
}

pub mod sie {
    use super::*;

    #[inline]
    pub fn read() -> Sie {
        let bits: usize;
        unsafe { asm!("csrr {}, sie", out(reg) bits) };
        Sie::from_bits_retain(bits)
    }

    #[inline]
    pub fn set(flags: Sie) {
        unsafe { asm!("csrs sie, {}", in(reg) flags.bits()) };
    }
}

pub mod sip {
    use core::arch::asm;

    #[inline]
    pub fn read() -> usize {
        let bits: usize;
        unsafe { asm!("csrr {}, sip", out(reg) bits) };
        bits
    }
}

pub mod stvec {
    use core::arch::asm;

    /// Installs `addr` as the trap vector in direct mode.
    ///
    /// # Safety
    /// `addr` must be a 4-byte aligned trap entry that preserves the
    /// interrupted context.
    #[inline]
    pub unsafe fn write(addr: usize) {
        unsafe { asm!("csrw stvec, {}", in(reg) addr & !0b11) };
    }
}

pub mod time {
    use core::arch::asm;

    #[inline]
    pub fn read() -> u64 {
        let t: u64;
        unsafe { asm!("csrr {}, time", out(reg) t) };
        t
    }
}

/// Interrupt bit of `scause`.
pub const SCAUSE_INTERRUPT: usize = 1 << 63;

/// Exception code of the supervisor timer interrupt.
pub const SCAUSE_SUPERVISOR_TIMER: usize = 5;
