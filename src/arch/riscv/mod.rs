//! RV64 supervisor-mode support (QEMU virt under OpenSBI).

mod boot;
mod context;
pub mod csr;
mod sbi;
pub mod trap;

pub use context::{switch_context, Context};

/// Enables the FP unit and installs trap handling.
pub fn init() {
    csr::sstatus::set(csr::Sstatus::FS_INITIAL);
    trap::init();
}

/// Supervisor interrupt enable, as seen through `sstatus.SIE`.
pub mod interrupts {
    use super::csr::{sstatus, Sstatus};

    /// Returns whether supervisor interrupts are enabled.
    #[inline]
    pub fn are_enabled() -> bool {
        sstatus::read().contains(Sstatus::SIE)
    }

    #[inline]
    pub fn enable() {
        sstatus::set(Sstatus::SIE);
    }

    #[inline]
    pub fn disable() {
        sstatus::clear(Sstatus::SIE);
    }

    /// Runs `f` with interrupts masked, restoring the previous state after.
    #[inline]
    pub fn without_interrupts<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let were_enabled = are_enabled();
        if were_enabled {
            disable();
        }
        let ret = f();
        if were_enabled {
            enable();
        }
        ret
    }
}

/// Platform time source and timer deadline.
pub mod timer {
    use super::{csr, sbi};

    /// Current value of the `time` CSR.
    #[inline]
    pub fn now() -> u64 {
        csr::time::read()
    }

    /// Arms the supervisor timer for absolute time `deadline`.
    #[inline]
    pub fn arm(deadline: u64) {
        sbi::set_timer(deadline);
    }
}

/// Wait for the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    unsafe { core::arch::asm!("wfi") };
}

/// Stops forward progress on this hart for good.
pub fn halt() -> ! {
    interrupts::disable();
    loop {
        wait_for_interrupt();
    }
}

/// Diagnostic view of the interrupt CSRs: `(sstatus, sie, sip)`.
pub fn interrupt_registers() -> (usize, usize, usize) {
    (
        csr::sstatus::read().bits(),
        csr::sie::read().bits(),
        csr::sip::read(),
    )
}
