//! Host stand-in for the architecture layer.
//!
//! Provides the same names as the RISC-V module so the kernel builds and
//! its logic can be unit-tested off-target. Nothing here touches hardware:
//! the interrupt flag is a plain atomic, the clock is settable, and a
//! context switch only records which contexts were involved.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Recorded register state of a fake task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pc: usize,
    sp: usize,
    argument: usize,
    interrupts_on: bool,
}

impl Context {
    pub const fn zeroed() -> Self {
        Context {
            pc: 0,
            sp: 0,
            argument: 0,
            interrupts_on: false,
        }
    }

    pub fn for_task(entry_pc: usize, stack_top: usize, argument: usize) -> Self {
        Context {
            pc: entry_pc,
            sp: stack_top,
            argument,
            interrupts_on: true,
        }
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Value that would be in `a0` on first resume.
    pub fn argument(&self) -> usize {
        self.argument
    }
}

/// Records the interrupt state on both sides and returns immediately.
///
/// # Safety
/// Same contract as the real primitive; `to` must be readable.
pub unsafe fn switch_context(from: Option<*mut Context>, to: *const Context) {
    let target = unsafe { *to };
    if let Some(from) = from {
        unsafe { (*from).interrupts_on = interrupts::are_enabled() };
    }
    if target.interrupts_on {
        interrupts::enable();
    }
}

pub mod interrupts {
    use super::*;

    static ENABLED: AtomicBool = AtomicBool::new(false);

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

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

pub mod timer {
    use super::*;

    static NOW: AtomicU64 = AtomicU64::new(0);
    static DEADLINE: AtomicU64 = AtomicU64::new(u64::MAX);

    pub fn now() -> u64 {
        NOW.load(Ordering::SeqCst)
    }

    pub fn arm(deadline: u64) {
        DEADLINE.store(deadline, Ordering::SeqCst);
    }

    /// Last armed deadline.
    pub fn deadline() -> u64 {
        DEADLINE.load(Ordering::SeqCst)
    }

    /// Moves the fake clock forward.
    pub fn advance(delta: u64) {
        NOW.fetch_add(delta, Ordering::SeqCst);
    }
}

pub mod trap {
    pub fn init() {
        super::timer::arm(u64::MAX);
    }
}

pub fn init() {
    trap::init();
}

pub fn wait_for_interrupt() {
    core::hint::spin_loop();
}

pub fn halt() -> ! {
    interrupts::disable();
    loop {
        core::hint::spin_loop();
    }
}

pub fn interrupt_registers() -> (usize, usize, usize) {
    (usize::from(interrupts::are_enabled()) << 1, 0, 0)
}
