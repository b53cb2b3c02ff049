//! Trap coordinator: the timer tick and the fatal path.
//!
//! The architecture's trap vector decodes the cause and calls in here. The
//! handler never switches tasks; it only requests a reschedule, which the
//! running task honours at its next cooperative checkpoint.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch;
use crate::config::{TICK_HZ, TIMEBASE_HZ};
use crate::kernel;

/// Timebase cycles between two ticks.
pub const TICK_INTERVAL: u64 = TIMEBASE_HZ / TICK_HZ;

const INTERRUPT_BIT: usize = 1 << (usize::BITS - 1);

static INTERRUPTS: AtomicU64 = AtomicU64::new(0);

/// Installs the trap vector. The timer stays silent until [`start_timer`].
pub fn init() {
    arch::init();
    log::info!(target: "trap", "trap vector installed, tick every {} cycles", TICK_INTERVAL);
}

/// Arms the first deadline.
pub fn start_timer() {
    arm_next();
    log::info!(target: "trap", "timer started at {} Hz", TICK_HZ);
}

fn arm_next() {
    arch::timer::arm(arch::timer::now().wrapping_add(TICK_INTERVAL));
}

/// Supervisor timer interrupt.
///
/// The next deadline is armed before anything else so a slow tick cannot
/// lose the following one.
pub fn on_timer_interrupt() {
    arm_next();
    INTERRUPTS.fetch_add(1, Ordering::Relaxed);
    kernel::tick();
}

/// Anything other than the timer. Reports and halts.
pub fn on_unhandled_trap(cause: usize, epc: usize, tval: usize) -> ! {
    log::error!(
        target: "trap",
        "unhandled {} (scause={:#x} sepc={:#x} stval={:#x})",
        describe(cause),
        cause,
        epc,
        tval
    );
    println!("!!! TRAP !!! scause={:#x} sepc={:#x} stval={:#x}", cause, epc, tval);
    arch::halt()
}

/// Timer interrupts taken since boot.
pub fn interrupt_count() -> u64 {
    INTERRUPTS.load(Ordering::Relaxed)
}

/// Human-readable name of an `scause` value.
pub fn describe(cause: usize) -> &'static str {
    let code = cause & !INTERRUPT_BIT;
    if cause & INTERRUPT_BIT != 0 {
        return match code {
            1 => "supervisor software interrupt",
            5 => "supervisor timer interrupt",
            9 => "supervisor external interrupt",
            _ => "unknown interrupt",
        };
    }
    match code {
        0 => "instruction address misaligned",
        1 => "instruction access fault",
        2 => "illegal instruction",
        3 => "breakpoint",
        4 => "load address misaligned",
        5 => "load access fault",
        6 => "store address misaligned",
        7 => "store access fault",
        8 => "environment call from U-mode",
        9 => "environment call from S-mode",
        12 => "instruction page fault",
        13 => "load page fault",
        15 => "store page fault",
        _ => "unknown exception",
    }
}
