//! Supervisor trap vector.
//!
//! The vector only preserves the caller-saved registers: the handler is an
//! ordinary `extern "C"` function and never switches tasks, so callee-saved
//! registers come back untouched and `sret` resumes whatever was
//! interrupted.

use core::arch::global_asm;

use super::csr::{self, Sie};

global_asm!(
    r#"
    .section .text
    .globl __trap_vector
    .align 4
__trap_vector:
    addi sp, sp, -128
    sd ra, 0(sp)
    sd a0, 8(sp)
    sd a1, 16(sp)
    sd a2, 24(sp)
    sd a3, 32(sp)
    sd a4, 40(sp)
    sd a5, 48(sp)
    sd a6, 56(sp)
    sd a7, 64(sp)
    sd t0, 72(sp)
    sd t1, 80(sp)
    sd t2, 88(sp)
    sd t3, 96(sp)
    sd t4, 104(sp)
    sd t5, 112(sp)
    sd t6, 120(sp)

    csrr a0, scause
    csrr a1, sepc
    csrr a2, stval
    call __trap_dispatch

    ld t6, 120(sp)
    ld t5, 112(sp)
    ld t4, 104(sp)
    ld t3, 96(sp)
    ld t2, 88(sp)
    ld t1, 80(sp)
    ld t0, 72(sp)
    ld a7, 64(sp)
    ld a6, 56(sp)
    ld a5, 48(sp)
    ld a4, 40(sp)
    ld a3, 32(sp)
    ld a2, 24(sp)
    ld a1, 16(sp)
    ld a0, 8(sp)
    ld ra, 0(sp)
    addi sp, sp, 128
    sret
"#
);

extern "C" {
    fn __trap_vector();
}

#[no_mangle]
extern "C" fn __trap_dispatch(scause: usize, sepc: usize, stval: usize) {
    let is_interrupt = scause & csr::SCAUSE_INTERRUPT != 0;
    let code = scause & !csr::SCAUSE_INTERRUPT;

    if is_interrupt && code == csr::SCAUSE_SUPERVISOR_TIMER {
        crate::trap::on_timer_interrupt();
        return;
    }

    crate::trap::on_unhandled_trap(scause, sepc, stval);
}

/// Installs the trap vector and enables the timer interrupt source.
///
/// The timer is parked at the far future until the first deadline is
/// armed, and global interrupts stay masked: the first dispatched task
/// enables them through its saved `sstatus`.
pub fn init() {
    unsafe { csr::stvec::write(__trap_vector as *const () as usize) };
    super::timer::arm(u64::MAX);
    csr::sie::set(Sie::STIE);
}
