//! Register-level context switch.
//!
//! A [`Context`] is the complete integer register file of a suspended task
//! plus its `sstatus` and resume address. Contexts built by
//! [`Context::for_task`] and contexts captured by [`switch_context`] have the
//! same shape, so the switch never needs to know which one it is resuming.
//!
//! Floating-point registers are not part of the context; kernel tasks must
//! not keep live FP state across a switch.

use core::arch::{asm, global_asm};

use super::csr::Sstatus;

/// Number of saved general purpose registers (`x1..=x31`).
const GPR_COUNT: usize = 31;

const RA: usize = 0; // x1
const SP: usize = 1; // x2
const GP: usize = 2; // x3
const A0: usize = 9; // x10

/// Saved register state of a task. Layout is shared with `__context_switch`.
#[derive(Clone, Copy)]
#[repr(C)]
pub struct Context {
    /// `x1..=x31`; `regs[n - 1]` holds `xn`.
    regs: [usize; GPR_COUNT],
    sstatus: usize,
    pc: usize,
}

const _: () = assert!(core::mem::size_of::<Context>() == 33 * 8);

impl Context {
    /// An all-zero context; only meaningful as a save target.
    pub const fn zeroed() -> Self {
        Context {
            regs: [0; GPR_COUNT],
            sstatus: 0,
            pc: 0,
        }
    }

    /// Builds the context of a task that has never run: resuming it enters
    /// `entry_pc` in supervisor mode on `stack_top`, with interrupts enabled
    /// and `argument` in `a0`.
    pub fn for_task(entry_pc: usize, stack_top: usize, argument: usize) -> Self {
        let gp: usize;
        unsafe { asm!("mv {}, gp", out(reg) gp) };

        let mut ctx = Context::zeroed();
        ctx.regs[RA] = entry_pc;
        ctx.regs[SP] = stack_top;
        ctx.regs[GP] = gp;
        ctx.regs[A0] = argument;
        ctx.pc = entry_pc;
        // Clean FP unit, S-mode, SIE on once resumed.
        ctx.sstatus = (Sstatus::FS_INITIAL | Sstatus::SPP | Sstatus::SPIE | Sstatus::SIE).bits();
        ctx
    }

    /// Resume address.
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Saved stack pointer.
    pub fn sp(&self) -> usize {
        self.regs[SP]
    }
}

extern "C" {
    fn __context_switch(from: *mut Context, to: *const Context);
}

/// Saves the running register file into `from` (when given) and resumes
/// `to`.
///
/// Returns when some later switch resumes `from`. If `from` is `None`, the
/// current flow of execution is abandoned.
///
/// # Safety
/// Interrupts must be disabled. Both pointers must stay valid until the
/// switch completes, and `to` must hold either a context built by
/// [`Context::for_task`] or one captured by this function. The target's
/// interrupt-enable bit is restored atomically by `sret`.
pub unsafe fn switch_context(from: Option<*mut Context>, to: *const Context) {
    let from = from.unwrap_or(core::ptr::null_mut());
    unsafe { __context_switch(from, to) };
}

global_asm!(
    r#"
    .section .text
    .globl __context_switch
    .align 2
__context_switch:
    beqz a0, 1f
    .irp n, 1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31
    sd x\n, (\n - 1) * 8(a0)
    .endr
    csrr t0, sstatus
    sd t0, 248(a0)
    sd ra, 256(a0)
1:
    ld t0, 248(a1)
    andi t1, t0, 2
    slli t1, t1, 4
    andi t0, t0, -35
    or t0, t0, t1
    li t1, 0x100
    or t0, t0, t1
    csrw sstatus, t0
    ld t0, 256(a1)
    csrw sepc, t0
    .irp n, 1,2,3,4,5,6,7,8,9,10,12,13,14,15,16,17,18,19,20,21,22,23,24,25,26,27,28,29,30,31
    ld x\n, (\n - 1) * 8(a1)
    .endr
    ld x11, 80(a1)
    sret
"#
);
