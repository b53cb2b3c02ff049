//! Entry point. OpenSBI jumps here in S-mode with `a0 = hartid`.
//!
//! Sets up the boot stack, clears `.bss` and calls `kmain`, which runs on
//! this stack until the first task is dispatched.
//!
//! The first use of the global kernel builds it on this stack. Unoptimized
//! builds need well over 100 KiB of frames for that, hence 256 KiB.

use core::arch::global_asm;

global_asm!(
    r#"
    .section .text.entry
    .globl _start
_start:
    la sp, __boot_stack_top
    la t0, __bss_start
    la t1, __bss_end
1:
    bgeu t0, t1, 2f
    sd zero, 0(t0)
    addi t0, t0, 8
    j 1b
2:
    call kmain
3:
    wfi
    j 3b

    .section .bss.stack
    .align 12
__boot_stack:
    .space 0x40000
    .globl __boot_stack_top
__boot_stack_top:
"#
);
