//! Compile-time kernel configuration.

/// Capacity of the task table (and of the ready queue).
pub const MAX_TASKS: usize = 32;

/// Stack size handed to every task, in bytes.
pub const STACK_SIZE: usize = 8192;

/// Size of the stack arena managed by [`crate::memory::arena`].
pub const HEAP_SIZE: usize = 256 * 1024;

/// Capacity of the arena's block table.
///
/// Stacks dominate arena traffic, so twice the task count plus a little
/// slack is plenty; when the table is full, allocations stop splitting.
pub const MAX_BLOCKS: usize = 2 * MAX_TASKS + 8;

/// Size of the general-purpose kernel heap (boxed entries, snapshots).
pub const KERNEL_HEAP_SIZE: usize = 64 * 1024;

/// Timer interrupts per second.
pub const TICK_HZ: u64 = 100;

/// Frequency of the `time` CSR on QEMU virt.
pub const TIMEBASE_HZ: u64 = 10_000_000;

/// Round-robin quantum, in ticks.
pub const RR_QUANTUM: u32 = 5;

/// Whether timer-driven round-robin preemption starts enabled.
pub const PREEMPT_DEFAULT: bool = cfg!(feature = "preempt");

/// MMIO base of the NS16550A UART on QEMU virt.
pub const UART_BASE: usize = 0x1000_0000;

/// Maximum level emitted by the serial logger.
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;
