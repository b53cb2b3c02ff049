//! Memory management for the kernel.
//!
//! Provides:
//! - The stack arena: a static, 16-byte aligned region whose blocks are
//!   handed out by [`arena::Arena`] as task stacks
//! - The general kernel heap via linked_list_allocator

pub mod arena;
pub mod heap;

use core::cell::UnsafeCell;

use crate::config::HEAP_SIZE;

/// Backing storage for the stack arena.
#[repr(C, align(16))]
struct StackMemory(UnsafeCell<[u8; HEAP_SIZE]>);

// SAFETY: the bytes are only reached through allocations handed out by the
// kernel's arena, each owned by exactly one task.
unsafe impl Sync for StackMemory {}

static STACK_MEMORY: StackMemory = StackMemory(UnsafeCell::new([0; HEAP_SIZE]));

/// Address of the first byte of the stack arena.
pub fn stack_arena_base() -> usize {
    STACK_MEMORY.0.get() as usize
}

/// Initialize all memory subsystems.
///
/// Must be called before any heap allocation.
pub fn init() {
    heap::init_heap();
    log::info!(
        target: "mem",
        "kernel heap {} KiB, stack arena {} KiB at {:#x}",
        heap::heap_size() / 1024,
        HEAP_SIZE / 1024,
        stack_arena_base()
    );
}
