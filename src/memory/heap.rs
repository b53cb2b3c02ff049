//! Kernel heap setup.
//!
//! A static region handed to linked_list_allocator. On the bare-metal
//! target it is the `#[global_allocator]` behind `alloc` (boxed task
//! entries, snapshots); host builds keep the system allocator.

use core::cell::UnsafeCell;

use linked_list_allocator::LockedHeap;

use crate::config::KERNEL_HEAP_SIZE;

#[repr(C, align(16))]
struct HeapMemory(UnsafeCell<[u8; KERNEL_HEAP_SIZE]>);

// SAFETY: only touched through the allocator after `init_heap`.
unsafe impl Sync for HeapMemory {}

static HEAP_MEMORY: HeapMemory = HeapMemory(UnsafeCell::new([0; KERNEL_HEAP_SIZE]));

/// The global heap allocator.
#[cfg_attr(target_os = "none", global_allocator)]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initialize the kernel heap over the static region. Idempotent.
pub fn init_heap() {
    let mut heap = ALLOCATOR.lock();
    if heap.size() == 0 {
        // SAFETY: the region is static, unused by anything else, and the
        // allocator is only initialized once.
        unsafe { heap.init(HEAP_MEMORY.0.get().cast::<u8>(), KERNEL_HEAP_SIZE) };
    }
}

/// Size of the kernel heap in bytes.
pub fn heap_size() -> usize {
    ALLOCATOR.lock().size()
}

/// Bytes currently allocated from the kernel heap.
pub fn heap_used() -> usize {
    ALLOCATOR.lock().used()
}
