//! First-fit block allocator for task stacks.
//!
//! The arena is a fixed byte range carved into blocks that appear in
//! address order. Every block reserves `HEADER_SIZE` bytes in front of its
//! payload, while its metadata (size, free flag, neighbours) lives in a
//! separate index-based table. Neighbour links are explicit in both
//! directions, so coalescing never has to rescan the list.
//!
//! The allocator deals only in offsets; turning an offset into an address
//! is the caller's business. Callers serialize access (the kernel holds it
//! inside its lock with interrupts masked).
//!
//! Invariant, checked by the tests after every operation:
//! `allocated_bytes + free_bytes + HEADER_SIZE * live_blocks == capacity`.

use core::fmt;

use crate::config::MAX_BLOCKS;

/// Arena bytes reserved in front of every payload.
pub const HEADER_SIZE: usize = 32;

/// Payload alignment and size granularity.
pub const ALIGN: usize = 16;

/// Smallest payload worth splitting off into its own block.
pub const MIN_SPLIT: usize = 16;

/// Allocator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Zero-byte request.
    ZeroSize,
    /// No free block is large enough.
    OutOfMemory,
    /// The handle does not describe a block of this arena.
    InvalidBlock,
    /// The block is already free.
    DoubleFree,
}

impl fmt::Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeapError::ZeroSize => write!(f, "zero-sized allocation"),
            HeapError::OutOfMemory => write!(f, "out of memory"),
            HeapError::InvalidBlock => write!(f, "invalid block"),
            HeapError::DoubleFree => write!(f, "double free"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Block {
    /// Offset of the block header.
    offset: usize,
    /// Usable payload bytes.
    size: usize,
    free: bool,
    /// Slot currently describes a block of the list.
    live: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

impl Block {
    const UNUSED: Block = Block {
        offset: 0,
        size: 0,
        free: false,
        live: false,
        prev: None,
        next: None,
    };

    fn payload(&self) -> usize {
        self.offset + HEADER_SIZE
    }
}

/// An allocated payload. Move-only: giving it back to [`Arena::free`]
/// consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct Allocation {
    index: usize,
    offset: usize,
    size: usize,
}

impl Allocation {
    /// Offset of the payload from the arena base (16-byte aligned).
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Usable payload size; at least the rounded request.
    pub fn size(&self) -> usize {
        self.size
    }
}

/// A first-fit allocator over `capacity` bytes.
pub struct Arena {
    blocks: [Block; MAX_BLOCKS],
    head: Option<usize>,
    capacity: usize,
    allocated: usize,
    free: usize,
}

#[inline]
fn align_up(value: usize) -> Option<usize> {
    value.checked_add(ALIGN - 1).map(|v| v & !(ALIGN - 1))
}

impl Arena {
    /// Creates an arena with a single free block spanning `capacity` bytes.
    ///
    /// `capacity` is rounded down to the alignment; it must leave room for
    /// at least one header.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity & !(ALIGN - 1);
        assert!(capacity > HEADER_SIZE, "arena smaller than one header");

        let mut blocks = [Block::UNUSED; MAX_BLOCKS];
        blocks[0] = Block {
            offset: 0,
            size: capacity - HEADER_SIZE,
            free: true,
            live: true,
            prev: None,
            next: None,
        };

        Arena {
            blocks,
            head: Some(0),
            capacity,
            allocated: 0,
            free: capacity - HEADER_SIZE,
        }
    }

    /// Allocates `size` bytes, rounded up to [`ALIGN`], from the first free
    /// block that fits.
    pub fn allocate(&mut self, size: usize) -> Result<Allocation, HeapError> {
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }
        let size = align_up(size).ok_or(HeapError::OutOfMemory)?;

        let mut cursor = self.head;
        while let Some(index) = cursor {
            let block = self.blocks[index];
            if block.free && block.size >= size {
                self.split(index, size);

                let block = &mut self.blocks[index];
                block.free = false;
                self.allocated += block.size;
                self.free -= block.size;
                return Ok(Allocation {
                    index,
                    offset: block.payload(),
                    size: block.size,
                });
            }
            cursor = block.next;
        }

        Err(HeapError::OutOfMemory)
    }

    /// Carves the tail of block `index` off into a new free block, leaving
    /// `size` payload bytes behind. Does nothing if the tail is too small
    /// or the block table is full.
    fn split(&mut self, index: usize, size: usize) {
        let block = self.blocks[index];
        let remaining = block.size - size;
        if remaining < HEADER_SIZE + MIN_SPLIT {
            return;
        }
        let Some(spare) = self.blocks.iter().position(|b| !b.live) else {
            return;
        };

        self.blocks[spare] = Block {
            offset: block.payload() + size,
            size: remaining - HEADER_SIZE,
            free: true,
            live: true,
            prev: Some(index),
            next: block.next,
        };
        if let Some(next) = block.next {
            self.blocks[next].prev = Some(spare);
        }
        self.blocks[index].next = Some(spare);
        self.blocks[index].size = size;
        // The new header comes out of free space.
        self.free -= HEADER_SIZE;
    }

    /// Returns `allocation` to the arena, merging it with free neighbours.
    pub fn free(&mut self, allocation: Allocation) -> Result<(), HeapError> {
        let index = allocation.index;
        let block = self
            .blocks
            .get(index)
            .copied()
            .filter(|b| b.live && b.payload() == allocation.offset)
            .ok_or(HeapError::InvalidBlock)?;
        if block.free {
            return Err(HeapError::DoubleFree);
        }

        self.blocks[index].free = true;
        self.allocated -= block.size;
        self.free += block.size;

        if let Some(next) = block.next {
            if self.blocks[next].free {
                self.merge_into(index, next);
            }
        }
        if let Some(prev) = block.prev {
            if self.blocks[prev].free {
                self.merge_into(prev, index);
            }
        }
        Ok(())
    }

    /// Absorbs `victim` (the immediate successor of `keep`) into `keep`.
    fn merge_into(&mut self, keep: usize, victim: usize) {
        let absorbed = self.blocks[victim];
        debug_assert_eq!(self.blocks[keep].next, Some(victim));

        self.blocks[keep].size += HEADER_SIZE + absorbed.size;
        self.blocks[keep].next = absorbed.next;
        if let Some(next) = absorbed.next {
            self.blocks[next].prev = Some(keep);
        }
        self.blocks[victim] = Block::UNUSED;
        // The absorbed header becomes free payload.
        self.free += HEADER_SIZE;
    }

    /// Total arena bytes, headers included.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Payload bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// Payload bytes available in free blocks.
    pub fn free_bytes(&self) -> usize {
        self.free
    }

    /// Number of free blocks (fragmentation indicator).
    pub fn free_blocks(&self) -> usize {
        self.iter().filter(|b| b.free).count()
    }

    /// Number of blocks in the list, free or not.
    pub fn live_blocks(&self) -> usize {
        self.iter().count()
    }

    fn iter(&self) -> impl Iterator<Item = &Block> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let block = &self.blocks[cursor?];
            cursor = block.next;
            Some(block)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: usize = 4096;

    /// Checks the byte-conservation identity and that the list tiles the
    /// arena with no gaps and consistent back links.
    fn assert_consistent(arena: &Arena) {
        assert_eq!(
            arena.allocated_bytes() + arena.free_bytes() + HEADER_SIZE * arena.live_blocks(),
            arena.capacity()
        );

        let mut expected_offset = 0;
        let mut prev = None;
        let mut cursor = arena.head;
        while let Some(i) = cursor {
            let b = &arena.blocks[i];
            assert!(b.live);
            assert_eq!(b.offset, expected_offset);
            assert_eq!(b.prev, prev);
            assert_eq!(b.payload() % ALIGN, 0);
            if let Some(p) = prev {
                assert!(!(arena.blocks[p].free && b.free), "adjacent free blocks");
            }
            expected_offset = b.payload() + b.size;
            prev = Some(i);
            cursor = b.next;
        }
        assert_eq!(expected_offset, arena.capacity());
    }

    #[test]
    fn fresh_arena_is_one_free_block() {
        let arena = Arena::new(CAP);
        assert_eq!(arena.free_bytes(), CAP - HEADER_SIZE);
        assert_eq!(arena.allocated_bytes(), 0);
        assert_eq!(arena.free_blocks(), 1);
        assert_consistent(&arena);
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut arena = Arena::new(CAP);
        assert_eq!(arena.allocate(0), Err(HeapError::ZeroSize));
        assert_consistent(&arena);
    }

    #[test]
    fn requests_round_up_to_sixteen() {
        let mut arena = Arena::new(CAP);
        let a = arena.allocate(1).unwrap();
        assert_eq!(a.size(), 16);
        assert_eq!(a.offset(), HEADER_SIZE);
        let b = arena.allocate(17).unwrap();
        assert_eq!(b.size(), 32);
        assert_eq!(b.offset(), HEADER_SIZE + 16 + HEADER_SIZE);
        assert_consistent(&arena);
    }

    #[test]
    fn round_trip_restores_free_bytes_and_block_count() {
        let mut arena = Arena::new(CAP);
        let keep = arena.allocate(100).unwrap();

        let free_before = arena.free_bytes();
        let blocks_before = arena.live_blocks();

        let a = arena.allocate(256).unwrap();
        assert_consistent(&arena);
        arena.free(a).unwrap();

        assert_eq!(arena.free_bytes(), free_before);
        assert_eq!(arena.live_blocks(), blocks_before);
        assert_consistent(&arena);

        arena.free(keep).unwrap();
        assert_eq!(arena.live_blocks(), 1);
    }

    #[test]
    fn first_fit_reuses_earliest_hole() {
        let mut arena = Arena::new(CAP);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let _c = arena.allocate(64).unwrap();
        let a_offset = a.offset();

        arena.free(a).unwrap();
        let d = arena.allocate(48).unwrap();
        assert_eq!(d.offset(), a_offset);
        // 64 - 48 leaves no room for a header + minimum split.
        assert_eq!(d.size(), 64);

        arena.free(b).unwrap();
        assert_consistent(&arena);
    }

    #[test]
    fn small_tail_is_not_split() {
        let mut arena = Arena::new(CAP);
        let whole = CAP - HEADER_SIZE;
        // Leaves exactly HEADER_SIZE bytes, below HEADER_SIZE + MIN_SPLIT.
        let a = arena.allocate(whole - HEADER_SIZE).unwrap();
        assert_eq!(a.size(), whole);
        assert_eq!(arena.live_blocks(), 1);
        assert_eq!(arena.free_bytes(), 0);
        assert_consistent(&arena);
    }

    #[test]
    fn coalesces_in_both_directions() {
        let mut arena = Arena::new(CAP);
        let a = arena.allocate(64).unwrap();
        let b = arena.allocate(64).unwrap();
        let c = arena.allocate(64).unwrap();
        let guard = arena.allocate(64).unwrap();

        arena.free(a).unwrap();
        arena.free(c).unwrap();
        assert_eq!(arena.free_blocks(), 3);
        assert_consistent(&arena);

        // b's neighbours are both free: one block from offset 0 to guard.
        arena.free(b).unwrap();
        assert_eq!(arena.free_blocks(), 2);
        assert_consistent(&arena);

        arena.free(guard).unwrap();
        assert_eq!(arena.free_blocks(), 1);
        assert_eq!(arena.free_bytes(), CAP - HEADER_SIZE);
        assert_consistent(&arena);
    }

    #[test]
    fn out_of_memory_when_nothing_fits() {
        let mut arena = Arena::new(CAP);
        let _a = arena.allocate(2048).unwrap();
        assert_eq!(arena.allocate(2048), Err(HeapError::OutOfMemory));
        assert_eq!(arena.allocate(usize::MAX), Err(HeapError::OutOfMemory));
        assert_consistent(&arena);
    }

    #[test]
    fn forged_and_repeated_frees_are_reported() {
        let mut arena = Arena::new(CAP);
        let a = arena.allocate(64).unwrap();
        let _b = arena.allocate(64).unwrap();
        let index = a.index;
        let offset = a.offset;
        let size = a.size;
        arena.free(a).unwrap();

        let again = Allocation { index, offset, size };
        assert_eq!(arena.free(again), Err(HeapError::DoubleFree));

        let bogus = Allocation { index: MAX_BLOCKS + 1, offset: 0, size: 16 };
        assert_eq!(arena.free(bogus), Err(HeapError::InvalidBlock));
        assert_consistent(&arena);
    }

    #[test]
    fn full_block_table_stops_splitting() {
        let mut arena = Arena::new(crate::config::HEAP_SIZE);
        let mut held = alloc::vec::Vec::new();
        for _ in 0..MAX_BLOCKS - 1 {
            held.push(arena.allocate(16).unwrap());
        }
        assert_eq!(arena.live_blocks(), MAX_BLOCKS);

        // The last (free) block is consumed whole.
        let tail = arena.allocate(16).unwrap();
        assert!(tail.size() > 16);
        assert_eq!(arena.free_bytes(), 0);
        assert_consistent(&arena);

        arena.free(tail).unwrap();
        for a in held {
            arena.free(a).unwrap();
        }
        assert_eq!(arena.live_blocks(), 1);
        assert_consistent(&arena);
    }
}
