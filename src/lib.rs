//! uROS: a single-core RISC-V task kernel.
//!
//! Tasks are created with a burst hint, scheduled round-robin or
//! shortest-job-first, and switched only at cooperative checkpoints; the
//! timer interrupt merely requests a reschedule. Stacks come from a
//! first-fit arena, everything else from a small linked-list heap.
//!
//! Off-target the library builds against a fake architecture layer so the
//! scheduling core can be unit-tested on the host.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod serial;

pub mod arch;
pub mod config;
pub mod console;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod shell;
pub mod sync;
pub mod task;
pub mod trap;
