//! Architecture-specific support.
//!
//! Each architecture module defines the same set of names, and the one
//! matching the current target is re-exported here:
//!
//! - `Context` and `switch_context`, the only code that knows the register
//!   layout of a suspended task
//! - `interrupts`, the critical-section primitive
//! - `timer`, the time source and deadline arming
//! - `trap::init`, trap vector installation
//! - `wait_for_interrupt` and `halt`
//!
//! Off-target (host builds and unit tests) the `fake` module stands in.

#[cfg(target_arch = "riscv64")]
mod riscv;
#[cfg(target_arch = "riscv64")]
pub use riscv::*;

#[cfg(not(target_arch = "riscv64"))]
mod fake;
#[cfg(not(target_arch = "riscv64"))]
pub use fake::*;
