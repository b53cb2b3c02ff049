//! uROS boot glue.
//!
//! OpenSBI enters `_start` (in the library's boot assembly) in supervisor
//! mode with the hart id in `a0`; `_start` sets up the boot stack, clears
//! `.bss` and calls [`kmain`].

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

#[cfg(target_os = "none")]
mod boot {
    use core::panic::PanicInfo;

    use uros::{arch, kernel, logging, memory, println, serial, shell, trap};

    /// Kernel entry after the boot assembly.
    #[no_mangle]
    pub extern "C" fn kmain(hartid: usize) -> ! {
        // Initialize serial output first (for debugging in QEMU)
        serial::init();
        logging::init();

        println!("uROS v{}", env!("CARGO_PKG_VERSION"));
        println!("==========");
        println!("hart {}, log level {}", hartid, logging::level_name());

        memory::init();
        println!("[OK] Memory initialized");

        if let Err(e) = kernel::init() {
            println!("[FAIL] Idle task: {}", e);
            arch::halt();
        }
        match kernel::create(shell::shell_task, 0, shell::SHELL_BURST_HINT) {
            Ok(id) => println!("[OK] Shell task {}", id.index()),
            Err(e) => {
                println!("[FAIL] Shell task: {}", e);
                arch::halt();
            }
        }

        trap::init();
        trap::start_timer();
        println!("[OK] Timer running, policy {}", kernel::mode());

        kernel::start()
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        println!("KERNEL PANIC: {}", info);
        arch::halt()
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    println!("uROS is a bare-metal kernel; build it with `cargo kbuild` and run it with `cargo krun`.");
}
