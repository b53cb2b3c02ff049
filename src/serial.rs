//! Serial console on the QEMU virt UART.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::interrupts;

#[cfg(target_arch = "riscv64")]
type Port = uart_16550::MmioSerialPort;

#[cfg(not(target_arch = "riscv64"))]
type Port = host::NullPort;

lazy_static! {
    pub static ref SERIAL1: Mutex<Port> = {
        let mut serial_port = unsafe { new_port() };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

#[cfg(target_arch = "riscv64")]
unsafe fn new_port() -> Port {
    unsafe { uart_16550::MmioSerialPort::new(crate::config::UART_BASE) }
}

#[cfg(not(target_arch = "riscv64"))]
unsafe fn new_port() -> Port {
    host::NullPort
}

/// Initialize serial output.
pub fn init() {
    // Serial is initialized lazily, just force it here
    let _ = SERIAL1.lock();
}

/// Writes one raw byte.
pub fn write_byte(byte: u8) {
    interrupts::without_interrupts(|| SERIAL1.lock().send(byte));
}

/// Next received byte, if one is waiting.
pub fn try_read_byte() -> Option<u8> {
    interrupts::without_interrupts(|| SERIAL1.lock().try_receive().ok())
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;
    // Mask interrupts while holding the port so the timer path can log
    // without deadlocking on it.
    interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}

/// Print to serial (QEMU console).
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::serial::_print(format_args!($($arg)*)));
}

/// Print to serial with newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[cfg(not(target_arch = "riscv64"))]
mod host {
    use core::fmt;

    /// Off-target port: swallows output, never has input.
    pub struct NullPort;

    impl NullPort {
        pub fn init(&mut self) {}

        pub fn send(&mut self, _: u8) {}

        pub fn try_receive(&mut self) -> Result<u8, ()> {
            Err(())
        }
    }

    impl fmt::Write for NullPort {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Ok(())
        }
    }
}
