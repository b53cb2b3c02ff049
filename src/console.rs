//! Line input from the serial console.

use crate::kernel;
use crate::serial;

/// Longest line the console accepts; extra input is dropped.
pub const LINE_MAX: usize = 64;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;

/// What a received byte did to the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Insert(u8),
    Erase,
    Submit,
    Ignore,
}

/// Fixed-size line being edited.
pub struct LineBuffer {
    bytes: [u8; LINE_MAX],
    len: usize,
}

impl LineBuffer {
    pub const fn new() -> Self {
        LineBuffer {
            bytes: [0; LINE_MAX],
            len: 0,
        }
    }

    /// Applies one received byte.
    pub fn push(&mut self, byte: u8) -> Edit {
        match byte {
            b'\r' | b'\n' => Edit::Submit,
            BACKSPACE | DELETE if self.len > 0 => {
                self.len -= 1;
                Edit::Erase
            }
            0x20..=0x7e if self.len < LINE_MAX => {
                self.bytes[self.len] = byte;
                self.len += 1;
                Edit::Insert(byte)
            }
            _ => Edit::Ignore,
        }
    }

    /// Only printable ASCII is ever stored.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads one line with echo and backspace handling. Yields the core while
/// no input is pending.
pub fn read_line(line: &mut LineBuffer) -> &str {
    line.clear();
    loop {
        let Some(byte) = serial::try_read_byte() else {
            kernel::yield_now();
            continue;
        };
        match line.push(byte) {
            Edit::Insert(byte) => serial::write_byte(byte),
            Edit::Erase => {
                serial::write_byte(BACKSPACE);
                serial::write_byte(b' ');
                serial::write_byte(BACKSPACE);
            }
            Edit::Submit => {
                println!();
                return line.as_str().trim();
            }
            Edit::Ignore => {}
        }
    }
}
