//! `log` backend writing to the serial console.
//!
//! Lines look like `[   123 INFO  sched] policy set to SJF`, where the
//! leading number is the count of timer interrupts taken so far. The
//! counter is read without touching the kernel lock, so logging is safe
//! from inside kernel critical sections and from the trap path.

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LOG_LEVEL;
use crate::trap;

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!(
            "[{:>6} {:<5} {}] {}",
            trap::interrupt_count(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs the serial logger. A second call is a no-op.
pub fn init() {
    init_with_level(LOG_LEVEL);
}

pub fn init_with_level(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

/// Level name as printed in the console banner.
pub fn level_name() -> &'static str {
    LOG_LEVEL.as_str()
}
