//! Colored stderr logger for applications embedding register trees.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};
use std::io::Write;

pub struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31,
            Level::Warn => 93,
            Level::Info => 37,
            Level::Debug => 32,
            Level::Trace => 90,
        };
        let mut err = std::io::stderr().lock();
        // Nowhere left to report a failing stderr.
        let _ = writeln!(
            err,
            "\u{1B}[{}m[{:<5}] {}: {}\u{1B}[0m",
            color,
            record.level(),
            record.target(),
            record.args(),
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the colored stderr logger. Fails if a logger is already installed.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger;
    set_logger(&LOGGER)?;
    set_max_level(level);
    Ok(())
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log, Level};
            log!(target: $target, Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            use log::{log, Level};
            log!(Level::Debug, $($arg)+)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_refused() {
        assert!(init(LevelFilter::Warn).is_ok());
        assert!(init(LevelFilter::Debug).is_err());
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}
