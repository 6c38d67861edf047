use crate::domains::logger::{DomainLogger, DynLogger, LogLevel};
use chrono::Utc;
use std::sync::Arc;

/// Writes timestamped lines to stdout, warnings and errors to stderr.
pub struct ConsoleLogger {
    min_level: LogLevel,
}

impl ConsoleLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }

    fn write(&self, level: LogLevel, msg: &str) {
        if level < self.min_level {
            return;
        }
        let line = format!("{} {:<5} {}", Utc::now().format("%H:%M:%S%.3f"), level.label(), msg);
        if level >= LogLevel::Warn {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

impl DomainLogger for ConsoleLogger {
    fn debug(&self, msg: &str) {
        self.write(LogLevel::Debug, msg);
    }
    fn info(&self, msg: &str) {
        self.write(LogLevel::Info, msg);
    }
    fn warn(&self, msg: &str) {
        self.write(LogLevel::Warn, msg);
    }
    fn error(&self, msg: &str) {
        self.write(LogLevel::Error, msg);
    }
}

/// Console-backed logger at info level, used when no log file is configured.
pub fn init_console_logger() -> DynLogger {
    Arc::new(ConsoleLogger::new(LogLevel::Info))
}
