use crate::config::LoggingConfig;
use crate::domains::logger::{DomainLogger, DynLogger, LogLevel};
use std::sync::Arc;

/// Forwards every line to each attached logger in order.
pub struct MultiLogger {
    sinks: Vec<DynLogger>,
}

impl MultiLogger {
    pub fn new(sinks: Vec<DynLogger>) -> Self {
        Self { sinks }
    }

    fn forward(&self, level: LogLevel, msg: &str) {
        for sink in &self.sinks {
            level.emit(sink.as_ref(), msg);
        }
    }
}

impl DomainLogger for MultiLogger {
    fn debug(&self, msg: &str) {
        self.forward(LogLevel::Debug, msg);
    }

    fn info(&self, msg: &str) {
        self.forward(LogLevel::Info, msg);
    }

    fn warn(&self, msg: &str) {
        self.forward(LogLevel::Warn, msg);
    }

    fn error(&self, msg: &str) {
        self.forward(LogLevel::Error, msg);
    }
}

/// Console logger, plus a buffered file logger when `logging.file` is set.
/// Falls back to console only if the file logger cannot be installed.
/// Must be called inside a tokio runtime.
pub fn init_logger(config: &LoggingConfig) -> DynLogger {
    let console = crate::adapters::outbound::init_console_logger();
    let Some(path) = config.file.as_deref() else {
        return console;
    };
    match crate::adapters::outbound::init_file_logger(path) {
        Ok(file_logger) => {
            let buffered = crate::adapters::outbound::init_buffered_logger(file_logger, config.buffer_capacity);
            Arc::new(MultiLogger::new(vec![console, buffered]))
        }
        Err(e) => {
            console.warn(&format!("File logging disabled: {}", e));
            console
        }
    }
}
