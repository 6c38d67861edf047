use crate::domains::logger::{DomainLogger, DynLogger};
use std::sync::Arc;

/// Bridges domain log lines into the `log` facade, which `fast_log` writes to
/// a rolling file.
pub struct FileLogger;

impl FileLogger {
    /// Installs `fast_log` as the global `log` backend writing to `path`.
    /// Fails if another `log` backend is already installed.
    pub fn init(path: &str) -> Result<Self, String> {
        fast_log::init(
            fast_log::config::Config::new()
                .file(path)
                .level(log::LevelFilter::Debug),
        )
        .map_err(|e| format!("Failed to initialize fast_log: {}", e))?;
        Ok(Self)
    }
}

impl DomainLogger for FileLogger {
    fn debug(&self, msg: &str) {
        log::debug!(target: "fleet", "{}", msg);
    }

    fn info(&self, msg: &str) {
        log::info!(target: "fleet", "{}", msg);
    }

    fn warn(&self, msg: &str) {
        log::warn!(target: "fleet", "{}", msg);
    }

    fn error(&self, msg: &str) {
        log::error!(target: "fleet", "{}", msg);
    }
}

pub fn init_file_logger(path: &str) -> Result<DynLogger, String> {
    Ok(Arc::new(FileLogger::init(path)?))
}
