use crate::domains::logger::{DomainLogger, DynLogger};
use std::sync::Arc;

pub struct NoopLogger;

impl DomainLogger for NoopLogger {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn tick(&self, _report: &crate::domains::fleet::TickReport) {}
}

/// Silent logger for tests and headless runs.
pub fn init_noop_logger() -> DynLogger {
    Arc::new(NoopLogger)
}
