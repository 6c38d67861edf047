use crate::domains::fleet::TickReport;
use std::sync::Arc;

/// Domain-level logging port for operator-facing messages.
///
/// Never fails from the caller's perspective; adapters decide where lines go
/// and may drop them under pressure.
pub trait DomainLogger: Send + Sync + 'static {
    fn debug(&self, _msg: &str) {}
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);

    /// One line per processed tick, plus a warning per stuck robot.
    fn tick(&self, report: &TickReport) {
        self.info(&report.summary_line());
        for robot in report
            .snapshot
            .robots
            .iter()
            .filter(|robot| robot.status == crate::domains::fleet::RobotStatus::Stuck)
        {
            self.warn(&format!("{} stuck at {}", robot.id, robot.cell));
        }
    }
}

pub type DynLogger = Arc<dyn DomainLogger>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Route a message to the matching method of `logger`.
    pub fn emit(&self, logger: &dyn DomainLogger, msg: &str) {
        match self {
            LogLevel::Debug => logger.debug(msg),
            LogLevel::Info => logger.info(msg),
            LogLevel::Warn => logger.warn(msg),
            LogLevel::Error => logger.error(msg),
        }
    }
}
