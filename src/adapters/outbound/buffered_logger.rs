use crate::domains::logger::{DomainLogger, DynLogger, LogLevel};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct LogMessage {
    level: LogLevel,
    msg: String,
}

/// Non-blocking logger for the tick loop. Lines are queued on a bounded
/// channel and forwarded to `bridge` by a background task; when the queue is
/// full the line is dropped and counted.
pub struct BufferedLogger {
    sender: mpsc::Sender<LogMessage>,
    dropped: Arc<AtomicU64>,
}

impl BufferedLogger {
    /// Spawns the forwarding task, so this needs a running tokio runtime.
    pub fn new(bridge: DynLogger, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<LogMessage>(capacity.max(1));
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                message.level.emit(bridge.as_ref(), &message.msg);
            }
        });
        Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn enqueue(&self, level: LogLevel, msg: &str) {
        let message = LogMessage {
            level,
            msg: msg.to_string(),
        };
        if self.sender.try_send(message).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl DomainLogger for BufferedLogger {
    fn debug(&self, msg: &str) {
        self.enqueue(LogLevel::Debug, msg);
    }

    fn info(&self, msg: &str) {
        self.enqueue(LogLevel::Info, msg);
    }

    fn warn(&self, msg: &str) {
        self.enqueue(LogLevel::Warn, msg);
    }

    fn error(&self, msg: &str) {
        self.enqueue(LogLevel::Error, msg);
    }
}

pub fn init_buffered_logger(bridge: DynLogger, capacity: usize) -> DynLogger {
    Arc::new(BufferedLogger::new(bridge, capacity))
}
