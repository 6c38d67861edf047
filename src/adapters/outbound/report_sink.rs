use crate::common::{ApplicationError, ApplicationResult};
use crate::domains::fleet::{TickReport, TickReportSink};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

/// Keeps every published report in memory, in order.
#[derive(Debug, Default)]
pub struct InMemoryReportSink {
    reports: RwLock<Vec<TickReport>>,
}

impl InMemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reports(&self) -> Vec<TickReport> {
        self.reports.read().await.clone()
    }

    pub async fn last(&self) -> Option<TickReport> {
        self.reports.read().await.last().cloned()
    }
}

#[async_trait]
impl TickReportSink for InMemoryReportSink {
    async fn publish(&self, report: &TickReport) -> ApplicationResult<()> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }
}

/// Appends one JSON object per tick report to a file.
pub struct JsonLinesReportSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesReportSink {
    /// Opens `path` for appending, creating parent directories as needed.
    pub async fn create<P: AsRef<Path>>(path: P) -> ApplicationResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApplicationError::ReportSink(format!("Failed to create {}: {}", parent.display(), e)))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ApplicationError::ReportSink(format!("Failed to open {}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TickReportSink for JsonLinesReportSink {
    async fn publish(&self, report: &TickReport) -> ApplicationResult<()> {
        let mut line = serde_json::to_string(report)
            .map_err(|e| ApplicationError::ReportSink(format!("Failed to serialize report: {}", e)))?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ApplicationError::ReportSink(format!("Failed to write report: {}", e)))
    }

    async fn flush(&self) -> ApplicationResult<()> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .map_err(|e| ApplicationError::ReportSink(format!("Failed to flush reports: {}", e)))
    }
}
