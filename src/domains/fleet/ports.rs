use super::projections::TickReport;
use crate::common::ApplicationResult;
use async_trait::async_trait;

/// Port for publishing per-tick reports to whoever renders or records them.
#[async_trait]
pub trait TickReportSink: Send + Sync {
    async fn publish(&self, report: &TickReport) -> ApplicationResult<()>;

    async fn flush(&self) -> ApplicationResult<()> {
        Ok(())
    }
}
