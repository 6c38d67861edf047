use crate::common::{AggregateRoot, ApplicationResult};
use crate::domains::fleet::{FleetCommandActor, FleetEvent, FleetOrchestrator, FleetRequest, TickReport, TickReportSink};
use crate::domains::logger::DynLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

const REQUEST_BUFFER: usize = 256;

/// Drives a `FleetOrchestrator` on a fixed tick interval.
///
/// Commands and queries arrive through `FleetCommandActor` handles and are
/// applied between ticks. Events go to the journal actor, reports to the
/// configured sink and a summary line per tick to the domain logger.
pub struct FleetService {
    orchestrator: FleetOrchestrator,
    requests: mpsc::Receiver<FleetRequest>,
    requests_open: bool,
    events: Option<mpsc::Sender<(u64, FleetEvent)>>,
    report_sink: Option<Arc<dyn TickReportSink>>,
    logger: DynLogger,
    tick_interval: Duration,
    paused: bool,
}

impl FleetService {
    pub fn new(orchestrator: FleetOrchestrator, logger: DynLogger, tick_interval: Duration) -> (Self, FleetCommandActor) {
        let (sender, requests) = mpsc::channel(REQUEST_BUFFER);
        let service = Self {
            orchestrator,
            requests,
            requests_open: true,
            events: None,
            report_sink: None,
            logger,
            tick_interval,
            paused: false,
        };
        (service, FleetCommandActor::new(sender))
    }

    pub fn with_event_channel(mut self, events: mpsc::Sender<(u64, FleetEvent)>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_report_sink(mut self, sink: Arc<dyn TickReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    pub fn orchestrator(&self) -> &FleetOrchestrator {
        &self.orchestrator
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Applies queued requests, then runs one tick unless paused.
    /// Returns `None` when paused or after a shutdown request.
    pub async fn step(&mut self) -> ApplicationResult<Option<TickReport>> {
        while let Ok(request) = self.requests.try_recv() {
            if !self.handle_request(request).await {
                return Ok(None);
            }
        }
        if self.paused {
            return Ok(None);
        }
        self.tick_once().await.map(Some)
    }

    /// Ticks until shut down, the request channel closes while paused, or
    /// `max_ticks` ticks have run. Hands the orchestrator back at the end.
    pub async fn run(mut self, max_ticks: Option<u64>) -> ApplicationResult<FleetOrchestrator> {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut processed = 0u64;
        self.logger.info(&format!(
            "Fleet {} running with {} robots",
            self.orchestrator.id,
            self.orchestrator.robot_count()
        ));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.paused {
                        if !self.requests_open {
                            break;
                        }
                        continue;
                    }
                    self.tick_once().await?;
                    processed += 1;
                    if max_ticks.map_or(false, |limit| processed >= limit) {
                        break;
                    }
                }
                request = self.requests.recv(), if self.requests_open => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    None => self.requests_open = false,
                }
            }
        }

        if let Some(sink) = &self.report_sink {
            sink.flush().await?;
        }
        self.logger.info(&format!(
            "Fleet {} stopped after {} ticks",
            self.orchestrator.id, processed
        ));
        Ok(self.orchestrator)
    }

    async fn tick_once(&mut self) -> ApplicationResult<TickReport> {
        let report = self.orchestrator.tick()?;
        self.forward_events(report.tick).await;
        if let Some(sink) = &self.report_sink {
            if let Err(e) = sink.publish(&report).await {
                self.logger.error(&format!("Failed to publish tick report: {}", e));
            }
        }
        self.logger.tick(&report);
        Ok(report)
    }

    /// Returns `false` on shutdown.
    async fn handle_request(&mut self, request: FleetRequest) -> bool {
        match request {
            FleetRequest::Command { command, reply } => {
                let result = self.orchestrator.handle_command(command.clone());
                if let Err(e) = &result {
                    self.logger.warn(&format!("Rejected {:?}: {}", command, e));
                }
                self.forward_events(self.orchestrator.current_tick()).await;
                if reply.send(result).is_err() {
                    tracing::debug!("Command caller went away before the reply");
                }
            }
            FleetRequest::Snapshot { reply } => {
                let _ = reply.send(self.orchestrator.snapshot());
            }
            FleetRequest::BlockedCells { reply } => {
                let _ = reply.send(self.orchestrator.blocked_cells().into_iter().collect());
            }
            FleetRequest::Pause => {
                self.paused = true;
                self.logger.info("Fleet paused");
            }
            FleetRequest::Resume => {
                self.paused = false;
                self.logger.info("Fleet resumed");
            }
            FleetRequest::Shutdown => return false,
        }
        true
    }

    async fn forward_events(&mut self, tick: u64) {
        let events = self.orchestrator.take_uncommitted_events();
        let mut journal_closed = false;
        if let Some(sender) = &self.events {
            for event in events {
                if sender.send((tick, event)).await.is_err() {
                    journal_closed = true;
                    break;
                }
            }
        }
        if journal_closed {
            tracing::warn!("Event journal closed, dropping further events");
            self.events = None;
        }
    }
}
