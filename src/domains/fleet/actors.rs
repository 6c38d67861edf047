use super::commands::{CommandReply, FleetCommand};
use super::events::FleetEvent;
use super::projections::{FleetOverview, FleetSnapshot, RobotOverview};
use crate::common::{ApplicationError, ApplicationResult, DomainEvent, DomainResult, EventEnvelope, EventMetadata, EventStore};
use crate::domains::grid_map::Cell;
use crate::domains::traffic::RobotId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Requests the fleet service accepts between ticks.
#[derive(Debug)]
pub enum FleetRequest {
    Command {
        command: FleetCommand,
        reply: oneshot::Sender<DomainResult<CommandReply>>,
    },
    Snapshot {
        reply: oneshot::Sender<FleetSnapshot>,
    },
    BlockedCells {
        reply: oneshot::Sender<Vec<Cell>>,
    },
    Pause,
    Resume,
    Shutdown,
}

/// Actor responsible for handling fleet events: journals them and keeps the
/// read-side projections current.
pub struct FleetEventActor {
    event_store: Arc<dyn EventStore + Send + Sync>,
    projection_store: Arc<RwLock<FleetProjectionStore>>,
    event_receiver: mpsc::Receiver<(u64, FleetEvent)>,
}

impl FleetEventActor {
    pub fn new(
        event_store: Arc<dyn EventStore + Send + Sync>,
        event_receiver: mpsc::Receiver<(u64, FleetEvent)>,
    ) -> Self {
        Self {
            event_store,
            projection_store: Arc::new(RwLock::new(FleetProjectionStore::new())),
            event_receiver,
        }
    }

    /// Shared handle to the projections, readable while `run` is looping.
    pub fn projection_store(&self) -> Arc<RwLock<FleetProjectionStore>> {
        Arc::clone(&self.projection_store)
    }

    pub async fn run(&mut self) {
        while let Some((tick, event)) = self.event_receiver.recv().await {
            if let Err(e) = self.handle_event(tick, event).await {
                tracing::error!("Failed to handle fleet event: {}", e);
            }
        }
        tracing::debug!("Fleet event channel closed");
    }

    async fn handle_event(&self, tick: u64, event: FleetEvent) -> Result<(), String> {
        let metadata = EventMetadata::from_source("FleetEventActor").at_tick(tick);
        let envelope = EventEnvelope::new(&event, "Fleet", metadata)
            .map_err(|e| format!("Failed to create event envelope: {}", e))?;

        self.event_store
            .append_events(event.aggregate_id(), vec![envelope])
            .await?;

        self.update_projections(&event).await;

        tracing::trace!("Handled fleet event: {}", event.event_type());
        Ok(())
    }

    async fn update_projections(&self, event: &FleetEvent) {
        let mut store = self.projection_store.write().await;
        store.apply_event(event);
    }

    pub async fn get_robot_overview(&self, robot_id: RobotId) -> Option<RobotOverview> {
        let store = self.projection_store.read().await;
        store.robot_overviews.get(&robot_id).cloned()
    }

    pub async fn get_fleet_overview(&self) -> FleetOverview {
        let store = self.projection_store.read().await;
        store.fleet_overview.clone()
    }
}

/// In-memory projection store for fleet projections
#[derive(Debug, Default)]
pub struct FleetProjectionStore {
    pub robot_overviews: BTreeMap<RobotId, RobotOverview>,
    pub fleet_overview: FleetOverview,
}

impl FleetProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_event(&mut self, event: &FleetEvent) {
        self.fleet_overview.apply_event(event);

        match event {
            FleetEvent::RobotSpawned {
                robot_id,
                cell,
                timestamp,
                ..
            } => {
                self.robot_overviews
                    .insert(*robot_id, RobotOverview::new(*robot_id, *cell, *timestamp));
            }
            FleetEvent::ConflictResolved { resolution, .. } => {
                for robot_id in &resolution.conflict.robots {
                    if let Some(overview) = self.robot_overviews.get_mut(robot_id) {
                        overview.apply_event(event);
                    }
                }
            }
            _ => {
                if let Some(overview) = event.robot_id().and_then(|id| self.robot_overviews.get_mut(&id)) {
                    overview.apply_event(event);
                }
            }
        }
    }
}

/// Actor responsible for forwarding fleet commands and queries to the
/// running service and awaiting its answer.
#[derive(Clone)]
pub struct FleetCommandActor {
    request_sender: mpsc::Sender<FleetRequest>,
}

impl FleetCommandActor {
    pub fn new(request_sender: mpsc::Sender<FleetRequest>) -> Self {
        Self { request_sender }
    }

    async fn send(&self, request: FleetRequest) -> ApplicationResult<()> {
        self.request_sender
            .send(request)
            .await
            .map_err(|e| ApplicationError::ServiceUnavailable(format!("Failed to send request: {}", e)))
    }

    async fn command(&self, command: FleetCommand) -> ApplicationResult<CommandReply> {
        let (reply, answer) = oneshot::channel();
        self.send(FleetRequest::Command { command, reply }).await?;
        let result = answer
            .await
            .map_err(|e| ApplicationError::ServiceUnavailable(format!("No reply: {}", e)))?;
        Ok(result?)
    }

    pub async fn spawn_robot(&self, cell: Cell) -> ApplicationResult<RobotId> {
        match self.command(FleetCommand::SpawnRobot { cell }).await? {
            CommandReply::Spawned(robot_id) => Ok(robot_id),
            other => Err(ApplicationError::ServiceUnavailable(format!(
                "Unexpected reply to spawn: {:?}",
                other
            ))),
        }
    }

    pub async fn assign_task(&self, robot_id: RobotId, target: Cell, priority: Option<u32>) -> ApplicationResult<()> {
        self.command(FleetCommand::AssignTask {
            robot_id,
            target,
            priority,
        })
        .await
        .map(|_| ())
    }

    pub async fn edit_obstacle(&self, cell: Cell, is_obstacle: bool) -> ApplicationResult<()> {
        self.command(FleetCommand::EditObstacle { cell, is_obstacle })
            .await
            .map(|_| ())
    }

    pub async fn set_speed_multiplier(&self, multiplier: f64) -> ApplicationResult<()> {
        self.command(FleetCommand::SetSpeedMultiplier { multiplier })
            .await
            .map(|_| ())
    }

    pub async fn force_replan(&self, robot_id: RobotId) -> ApplicationResult<()> {
        self.command(FleetCommand::ForceReplan { robot_id }).await.map(|_| ())
    }

    pub async fn remove_robot(&self, robot_id: RobotId) -> ApplicationResult<()> {
        self.command(FleetCommand::RemoveRobot { robot_id }).await.map(|_| ())
    }

    pub async fn start_charging(&self, robot_id: RobotId) -> ApplicationResult<()> {
        self.command(FleetCommand::StartCharging { robot_id }).await.map(|_| ())
    }

    pub async fn stop_charging(&self, robot_id: RobotId) -> ApplicationResult<()> {
        self.command(FleetCommand::StopCharging { robot_id }).await.map(|_| ())
    }

    pub async fn snapshot(&self) -> ApplicationResult<FleetSnapshot> {
        let (reply, answer) = oneshot::channel();
        self.send(FleetRequest::Snapshot { reply }).await?;
        answer
            .await
            .map_err(|e| ApplicationError::ServiceUnavailable(format!("No reply: {}", e)))
    }

    pub async fn blocked_cells(&self) -> ApplicationResult<Vec<Cell>> {
        let (reply, answer) = oneshot::channel();
        self.send(FleetRequest::BlockedCells { reply }).await?;
        answer
            .await
            .map_err(|e| ApplicationError::ServiceUnavailable(format!("No reply: {}", e)))
    }

    pub async fn pause(&self) -> ApplicationResult<()> {
        self.send(FleetRequest::Pause).await
    }

    pub async fn resume(&self) -> ApplicationResult<()> {
        self.send(FleetRequest::Resume).await
    }

    pub async fn shutdown(&self) -> ApplicationResult<()> {
        self.send(FleetRequest::Shutdown).await
    }

    /// Resolves once the service has stopped accepting requests.
    pub async fn closed(&self) {
        self.request_sender.closed().await
    }
}
