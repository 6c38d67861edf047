use super::robot::{PathPurpose, RobotStatus};
use crate::common::DomainEvent;
use crate::domains::grid_map::Cell;
use crate::domains::traffic::{Resolution, RobotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FleetEvent {
    RobotSpawned {
        fleet_id: String,
        robot_id: RobotId,
        cell: Cell,
        battery: f64,
        timestamp: DateTime<Utc>,
    },
    TaskAssigned {
        fleet_id: String,
        robot_id: RobotId,
        target: Cell,
        priority: Option<u32>,
        timestamp: DateTime<Utc>,
    },
    PathCommitted {
        fleet_id: String,
        robot_id: RobotId,
        cells: Vec<Cell>,
        start_tick: u64,
        ticks_per_cell: u32,
        purpose: PathPurpose,
        timestamp: DateTime<Utc>,
    },
    /// A committed robot gave way: its path now ends at `last_index`.
    PathTruncated {
        fleet_id: String,
        robot_id: RobotId,
        last_index: usize,
        cell: Cell,
        /// Plan around the winner's reservations afterwards.
        displaced: bool,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    /// Reached the end of a path that completed nothing.
    PathEnded {
        fleet_id: String,
        robot_id: RobotId,
        cell: Cell,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    RobotAdvanced {
        fleet_id: String,
        robot_id: RobotId,
        cell: Cell,
        path_index: usize,
        transit_ticks: u32,
        progress: f64,
        battery: f64,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    RobotHeld {
        fleet_id: String,
        robot_id: RobotId,
        wait_target: Option<Cell>,
        wait_streak: u32,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    ConflictResolved {
        fleet_id: String,
        resolution: Resolution,
        timestamp: DateTime<Utc>,
    },
    RobotWaiting {
        fleet_id: String,
        robot_id: RobotId,
        blocked_on: Option<Cell>,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    RobotStuck {
        fleet_id: String,
        robot_id: RobotId,
        cell: Cell,
        reason: String,
        /// Raised by stuck detection; the next plan avoids higher-ranked
        /// reservations.
        replan: bool,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    ReplanRequested {
        fleet_id: String,
        robot_id: RobotId,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        fleet_id: String,
        robot_id: RobotId,
        target: Cell,
        reached: Cell,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    LowBattery {
        fleet_id: String,
        robot_id: RobotId,
        battery: f64,
        /// Leave the current path at the next cell instead of finishing it.
        reroute: bool,
        timestamp: DateTime<Utc>,
    },
    ChargingStarted {
        fleet_id: String,
        robot_id: RobotId,
        cell: Cell,
        timestamp: DateTime<Utc>,
    },
    BatteryCharged {
        fleet_id: String,
        robot_id: RobotId,
        battery: f64,
        tick: u64,
        timestamp: DateTime<Utc>,
    },
    ChargingStopped {
        fleet_id: String,
        robot_id: RobotId,
        battery: f64,
        resume_task: bool,
        timestamp: DateTime<Utc>,
    },
    ObstacleEdited {
        fleet_id: String,
        cell: Cell,
        is_obstacle: bool,
        timestamp: DateTime<Utc>,
    },
    SpeedMultiplierChanged {
        fleet_id: String,
        multiplier: f64,
        timestamp: DateTime<Utc>,
    },
    RobotRemoved {
        fleet_id: String,
        robot_id: RobotId,
        last_status: RobotStatus,
        timestamp: DateTime<Utc>,
    },
}

impl FleetEvent {
    /// Robot the event is about, if any.
    pub fn robot_id(&self) -> Option<RobotId> {
        match self {
            FleetEvent::RobotSpawned { robot_id, .. }
            | FleetEvent::TaskAssigned { robot_id, .. }
            | FleetEvent::PathCommitted { robot_id, .. }
            | FleetEvent::PathTruncated { robot_id, .. }
            | FleetEvent::PathEnded { robot_id, .. }
            | FleetEvent::RobotAdvanced { robot_id, .. }
            | FleetEvent::RobotHeld { robot_id, .. }
            | FleetEvent::RobotWaiting { robot_id, .. }
            | FleetEvent::RobotStuck { robot_id, .. }
            | FleetEvent::ReplanRequested { robot_id, .. }
            | FleetEvent::TaskCompleted { robot_id, .. }
            | FleetEvent::LowBattery { robot_id, .. }
            | FleetEvent::ChargingStarted { robot_id, .. }
            | FleetEvent::BatteryCharged { robot_id, .. }
            | FleetEvent::ChargingStopped { robot_id, .. }
            | FleetEvent::RobotRemoved { robot_id, .. } => Some(*robot_id),
            FleetEvent::ConflictResolved { .. }
            | FleetEvent::ObstacleEdited { .. }
            | FleetEvent::SpeedMultiplierChanged { .. } => None,
        }
    }
}

impl DomainEvent for FleetEvent {
    fn event_type(&self) -> &'static str {
        match self {
            FleetEvent::RobotSpawned { .. } => "RobotSpawned",
            FleetEvent::TaskAssigned { .. } => "TaskAssigned",
            FleetEvent::PathCommitted { .. } => "PathCommitted",
            FleetEvent::PathTruncated { .. } => "PathTruncated",
            FleetEvent::PathEnded { .. } => "PathEnded",
            FleetEvent::RobotAdvanced { .. } => "RobotAdvanced",
            FleetEvent::RobotHeld { .. } => "RobotHeld",
            FleetEvent::ConflictResolved { .. } => "ConflictResolved",
            FleetEvent::RobotWaiting { .. } => "RobotWaiting",
            FleetEvent::RobotStuck { .. } => "RobotStuck",
            FleetEvent::ReplanRequested { .. } => "ReplanRequested",
            FleetEvent::TaskCompleted { .. } => "TaskCompleted",
            FleetEvent::LowBattery { .. } => "LowBattery",
            FleetEvent::ChargingStarted { .. } => "ChargingStarted",
            FleetEvent::BatteryCharged { .. } => "BatteryCharged",
            FleetEvent::ChargingStopped { .. } => "ChargingStopped",
            FleetEvent::ObstacleEdited { .. } => "ObstacleEdited",
            FleetEvent::SpeedMultiplierChanged { .. } => "SpeedMultiplierChanged",
            FleetEvent::RobotRemoved { .. } => "RobotRemoved",
        }
    }

    fn aggregate_id(&self) -> &str {
        match self {
            FleetEvent::RobotSpawned { fleet_id, .. }
            | FleetEvent::TaskAssigned { fleet_id, .. }
            | FleetEvent::PathCommitted { fleet_id, .. }
            | FleetEvent::PathTruncated { fleet_id, .. }
            | FleetEvent::PathEnded { fleet_id, .. }
            | FleetEvent::RobotAdvanced { fleet_id, .. }
            | FleetEvent::RobotHeld { fleet_id, .. }
            | FleetEvent::ConflictResolved { fleet_id, .. }
            | FleetEvent::RobotWaiting { fleet_id, .. }
            | FleetEvent::RobotStuck { fleet_id, .. }
            | FleetEvent::ReplanRequested { fleet_id, .. }
            | FleetEvent::TaskCompleted { fleet_id, .. }
            | FleetEvent::LowBattery { fleet_id, .. }
            | FleetEvent::ChargingStarted { fleet_id, .. }
            | FleetEvent::BatteryCharged { fleet_id, .. }
            | FleetEvent::ChargingStopped { fleet_id, .. }
            | FleetEvent::ObstacleEdited { fleet_id, .. }
            | FleetEvent::SpeedMultiplierChanged { fleet_id, .. }
            | FleetEvent::RobotRemoved { fleet_id, .. } => fleet_id,
        }
    }

    fn event_version(&self) -> u64 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            FleetEvent::RobotSpawned { timestamp, .. }
            | FleetEvent::TaskAssigned { timestamp, .. }
            | FleetEvent::PathCommitted { timestamp, .. }
            | FleetEvent::PathTruncated { timestamp, .. }
            | FleetEvent::PathEnded { timestamp, .. }
            | FleetEvent::RobotAdvanced { timestamp, .. }
            | FleetEvent::RobotHeld { timestamp, .. }
            | FleetEvent::ConflictResolved { timestamp, .. }
            | FleetEvent::RobotWaiting { timestamp, .. }
            | FleetEvent::RobotStuck { timestamp, .. }
            | FleetEvent::ReplanRequested { timestamp, .. }
            | FleetEvent::TaskCompleted { timestamp, .. }
            | FleetEvent::LowBattery { timestamp, .. }
            | FleetEvent::ChargingStarted { timestamp, .. }
            | FleetEvent::BatteryCharged { timestamp, .. }
            | FleetEvent::ChargingStopped { timestamp, .. }
            | FleetEvent::ObstacleEdited { timestamp, .. }
            | FleetEvent::SpeedMultiplierChanged { timestamp, .. }
            | FleetEvent::RobotRemoved { timestamp, .. } => *timestamp,
        }
    }
}
