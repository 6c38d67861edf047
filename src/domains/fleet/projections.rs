use super::events::FleetEvent;
use super::robot::{RobotStatus, Task};
use crate::domains::grid_map::Cell;
use crate::domains::traffic::{Decision, Resolution, RobotId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Read-only view of one robot at a tick boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotSnapshot {
    pub id: RobotId,
    pub cell: Cell,
    /// Interpolated position for display.
    pub position: (f64, f64),
    pub status: RobotStatus,
    /// Remaining committed cells, starting with the one currently held.
    pub path: Vec<Cell>,
    pub task: Option<Task>,
    pub battery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub tick: u64,
    pub speed_multiplier: f64,
    pub robots: Vec<RobotSnapshot>,
}

impl FleetSnapshot {
    pub fn robot(&self, robot_id: RobotId) -> Option<&RobotSnapshot> {
        self.robots.iter().find(|robot| robot.id == robot_id)
    }

    pub fn count(&self, status: RobotStatus) -> usize {
        self.robots.iter().filter(|robot| robot.status == status).count()
    }
}

/// Everything observable about one processed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// The tick that was processed; `snapshot.tick` is the one after it.
    pub tick: u64,
    pub snapshot: FleetSnapshot,
    pub resolutions: Vec<Resolution>,
}

impl TickReport {
    pub fn summary_line(&self) -> String {
        format!(
            "tick={} robots={} moving={} waiting={} stuck={} conflicts={}",
            self.tick,
            self.snapshot.robots.len(),
            self.snapshot.count(RobotStatus::Moving),
            self.snapshot.count(RobotStatus::Waiting),
            self.snapshot.count(RobotStatus::Stuck),
            self.resolutions.len()
        )
    }

    /// Decisions handed to `robot_id` this tick, in resolution order.
    pub fn decisions_for(&self, robot_id: RobotId) -> Vec<Decision> {
        self.resolutions
            .iter()
            .filter_map(|resolution| resolution.decision_for(robot_id))
            .collect()
    }
}

/// Running per-robot statistics built from the event journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotOverview {
    pub robot_id: RobotId,
    pub status: RobotStatus,
    pub last_cell: Cell,
    pub tasks_assigned: usize,
    pub tasks_completed: usize,
    pub paths_committed: usize,
    pub cells_travelled: usize,
    pub conflicts: usize,
    pub waits: usize,
    pub replans: usize,
    pub times_stuck: usize,
    pub charges: usize,
    pub removed: bool,
    pub last_activity: DateTime<Utc>,
}

impl RobotOverview {
    pub fn new(robot_id: RobotId, cell: Cell, created_at: DateTime<Utc>) -> Self {
        Self {
            robot_id,
            status: RobotStatus::Idle,
            last_cell: cell,
            tasks_assigned: 0,
            tasks_completed: 0,
            paths_committed: 0,
            cells_travelled: 0,
            conflicts: 0,
            waits: 0,
            replans: 0,
            times_stuck: 0,
            charges: 0,
            removed: false,
            last_activity: created_at,
        }
    }

    pub fn apply_event(&mut self, event: &FleetEvent) {
        match event {
            FleetEvent::TaskAssigned { timestamp, .. } => {
                self.tasks_assigned += 1;
                self.status = RobotStatus::Planning;
                self.last_activity = *timestamp;
            }
            FleetEvent::PathCommitted { cells, timestamp, .. } => {
                self.paths_committed += 1;
                self.status = RobotStatus::Moving;
                if let Some(first) = cells.first() {
                    self.last_cell = *first;
                }
                self.last_activity = *timestamp;
            }
            FleetEvent::RobotAdvanced { cell, timestamp, .. } => {
                if *cell != self.last_cell {
                    self.cells_travelled += 1;
                    self.last_cell = *cell;
                }
                self.last_activity = *timestamp;
            }
            FleetEvent::PathEnded { cell, timestamp, .. } => {
                self.last_cell = *cell;
                self.last_activity = *timestamp;
            }
            FleetEvent::ConflictResolved { resolution, timestamp, .. } => {
                self.conflicts += 1;
                if resolution.decision_for(self.robot_id) == Some(Decision::Replan) {
                    self.replans += 1;
                }
                self.last_activity = *timestamp;
            }
            FleetEvent::RobotWaiting { timestamp, .. } => {
                self.waits += 1;
                self.status = RobotStatus::Waiting;
                self.last_activity = *timestamp;
            }
            FleetEvent::RobotStuck { cell, timestamp, .. } => {
                self.times_stuck += 1;
                self.status = RobotStatus::Stuck;
                self.last_cell = *cell;
                self.last_activity = *timestamp;
            }
            FleetEvent::TaskCompleted { reached, timestamp, .. } => {
                self.tasks_completed += 1;
                self.status = RobotStatus::Idle;
                self.last_cell = *reached;
                self.last_activity = *timestamp;
            }
            FleetEvent::ChargingStarted { cell, timestamp, .. } => {
                self.charges += 1;
                self.status = RobotStatus::Charging;
                self.last_cell = *cell;
                self.last_activity = *timestamp;
            }
            FleetEvent::ChargingStopped { resume_task, timestamp, .. } => {
                self.status = if *resume_task {
                    RobotStatus::Planning
                } else {
                    RobotStatus::Idle
                };
                self.last_activity = *timestamp;
            }
            FleetEvent::RobotRemoved { last_status, timestamp, .. } => {
                self.removed = true;
                self.status = *last_status;
                self.last_activity = *timestamp;
            }
            _ => {}
        }
    }
}

/// Fleet-wide counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetOverview {
    pub robots_spawned: usize,
    pub robots_removed: usize,
    pub tasks_completed: usize,
    pub conflicts_resolved: usize,
    pub obstacle_edits: usize,
    pub speed_multiplier: Option<f64>,
}

impl FleetOverview {
    pub fn apply_event(&mut self, event: &FleetEvent) {
        match event {
            FleetEvent::RobotSpawned { .. } => self.robots_spawned += 1,
            FleetEvent::RobotRemoved { .. } => self.robots_removed += 1,
            FleetEvent::TaskCompleted { .. } => self.tasks_completed += 1,
            FleetEvent::ConflictResolved { .. } => self.conflicts_resolved += 1,
            FleetEvent::ObstacleEdited { .. } => self.obstacle_edits += 1,
            FleetEvent::SpeedMultiplierChanged { multiplier, .. } => self.speed_multiplier = Some(*multiplier),
            _ => {}
        }
    }
}
