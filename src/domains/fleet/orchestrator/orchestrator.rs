use crate::common::{AggregateRoot, DomainError, DomainResult};
use crate::config::{BatteryConfig, Config, SimulationConfig};
use crate::domains::fleet::events::FleetEvent;
use crate::domains::fleet::projections::{FleetSnapshot, RobotSnapshot};
use crate::domains::fleet::robot::{Robot, RobotStatus};
use crate::domains::grid_map::{Cell, GridMap};
use crate::domains::motion::{MotionController, MAX_SPEED_MULTIPLIER, MIN_SPEED_MULTIPLIER};
use crate::domains::path_planning::PathPlanner;
use crate::domains::traffic::{ConflictDetector, NegotiationResolver, ReservationTable, RobotId};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

/// Owns the robots, the grid and the reservation table, and composes planner,
/// detector, resolver and motion controller once per tick.
///
/// External commands are plain method calls validated against the current
/// state; the application layer applies them between ticks.
#[derive(Debug, Clone)]
pub struct FleetOrchestrator {
    pub id: String,
    pub(super) grid: GridMap,
    pub(super) robots: BTreeMap<RobotId, Robot>,
    pub(super) table: ReservationTable,
    pub(super) detector: ConflictDetector,
    pub(super) resolver: NegotiationResolver,
    pub(super) planner: PathPlanner,
    pub(super) motion: MotionController,
    pub(super) simulation: SimulationConfig,
    pub(super) battery: BatteryConfig,
    pub(super) speed_multiplier: f64,
    pub(super) next_robot_id: u32,
    pub version: u64,
    pub(super) uncommitted_events: Vec<FleetEvent>,
}

impl FleetOrchestrator {
    pub fn new(id: impl Into<String>, grid: GridMap, config: &Config) -> Self {
        let simulation = config.simulation.clone();
        let battery = config.battery.clone();
        Self {
            id: id.into(),
            grid,
            robots: BTreeMap::new(),
            table: ReservationTable::new(),
            detector: ConflictDetector::new(simulation.planning_horizon),
            resolver: NegotiationResolver::new(config.negotiation.wait_bound)
                .with_rank_order(config.negotiation.rank_order),
            planner: PathPlanner::new(simulation.max_planning_expansions),
            motion: MotionController::new(
                simulation.base_velocity,
                config.negotiation.stuck_threshold,
                battery.low_threshold,
                battery.drain_per_cell,
            ),
            speed_multiplier: simulation
                .speed_multiplier
                .clamp(MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER),
            simulation,
            battery,
            next_robot_id: 0,
            version: 0,
            uncommitted_events: Vec::new(),
        }
    }

    // Queries

    pub fn grid(&self) -> &GridMap {
        &self.grid
    }

    pub fn table(&self) -> &ReservationTable {
        &self.table
    }

    pub fn current_tick(&self) -> u64 {
        self.table.current_tick()
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn robot(&self, robot_id: RobotId) -> Option<&Robot> {
        self.robots.get(&robot_id)
    }

    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    pub fn robot_count(&self) -> usize {
        self.robots.len()
    }

    /// Cells held in the reservation table now or at a later tick.
    pub fn blocked_cells(&self) -> BTreeSet<Cell> {
        self.table.held_cells()
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            tick: self.table.current_tick(),
            speed_multiplier: self.speed_multiplier,
            robots: self
                .robots
                .values()
                .map(|robot| RobotSnapshot {
                    id: robot.id,
                    cell: robot.cell,
                    position: robot.position(),
                    status: robot.status,
                    path: robot.remaining_path(),
                    task: robot.task,
                    battery: robot.battery,
                })
                .collect(),
        }
    }

    pub(super) fn robot_mut(&mut self, robot_id: RobotId) -> DomainResult<&mut Robot> {
        self.robots
            .get_mut(&robot_id)
            .ok_or(DomainError::UnknownRobot { id: robot_id.0 })
    }

    fn known(&self, robot_id: RobotId) -> DomainResult<&Robot> {
        self.robots
            .get(&robot_id)
            .ok_or(DomainError::UnknownRobot { id: robot_id.0 })
    }

    pub(super) fn record(&mut self, event: FleetEvent) -> DomainResult<()> {
        self.add_event(event.clone());
        self.apply(&event)
    }

    // Commands

    pub fn spawn_robot(&mut self, cell: Cell) -> DomainResult<RobotId> {
        if !self.grid.is_traversable(cell)? || self.table.holder_of(cell).is_some() {
            tracing::warn!("Refused to spawn robot at {}: occupied or obstacle", cell);
            return Err(DomainError::OccupiedOrObstacle { x: cell.x, y: cell.y });
        }
        let robot_id = RobotId(self.next_robot_id);
        let event = FleetEvent::RobotSpawned {
            fleet_id: self.id.clone(),
            robot_id,
            cell,
            battery: self.battery.capacity,
            timestamp: Utc::now(),
        };
        self.record(event)?;
        tracing::info!("Spawned {} at {}", robot_id, cell);
        Ok(robot_id)
    }

    pub fn assign_task(&mut self, robot_id: RobotId, target: Cell, priority: Option<u32>) -> DomainResult<()> {
        let robot = self.known(robot_id)?;
        if !self.grid.contains(target) {
            return Err(DomainError::OutOfBounds { x: target.x, y: target.y });
        }
        if robot.status == RobotStatus::Charging {
            return Err(DomainError::InvalidCommand {
                reason: format!("{} is charging and cannot take tasks", robot_id),
            });
        }
        let event = FleetEvent::TaskAssigned {
            fleet_id: self.id.clone(),
            robot_id,
            target,
            priority,
            timestamp: Utc::now(),
        };
        self.record(event)?;
        tracing::info!("Assigned task {} (priority {:?}) to {}", target, priority, robot_id);
        Ok(())
    }

    pub fn edit_obstacle(&mut self, cell: Cell, is_obstacle: bool) -> DomainResult<()> {
        self.grid.is_traversable(cell)?;
        if is_obstacle {
            if let Some(holder) = self.table.holder_of(cell) {
                tracing::warn!("Obstacle edit at {} denied: reserved by {}", cell, holder);
                return Err(DomainError::ObstacleEditDenied {
                    x: cell.x,
                    y: cell.y,
                    robot: holder.0,
                });
            }
        }
        let event = FleetEvent::ObstacleEdited {
            fleet_id: self.id.clone(),
            cell,
            is_obstacle,
            timestamp: Utc::now(),
        };
        self.record(event)
    }

    pub fn set_speed_multiplier(&mut self, multiplier: f64) -> DomainResult<()> {
        if !multiplier.is_finite() || !(MIN_SPEED_MULTIPLIER..=MAX_SPEED_MULTIPLIER).contains(&multiplier) {
            return Err(DomainError::InvalidCommand {
                reason: format!(
                    "Speed multiplier {} outside [{}, {}]",
                    multiplier, MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER
                ),
            });
        }
        let event = FleetEvent::SpeedMultiplierChanged {
            fleet_id: self.id.clone(),
            multiplier,
            timestamp: Utc::now(),
        };
        self.record(event)
    }

    /// Same entry point the stuck-detection path uses: the robot replans on
    /// the next tick with higher-ranked robots' reservations blocked.
    pub fn force_replan(&mut self, robot_id: RobotId) -> DomainResult<()> {
        let robot = self.known(robot_id)?;
        if robot.task.is_none() && !robot.seeking_charger {
            return Err(DomainError::InvalidCommand {
                reason: format!("{} has no task to replan", robot_id),
            });
        }
        let event = FleetEvent::ReplanRequested {
            fleet_id: self.id.clone(),
            robot_id,
            timestamp: Utc::now(),
        };
        self.record(event)
    }

    /// Removes the robot and releases every reservation it holds at once.
    pub fn remove_robot(&mut self, robot_id: RobotId) -> DomainResult<()> {
        let last_status = self.known(robot_id)?.status;
        let event = FleetEvent::RobotRemoved {
            fleet_id: self.id.clone(),
            robot_id,
            last_status,
            timestamp: Utc::now(),
        };
        self.record(event)?;
        tracing::info!("Removed {}", robot_id);
        Ok(())
    }

    pub fn start_charging(&mut self, robot_id: RobotId) -> DomainResult<()> {
        let robot = self.known(robot_id)?;
        if robot.status != RobotStatus::Idle || !self.grid.is_charging_station(robot.cell)? {
            return Err(DomainError::InvalidCommand {
                reason: format!("{} must be idle on a charging station to charge", robot_id),
            });
        }
        let event = FleetEvent::ChargingStarted {
            fleet_id: self.id.clone(),
            robot_id,
            cell: robot.cell,
            timestamp: Utc::now(),
        };
        self.record(event)
    }

    pub fn stop_charging(&mut self, robot_id: RobotId) -> DomainResult<()> {
        let robot = self.known(robot_id)?;
        if robot.status != RobotStatus::Charging {
            return Err(DomainError::InvalidCommand {
                reason: format!("{} is not charging", robot_id),
            });
        }
        let event = FleetEvent::ChargingStopped {
            fleet_id: self.id.clone(),
            robot_id,
            battery: robot.battery,
            resume_task: robot.task.is_some(),
            timestamp: Utc::now(),
        };
        self.record(event)
    }
}
