use super::FleetOrchestrator;
use crate::common::{AggregateRoot, DomainError, DomainResult};
use crate::domains::fleet::events::FleetEvent;
use crate::domains::fleet::robot::{ActivePath, PathPurpose, ReplanReason, Robot, RobotStatus, Task};
use crate::domains::traffic::ScheduledPath;

impl AggregateRoot for FleetOrchestrator {
    type Event = FleetEvent;

    fn aggregate_id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) -> DomainResult<()> {
        match event {
            FleetEvent::RobotSpawned { robot_id, cell, battery, .. } => {
                self.table
                    .hold(*robot_id, *cell)
                    .map_err(|_| DomainError::OccupiedOrObstacle { x: cell.x, y: cell.y })?;
                self.robots.insert(*robot_id, Robot::new(*robot_id, *cell, *battery));
                self.next_robot_id = self.next_robot_id.max(robot_id.0 + 1);
            }
            FleetEvent::TaskAssigned { robot_id, target, priority, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.task = Some(Task::new(*target, *priority));
                robot.wait_streak = 0;
                robot.wait_target = None;
                if robot.active_path.is_some() {
                    robot.pending_replan = Some(ReplanReason::Retarget);
                } else {
                    robot.status = RobotStatus::Planning;
                }
            }
            FleetEvent::PathCommitted {
                robot_id,
                cells,
                start_tick,
                ticks_per_cell,
                purpose,
                ..
            } => {
                let path = ScheduledPath::with_pace(cells.clone(), *start_tick, *ticks_per_cell)?;
                let multiplier = self.speed_multiplier;
                let robot = self.robot_mut(*robot_id)?;
                robot.active_path = Some(ActivePath::new(path, *purpose, multiplier));
                robot.status = RobotStatus::Moving;
                robot.progress = 0.0;
                robot.pending_replan = None;
                robot.blocked_on = None;
                robot.wait_target = None;
                robot.wait_streak = 0;
                if *purpose == PathPurpose::Task {
                    if let Some(task) = robot.task.as_mut() {
                        task.first_commit_tick.get_or_insert(*start_tick);
                    }
                }
            }
            FleetEvent::PathTruncated {
                robot_id,
                last_index,
                displaced,
                ..
            } => {
                let robot = self.robot_mut(*robot_id)?;
                if let Some(active) = robot.active_path.as_mut() {
                    active.path = active.path.truncated(*last_index);
                }
                robot.pending_replan = Some(if *displaced {
                    ReplanReason::Displaced
                } else {
                    ReplanReason::Yielded
                });
            }
            FleetEvent::PathEnded { robot_id, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.active_path = None;
                robot.progress = 0.0;
                if robot.task.is_some() || robot.seeking_charger {
                    robot.status = RobotStatus::Planning;
                } else {
                    robot.status = RobotStatus::Idle;
                    robot.pending_replan = None;
                }
            }
            FleetEvent::RobotAdvanced {
                robot_id,
                cell,
                path_index,
                transit_ticks,
                progress,
                battery,
                ..
            } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.cell = *cell;
                robot.progress = *progress;
                robot.battery = *battery;
                robot.blocked_on = None;
                robot.wait_target = None;
                robot.wait_streak = 0;
                if let Some(active) = robot.active_path.as_mut() {
                    active.index = *path_index;
                    active.transit_ticks = *transit_ticks;
                }
            }
            FleetEvent::RobotHeld {
                robot_id,
                wait_target,
                wait_streak,
                ..
            } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.wait_target = *wait_target;
                robot.wait_streak = *wait_streak;
            }
            // Streaks live in the resolver; the event is for the journal.
            FleetEvent::ConflictResolved { .. } => {}
            FleetEvent::RobotWaiting { robot_id, blocked_on, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                if robot.active_path.is_none() {
                    robot.status = RobotStatus::Waiting;
                    robot.blocked_on = *blocked_on;
                }
            }
            FleetEvent::RobotStuck { robot_id, replan, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                if robot.active_path.is_none() {
                    robot.status = RobotStatus::Stuck;
                }
                if *replan {
                    robot.pending_replan = Some(ReplanReason::Stuck);
                    robot.wait_streak = 0;
                    robot.wait_target = None;
                }
            }
            FleetEvent::ReplanRequested { robot_id, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.pending_replan = Some(ReplanReason::Forced);
                if robot.active_path.is_none() && robot.status == RobotStatus::Idle {
                    robot.status = RobotStatus::Planning;
                }
            }
            FleetEvent::TaskCompleted { robot_id, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.task = None;
                robot.active_path = None;
                robot.progress = 0.0;
                robot.status = if robot.seeking_charger {
                    RobotStatus::Planning
                } else {
                    RobotStatus::Idle
                };
            }
            FleetEvent::LowBattery { robot_id, reroute, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.seeking_charger = true;
                if *reroute {
                    robot.pending_replan = Some(ReplanReason::LowBattery);
                }
            }
            FleetEvent::ChargingStarted { robot_id, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.status = RobotStatus::Charging;
                robot.seeking_charger = false;
                robot.active_path = None;
                robot.pending_replan = None;
                robot.progress = 0.0;
            }
            FleetEvent::BatteryCharged { robot_id, battery, .. } => {
                self.robot_mut(*robot_id)?.battery = *battery;
            }
            FleetEvent::ChargingStopped { robot_id, battery, .. } => {
                let robot = self.robot_mut(*robot_id)?;
                robot.battery = *battery;
                robot.seeking_charger = false;
                robot.status = if robot.task.is_some() {
                    RobotStatus::Planning
                } else {
                    RobotStatus::Idle
                };
            }
            FleetEvent::ObstacleEdited { cell, is_obstacle, .. } => {
                self.grid.set_obstacle(*cell, *is_obstacle)?;
            }
            FleetEvent::SpeedMultiplierChanged { multiplier, .. } => {
                self.speed_multiplier = *multiplier;
            }
            FleetEvent::RobotRemoved { robot_id, .. } => {
                self.table.release(*robot_id);
                self.resolver.forget(*robot_id);
                self.robots.remove(robot_id);
            }
        }
        self.version += 1;
        Ok(())
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn mark_events_as_committed(&mut self) {
        self.uncommitted_events.clear();
    }

    fn add_event(&mut self, event: Self::Event) {
        self.uncommitted_events.push(event);
    }
}
