use super::orchestrator::FleetOrchestrator;
use crate::common::DomainResult;
use crate::domains::grid_map::Cell;
use crate::domains::traffic::RobotId;
use serde::{Deserialize, Serialize};

/// External requests, applied between ticks in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FleetCommand {
    SpawnRobot { cell: Cell },
    AssignTask { robot_id: RobotId, target: Cell, priority: Option<u32> },
    EditObstacle { cell: Cell, is_obstacle: bool },
    SetSpeedMultiplier { multiplier: f64 },
    ForceReplan { robot_id: RobotId },
    RemoveRobot { robot_id: RobotId },
    StartCharging { robot_id: RobotId },
    StopCharging { robot_id: RobotId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandReply {
    Spawned(RobotId),
    Accepted,
}

impl FleetOrchestrator {
    pub fn handle_command(&mut self, command: FleetCommand) -> DomainResult<CommandReply> {
        match command {
            FleetCommand::SpawnRobot { cell } => self.spawn_robot(cell).map(CommandReply::Spawned),
            FleetCommand::AssignTask {
                robot_id,
                target,
                priority,
            } => self.assign_task(robot_id, target, priority).map(|_| CommandReply::Accepted),
            FleetCommand::EditObstacle { cell, is_obstacle } => {
                self.edit_obstacle(cell, is_obstacle).map(|_| CommandReply::Accepted)
            }
            FleetCommand::SetSpeedMultiplier { multiplier } => {
                self.set_speed_multiplier(multiplier).map(|_| CommandReply::Accepted)
            }
            FleetCommand::ForceReplan { robot_id } => self.force_replan(robot_id).map(|_| CommandReply::Accepted),
            FleetCommand::RemoveRobot { robot_id } => self.remove_robot(robot_id).map(|_| CommandReply::Accepted),
            FleetCommand::StartCharging { robot_id } => self.start_charging(robot_id).map(|_| CommandReply::Accepted),
            FleetCommand::StopCharging { robot_id } => self.stop_charging(robot_id).map(|_| CommandReply::Accepted),
        }
    }
}
