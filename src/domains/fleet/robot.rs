use crate::domains::grid_map::Cell;
use crate::domains::traffic::{Contender, RobotId, ScheduledPath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RobotStatus {
    Idle,
    Planning,
    Moving,
    Waiting,
    Charging,
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub target: Cell,
    pub priority: Option<u32>,
    /// Tick this task's first path was committed.
    pub first_commit_tick: Option<u64>,
}

impl Task {
    pub fn new(target: Cell, priority: Option<u32>) -> Self {
        Self {
            target,
            priority,
            first_commit_tick: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathPurpose {
    Task,
    Charger,
    /// Parked robot stepping off another robot's route.
    Aside,
}

/// Why a robot has to plan again. Every reason is kept until a new path
/// commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplanReason {
    /// External request; plans around higher-ranked reservations.
    Forced,
    /// Raised by stuck detection; handled like `Forced`.
    Stuck,
    /// Reroute to the nearest charger.
    LowBattery,
    /// New task while moving.
    Retarget,
    /// Lost right of way while committed; stops at the next cell boundary.
    Yielded,
    /// Like `Yielded`, after losing to the same robot too often; plans
    /// around higher-ranked reservations.
    Displaced,
}

impl ReplanReason {
    /// Whether planning should also avoid cells reserved by higher-ranked robots.
    pub fn avoids_reservations(&self) -> bool {
        matches!(self, ReplanReason::Forced | ReplanReason::Stuck | ReplanReason::Displaced)
    }

    /// Whether the end of the current path no longer completes anything.
    pub fn abandons_path(&self) -> bool {
        matches!(self, ReplanReason::Retarget | ReplanReason::Yielded | ReplanReason::Displaced)
    }
}

/// A committed path being driven along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePath {
    pub path: ScheduledPath,
    pub purpose: PathPurpose,
    pub speed_multiplier: f64,
    /// Index of the cell the robot currently holds.
    pub index: usize,
    pub transit_ticks: u32,
}

impl ActivePath {
    pub fn new(path: ScheduledPath, purpose: PathPurpose, speed_multiplier: f64) -> Self {
        Self {
            path,
            purpose,
            speed_multiplier,
            index: 0,
            transit_ticks: 0,
        }
    }

    pub fn next_cell(&self) -> Option<Cell> {
        self.path.cells().get(self.index + 1).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.index + 1 >= self.path.len()
    }

    pub fn remaining(&self) -> &[Cell] {
        &self.path.cells()[self.index..]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Robot {
    pub id: RobotId,
    pub cell: Cell,
    /// Fraction of the way to the next cell, in `[0, 1)`.
    pub progress: f64,
    pub battery: f64,
    pub status: RobotStatus,
    pub task: Option<Task>,
    pub active_path: Option<ActivePath>,
    pub seeking_charger: bool,
    pub pending_replan: Option<ReplanReason>,
    /// Next cell a waiting robot is trying to enter.
    pub blocked_on: Option<Cell>,
    pub wait_target: Option<Cell>,
    pub wait_streak: u32,
}

impl Robot {
    pub fn new(id: RobotId, cell: Cell, battery: f64) -> Self {
        Self {
            id,
            cell,
            progress: 0.0,
            battery,
            status: RobotStatus::Idle,
            task: None,
            active_path: None,
            seeking_charger: false,
            pending_replan: None,
            blocked_on: None,
            wait_target: None,
            wait_streak: 0,
        }
    }

    /// Interpolated position between the held cell and the next one.
    pub fn position(&self) -> (f64, f64) {
        let (x, y) = (self.cell.x as f64, self.cell.y as f64);
        match self.active_path.as_ref().and_then(ActivePath::next_cell) {
            Some(next) if self.progress > 0.0 => (
                x + (next.x as f64 - x) * self.progress,
                y + (next.y as f64 - y) * self.progress,
            ),
            _ => (x, y),
        }
    }

    pub fn is_at_cell_center(&self) -> bool {
        self.active_path.as_ref().map_or(true, |active| active.transit_ticks == 0)
    }

    pub fn remaining_path(&self) -> Vec<Cell> {
        self.active_path
            .as_ref()
            .map(|active| active.remaining().to_vec())
            .unwrap_or_default()
    }

    /// Whether the robot should ask the planner for a path this tick.
    pub fn needs_plan(&self) -> bool {
        match self.status {
            RobotStatus::Planning | RobotStatus::Waiting | RobotStatus::Stuck => {
                self.task.is_some() || self.seeking_charger
            }
            RobotStatus::Moving => self.pending_replan.is_some() && self.is_at_cell_center(),
            RobotStatus::Idle | RobotStatus::Charging => false,
        }
    }

    /// Standing still with nothing to do; may be asked to step aside.
    pub fn is_parked(&self) -> bool {
        self.status == RobotStatus::Idle && self.task.is_none() && self.active_path.is_none() && !self.seeking_charger
    }

    /// Index of the cell the robot can stop on soonest: the one it holds
    /// when at a cell centre, otherwise the one it is entering.
    pub fn next_boundary(&self) -> Option<usize> {
        self.active_path
            .as_ref()
            .map(|active| if active.transit_ticks == 0 { active.index } else { active.index + 1 })
    }

    pub fn contender(&self, pinned: bool) -> Contender {
        Contender {
            robot_id: self.id,
            pinned,
            priority: self.task.and_then(|task| task.priority.or(Some(0))),
            commit_tick: self.task.and_then(|task| task.first_commit_tick),
        }
    }
}
