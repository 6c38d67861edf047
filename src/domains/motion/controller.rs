use crate::domains::fleet::{Robot, RobotStatus};
use crate::domains::grid_map::Cell;
use crate::domains::traffic::Decision;

pub const MIN_SPEED_MULTIPLIER: f64 = 0.5;
pub const MAX_SPEED_MULTIPLIER: f64 = 2.0;

/// One step along a committed path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionStep {
    pub cell: Cell,
    pub path_index: usize,
    pub transit_ticks: u32,
    pub progress: f64,
    pub battery: f64,
    /// Reached the centre of `cell` this tick.
    pub arrived: bool,
    pub path_complete: bool,
    /// Battery fell below the low threshold on arrival.
    pub low_battery: bool,
}

/// What one `advance` call decided for a robot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionOutcome {
    /// Nothing to drive: no committed path and no wait in progress.
    Idle,
    /// Position unchanged; wait bookkeeping for the next tick.
    Held { wait_target: Option<Cell>, wait_streak: u32 },
    Moved(MotionStep),
    /// Already at the end of its path.
    PathComplete { cell: Cell },
    /// Waited on the same cell for too long; flagged for forced replanning.
    StuckDetected { blocked_on: Option<Cell> },
}

/// Velocity-based integration of robots along their committed paths.
///
/// `advance` only computes the robot's next state; the caller records it.
#[derive(Debug, Clone, Copy)]
pub struct MotionController {
    base_velocity: f64,
    stuck_threshold: u32,
    low_battery_threshold: f64,
    drain_per_cell: f64,
}

impl MotionController {
    pub fn new(base_velocity: f64, stuck_threshold: u32, low_battery_threshold: f64, drain_per_cell: f64) -> Self {
        Self {
            base_velocity,
            stuck_threshold: stuck_threshold.max(1),
            low_battery_threshold,
            drain_per_cell,
        }
    }

    /// Cells covered per tick at `multiplier`, capped at one cell because
    /// reservations are held per tick.
    pub fn speed_per_tick(&self, multiplier: f64, dt: f64) -> f64 {
        let multiplier = multiplier.clamp(MIN_SPEED_MULTIPLIER, MAX_SPEED_MULTIPLIER);
        (self.base_velocity * multiplier * dt).min(1.0)
    }

    /// Whole ticks needed to cross one cell; this is the pace paths are
    /// scheduled with.
    pub fn ticks_per_cell(&self, multiplier: f64, dt: f64) -> u32 {
        let speed = self.speed_per_tick(multiplier, dt);
        if speed <= 0.0 {
            return u32::MAX;
        }
        (1.0 / speed).ceil().min(u32::MAX as f64).max(1.0) as u32
    }

    pub fn advance(&self, robot: &Robot, decision: Decision, dt: f64) -> MotionOutcome {
        match decision {
            Decision::Proceed => self.proceed(robot, dt),
            Decision::Wait(_) => self.hold(robot),
            Decision::Replan => MotionOutcome::Held {
                wait_target: robot.wait_target,
                wait_streak: robot.wait_streak,
            },
        }
    }

    fn proceed(&self, robot: &Robot, dt: f64) -> MotionOutcome {
        let Some(active) = robot.active_path.as_ref() else {
            return MotionOutcome::Idle;
        };
        if active.is_complete() {
            return MotionOutcome::PathComplete { cell: robot.cell };
        }

        let transit_ticks = active.transit_ticks + 1;
        if transit_ticks < active.path.ticks_per_cell() {
            let speed = self.speed_per_tick(active.speed_multiplier, dt);
            return MotionOutcome::Moved(MotionStep {
                cell: robot.cell,
                path_index: active.index,
                transit_ticks,
                progress: (robot.progress + speed).min(1.0 - f64::EPSILON),
                battery: robot.battery,
                arrived: false,
                path_complete: false,
                low_battery: false,
            });
        }

        let path_index = active.index + 1;
        let battery = (robot.battery - self.drain_per_cell).max(0.0);
        MotionOutcome::Moved(MotionStep {
            cell: active.path.cells()[path_index],
            path_index,
            transit_ticks: 0,
            progress: 0.0,
            battery,
            arrived: true,
            path_complete: path_index + 1 >= active.path.len(),
            low_battery: battery < self.low_battery_threshold
                && !robot.seeking_charger
                && robot.status != RobotStatus::Charging,
        })
    }

    fn hold(&self, robot: &Robot) -> MotionOutcome {
        let (wait_target, wait_streak) = match robot.blocked_on {
            Some(target) if robot.wait_target == Some(target) => (Some(target), robot.wait_streak + 1),
            target => (target, 1),
        };
        if wait_streak >= self.stuck_threshold {
            return MotionOutcome::StuckDetected { blocked_on: wait_target };
        }
        MotionOutcome::Held { wait_target, wait_streak }
    }
}
