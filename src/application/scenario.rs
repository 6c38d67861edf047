use crate::common::{DomainError, DomainResult};
use crate::domains::fleet::FleetOrchestrator;
use crate::domains::grid_map::{Cell, Connectivity, GridMap};
use crate::domains::traffic::RobotId;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

/// Parameters for a reproducible random fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    pub width: u32,
    pub height: u32,
    pub robots: usize,
    /// Fraction of cells turned into obstacles, in `[0, 0.5]`.
    pub obstacle_ratio: f64,
    pub chargers: usize,
    pub seed: u64,
}

impl Default for ScenarioSpec {
    fn default() -> Self {
        Self {
            width: 12,
            height: 12,
            robots: 6,
            obstacle_ratio: 0.1,
            chargers: 1,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Index into `Scenario::spawns`.
    pub robot: usize,
    pub target: Cell,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Scenario {
    pub grid: GridMap,
    pub spawns: Vec<Cell>,
    pub tasks: Vec<TaskSpec>,
}

impl Scenario {
    /// Equal `ScenarioSpec`s generate the same grid, spawns and tasks.
    pub fn generate(spec: &ScenarioSpec) -> DomainResult<Self> {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let mut grid = GridMap::new(spec.width, spec.height, Connectivity::Four)?;

        let mut cells: Vec<Cell> = grid.cells().collect();
        cells.shuffle(&mut rng);

        let ratio = spec.obstacle_ratio.clamp(0.0, 0.5);
        let obstacle_count = (cells.len() as f64 * ratio).floor() as usize;
        let needed = spec.robots * 2 + spec.chargers;
        if cells.len() < obstacle_count + needed {
            return Err(DomainError::InvalidCommand {
                reason: format!(
                    "{}x{} grid cannot hold {} robots with {} obstacles",
                    spec.width, spec.height, spec.robots, obstacle_count
                ),
            });
        }

        let (obstacles, free) = cells.split_at(obstacle_count);
        for cell in obstacles {
            grid.set_obstacle(*cell, true)?;
        }

        let spawns = free[..spec.robots].to_vec();
        let targets = &free[spec.robots..spec.robots * 2];
        for charger in &free[spec.robots * 2..needed] {
            grid.add_charging_station(*charger)?;
        }

        let tasks = targets
            .iter()
            .enumerate()
            .map(|(robot, target)| TaskSpec {
                robot,
                target: *target,
                priority: if rng.gen_bool(0.25) { None } else { Some(rng.gen_range(0..4)) },
            })
            .collect();

        Ok(Self { grid, spawns, tasks })
    }

    /// Spawns every robot and assigns its task. Returns ids in spawn order.
    pub fn install(&self, orchestrator: &mut FleetOrchestrator) -> DomainResult<Vec<RobotId>> {
        let robot_ids = self
            .spawns
            .iter()
            .map(|cell| orchestrator.spawn_robot(*cell))
            .collect::<DomainResult<Vec<_>>>()?;
        for task in &self.tasks {
            let robot_id = robot_ids.get(task.robot).copied().ok_or(DomainError::InvalidCommand {
                reason: format!("Task refers to robot #{} of {}", task.robot, robot_ids.len()),
            })?;
            orchestrator.assign_task(robot_id, task.target, task.priority)?;
        }
        Ok(robot_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_scenario() {
        let spec = ScenarioSpec::default();
        let a = Scenario::generate(&spec).unwrap();
        let b = Scenario::generate(&spec).unwrap();
        assert_eq!(a.spawns, b.spawns);
        assert_eq!(a.tasks, b.tasks);
        assert_eq!(a.grid.free_cells().count(), b.grid.free_cells().count());
    }

    #[test]
    fn test_spawns_are_free_and_distinct() {
        let scenario = Scenario::generate(&ScenarioSpec {
            robots: 10,
            obstacle_ratio: 0.3,
            ..ScenarioSpec::default()
        })
        .unwrap();
        let mut seen = std::collections::HashSet::new();
        for cell in &scenario.spawns {
            assert!(scenario.grid.is_traversable(*cell).unwrap());
            assert!(seen.insert(*cell));
        }
    }

    #[test]
    fn test_too_many_robots_rejected() {
        let spec = ScenarioSpec {
            width: 3,
            height: 3,
            robots: 5,
            ..ScenarioSpec::default()
        };
        assert!(Scenario::generate(&spec).is_err());
    }
}
