use fleet_traffic::application::{Scenario, ScenarioSpec};
use fleet_traffic::common::AggregateRoot;
use fleet_traffic::domains::fleet::{FleetEvent, FleetOrchestrator, FleetSnapshot, TickReport};
use fleet_traffic::domains::grid_map::{Cell, Connectivity, GridMap};
use fleet_traffic::domains::traffic::RobotId;
use fleet_traffic::Config;
use std::collections::{HashMap, HashSet};

const TICKS: usize = 80;

fn scenario_fleet(spec: &ScenarioSpec, parallel: bool) -> FleetOrchestrator {
    let mut config = Config::default();
    config.simulation.parallel_planning = parallel;
    let scenario = Scenario::generate(spec).unwrap();
    let mut orchestrator = FleetOrchestrator::new("property", scenario.grid.clone(), &config);
    scenario.install(&mut orchestrator).unwrap();
    orchestrator
}

fn specs() -> Vec<ScenarioSpec> {
    vec![
        ScenarioSpec::default(),
        ScenarioSpec {
            width: 8,
            height: 8,
            robots: 8,
            obstacle_ratio: 0.15,
            seed: 11,
            ..ScenarioSpec::default()
        },
        ScenarioSpec {
            width: 6,
            height: 4,
            robots: 5,
            obstacle_ratio: 0.0,
            chargers: 0,
            seed: 3,
        },
    ]
}

fn assert_unique_cells(snapshot: &FleetSnapshot) {
    let mut seen = HashSet::new();
    for robot in &snapshot.robots {
        assert!(
            seen.insert(robot.cell),
            "tick {}: two robots on {}",
            snapshot.tick,
            robot.cell
        );
    }
}

fn assert_no_swaps(before: &FleetSnapshot, after: &FleetSnapshot) {
    let previous: HashMap<_, Cell> = before.robots.iter().map(|r| (r.id, r.cell)).collect();
    let moves: Vec<(Cell, Cell)> = after
        .robots
        .iter()
        .filter_map(|r| previous.get(&r.id).map(|from| (*from, r.cell)))
        .filter(|(from, to)| from != to)
        .collect();
    for (from, to) in &moves {
        assert!(from.is_adjacent(to), "tick {}: jump from {} to {}", after.tick, from, to);
        assert!(
            !moves.contains(&(*to, *from)),
            "tick {}: robots swapped {} and {}",
            after.tick,
            from,
            to
        );
    }
}

#[cfg(test)]
mod safety_properties {
    use super::*;

    #[test]
    fn test_no_shared_cells_and_no_swaps() {
        for spec in specs() {
            let mut orchestrator = scenario_fleet(&spec, true);
            let mut previous = orchestrator.snapshot();
            assert_unique_cells(&previous);

            for _ in 0..TICKS {
                let report = orchestrator.tick().unwrap();
                assert_unique_cells(&report.snapshot);
                assert_no_swaps(&previous, &report.snapshot);
                assert!(orchestrator.table().find_double_booking().is_none());
                for robot in &report.snapshot.robots {
                    assert!(orchestrator.grid().is_traversable(robot.cell).unwrap());
                }
                previous = report.snapshot;
            }
        }
    }

    #[test]
    fn test_every_robot_keeps_a_reservation() {
        let mut orchestrator = scenario_fleet(&ScenarioSpec::default(), true);
        for _ in 0..TICKS {
            orchestrator.tick().unwrap();
            for robot in orchestrator.robots() {
                assert!(orchestrator.table().contains(robot.id));
                let now = orchestrator.current_tick();
                assert_eq!(orchestrator.table().occupant(robot.cell, now), Some(robot.id));
            }
        }
    }

    #[test]
    fn test_committed_paths_are_contiguous() {
        let mut orchestrator = scenario_fleet(&ScenarioSpec::default(), true);
        for _ in 0..TICKS {
            orchestrator.tick().unwrap();
            for event in orchestrator.take_uncommitted_events() {
                if let FleetEvent::PathCommitted { cells, .. } = event {
                    for pair in cells.windows(2) {
                        assert!(pair[0].is_adjacent(&pair[1]));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod determinism_properties {
    use super::*;

    fn reports(spec: &ScenarioSpec, parallel: bool) -> Vec<TickReport> {
        let mut orchestrator = scenario_fleet(spec, parallel);
        (0..TICKS).map(|_| orchestrator.tick().unwrap()).collect()
    }

    #[test]
    fn test_same_input_same_reports() {
        for spec in specs() {
            assert_eq!(reports(&spec, true), reports(&spec, true));
        }
    }

    #[test]
    fn test_parallel_planning_changes_nothing() {
        for spec in specs() {
            assert_eq!(reports(&spec, true), reports(&spec, false));
        }
    }
}

#[cfg(test)]
mod liveness_properties {
    use super::*;

    #[test]
    fn test_tasks_get_completed() {
        let mut orchestrator = scenario_fleet(&ScenarioSpec::default(), true);
        let mut completed = 0;
        for _ in 0..TICKS {
            orchestrator.tick().unwrap();
            completed += orchestrator
                .take_uncommitted_events()
                .iter()
                .filter(|event| matches!(event, FleetEvent::TaskCompleted { .. }))
                .count();
        }
        assert!(completed > 0);
    }

    struct Errand {
        robot_id: RobotId,
        assigned_at: u64,
        route_len: u64,
        completed_at: Option<u64>,
        conflicts: u64,
    }

    impl Errand {
        fn new(robot_id: RobotId, assigned_at: u64, from: Cell, to: Cell) -> Self {
            Self {
                robot_id,
                assigned_at,
                route_len: u64::from(from.manhattan(&to)),
                completed_at: None,
                conflicts: 0,
            }
        }
    }

    /// Ticks the fleet until every errand is done, then checks that each
    /// robot took at most its route length plus two ticks per conflict.
    fn assert_bounded(orchestrator: &mut FleetOrchestrator, errands: &mut [Errand], limit: usize) {
        for _ in 0..limit {
            if errands.iter().all(|errand| errand.completed_at.is_some()) {
                break;
            }
            let report = orchestrator.tick().unwrap();
            for errand in errands.iter_mut() {
                errand.conflicts += report
                    .resolutions
                    .iter()
                    .filter(|resolution| resolution.decision_for(errand.robot_id).is_some())
                    .count() as u64;
            }
            for event in orchestrator.take_uncommitted_events() {
                if let FleetEvent::TaskCompleted { robot_id, tick, .. } = event {
                    if let Some(errand) = errands.iter_mut().find(|errand| errand.robot_id == robot_id) {
                        errand.completed_at.get_or_insert(tick);
                    }
                }
            }
        }

        for errand in errands.iter() {
            let completed_at = errand
                .completed_at
                .unwrap_or_else(|| panic!("{} never completed its task", errand.robot_id));
            let elapsed = completed_at - errand.assigned_at + 1;
            let bound = errand.route_len + 2 * errand.conflicts;
            assert!(
                elapsed <= bound,
                "{} took {} ticks, bound {} ({} conflicts)",
                errand.robot_id,
                elapsed,
                bound,
                errand.conflicts
            );
        }
    }

    #[test]
    fn test_parked_robots_around_the_goal_are_moved() {
        let grid = GridMap::new(6, 6, Connectivity::Four).unwrap();
        let mut orchestrator = FleetOrchestrator::new("liveness", grid, &Config::default());
        let robot = orchestrator.spawn_robot(Cell::new(3, 1)).unwrap();
        for cell in [Cell::new(3, 0), Cell::new(5, 0), Cell::new(4, 1)] {
            orchestrator.spawn_robot(cell).unwrap();
        }
        orchestrator.assign_task(robot, Cell::new(4, 0), None).unwrap();

        let mut errands = [Errand::new(robot, 0, Cell::new(3, 1), Cell::new(4, 0))];
        assert_bounded(&mut orchestrator, &mut errands, 20);
        assert_eq!(errands[0].conflicts, 1);
    }

    #[test]
    fn test_parked_robot_in_a_corridor_is_moved() {
        // One free cell at (2, 1) off a five-cell corridor.
        let grid = GridMap::from_matrix(
            &[vec![true; 5], vec![false, false, true, false, false]],
            Connectivity::Four,
        )
        .unwrap();
        let mut orchestrator = FleetOrchestrator::new("liveness", grid, &Config::default());
        let robot = orchestrator.spawn_robot(Cell::new(0, 0)).unwrap();
        let parked = orchestrator.spawn_robot(Cell::new(2, 0)).unwrap();
        orchestrator.assign_task(robot, Cell::new(4, 0), None).unwrap();

        let mut errands = [Errand::new(robot, 0, Cell::new(0, 0), Cell::new(4, 0))];
        assert_bounded(&mut orchestrator, &mut errands, 20);
        assert_eq!(orchestrator.robot(parked).unwrap().cell, Cell::new(2, 1));
    }

    #[test]
    fn test_crossing_robots_finish_within_bound() {
        let grid = GridMap::new(5, 5, Connectivity::Four).unwrap();
        let mut orchestrator = FleetOrchestrator::new("liveness", grid, &Config::default());
        let a = orchestrator.spawn_robot(Cell::new(0, 2)).unwrap();
        let b = orchestrator.spawn_robot(Cell::new(2, 0)).unwrap();
        orchestrator.assign_task(a, Cell::new(4, 2), Some(1)).unwrap();
        orchestrator.assign_task(b, Cell::new(2, 4), Some(1)).unwrap();

        let mut errands = [
            Errand::new(a, 0, Cell::new(0, 2), Cell::new(4, 2)),
            Errand::new(b, 0, Cell::new(2, 0), Cell::new(2, 4)),
        ];
        assert_bounded(&mut orchestrator, &mut errands, 20);
    }

    #[test]
    fn test_latecomer_and_committed_robot_finish_within_bound() {
        let grid = GridMap::new(7, 7, Connectivity::Four).unwrap();
        let mut orchestrator = FleetOrchestrator::new("liveness", grid, &Config::default());
        let low = orchestrator.spawn_robot(Cell::new(0, 3)).unwrap();
        let high = orchestrator.spawn_robot(Cell::new(3, 1)).unwrap();
        orchestrator.assign_task(low, Cell::new(6, 3), None).unwrap();
        orchestrator.tick().unwrap();
        orchestrator.take_uncommitted_events();
        orchestrator.assign_task(high, Cell::new(3, 6), Some(10)).unwrap();

        let mut errands = [
            Errand::new(low, 0, Cell::new(0, 3), Cell::new(6, 3)),
            Errand::new(high, 1, Cell::new(3, 1), Cell::new(3, 6)),
        ];
        assert_bounded(&mut orchestrator, &mut errands, 20);
        assert_eq!(errands[0].conflicts, 1);
    }
}
