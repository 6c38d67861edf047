use fleet_traffic::adapters::inbound::InMemoryEventStore;
use fleet_traffic::adapters::outbound::{init_noop_logger, InMemoryReportSink};
use fleet_traffic::application::FleetService;
use fleet_traffic::common::{ApplicationError, DomainError, EventStore};
use fleet_traffic::domains::fleet::{FleetEventActor, FleetOrchestrator, RobotStatus};
use fleet_traffic::domains::grid_map::{Cell, Connectivity, GridMap};
use fleet_traffic::domains::traffic::RobotId;
use fleet_traffic::Config;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn orchestrator(width: u32, height: u32) -> FleetOrchestrator {
    let grid = GridMap::new(width, height, Connectivity::Four).unwrap();
    FleetOrchestrator::new("service-test", grid, &Config::default())
}

#[tokio::test]
async fn test_step_respects_pause_and_resume() {
    let mut fleet = orchestrator(5, 5);
    let robot = fleet.spawn_robot(Cell::new(0, 0)).unwrap();
    fleet.assign_task(robot, Cell::new(2, 0), None).unwrap();

    let (mut service, commands) = FleetService::new(fleet, init_noop_logger(), Duration::from_millis(1));

    commands.pause().await.unwrap();
    assert!(service.step().await.unwrap().is_none());
    assert!(service.is_paused());
    assert_eq!(service.orchestrator().current_tick(), 0);

    commands.resume().await.unwrap();
    let report = service.step().await.unwrap().unwrap();
    assert_eq!(report.tick, 0);
    assert!(!service.is_paused());
    assert_eq!(report.snapshot.robot(robot).unwrap().cell, Cell::new(1, 0));

    commands.shutdown().await.unwrap();
    assert!(service.step().await.unwrap().is_none());
}

#[tokio::test]
async fn test_commands_round_trip_through_running_service() {
    let (service, commands) = FleetService::new(orchestrator(6, 6), init_noop_logger(), Duration::from_millis(1));
    let handle = tokio::spawn(service.run(None));

    let robot = commands.spawn_robot(Cell::new(0, 0)).await.unwrap();
    assert_eq!(robot, RobotId(0));
    assert!(matches!(
        commands.spawn_robot(Cell::new(0, 0)).await,
        Err(ApplicationError::Domain(DomainError::OccupiedOrObstacle { .. }))
    ));
    commands.assign_task(robot, Cell::new(3, 2), Some(2)).await.unwrap();

    match commands.assign_task(robot, Cell::new(9, 9), None).await {
        Err(ApplicationError::Domain(DomainError::OutOfBounds { x: 9, y: 9 })) => {}
        other => panic!("Expected OutOfBounds, got {:?}", other),
    }
    assert!(matches!(
        commands.set_speed_multiplier(2.5).await,
        Err(ApplicationError::Domain(DomainError::InvalidCommand { .. }))
    ));

    let mut arrived = false;
    for _ in 0..200 {
        let snapshot = commands.snapshot().await.unwrap();
        let state = snapshot.robot(robot).unwrap();
        if state.status == RobotStatus::Idle && state.cell == Cell::new(3, 2) {
            arrived = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert!(arrived, "robot never reached its task target");

    commands.edit_obstacle(Cell::new(5, 5), true).await.unwrap();
    assert!(commands.blocked_cells().await.unwrap().contains(&Cell::new(3, 2)));

    commands.shutdown().await.unwrap();
    let fleet = handle.await.unwrap().unwrap();
    assert!(!fleet.grid().is_traversable(Cell::new(5, 5)).unwrap());
    commands.closed().await;
    assert!(matches!(
        commands.snapshot().await,
        Err(ApplicationError::ServiceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_events_reach_journal_and_projections() {
    let mut fleet = orchestrator(5, 3);
    let robot = fleet.spawn_robot(Cell::new(0, 0)).unwrap();
    fleet.assign_task(robot, Cell::new(3, 0), None).unwrap();

    let store = Arc::new(InMemoryEventStore::new());
    let (event_sender, event_receiver) = mpsc::channel(64);
    let mut journal = FleetEventActor::new(store.clone(), event_receiver);
    let journal_task = tokio::spawn(async move {
        journal.run().await;
        journal
    });

    let sink = Arc::new(InMemoryReportSink::new());
    let (service, _commands) = FleetService::new(fleet, init_noop_logger(), Duration::from_millis(1));
    let service = service.with_event_channel(event_sender).with_report_sink(sink.clone());
    let fleet = service.run(Some(6)).await.unwrap();
    assert_eq!(fleet.current_tick(), 6);

    let journal = journal_task.await.unwrap();
    let overview = journal.get_robot_overview(robot).await.unwrap();
    assert_eq!(overview.tasks_assigned, 1);
    assert_eq!(overview.tasks_completed, 1);
    assert_eq!(overview.paths_committed, 1);
    assert_eq!(overview.status, RobotStatus::Idle);
    assert_eq!(overview.last_cell, Cell::new(3, 0));

    let fleet_overview = journal.get_fleet_overview().await;
    assert_eq!(fleet_overview.robots_spawned, 1);
    assert_eq!(fleet_overview.tasks_completed, 1);

    let journaled = store.load_events("service-test", 0).await.unwrap();
    assert_eq!(journaled.first().map(|e| e.event_type.as_str()), Some("RobotSpawned"));
    let completed = store.load_events_by_type("TaskCompleted", None).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].metadata.tick, Some(2));

    let ticks: Vec<u64> = sink.reports().await.iter().map(|r| r.tick).collect();
    assert_eq!(ticks, vec![0, 1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_paused_service_stops_when_all_handles_drop() {
    let (mut service, commands) = FleetService::new(orchestrator(3, 3), init_noop_logger(), Duration::from_millis(1));
    commands.pause().await.unwrap();
    drop(commands);
    assert!(service.step().await.unwrap().is_none());

    let fleet = tokio::time::timeout(Duration::from_secs(5), service.run(None))
        .await
        .expect("service kept running")
        .unwrap();
    assert_eq!(fleet.current_tick(), 0);
}
