use fleet_traffic::domains::logger::DomainLogger;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct BridgeCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl BridgeCapture {
    fn new() -> Self { Self { messages: Arc::new(Mutex::new(Vec::new())) } }
}

impl DomainLogger for BridgeCapture {
    fn debug(&self, msg: &str) { self.messages.lock().unwrap().push(format!("DEBUG:{}", msg)); }
    fn info(&self, msg: &str) { self.messages.lock().unwrap().push(format!("INFO:{}", msg)); }
    fn warn(&self, msg: &str) { self.messages.lock().unwrap().push(format!("WARN:{}", msg)); }
    fn error(&self, msg: &str) { self.messages.lock().unwrap().push(format!("ERR:{}", msg)); }
}

#[tokio::test]
async fn test_buffered_and_noop_logger() {
    let capture = Arc::new(BridgeCapture::new());
    let bridge = capture.clone() as Arc<dyn DomainLogger>;

    let buffered = fleet_traffic::adapters::outbound::init_buffered_logger(bridge.clone(), 8);

    buffered.info("one");
    buffered.warn("two");
    buffered.error("three");

    // Give the forwarding task a moment
    tokio::time::sleep(Duration::from_millis(50)).await;

    let msgs = capture.messages.lock().unwrap();
    assert!(msgs.iter().any(|m| m.contains("INFO:one")));
    assert!(msgs.iter().any(|m| m.contains("WARN:two")));
    assert!(msgs.iter().any(|m| m.contains("ERR:three")));

    let noop = fleet_traffic::adapters::outbound::init_noop_logger();
    noop.info("ignored");
    noop.error("ignored-err");
}

#[test]
fn test_multi_logger_fans_out_in_order() {
    let first = Arc::new(BridgeCapture::new());
    let second = Arc::new(BridgeCapture::new());
    let multi = fleet_traffic::adapters::outbound::MultiLogger::new(vec![
        first.clone() as Arc<dyn DomainLogger>,
        second.clone() as Arc<dyn DomainLogger>,
    ]);

    multi.debug("zero");
    multi.info("one");
    multi.warn("two");

    for capture in [&first, &second] {
        let msgs = capture.messages.lock().unwrap();
        assert_eq!(*msgs, vec!["DEBUG:zero", "INFO:one", "WARN:two"]);
    }
}

#[test]
fn test_tick_report_logs_summary_and_stuck_robots() {
    use fleet_traffic::domains::grid_map::{Cell, Connectivity, GridMap};
    use fleet_traffic::{Config, FleetOrchestrator};

    // A robot walled in on every side cannot reach its goal.
    let mut grid = GridMap::new(5, 5, Connectivity::Four).unwrap();
    for cell in [Cell::new(1, 2), Cell::new(3, 2), Cell::new(2, 1), Cell::new(2, 3)] {
        grid.set_obstacle(cell, true).unwrap();
    }
    let mut orchestrator = FleetOrchestrator::new("logging", grid, &Config::default());
    let robot = orchestrator.spawn_robot(Cell::new(2, 2)).unwrap();
    orchestrator.assign_task(robot, Cell::new(0, 0), None).unwrap();
    let report = orchestrator.tick().unwrap();

    let capture = BridgeCapture::new();
    capture.tick(&report);

    let msgs = capture.messages.lock().unwrap();
    assert_eq!(msgs.len(), 2);
    assert!(msgs[0].starts_with("INFO:tick=0 robots=1"));
    assert!(msgs[0].contains("stuck=1"));
    assert_eq!(msgs[1], "WARN:robot-0 stuck at (2, 2)");
}

#[tokio::test]
async fn test_buffered_logger_counts_dropped_lines() {
    use fleet_traffic::adapters::outbound::BufferedLogger;

    let capture = Arc::new(BridgeCapture::new());
    let buffered = BufferedLogger::new(capture.clone() as Arc<dyn DomainLogger>, 1);

    // Nothing yields between the sends, so the forwarder cannot drain the queue.
    for i in 0..5 {
        buffered.info(&format!("line {}", i));
    }
    assert_eq!(buffered.dropped(), 4);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let msgs = capture.messages.lock().unwrap();
    assert_eq!(*msgs, vec!["INFO:line 0"]);
}
