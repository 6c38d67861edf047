use fleet_traffic::adapters::inbound::FileEventStore;
use fleet_traffic::adapters::outbound::{init_logger, FilesystemLayoutSource, JsonLinesReportSink};
use fleet_traffic::application::{FleetService, Scenario, ScenarioSpec};
use fleet_traffic::domains::fleet::{FleetEventActor, FleetOrchestrator, TickReportSink};
use fleet_traffic::domains::grid_map::{GridLayoutSource, GridMap};
use fleet_traffic::{Cell, Config};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_TICKS: u64 = 200;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());

    // Load configuration before tracing so a file logger can claim the `log` facade first
    let (config, config_note) = match Config::from_file(&config_path).await {
        Ok(config) => (config, format!("Loaded configuration from {}", config_path)),
        Err(e) => (Config::default(), format!("Using default configuration ({}: {})", config_path, e)),
    };
    let logger = init_logger(&config.logging);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    info!("Starting fleet traffic engine");
    info!("{}", config_note);

    let mut orchestrator = match config.map.layout.as_deref() {
        Some(name) => {
            let source = FilesystemLayoutSource::new(None);
            let layout = source.load_layout(name)?;
            info!("Loaded layout {} from {}", name, source.base().display());
            FleetOrchestrator::new("fleet", layout.into_grid(config.map.connectivity)?, &config)
        }
        None => {
            let spec = ScenarioSpec {
                width: config.map.width,
                height: config.map.height,
                ..ScenarioSpec::default()
            };
            let scenario = Scenario::generate(&spec)?;
            let mut orchestrator = FleetOrchestrator::new("fleet", scenario.grid.clone(), &config);
            let robots = scenario.install(&mut orchestrator)?;
            info!("Generated scenario (seed {}) with {} robots", spec.seed, robots.len());
            orchestrator
        }
    };
    if orchestrator.robot_count() == 0 {
        seed_demo_robots(&mut orchestrator);
    }

    let (event_sender, event_receiver) = mpsc::channel(1024);
    let event_store = Arc::new(FileEventStore::new("journal"));
    let mut event_actor = FleetEventActor::new(event_store, event_receiver);
    let projections = event_actor.projection_store();
    let journal = tokio::spawn(async move { event_actor.run().await });

    let tick_interval = Duration::from_millis(config.simulation.tick_interval_ms);
    let (service, commands) = FleetService::new(orchestrator, logger, tick_interval);
    let mut service = service.with_event_channel(event_sender);
    if let Some(path) = config.logging.report_file.as_deref() {
        let sink: Arc<dyn TickReportSink> = Arc::new(JsonLinesReportSink::create(path).await?);
        service = service.with_report_sink(sink);
    }

    let runner = tokio::spawn(service.run(Some(DEMO_TICKS)));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down fleet traffic engine");
            if let Err(e) = commands.shutdown().await {
                warn!("Service already stopped: {}", e);
            }
        }
        _ = commands.closed() => {}
    }

    match runner.await? {
        Ok(orchestrator) => info!(
            "Finished at tick {} with {} robots",
            orchestrator.current_tick(),
            orchestrator.robot_count()
        ),
        Err(e) => error!("Fleet service failed: {}", e),
    }
    drop(commands);
    if let Err(e) = journal.await {
        error!("Event journal task failed: {}", e);
    }

    let store = projections.read().await;
    info!(
        "Journal: {} robots spawned, {} tasks completed, {} conflicts resolved",
        store.fleet_overview.robots_spawned, store.fleet_overview.tasks_completed, store.fleet_overview.conflicts_resolved
    );
    Ok(())
}

/// A layout without robots gets one robot per corner crossing to the opposite corner.
fn seed_demo_robots(orchestrator: &mut FleetOrchestrator) {
    let grid: &GridMap = orchestrator.grid();
    let (w, h) = (grid.width() as i32 - 1, grid.height() as i32 - 1);
    let corners = [
        (Cell::new(0, 0), Cell::new(w, h)),
        (Cell::new(w, h), Cell::new(0, 0)),
        (Cell::new(w, 0), Cell::new(0, h)),
        (Cell::new(0, h), Cell::new(w, 0)),
    ];
    for (priority, (start, target)) in corners.into_iter().enumerate() {
        let spawned = orchestrator
            .spawn_robot(start)
            .and_then(|robot_id| orchestrator.assign_task(robot_id, target, Some(priority as u32)));
        if let Err(e) = spawned {
            warn!("Skipped demo robot at {}: {}", start, e);
        }
    }
}

