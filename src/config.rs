use crate::domains::grid_map::Connectivity;
use crate::domains::traffic::RankOrder;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub negotiation: NegotiationConfig,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Wall-clock pause between ticks in the service loop.
    pub tick_interval_ms: u64,
    /// Simulated seconds per tick.
    pub dt: f64,
    /// Cells per second at speed multiplier 1.0.
    pub base_velocity: f64,
    /// Conflict lookahead in ticks.
    pub planning_horizon: u64,
    /// BFS expansions allowed per planning call before deferring to the next tick.
    pub max_planning_expansions: usize,
    pub parallel_planning: bool,
    pub speed_multiplier: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            dt: 1.0,
            base_velocity: 1.0,
            planning_horizon: 8,
            max_planning_expansions: 1_000_000,
            parallel_planning: true,
            speed_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Consecutive collisions of the same pair before the loser must replan.
    pub wait_bound: u32,
    /// Consecutive waits on the same cell before a robot is flagged stuck.
    pub stuck_threshold: u32,
    /// Whether task priority or first commit tick decides right of way first.
    pub rank_order: RankOrder,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            wait_bound: 2,
            stuck_threshold: 3,
            rank_order: RankOrder::PriorityFirst,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub capacity: f64,
    pub low_threshold: f64,
    pub drain_per_cell: f64,
    pub charge_per_tick: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            low_threshold: 20.0,
            drain_per_cell: 0.5,
            charge_per_tick: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Layout file name resolved by the layout source; falls back to an
    /// open grid of `width` x `height` when unset.
    pub layout: Option<String>,
    pub width: u32,
    pub height: u32,
    pub connectivity: Connectivity,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            layout: None,
            width: 10,
            height: 10,
            connectivity: Connectivity::Four,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: Option<String>,
    pub buffer_capacity: usize,
    /// JSON-lines file receiving one tick report per line.
    pub report_file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            buffer_capacity: 1024,
            report_file: None,
        }
    }
}

impl Config {
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let multiplier = self.simulation.speed_multiplier;
        if !(0.5..=2.0).contains(&multiplier) {
            anyhow::bail!("speed_multiplier must lie in [0.5, 2.0], got {}", multiplier);
        }
        if self.simulation.base_velocity <= 0.0 || self.simulation.dt <= 0.0 {
            anyhow::bail!("base_velocity and dt must be positive");
        }
        if self.battery.low_threshold > self.battery.capacity {
            anyhow::bail!("battery low_threshold exceeds capacity");
        }
        Ok(())
    }
}
