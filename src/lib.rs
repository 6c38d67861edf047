pub mod adapters;
pub mod application;
pub mod common;
pub mod config;
pub mod domains;

pub use config::Config;

// Re-export common types
pub use common::*;

// Re-export the domain entry points
pub use domains::fleet::{FleetCommand, FleetOrchestrator, FleetSnapshot, RobotStatus, TickReport};
pub use domains::grid_map::{Cell, Connectivity, GridMap};
pub use domains::traffic::{Decision, RobotId};
