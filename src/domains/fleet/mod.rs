pub mod actors;
pub mod commands;
pub mod events;
pub mod orchestrator;
pub mod ports;
pub mod projections;
pub mod robot;

pub use actors::*;
pub use commands::*;
pub use events::*;
pub use orchestrator::*;
pub use ports::*;
pub use projections::*;
pub use robot::*;
