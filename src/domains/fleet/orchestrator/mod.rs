pub mod event_apply;
pub mod orchestrator;
pub mod tick;

pub use orchestrator::*;
