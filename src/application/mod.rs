pub mod fleet_service;
pub mod scenario;

pub use fleet_service::*;
pub use scenario::*;
