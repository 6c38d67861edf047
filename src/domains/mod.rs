pub mod fleet;
pub mod grid_map;
pub mod logger;
pub mod motion;
pub mod path_planning;
pub mod traffic;

pub use logger::*;
