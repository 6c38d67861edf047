pub mod cell;
pub mod layout;
pub mod map;
pub mod ports;

pub use cell::*;
pub use layout::*;
pub use map::*;
pub use ports::*;
