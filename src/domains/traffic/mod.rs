pub mod conflict;
pub mod negotiation;
pub mod reservation;

pub use conflict::*;
pub use negotiation::*;
pub use reservation::*;
