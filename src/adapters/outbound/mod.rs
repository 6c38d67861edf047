pub mod buffered_logger;
pub mod console_logger;
pub mod file_logger;
pub mod layout_data;
pub mod multi_logger;
pub mod noop_logger;
pub mod report_sink;

pub use buffered_logger::*;
pub use console_logger::*;
pub use file_logger::*;
pub use layout_data::*;
pub use multi_logger::*;
pub use noop_logger::*;
pub use report_sink::*;
