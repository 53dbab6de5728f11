pub mod format;
pub mod logger;

pub use format::{format_duration, format_percent, format_rate};
pub use logger::init_logging;
