pub mod format;
pub mod signal;
pub mod types;

pub use format::format_value;
pub use signal::shutdown_signal;
pub use types::{Metric, MetricKind, MetricPayload, ValidationError};
