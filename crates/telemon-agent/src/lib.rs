//! The telemon agent: samples runtime statistics into a local store and
//! periodically pushes every stored metric to a telemon server.

pub mod config;
pub mod sender;
pub mod service;

pub use sender::{HttpTransport, MetricSender, RetryPolicy, RetrySender, Transport, WireFormat};
pub use service::CollectionAgent;
