//! The telemon server: accepts metric writes over HTTP, aggregates them in a
//! [`telemon_storage::Storage`] backend and journals them to a metric log.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod state;
