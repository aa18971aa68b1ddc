//! Driven adapters for the host build.
//!
//! Each adapter implements one or more [port traits](crate::app::ports);
//! the binary wires them into the engine and the monitor session.

pub mod alert_log;
pub mod feed;
pub mod log_sink;
pub mod profile;
pub mod time;
