//! Scheduler layer for the agent
//!
//! Timer loops that drive the services: polling the control plane for
//! lifecycle commands, and periodically reporting status and logs.

pub mod poller;
pub mod reporter;

pub use poller::CommandPoller;
pub use reporter::{LogReporter, StatusReporter};
