//! Service layer
//!
//! Services contain the agent's business logic. They orchestrate the
//! container runtime and the registry to move applications through their
//! lifecycle, and derive the status and log snapshots reported off-node.

mod lifecycle;
mod log_collector;
mod reconciler;

// Re-export traits
pub use lifecycle::LifecycleService;

// Re-export implementations
pub use lifecycle::StandardLifecycleService;
pub use log_collector::LogCollector;
pub use reconciler::{StatusReconciler, has_changed};

pub use lifecycle::{LifecycleError, Outcome};
