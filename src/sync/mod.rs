//! Incremental sync: the per-collection pull engine and the background
//! orchestrator that schedules it.

pub mod orchestrator;
pub mod pull;

pub use orchestrator::SyncOrchestrator;
pub use pull::{pull_collection, PullStats};
