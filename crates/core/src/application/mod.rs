// Application Layer - Queue coordination, rebalance policy, worker slots

pub mod queue;
pub mod rebalance;
pub mod worker;

// Re-exports
pub use queue::{Config, Queue};
pub use rebalance::{Decision, RebalanceOutcome};
pub use worker::Worker;
