//! Sync orchestration for idsync.
//!
//! [`SyncOrchestrator`] snapshots the source directory and the target,
//! diffs them with the engine in `idsync-core` and applies the result stage
//! by stage. [`DryRunTarget`] simulates every mutation, and [`SyncReport`]
//! summarizes what a run did.

pub mod config;
pub mod dry_run;
pub mod orchestrator;
pub mod report;

pub use config::{FailurePolicy, SyncConfig, SyncMethod};
pub use dry_run::{placeholder_id, DryRunTarget};
pub use orchestrator::SyncOrchestrator;
pub use report::{SyncFailure, SyncReport, SyncStage};
