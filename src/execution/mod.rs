//! # Execution
//!
//! Producer and consumer sides of the dispatch engine.
//!
//! ```text
//! Producer ─► Dispatcher ─► Worker (single process)
//!                        └► WorkerPoolCoordinator ─► Subworker × N ─► status back
//! ```

pub mod coordinator;
pub mod dispatcher;
pub mod executor;
pub mod subworker;
pub mod worker;
pub mod worker_pool;

pub use coordinator::{CoordinatorStats, WorkerPoolCoordinator};
pub use dispatcher::{CallBuilder, Dispatcher, EnqueueOutcome};
pub use executor::{invoke, JobExecutor, JobOutcome};
pub use subworker::Subworker;
pub use worker::{Worker, WorkerStats};
pub use worker_pool::{SubworkerCommand, SubworkerHealth, SubworkerPool};
