#![allow(clippy::doc_markdown)] // Allow technical terms like ZeroMQ in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Dispatch
//!
//! Lightweight distributed task dispatch over ZeroMQ.
//!
//! ## Overview
//!
//! A producer enqueues named function calls as messages; worker daemons pull
//! those messages and execute the matching function, either in a single
//! process or by fanning jobs out across a pool of subworker processes that
//! report their status back to a coordinator.
//!
//! ## Architecture
//!
//! ```text
//! Producer ─► Dispatcher ──push──► Worker                  (single process)
//!                        └─push──► WorkerPoolCoordinator   (multi-process)
//!                                    ├─push──► Subworker × N
//!                                    └◄─push── status reports
//! ```
//!
//! ## Dispatch Modes
//!
//! - **Disabled**: calls never run; a control message or local log records them
//! - **Eager**: calls run synchronously in the caller, errors propagate
//! - **Queued** (default): calls are pushed to the workers, falling back to
//!   in-process execution when the bus refuses them
//!
//! ## Module Organization
//!
//! - [`messaging`] - Call envelope codec, status reports, bus sockets
//! - [`registry`] - Function registry and cached resolver
//! - [`execution`] - Dispatcher, worker loop, subworker pool and coordinator
//! - [`daemon`] - Startup hooks and daemon run modes
//! - [`lifecycle`] - Signal handling and shutdown
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured logging setup
//! - [`cli`] - Command line entry point
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tasker_dispatch::config::ConfigManager;
//! use tasker_dispatch::execution::Dispatcher;
//! use tasker_dispatch::registry::{CallArgs, FunctionRegistry, FunctionResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = FunctionRegistry::new();
//! registry.register("app.jobs.recalc", |call: &CallArgs| {
//!     let id: i64 = call.kwarg("id")?;
//!     Ok(json!(id))
//! })?;
//! let resolver = Arc::new(FunctionResolver::new(Arc::new(registry)));
//!
//! let manager = ConfigManager::load(None)?;
//! let config = manager.config();
//! let dispatcher = Dispatcher::new(config.dispatch.clone(), config.transport.clone(), resolver);
//!
//! dispatcher.call("app.jobs.recalc").kwarg("id", 7).after(30.0).enqueue()?;
//! # Ok(())
//! # }
//! ```

pub mod builtin;
pub mod cli;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod error;
pub mod execution;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod registry;

pub use config::{ConfigManager, DispatchConfig};
pub use constants::CONTROL_LOG_SENTINEL;
pub use daemon::{run_startup_hooks, Daemon};
pub use error::{
    ConfigurationError, DaemonError, DispatchError, DispatchResult, EnvelopeError, ExecutionError,
    ResolutionError, TransportError,
};
pub use execution::{Dispatcher, EnqueueOutcome, Worker, WorkerPoolCoordinator};
pub use lifecycle::ShutdownSignal;
pub use messaging::{CallEnvelope, StatusReport};
pub use registry::{CallArgs, FunctionRegistry, FunctionResolver, TaskFunction};
