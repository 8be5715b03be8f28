//! # Function Registry
//!
//! Maps qualified function identifiers (`module.path.member`) to callables.
//!
//! ## Overview
//!
//! Rust has no runtime module import, so resolution is backed by an explicit
//! registry. Functions are registered statically at startup, or grouped into
//! modules whose loader runs the first time any of their members is resolved.
//!
//! ```text
//! Registry Infrastructure
//! ├── FunctionRegistry   (module path -> members, lazy module loaders)
//! └── FunctionResolver   (function_id -> callable, process-local cache)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tasker_dispatch::registry::{CallArgs, FunctionRegistry, FunctionResolver};
//!
//! let registry = FunctionRegistry::new();
//! registry
//!     .register("app.math.double", |call: &CallArgs| {
//!         let n: i64 = call.arg(0)?;
//!         Ok(json!(n * 2))
//!     })
//!     .unwrap();
//!
//! let resolver = FunctionResolver::new(Arc::new(registry));
//! let double = resolver.resolve("app.math.double").unwrap();
//! assert_eq!(double.call(&CallArgs::positional(vec![json!(21)])).unwrap(), json!(42));
//! ```

pub mod function_registry;
pub mod resolver;

pub use function_registry::{
    split_function_id, CallArgs, FunctionRegistry, ModuleBuilder, ModuleLoader, TaskFunction,
    TaskResult,
};
pub use resolver::{FunctionResolver, ResolverCacheStats};
