//! # Tasker Dispatch Daemon
//!
//! Worker daemon with only the built-in diagnostic tasks registered.
//! Applications that need their own functions embed the library and call
//! [`tasker_dispatch::cli::run`] with their registry instead.

use tasker_dispatch::builtin;
use tasker_dispatch::registry::FunctionRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let registry = FunctionRegistry::new();
    builtin::register(&registry);

    tasker_dispatch::cli::run(registry).await
}
