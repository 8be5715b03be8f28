//! # Command Line Entry Point
//!
//! Shared by the shipped `tasker-dispatchd` binary and by applications that
//! embed the library with their own task functions:
//!
//! ```rust,no_run
//! use tasker_dispatch::registry::{CallArgs, FunctionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = FunctionRegistry::new();
//!     registry.register("app.mail.send_email", |call: &CallArgs| {
//!         let to: String = call.kwarg("to")?;
//!         Ok(serde_json::json!(format!("sent to {to}")))
//!     })?;
//!     tasker_dispatch::cli::run(registry).await
//! }
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigManager, DispatchConfig};
use crate::daemon::{run_subworker_process, Daemon};
use crate::execution::{Dispatcher, SubworkerCommand};
use crate::lifecycle::{spawn_signal_listener, ShutdownSignal};
use crate::logging::{init_logging, LoggingOptions};
use crate::messaging::{Args, Kwargs};
use crate::registry::{FunctionRegistry, FunctionResolver};

/// Linger applied to a one-shot producer so the queued call survives process exit
const ENQUEUE_LINGER_MS: i32 = 1000;

#[derive(Debug, Parser)]
#[command(name = "tasker-dispatchd")]
#[command(about = "Task dispatch worker daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/tasker-dispatch.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(short = 'f', long = "logfile", global = true)]
    pub logfile: Option<PathBuf>,

    /// Log level: debug, info, warning, error or critical
    #[arg(short = 'l', long = "loglevel", default_value = "info", global = true)]
    pub loglevel: String,

    /// Fan jobs out to a pool of subworker processes
    #[arg(long)]
    pub multiprocess: bool,

    /// Number of subworkers in multi-process mode (overrides pool.size)
    #[arg(long = "worker-pool-size")]
    pub worker_pool_size: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand, PartialEq)]
pub enum Commands {
    /// Run the worker daemon (default)
    Serve,

    /// Enqueue one call through the configured dispatch mode
    Enqueue {
        /// Fully qualified function identifier, e.g. app.mail.send_email
        function_id: String,

        /// Positional arguments as a JSON array
        #[arg(long, default_value = "[]")]
        args: String,

        /// Named arguments as a JSON object
        #[arg(long, default_value = "{}")]
        kwargs: String,

        /// Requested delay in seconds (carried, not enforced)
        #[arg(long, default_value_t = 0.0)]
        after: f64,
    },

    /// Internal: run as a pooled subworker
    #[command(hide = true)]
    Subworker {
        #[arg(long)]
        id: usize,

        #[arg(long = "distribution-url")]
        distribution_url: String,

        #[arg(long = "status-url")]
        status_url: String,
    },
}

/// Parse the process arguments and run
pub async fn run(registry: FunctionRegistry) -> anyhow::Result<()> {
    run_with(Cli::parse(), registry).await
}

pub async fn run_with(cli: Cli, registry: FunctionRegistry) -> anyhow::Result<()> {
    init_logging(&LoggingOptions {
        level: cli.loglevel.clone(),
        log_file: cli.logfile.clone(),
    })?;

    let manager = ConfigManager::load(cli.config.as_deref())?;
    let mut config = manager.config().clone();
    let resolver = Arc::new(FunctionResolver::new(Arc::new(registry)));

    match cli.command.clone().unwrap_or(Commands::Serve) {
        Commands::Serve => {
            if let Some(size) = cli.worker_pool_size {
                config.pool.size = size;
                config.validate()?;
            }

            let mut daemon = Daemon::new(config.clone(), resolver);
            if cli.multiprocess {
                let command = SubworkerCommand::current_exe(subworker_args(&cli, &config))
                    .context("locating the daemon executable for subworkers")?;
                daemon = daemon.multiprocess(command);
            }

            let shutdown = ShutdownSignal::new();
            let listener = spawn_signal_listener(shutdown.clone());
            let result = daemon.run(shutdown).await;
            listener.abort();
            result?;
        }

        Commands::Enqueue {
            function_id,
            args,
            kwargs,
            after,
        } => {
            let args: Args = serde_json::from_str(&args).context("--args must be a JSON array")?;
            let kwargs: Kwargs =
                serde_json::from_str(&kwargs).context("--kwargs must be a JSON object")?;

            let mut transport = config.transport.clone();
            transport.linger_ms = transport.linger_ms.max(ENQUEUE_LINGER_MS);
            let dispatcher = Dispatcher::new(config.dispatch.clone(), transport, resolver);

            let outcome = tokio::task::spawn_blocking(move || {
                dispatcher.enqueue(&function_id, args, kwargs, after)
            })
            .await??;

            info!(outcome = ?outcome, "Enqueue finished");
            println!("{outcome:?}");
        }

        Commands::Subworker {
            id,
            distribution_url,
            status_url,
        } => {
            let shutdown = ShutdownSignal::new();
            let listener = spawn_signal_listener(shutdown.clone());
            let loop_shutdown = shutdown.clone();

            let stats = tokio::task::spawn_blocking(move || {
                run_subworker_process(
                    &config,
                    id,
                    &distribution_url,
                    &status_url,
                    resolver,
                    &loop_shutdown,
                )
            })
            .await??;

            listener.abort();
            info!(
                worker_id = id,
                completed = stats.completed,
                failed = stats.failed,
                "Subworker exiting"
            );
        }
    }

    Ok(())
}

/// Arguments that start one subworker; the pool appends `--id <n>`
pub fn subworker_args(cli: &Cli, config: &DispatchConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(path) = &cli.config {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    if let Some(path) = &cli.logfile {
        args.push("--logfile".to_string());
        args.push(path.display().to_string());
    }

    args.extend([
        "--loglevel".to_string(),
        cli.loglevel.clone(),
        "subworker".to_string(),
        "--distribution-url".to_string(),
        config.pool.management_url.clone(),
        "--status-url".to_string(),
        config.pool.status_report_url.clone(),
    ]);
    args
}
