//! # Worker Daemon
//!
//! Startup sequence shared by every consumer process:
//!
//! 1. run the configured `on_load` hooks, in order, with no arguments; any
//!    resolution or execution failure aborts startup
//! 2. bind and run either the single-process [`Worker`] or the
//!    [`WorkerPoolCoordinator`]
//!
//! Subworkers repeat step 1 themselves since a re-executed process inherits
//! nothing initialised by its parent.

use std::sync::Arc;
use tracing::info;

use crate::config::DispatchConfig;
use crate::error::{DaemonError, DispatchError};
use crate::execution::{
    invoke, Subworker, SubworkerCommand, Worker, WorkerPoolCoordinator, WorkerStats,
};
use crate::lifecycle::ShutdownSignal;
use crate::registry::{CallArgs, FunctionResolver};

/// Resolve and invoke each startup hook in order
pub fn run_startup_hooks(resolver: &FunctionResolver, hooks: &[String]) -> Result<(), DaemonError> {
    for hook in hooks {
        let fatal = |source: DispatchError| DaemonError::StartupHook {
            hook: hook.clone(),
            source,
        };

        let function = resolver.resolve(hook).map_err(|e| fatal(e.into()))?;
        info!(hook = %hook, "Running startup hook");
        invoke(&*function, &CallArgs::default()).map_err(|e| fatal(e.into()))?;
    }
    Ok(())
}

pub struct Daemon {
    config: DispatchConfig,
    resolver: Arc<FunctionResolver>,
    subworker_command: Option<SubworkerCommand>,
}

impl Daemon {
    /// Single-process daemon
    pub fn new(config: DispatchConfig, resolver: Arc<FunctionResolver>) -> Self {
        Self {
            config,
            resolver,
            subworker_command: None,
        }
    }

    /// Switch to multi-process mode, starting subworkers with `command`
    pub fn multiprocess(mut self, command: SubworkerCommand) -> Self {
        self.subworker_command = Some(command);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn is_multiprocess(&self) -> bool {
        self.subworker_command.is_some()
    }

    /// Run on the blocking pool until `shutdown` is requested
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), DaemonError> {
        tokio::task::spawn_blocking(move || self.run_blocking(&shutdown))
            .await
            .map_err(|e| DaemonError::LoopAborted {
                message: e.to_string(),
            })?
    }

    pub fn run_blocking(&self, shutdown: &ShutdownSignal) -> Result<(), DaemonError> {
        run_startup_hooks(&self.resolver, &self.config.worker.on_load)?;

        match &self.subworker_command {
            None => {
                info!(endpoint = %self.config.worker.bind_url(), "Starting single-process worker");
                let worker = Worker::bind(&self.config, Arc::clone(&self.resolver))?;
                worker.run(shutdown);
            }
            Some(command) => {
                info!(
                    endpoint = %self.config.worker.bind_url(),
                    pool_size = self.config.pool.size,
                    "Starting worker pool coordinator"
                );
                let mut coordinator = WorkerPoolCoordinator::start(&self.config, command.clone())?;
                coordinator.run(shutdown);
            }
        }

        info!("Worker daemon stopped");
        Ok(())
    }
}

/// Body of a pooled subworker process
pub fn run_subworker_process(
    config: &DispatchConfig,
    id: usize,
    distribution_url: &str,
    status_url: &str,
    resolver: Arc<FunctionResolver>,
    shutdown: &ShutdownSignal,
) -> Result<WorkerStats, DaemonError> {
    run_startup_hooks(&resolver, &config.worker.on_load)?;

    let subworker = Subworker::connect(
        id,
        distribution_url,
        status_url,
        config.transport.clone(),
        resolver,
    )?
    .with_poll_interval(std::time::Duration::from_millis(config.worker.poll_interval_ms));

    Ok(subworker.run(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ExecutionError, ResolutionError};
    use crate::registry::FunctionRegistry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn resolver_with_hooks(order: Arc<parking_lot::Mutex<Vec<&'static str>>>) -> FunctionResolver {
        let registry = FunctionRegistry::new();
        let first = Arc::clone(&order);
        registry
            .register("app.boot.first", move |_: &CallArgs| {
                first.lock().push("first");
                Ok(json!(null))
            })
            .unwrap();
        let second = Arc::clone(&order);
        registry
            .register("app.boot.second", move |_: &CallArgs| {
                second.lock().push("second");
                Ok(json!(null))
            })
            .unwrap();
        registry
            .register("app.boot.broken", |_: &CallArgs| {
                Err(ExecutionError::failed("cache cold"))
            })
            .unwrap();
        FunctionResolver::new(Arc::new(registry))
    }

    #[test]
    fn test_hooks_run_in_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let resolver = resolver_with_hooks(Arc::clone(&order));

        run_startup_hooks(
            &resolver,
            &["app.boot.second".to_string(), "app.boot.first".to_string()],
        )
        .unwrap();
        assert_eq!(*order.lock(), vec!["second", "first"]);
    }

    #[test]
    fn test_unresolvable_hook_is_fatal() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let resolver = resolver_with_hooks(Arc::clone(&order));

        let err = run_startup_hooks(
            &resolver,
            &["app.boot.missing".to_string(), "app.boot.first".to_string()],
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DaemonError::StartupHook {
                ref hook,
                source: DispatchError::Resolution(ResolutionError::MemberNotFound { .. }),
            } if hook == "app.boot.missing"
        ));
        assert!(order.lock().is_empty());
    }

    #[test]
    fn test_failing_hook_is_fatal() {
        let resolver = resolver_with_hooks(Arc::new(parking_lot::Mutex::new(Vec::new())));
        let err = run_startup_hooks(&resolver, &["app.boot.broken".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            DaemonError::StartupHook {
                source: DispatchError::Execution(_),
                ..
            }
        ));
    }

    #[test]
    fn test_daemon_refuses_to_start_when_a_hook_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = FunctionRegistry::new();
        registry
            .register("app.jobs.work", move |_: &CallArgs| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(true))
            })
            .unwrap();

        let mut config = DispatchConfig::default();
        config.worker.on_load = vec!["app.boot.missing".to_string()];

        let daemon = Daemon::new(config, Arc::new(FunctionResolver::new(Arc::new(registry))));
        let err = daemon.run_blocking(&ShutdownSignal::new()).unwrap_err();
        assert!(matches!(err, DaemonError::StartupHook { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
