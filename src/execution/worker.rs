//! # Worker Loop
//!
//! Single-process consumer: binds the worker endpoint and handles one envelope
//! at a time, `Idle -> Receiving -> Dispatching -> Idle`, until shutdown.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info};

use super::executor::{JobExecutor, JobOutcome};
use crate::config::{DispatchConfig, TransportConfig};
use crate::error::TransportError;
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{Bus, PullSocket};
use crate::registry::FunctionResolver;

/// Counters collected over one run of a receive loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
    pub control: u64,
}

impl WorkerStats {
    pub fn record(&mut self, outcome: &JobOutcome) {
        self.received += 1;
        match outcome {
            JobOutcome::Completed { .. } => self.completed += 1,
            JobOutcome::Failed { .. } => self.failed += 1,
            JobOutcome::Discarded(_) => self.discarded += 1,
            JobOutcome::Control { .. } => self.control += 1,
        }
    }
}

pub struct Worker {
    socket: PullSocket,
    // Keeps the context alive for as long as the socket
    _bus: Bus,
    executor: JobExecutor,
    poll_interval: Duration,
}

impl Worker {
    /// Bind the configured worker endpoint
    pub fn bind(
        config: &DispatchConfig,
        resolver: Arc<FunctionResolver>,
    ) -> Result<Self, TransportError> {
        Self::bind_to(
            &config.worker.bind_url(),
            config.transport.clone(),
            Duration::from_millis(config.worker.poll_interval_ms),
            resolver,
        )
    }

    pub fn bind_to(
        endpoint: &str,
        transport: TransportConfig,
        poll_interval: Duration,
        resolver: Arc<FunctionResolver>,
    ) -> Result<Self, TransportError> {
        let bus = Bus::new(transport);
        let socket = bus.pull_bind(endpoint)?;

        Ok(Self {
            socket,
            _bus: bus,
            executor: JobExecutor::new(resolver),
            poll_interval,
        })
    }

    /// The endpoint actually bound
    pub fn endpoint(&self) -> String {
        self.socket.bound_endpoint()
    }

    /// Receive and execute envelopes until `shutdown` is requested
    pub fn run(&self, shutdown: &ShutdownSignal) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(endpoint = %self.endpoint(), "Worker loop started");

        while !shutdown.is_requested() {
            match self.socket.recv_timeout(self.poll_interval) {
                Ok(Some(payload)) => {
                    let outcome = self.executor.process_payload(&payload);
                    stats.record(&outcome);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, endpoint = %self.socket.endpoint(), "Receive failed");
                    thread::sleep(self.poll_interval);
                }
            }
        }

        info!(
            received = stats.received,
            completed = stats.completed,
            failed = stats.failed,
            discarded = stats.discarded,
            control = stats.control,
            "Worker loop stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;

    #[test]
    fn test_stats_record_every_outcome_kind() {
        let mut stats = WorkerStats::default();
        stats.record(&JobOutcome::Control {
            message: "m".into(),
            context: "c".into(),
        });
        stats.record(&JobOutcome::Completed {
            function_id: "a.b".into(),
            value: serde_json::Value::Null,
        });
        stats.record(&JobOutcome::Discarded(crate::error::EnvelopeError::EmptyFunctionId));

        assert_eq!(
            stats,
            WorkerStats {
                received: 3,
                completed: 1,
                failed: 0,
                discarded: 1,
                control: 1,
            }
        );
    }

    #[test]
    fn test_run_returns_once_shutdown_is_requested() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = format!("ipc://{}/worker.sock", dir.path().display());
        let resolver = Arc::new(FunctionResolver::new(Arc::new(FunctionRegistry::new())));

        let worker = Worker::bind_to(
            &endpoint,
            TransportConfig::default(),
            Duration::from_millis(10),
            resolver,
        )
        .unwrap();

        let shutdown = ShutdownSignal::new();
        shutdown.request();
        assert_eq!(worker.run(&shutdown), WorkerStats::default());
    }
}
