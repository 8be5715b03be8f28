//! # Subworker
//!
//! Runs inside a pooled process: pulls jobs from the coordinator's distribution
//! endpoint, executes them one at a time and pushes exactly one status report
//! per invoked job. Holds no state between jobs beyond its resolver cache.

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::executor::JobExecutor;
use super::worker::WorkerStats;
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{Bus, PullSocket, PushSocket, StatusReport};
use crate::registry::FunctionResolver;

/// How long a status report may wait for the coordinator to accept it
const STATUS_SEND_TIMEOUT: Duration = Duration::from_secs(1);

pub struct Subworker {
    id: usize,
    jobs: PullSocket,
    status: PushSocket,
    _bus: Bus,
    executor: JobExecutor,
    poll_interval: Duration,
}

impl Subworker {
    /// Connect to the coordinator's internal endpoints with a bus of our own
    pub fn connect(
        id: usize,
        distribution_url: &str,
        status_url: &str,
        transport: TransportConfig,
        resolver: Arc<FunctionResolver>,
    ) -> Result<Self, TransportError> {
        let bus = Bus::new(transport);
        let jobs = bus.pull_connect(distribution_url)?;
        let status = bus.push_connect(&[status_url.to_string()])?;

        info!(
            worker_id = id,
            distribution_url = %distribution_url,
            status_url = %status_url,
            "Subworker connected"
        );

        Ok(Self {
            id,
            jobs,
            status,
            _bus: bus,
            executor: JobExecutor::new(resolver),
            poll_interval: Duration::from_millis(crate::constants::defaults::POLL_INTERVAL_MS),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Pull and execute jobs until `shutdown` is requested
    pub fn run(&self, shutdown: &ShutdownSignal) -> WorkerStats {
        let mut stats = WorkerStats::default();
        info!(worker_id = self.id, "Subworker loop started");

        while !shutdown.is_requested() {
            let payload = match self.jobs.recv_timeout(self.poll_interval) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Receive failed");
                    thread::sleep(self.poll_interval);
                    continue;
                }
            };

            let outcome = self.executor.process_payload(&payload);
            stats.record(&outcome);

            if let Some(report) = outcome.status_report() {
                self.report(&report);
            }
        }

        info!(
            worker_id = self.id,
            received = stats.received,
            completed = stats.completed,
            failed = stats.failed,
            "Subworker loop stopped"
        );
        stats
    }

    fn report(&self, report: &StatusReport) {
        let wire = report.to_wire();
        match self.status.send_timeout(wire.as_bytes(), STATUS_SEND_TIMEOUT) {
            Ok(()) => debug!(worker_id = self.id, status = %wire, "Status reported"),
            Err(e) => warn!(
                worker_id = self.id,
                status = %wire,
                error = %e,
                "Status report could not be delivered"
            ),
        }
    }
}
