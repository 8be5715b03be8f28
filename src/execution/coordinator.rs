//! # Worker Pool Coordinator
//!
//! Fronts a [`SubworkerPool`] behind the externally visible worker endpoint.
//! Raw payloads are forwarded verbatim onto the internal distribution endpoint;
//! the bus hands each one to exactly one connected subworker. Status reports
//! coming back are logged and counted, never reconciled against jobs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::worker_pool::{SubworkerCommand, SubworkerPool};
use crate::config::DispatchConfig;
use crate::error::{DaemonError, TransportError};
use crate::lifecycle::ShutdownSignal;
use crate::messaging::{poll_readable, Bus, ParsedStatus, PullSocket, PushSocket, StatusReport};

/// Upper bound on payloads moved per socket per loop iteration
const MAX_BATCH: usize = 100;

/// Live counters, shareable while the coordinator runs
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    forwarded: AtomicU64,
    done: AtomicU64,
    failed: AtomicU64,
    unrecognized: AtomicU64,
}

impl CoordinatorStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn unrecognized(&self) -> u64 {
        self.unrecognized.load(Ordering::Relaxed)
    }

    /// Status reports of any kind received so far
    pub fn reports(&self) -> u64 {
        self.done() + self.failed() + self.unrecognized()
    }
}

pub struct WorkerPoolCoordinator {
    receiver: PullSocket,
    distributor: PushSocket,
    status: PullSocket,
    _bus: Bus,
    pool: SubworkerPool,
    stats: Arc<CoordinatorStats>,
    poll_interval: Duration,
    // Job waiting for a subworker to connect; nothing new is pulled meanwhile
    pending: Option<Vec<u8>>,
}

impl WorkerPoolCoordinator {
    /// Bind the external, distribution and status endpoints, then start the pool
    pub fn start(config: &DispatchConfig, command: SubworkerCommand) -> Result<Self, DaemonError> {
        let bus = Bus::new(config.transport.clone());

        let receive_url = config.worker.bind_url();
        let receiver = bus.pull_bind(&receive_url)?;
        let distributor = bus.push_bind(&config.pool.management_url)?;
        let status = bus.pull_bind(&config.pool.status_report_url)?;

        let pool = SubworkerPool::spawn(command, config.pool.size, config.pool.respawn_exited)?;

        info!(
            receive_url = %receive_url,
            management_url = %config.pool.management_url,
            status_report_url = %config.pool.status_report_url,
            pool_size = config.pool.size,
            "Worker pool coordinator started"
        );

        Ok(Self {
            receiver,
            distributor,
            status,
            _bus: bus,
            pool,
            stats: Arc::new(CoordinatorStats::default()),
            poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
            pending: None,
        })
    }

    pub fn stats(&self) -> Arc<CoordinatorStats> {
        Arc::clone(&self.stats)
    }

    pub fn pool(&self) -> &SubworkerPool {
        &self.pool
    }

    /// The external endpoint actually bound
    pub fn endpoint(&self) -> String {
        self.receiver.bound_endpoint()
    }

    /// Forward jobs and collect status until `shutdown`, then kill the pool
    pub fn run(&mut self, shutdown: &ShutdownSignal) {
        while !shutdown.is_requested() {
            let ready = match poll_readable(&[&self.receiver, &self.status], self.poll_interval) {
                Ok(ready) => ready,
                Err(e) => {
                    error!(error = %e, "Coordinator poll failed");
                    thread::sleep(self.poll_interval);
                    continue;
                }
            };

            match self.pending.take() {
                Some(payload) => {
                    if self.forward(payload) && ready[0] {
                        self.forward_received();
                    }
                }
                None if ready[0] => self.forward_received(),
                None => {}
            }
            if ready[1] {
                self.collect_status();
            }

            self.pool.check_health();
        }

        info!(
            forwarded = self.stats.forwarded(),
            done = self.stats.done(),
            failed = self.stats.failed(),
            "Coordinator stopping, terminating subworkers"
        );
        if let Some(payload) = self.pending.take() {
            warn!(payload_len = payload.len(), "Dropping job that never reached a subworker");
        }
        self.pool.terminate_all();
    }

    fn forward_received(&mut self) {
        for _ in 0..MAX_BATCH {
            match self.receiver.try_recv() {
                Ok(Some(payload)) => {
                    if !self.forward(payload) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Receive on worker endpoint failed");
                    break;
                }
            }
        }
    }

    /// Hand one payload to the pool.
    ///
    /// Returns `false` when no subworker is connected; the payload is then kept
    /// pending and retried on the next loop iteration, after health checks.
    fn forward(&mut self, payload: Vec<u8>) -> bool {
        match self.distributor.send_timeout(&payload, self.poll_interval) {
            Ok(()) => {
                self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TransportError::NoPeers) => {
                debug!(payload_len = payload.len(), "No subworker connected, holding job");
                self.pending = Some(payload);
                false
            }
            Err(e) => {
                error!(error = %e, payload_len = payload.len(), "Dropping job, forward failed");
                true
            }
        }
    }

    fn collect_status(&self) {
        for _ in 0..MAX_BATCH {
            let bytes = match self.status.try_recv() {
                Ok(Some(bytes)) => bytes,
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "Receive on status endpoint failed");
                    break;
                }
            };

            match StatusReport::parse(&bytes) {
                ParsedStatus::Report(StatusReport::Done(result)) => {
                    self.stats.done.fetch_add(1, Ordering::Relaxed);
                    info!(result = %result, "Subworker finished job");
                }
                ParsedStatus::Report(StatusReport::Failed) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Subworker reported failed job");
                }
                ParsedStatus::Unrecognized(text) => {
                    self.stats.unrecognized.fetch_add(1, Ordering::Relaxed);
                    warn!(status = %text, "Unrecognized status report");
                }
            }
        }
    }
}
