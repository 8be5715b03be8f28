//! # Dispatch Configuration System
//!
//! Settings for producers, worker daemons and the subworker pool, loaded from a
//! YAML file with environment-specific overrides (see [`ConfigManager`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_dispatch::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load(None)?;
//! let bind_url = manager.config().worker.bind_url();
//! let pool_size = manager.config().pool.size;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
pub use crate::error::ConfigurationError;
pub use loader::ConfigManager;

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Root configuration structure mirroring tasker-dispatch.yaml
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Producer-side enqueue behaviour
    pub dispatch: ProducerConfig,

    /// Worker daemon receive endpoint and startup hooks
    pub worker: WorkerConfig,

    /// Multi-process subworker pool
    pub pool: PoolConfig,

    /// Socket tuning shared by every bus connection
    pub transport: TransportConfig,
}

/// Producer (enqueue) configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProducerConfig {
    /// Global kill switch: calls are never executed, only reported
    pub disabled: bool,
    /// Execute every call synchronously in-process
    pub always_eager: bool,
    /// Worker endpoints the fan-out connection connects to
    pub worker_urls: Vec<String>,
}

/// Worker daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub port: u16,
    /// Explicit bind URL; derived from `port` when absent
    pub bind_url: Option<String>,
    /// Fully qualified functions invoked once, in order, before the receive loop
    pub on_load: Vec<String>,
    /// How long a loop waits for a message before re-checking for shutdown
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: defaults::WORKER_PORT,
            bind_url: None,
            on_load: Vec::new(),
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
        }
    }
}

impl WorkerConfig {
    pub fn bind_url(&self) -> String {
        self.bind_url
            .clone()
            .unwrap_or_else(|| defaults::worker_bind_url(self.port))
    }
}

/// Subworker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub size: usize,
    /// Internal endpoint the coordinator distributes jobs on
    pub management_url: String,
    /// Internal endpoint subworkers report job status to
    pub status_report_url: String,
    /// Replace subworkers that exit on their own
    pub respawn_exited: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: defaults::WORKER_POOL_SIZE,
            management_url: defaults::SUBWORKER_MANAGEMENT_URL.to_string(),
            status_report_url: defaults::SUBWORKER_STATUS_REPORT_URL.to_string(),
            respawn_exited: false,
        }
    }
}

/// Socket options applied to bus connections
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub send_hwm: i32,
    pub recv_hwm: i32,
    pub linger_ms: i32,
    /// Only queue messages onto completed connections
    pub immediate: bool,
    /// Pause after connecting so handshakes can complete before the first send
    pub connect_settle_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            send_hwm: defaults::SEND_HWM,
            recv_hwm: defaults::RECV_HWM,
            linger_ms: defaults::LINGER_MS,
            immediate: true,
            connect_settle_ms: defaults::CONNECT_SETTLE_MS,
        }
    }
}

impl DispatchConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool.size == 0 {
            return Err(ConfigurationError::invalid_value(
                "pool.size",
                "pool size must be at least 1",
            ));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.poll_interval_ms",
                "poll interval must be greater than zero",
            ));
        }

        let endpoints = [
            ("worker.bind_url", self.worker.bind_url()),
            ("pool.management_url", self.pool.management_url.clone()),
            ("pool.status_report_url", self.pool.status_report_url.clone()),
        ];
        for (field, endpoint) in &endpoints {
            if endpoint.trim().is_empty() {
                return Err(ConfigurationError::invalid_value(
                    *field,
                    "endpoint must not be empty",
                ));
            }
        }

        if let Some(index) = self
            .dispatch
            .worker_urls
            .iter()
            .position(|url| url.trim().is_empty())
        {
            return Err(ConfigurationError::invalid_value(
                format!("dispatch.worker_urls[{index}]"),
                "endpoint must not be empty",
            ));
        }

        if self.pool.management_url == self.pool.status_report_url {
            return Err(ConfigurationError::invalid_value(
                "pool.status_report_url",
                "status endpoint must differ from the management endpoint",
            ));
        }

        Ok(())
    }
}
