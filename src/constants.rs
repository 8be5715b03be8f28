//! # System Constants
//!
//! Reserved identifiers, wire tokens and default endpoints shared by producers,
//! worker daemons and subworkers.

/// Reserved `function_id` marking a Control Message instead of a function call.
///
/// Consumers must check for it before attempting resolution.
pub const CONTROL_LOG_SENTINEL: &str = "tasker_dispatch_log";

/// Separator between module path and member name in a function identifier
pub const FUNCTION_ID_SEPARATOR: char = '.';

/// Status report wire tokens
pub mod status {
    pub const DONE_PREFIX: &str = "done:";
    pub const FAILED: &str = "failed";
}

/// Default endpoints and sizes
pub mod defaults {
    pub const WORKER_PORT: u16 = 5555;
    pub const SUBWORKER_MANAGEMENT_URL: &str = "tcp://127.0.0.1:5556";
    pub const SUBWORKER_STATUS_REPORT_URL: &str = "tcp://127.0.0.1:5557";
    pub const WORKER_POOL_SIZE: usize = 8;
    pub const POLL_INTERVAL_MS: u64 = 100;
    pub const CONNECT_SETTLE_MS: u64 = 100;
    pub const SEND_HWM: i32 = 1000;
    pub const RECV_HWM: i32 = 1000;
    pub const LINGER_MS: i32 = 0;

    /// Bind URL used when only a port is configured
    pub fn worker_bind_url(port: u16) -> String {
        format!("tcp://0.0.0.0:{port}")
    }
}

/// Environment variables consulted by the configuration loader
pub mod env_vars {
    pub const ENVIRONMENT: &str = "TASKER_ENV";
    pub const ENVIRONMENT_FALLBACK: &str = "APP_ENV";
    pub const DISABLED: &str = "TASKER_DISPATCH_DISABLED";
    pub const ALWAYS_EAGER: &str = "TASKER_DISPATCH_ALWAYS_EAGER";
    pub const WORKER_URLS: &str = "TASKER_DISPATCH_WORKER_URLS";
    pub const BIND_URL: &str = "TASKER_DISPATCH_BIND_URL";
    pub const POOL_SIZE: &str = "TASKER_DISPATCH_POOL_SIZE";
}
