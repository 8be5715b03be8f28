//! # Lifecycle and Signal Handling
//!
//! Receive loops are blocking and run off the async runtime, so shutdown is
//! communicated through a shared [`ShutdownSignal`] flag that every loop checks
//! between polls. A tokio task translates SIGINT/SIGTERM into that flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Cloneable shutdown flag shared between the signal listener and the loops
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Resolve once the process receives Ctrl+C or SIGTERM
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C");
        },
        _ = terminate => {
            info!("Received SIGTERM");
        },
    }
}

/// Flip `shutdown` when a termination signal arrives
pub fn spawn_signal_listener(shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown.request();
    })
}
