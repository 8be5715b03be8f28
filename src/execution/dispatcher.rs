//! # Dispatcher
//!
//! Producer side of the bus. A [`Dispatcher`] owns the fan-out connection to
//! every configured worker and decides per call whether to suppress it, run it
//! eagerly, or queue it.
//!
//! ## Modes
//!
//! Evaluated in priority order:
//!
//! 1. **Disabled**: nothing runs; a Control Message is sent if the bus takes
//!    it, otherwise the suppression is only logged locally.
//! 2. **Eager**: runs in-process; the function's error is returned to the caller.
//! 3. **Queued**: the envelope is pushed to the workers. If that fails for any
//!    reason the call runs in-process instead and any failure is only logged.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_dispatch::config::{ProducerConfig, TransportConfig};
//! use tasker_dispatch::execution::Dispatcher;
//! use tasker_dispatch::registry::{FunctionRegistry, FunctionResolver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let resolver = Arc::new(FunctionResolver::new(Arc::new(FunctionRegistry::new())));
//! let producer = ProducerConfig {
//!     worker_urls: vec!["tcp://127.0.0.1:5555".to_string()],
//!     ..Default::default()
//! };
//! let dispatcher = Dispatcher::new(producer, TransportConfig::default(), resolver);
//!
//! dispatcher
//!     .call("app.mail.send_email")
//!     .kwarg("to", "a@b.com")
//!     .kwarg("subject", "hi")
//!     .enqueue()?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::executor::JobExecutor;
use crate::config::{ProducerConfig, TransportConfig};
use crate::error::{DispatchError, TransportError};
use crate::messaging::{Args, Bus, CallEnvelope, Kwargs, PushSocket};
use crate::registry::FunctionResolver;

/// What `enqueue` did with a call
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Dispatch is disabled; `notice_sent` tells whether the Control Message went out
    Suppressed { notice_sent: bool },
    /// Eager mode result
    Executed(Value),
    /// Handed to the bus
    Queued,
    /// The bus refused the call and it ran in-process; `result` is `None` if it failed
    ExecutedLocally {
        result: Option<Value>,
        deferral_ignored: bool,
    },
}

pub struct Dispatcher {
    producer: ProducerConfig,
    // Connected on first use, kept for the dispatcher's lifetime
    socket: Mutex<Option<PushSocket>>,
    bus: Bus,
    executor: JobExecutor,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("producer", &self.producer)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(
        producer: ProducerConfig,
        transport: TransportConfig,
        resolver: Arc<FunctionResolver>,
    ) -> Self {
        Self {
            producer,
            socket: Mutex::new(None),
            bus: Bus::new(transport),
            executor: JobExecutor::new(resolver),
        }
    }

    pub fn producer_config(&self) -> &ProducerConfig {
        &self.producer
    }

    pub fn is_connected(&self) -> bool {
        self.socket.lock().is_some()
    }

    /// Start building a call to `function_id`
    pub fn call(&self, function_id: impl Into<String>) -> CallBuilder<'_> {
        CallBuilder {
            dispatcher: self,
            function_id: function_id.into(),
            args: Args::new(),
            kwargs: Kwargs::new(),
            deferral_seconds: 0.0,
            error: None,
        }
    }

    /// Enqueue one call according to the configured mode.
    ///
    /// Returns `Err` only for an invalid envelope or, in eager mode, for a
    /// resolution or execution failure.
    pub fn enqueue(
        &self,
        function_id: &str,
        args: Args,
        kwargs: Kwargs,
        deferral_seconds: f64,
    ) -> Result<EnqueueOutcome, DispatchError> {
        let envelope = CallEnvelope::new(function_id, args, kwargs, deferral_seconds)?;

        if self.producer.disabled {
            return Ok(self.suppress(&envelope));
        }

        if self.producer.always_eager {
            info!(function_id = %function_id, "Running call in eager mode");
            if deferral_seconds > 0.0 {
                warn!(
                    function_id = %function_id,
                    deferral_seconds = deferral_seconds,
                    "Ignoring deferral because eager mode is set"
                );
            }
            return self.executor.execute(&envelope).map(EnqueueOutcome::Executed);
        }

        let failure = match envelope.to_bytes() {
            Ok(payload) => match self.send_payload(&payload) {
                Ok(()) => {
                    debug!(function_id = %function_id, "Call queued");
                    return Ok(EnqueueOutcome::Queued);
                }
                Err(e) => e.to_string(),
            },
            Err(e) => e.to_string(),
        };

        warn!(
            function_id = %function_id,
            reason = %failure,
            "Could not queue call, running it in-process"
        );
        Ok(self.run_locally(&envelope))
    }

    /// Push an encoded envelope to the workers without blocking.
    ///
    /// Connects on first use; a failed connection is retried on the next call.
    pub fn send_payload(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.socket.lock();
        if guard.is_none() {
            let socket = self.bus.push_connect(&self.producer.worker_urls)?;
            info!(endpoints = ?socket.endpoints(), "Connected to workers");
            *guard = Some(socket);
        }

        guard
            .as_ref()
            .map_or(Err(TransportError::NoEndpoints), |socket| socket.try_send(payload))
    }

    fn suppress(&self, envelope: &CallEnvelope) -> EnqueueOutcome {
        let notice = CallEnvelope::control_log(
            "Would have called but dispatch is disabled",
            envelope.function_id(),
        );

        let sent = notice
            .to_bytes()
            .map_err(|e| e.to_string())
            .and_then(|payload| self.send_payload(&payload).map_err(|e| e.to_string()));

        match sent {
            Ok(()) => EnqueueOutcome::Suppressed { notice_sent: true },
            Err(reason) => {
                info!(
                    function_id = %envelope.function_id(),
                    reason = %reason,
                    "Would have sent call but dispatch is disabled"
                );
                EnqueueOutcome::Suppressed { notice_sent: false }
            }
        }
    }

    fn run_locally(&self, envelope: &CallEnvelope) -> EnqueueOutcome {
        let deferral_ignored = envelope.deferral_seconds() > 0.0;
        if deferral_ignored {
            warn!(
                function_id = %envelope.function_id(),
                deferral_seconds = envelope.deferral_seconds(),
                "Ignoring deferral because the call is being run in-process"
            );
        }

        let result = match self.executor.execute(envelope) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    function_id = %envelope.function_id(),
                    error = %e,
                    "In-process fallback execution failed"
                );
                None
            }
        };

        EnqueueOutcome::ExecutedLocally {
            result,
            deferral_ignored,
        }
    }
}

/// Fluent builder for one call, created by [`Dispatcher::call`]
#[must_use = "a call does nothing until `enqueue` is called"]
pub struct CallBuilder<'a> {
    dispatcher: &'a Dispatcher,
    function_id: String,
    args: Args,
    kwargs: Kwargs,
    deferral_seconds: f64,
    error: Option<DispatchError>,
}

impl<'a> CallBuilder<'a> {
    /// Append a positional argument
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        let name = format!("#{}", self.args.len());
        match serde_json::to_value(value) {
            Ok(value) => self.args.push(value),
            Err(e) => self.record_error(name, e),
        }
        self
    }

    /// Set a named argument
    pub fn kwarg<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Self {
        let name = name.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.kwargs.insert(name, value);
            }
            Err(e) => self.record_error(name, e),
        }
        self
    }

    /// Requested execution delay; carried on the wire but not enforced
    pub fn after(mut self, seconds: f64) -> Self {
        self.deferral_seconds = seconds;
        self
    }

    pub fn enqueue(self) -> Result<EnqueueOutcome, DispatchError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.dispatcher
            .enqueue(&self.function_id, self.args, self.kwargs, self.deferral_seconds)
    }

    fn record_error(&mut self, name: String, error: serde_json::Error) {
        if self.error.is_none() {
            self.error = Some(DispatchError::InvalidArgument {
                name,
                message: error.to_string(),
            });
        }
    }
}
