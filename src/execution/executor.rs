//! # Job Executor
//!
//! Envelope handling shared by the single-process worker loop and subworkers:
//! decode, screen out Control Messages, resolve, invoke. Nothing that happens
//! inside a job (bad payload, unknown function, error or panic in the function
//! body) escapes as anything but a [`JobOutcome`].

use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{panic_message, DispatchError, EnvelopeError, ExecutionError};
use crate::messaging::{CallEnvelope, StatusReport};
use crate::registry::{CallArgs, FunctionResolver, TaskFunction};

/// Bytes of an undecodable payload included in the error log
const PAYLOAD_PREVIEW_LEN: usize = 512;

/// What became of one received payload
#[derive(Debug)]
pub enum JobOutcome {
    /// Payload could not be decoded; nothing was executed
    Discarded(EnvelopeError),
    /// Control Message, logged and never resolved
    Control { message: String, context: String },
    Completed { function_id: String, value: Value },
    Failed {
        function_id: String,
        error: DispatchError,
    },
}

impl JobOutcome {
    /// Status a subworker reports for this outcome; `None` when nothing was invoked
    pub fn status_report(&self) -> Option<StatusReport> {
        match self {
            JobOutcome::Completed { value, .. } => Some(StatusReport::from_result(Some(value))),
            JobOutcome::Failed { .. } => Some(StatusReport::Failed),
            JobOutcome::Discarded(_) | JobOutcome::Control { .. } => None,
        }
    }

    pub fn function_id(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { function_id, .. } | JobOutcome::Failed { function_id, .. } => {
                Some(function_id.as_str())
            }
            _ => None,
        }
    }
}

/// Resolves and invokes envelopes against a [`FunctionResolver`]
#[derive(Debug, Clone)]
pub struct JobExecutor {
    resolver: Arc<FunctionResolver>,
}

impl JobExecutor {
    pub fn new(resolver: Arc<FunctionResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<FunctionResolver> {
        &self.resolver
    }

    /// Handle one raw payload pulled off the bus
    pub fn process_payload(&self, payload: &[u8]) -> JobOutcome {
        let envelope = match CallEnvelope::from_bytes(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let preview_len = payload.len().min(PAYLOAD_PREVIEW_LEN);
                error!(
                    error = %e,
                    payload_len = payload.len(),
                    payload = %String::from_utf8_lossy(&payload[..preview_len]),
                    "Discarding undecodable payload"
                );
                return JobOutcome::Discarded(e);
            }
        };

        self.process_envelope(&envelope)
    }

    /// Handle one decoded envelope
    pub fn process_envelope(&self, envelope: &CallEnvelope) -> JobOutcome {
        if let Some((message, context)) = envelope.control_notice() {
            warn!(message = %message, context = %context, "Control message received");
            return JobOutcome::Control { message, context };
        }

        let function_id = envelope.function_id().to_string();
        debug!(
            function_id = %function_id,
            args = envelope.args().len(),
            kwargs = envelope.kwargs().len(),
            deferral_seconds = envelope.deferral_seconds(),
            "Executing job"
        );

        let start_time = Instant::now();
        match self.execute(envelope) {
            Ok(value) => {
                info!(
                    function_id = %function_id,
                    execution_time_ms = start_time.elapsed().as_millis() as u64,
                    result = %value,
                    "Job completed"
                );
                JobOutcome::Completed { function_id, value }
            }
            Err(error) => {
                error!(
                    function_id = %function_id,
                    execution_time_ms = start_time.elapsed().as_millis() as u64,
                    error = %error,
                    error_detail = ?error,
                    "Job failed"
                );
                JobOutcome::Failed { function_id, error }
            }
        }
    }

    /// Resolve and invoke `envelope`, returning the function's own result
    pub fn execute(&self, envelope: &CallEnvelope) -> Result<Value, DispatchError> {
        let function = self.resolver.resolve(envelope.function_id())?;
        let call = CallArgs::from_envelope(envelope);
        Ok(invoke(&*function, &call)?)
    }
}

/// Call `function`, converting a panic into [`ExecutionError::Panicked`]
pub fn invoke(function: &dyn TaskFunction, call: &CallArgs) -> Result<Value, ExecutionError> {
    match panic::catch_unwind(AssertUnwindSafe(|| function.call(call))) {
        Ok(result) => result,
        Err(panic_error) => Err(ExecutionError::panicked(panic_message(&*panic_error))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use crate::messaging::Kwargs;
    use crate::registry::FunctionRegistry;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn executor_with_counter() -> (JobExecutor, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let registry = FunctionRegistry::new();
        registry
            .register("app.mail.send_email", move |call: &CallArgs| {
                counter.fetch_add(1, Ordering::SeqCst);
                let to: String = call.kwarg("to")?;
                Ok(json!(format!("sent to {to}")))
            })
            .unwrap();
        registry
            .register("app.jobs.explode", |_: &CallArgs| panic!("boom"))
            .unwrap();
        registry
            .register("app.jobs.nothing", |_: &CallArgs| Ok(Value::Null))
            .unwrap();
        registry.register_module("app.broken", |_| panic!("import blew up"));

        let resolver = Arc::new(FunctionResolver::new(Arc::new(registry)));
        (JobExecutor::new(resolver), calls)
    }

    fn payload(function_id: &str, kwargs: Value) -> Vec<u8> {
        let kwargs: Kwargs = kwargs.as_object().cloned().unwrap();
        CallEnvelope::new(function_id, vec![], kwargs, 0.0)
            .unwrap()
            .to_bytes()
            .unwrap()
    }

    #[test]
    fn test_completed_job_reports_done() {
        let (executor, calls) = executor_with_counter();
        let outcome =
            executor.process_payload(&payload("app.mail.send_email", json!({"to": "a@b.com"})));

        assert!(matches!(
            &outcome,
            JobOutcome::Completed { value, .. } if value == &json!("sent to a@b.com")
        ));
        assert_eq!(
            outcome.status_report(),
            Some(StatusReport::Done("sent to a@b.com".to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_contained() {
        let (executor, _) = executor_with_counter();

        let missing_arg = executor.process_payload(&payload("app.mail.send_email", json!({})));
        assert!(matches!(
            missing_arg,
            JobOutcome::Failed {
                error: DispatchError::Execution(ExecutionError::InvalidArguments { .. }),
                ..
            }
        ));

        let panicked = executor.process_payload(&payload("app.jobs.explode", json!({})));
        assert!(matches!(
            &panicked,
            JobOutcome::Failed {
                error: DispatchError::Execution(ExecutionError::Panicked { message }),
                ..
            } if message == "boom"
        ));
        assert_eq!(panicked.status_report(), Some(StatusReport::Failed));

        let broken_module = executor.process_payload(&payload("app.broken.job", json!({})));
        assert!(matches!(
            &broken_module,
            JobOutcome::Failed {
                error: DispatchError::Resolution(ResolutionError::ModuleLoadFailed { .. }),
                ..
            }
        ));
        assert_eq!(broken_module.status_report(), Some(StatusReport::Failed));

        let unknown = executor.process_payload(&payload("app.jobs.missing", json!({})));
        assert!(matches!(
            unknown,
            JobOutcome::Failed {
                error: DispatchError::Resolution(ResolutionError::MemberNotFound { .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_empty_result_reports_failed() {
        let (executor, _) = executor_with_counter();
        let outcome = executor.process_payload(&payload("app.jobs.nothing", json!({})));
        assert!(matches!(outcome, JobOutcome::Completed { .. }));
        assert_eq!(outcome.status_report(), Some(StatusReport::Failed));
    }

    #[test]
    fn test_control_message_is_never_resolved() {
        let (executor, _) = executor_with_counter();
        let control = CallEnvelope::control_log("Would have called", "app.mail.send_email")
            .to_bytes()
            .unwrap();

        let outcome = executor.process_payload(&control);
        assert!(matches!(outcome, JobOutcome::Control { .. }));
        assert_eq!(outcome.status_report(), None);
        assert_eq!(executor.resolver().cache_stats().resolutions, 0);
    }

    #[test]
    fn test_garbage_is_discarded() {
        let (executor, calls) = executor_with_counter();
        let outcome = executor.process_payload(b"\x00garbage");
        assert!(matches!(outcome, JobOutcome::Discarded(_)));
        assert_eq!(outcome.status_report(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
