//! Shared helpers for the integration suites.
//!
//! Every test gets its own temp directory of `ipc://` endpoints so suites can
//! run in parallel without fighting over TCP ports.

#![allow(dead_code)]

use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tasker_dispatch::config::TransportConfig;
use tasker_dispatch::error::ExecutionError;
use tasker_dispatch::registry::{CallArgs, FunctionRegistry, FunctionResolver};

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn ipc_endpoint(dir: &Path, name: &str) -> String {
    format!("ipc://{}", dir.join(name).display())
}

/// Transport tuned for tests: a longer settle so the first send finds its peer
pub fn test_transport() -> TransportConfig {
    TransportConfig {
        connect_settle_ms: 200,
        ..TransportConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Call counters for the functions in [`counting_resolver`]
#[derive(Debug, Default)]
pub struct CallCounters {
    pub send_email: AtomicUsize,
    pub recalc: AtomicUsize,
}

impl CallCounters {
    pub fn send_email(&self) -> usize {
        self.send_email.load(Ordering::SeqCst)
    }

    pub fn recalc(&self) -> usize {
        self.recalc.load(Ordering::SeqCst)
    }
}

/// Resolver over `app.mail.send_email`, `app.jobs.recalc` and `app.jobs.explode`
pub fn counting_resolver() -> (Arc<FunctionResolver>, Arc<CallCounters>) {
    let counters = Arc::new(CallCounters::default());
    let registry = FunctionRegistry::new();

    let mail = Arc::clone(&counters);
    registry
        .register("app.mail.send_email", move |call: &CallArgs| {
            let to: String = call.kwarg("to")?;
            let subject: String = call.kwarg("subject")?;
            mail.send_email.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"to": to, "subject": subject}))
        })
        .expect("register send_email");

    let jobs = Arc::clone(&counters);
    registry
        .register("app.jobs.recalc", move |call: &CallArgs| {
            let id: i64 = call.kwarg("id")?;
            jobs.recalc.fetch_add(1, Ordering::SeqCst);
            Ok(json!(id))
        })
        .expect("register recalc");

    registry
        .register("app.jobs.explode", |_: &CallArgs| {
            Err(ExecutionError::failed("boom"))
        })
        .expect("register explode");

    (
        Arc::new(FunctionResolver::new(Arc::new(registry))),
        counters,
    )
}
