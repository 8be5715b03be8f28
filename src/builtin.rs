//! # Built-in Tasks
//!
//! Diagnostic functions shipped with the daemon binary under the
//! `tasker_dispatch.builtin` module. Useful for smoke-testing a deployment
//! with `tasker-dispatchd enqueue`.

use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::thread;
use std::time::Duration;

use crate::error::ExecutionError;
use crate::registry::{CallArgs, FunctionRegistry, TaskResult};

pub const MODULE: &str = "tasker_dispatch.builtin";

/// Register the built-in module on `registry`; members load on first use
pub fn register(registry: &FunctionRegistry) {
    registry.register_module(MODULE, |module| {
        module
            .function("echo", echo)
            .function("noop", noop)
            .function("fail", fail)
            .function("sleep", sleep)
            .function("append_line", append_line);
        Ok(())
    });
}

/// Return the call's arguments
pub fn echo(call: &CallArgs) -> TaskResult {
    Ok(json!({
        "args": call.args(),
        "kwargs": call.kwargs(),
    }))
}

/// Do nothing; the empty result is reported as failed by subworkers
pub fn noop(_call: &CallArgs) -> TaskResult {
    Ok(Value::Null)
}

pub fn fail(call: &CallArgs) -> TaskResult {
    let message: Option<String> = call.kwarg_opt("message")?;
    Err(ExecutionError::failed(
        message.unwrap_or_else(|| "requested failure".to_string()),
    ))
}

/// Block for `seconds`
pub fn sleep(call: &CallArgs) -> TaskResult {
    let seconds: f64 = call.kwarg("seconds")?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ExecutionError::invalid_arguments(format!(
            "seconds must be a non-negative number, got {seconds}"
        )));
    }
    thread::sleep(Duration::from_secs_f64(seconds));
    Ok(json!(seconds))
}

/// Append `line` to the file at `path` with a single write, so concurrent
/// subworkers never interleave partial lines
pub fn append_line(call: &CallArgs) -> TaskResult {
    let path: String = call.kwarg("path")?;
    let line: String = call.kwarg("line")?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| ExecutionError::failed(format!("cannot open {path}: {e}")))?;
    file
        .write_all(format!("{line}\n").as_bytes())
        .map_err(|e| ExecutionError::failed(format!("write to {path}: {e}")))?;

    Ok(Value::String(line))
}
