//! Worker Pool Integration Tests
//!
//! Starts a coordinator whose subworkers are real `tasker-dispatchd subworker`
//! processes and pushes jobs through the external endpoint.

mod common;

use clap::Parser;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use common::{counting_resolver, ipc_endpoint, test_transport, wait_until};
use tasker_dispatch::cli::{subworker_args, Cli};
use tasker_dispatch::config::ProducerConfig;
use tasker_dispatch::execution::SubworkerCommand;
use tasker_dispatch::{
    ConfigManager, Dispatcher, EnqueueOutcome, ShutdownSignal, WorkerPoolCoordinator,
};

const JOB_COUNT: usize = 10;

fn write_pool_config(dir: &Path) -> std::path::PathBuf {
    let yaml = format!(
        r#"
worker:
  bind_url: {receive}
  poll_interval_ms: 20
pool:
  size: 3
  management_url: {management}
  status_report_url: {status}
transport:
  connect_settle_ms: 200
"#,
        receive = ipc_endpoint(dir, "receive.sock"),
        management = ipc_endpoint(dir, "management.sock"),
        status = ipc_endpoint(dir, "status.sock"),
    );
    let path = dir.join("pool.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[test]
fn test_pool_executes_every_job_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_pool_config(dir.path());
    let output = dir.path().join("jobs.log");

    let cli = Cli::try_parse_from([
        "tasker-dispatchd",
        "--config",
        config_path.to_str().unwrap(),
        "--loglevel",
        "warning",
        "--multiprocess",
    ])
    .unwrap();
    let config = ConfigManager::load_from_file(&config_path, "development")
        .unwrap()
        .config()
        .clone();

    let command = SubworkerCommand::new(
        env!("CARGO_BIN_EXE_tasker-dispatchd"),
        subworker_args(&cli, &config),
    );
    let mut coordinator = WorkerPoolCoordinator::start(&config, command).unwrap();
    assert_eq!(coordinator.pool().len(), 3);
    assert_eq!(coordinator.pool().pids().len(), 3);

    let stats = coordinator.stats();
    let shutdown = ShutdownSignal::new();
    let loop_shutdown = shutdown.clone();
    let handle = thread::spawn(move || {
        coordinator.run(&loop_shutdown);
        coordinator
    });

    let (resolver, _) = counting_resolver();
    let dispatcher = Dispatcher::new(
        ProducerConfig {
            worker_urls: vec![config.worker.bind_url()],
            ..ProducerConfig::default()
        },
        test_transport(),
        resolver,
    );

    let output_path = output.display().to_string();
    for job in 0..JOB_COUNT {
        let outcome = dispatcher
            .enqueue(
                "tasker_dispatch.builtin.append_line",
                Vec::new(),
                json!({"path": output_path, "line": format!("job-{job}")})
                    .as_object()
                    .cloned()
                    .unwrap(),
                0.0,
            )
            .unwrap();
        assert_eq!(outcome, EnqueueOutcome::Queued);
    }

    let finished = wait_until(Duration::from_secs(30), || {
        stats.done() as usize >= JOB_COUNT
    });

    shutdown.request();
    let coordinator = handle.join().expect("coordinator thread panicked");
    assert!(finished, "only {} of {JOB_COUNT} jobs reported done", stats.done());

    assert_eq!(stats.forwarded() as usize, JOB_COUNT);
    assert_eq!(stats.failed(), 0);
    assert_eq!(stats.unrecognized(), 0);
    // Subworkers are killed and reaped once the coordinator stops
    assert!(coordinator.pool().is_empty());

    let contents = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), JOB_COUNT);

    let distinct: BTreeSet<&str> = lines.iter().copied().collect();
    let expected: BTreeSet<String> = (0..JOB_COUNT).map(|job| format!("job-{job}")).collect();
    assert_eq!(
        distinct,
        expected.iter().map(String::as_str).collect::<BTreeSet<_>>()
    );
}

#[test]
fn test_subworker_that_cannot_start_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_pool_config(dir.path());
    let config = ConfigManager::load_from_file(&config_path, "development")
        .unwrap()
        .config()
        .clone();

    let command = SubworkerCommand::new(dir.path().join("no-such-binary"), Vec::<String>::new());
    assert!(WorkerPoolCoordinator::start(&config, command).is_err());
}
