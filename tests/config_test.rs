//! Configuration Loading Tests
//!
//! Loads the shipped sample configuration and hand-written files from disk.

use std::io::Write;

use tasker_dispatch::config::loader::DEFAULT_CONFIG_PATH;
use tasker_dispatch::error::ConfigurationError;
use tasker_dispatch::{ConfigManager, DispatchConfig};

fn sample_path() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH)
}

#[test]
fn test_sample_config_loads_for_every_environment() {
    for environment in ["development", "test", "production"] {
        let manager = ConfigManager::load_from_file(&sample_path(), environment)
            .unwrap_or_else(|e| panic!("{environment}: {e}"));
        manager.config().validate().unwrap();
        assert_eq!(manager.environment(), environment);
        assert_eq!(manager.source(), Some(sample_path().as_path()));
    }
}

#[test]
fn test_sample_config_environment_sections() {
    let development = ConfigManager::load_from_file(&sample_path(), "development").unwrap();
    assert_eq!(development.config().pool.size, 2);
    assert_eq!(
        development.config().dispatch.worker_urls,
        vec!["tcp://127.0.0.1:5555"]
    );

    let test = ConfigManager::load_from_file(&sample_path(), "test").unwrap();
    assert!(test.config().dispatch.always_eager);
    assert!(test.config().dispatch.worker_urls.is_empty());

    let production = ConfigManager::load_from_file(&sample_path(), "production").unwrap();
    assert_eq!(production.config().pool.size, 8);
    assert!(production.config().pool.respawn_exited);
    assert_eq!(production.config().transport.linger_ms, 1000);
    assert_eq!(production.config().worker.bind_url(), "tcp://0.0.0.0:5555");
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_sections() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "pool:\n  size: 5").unwrap();

    let manager = ConfigManager::load_from_file(file.path(), "development").unwrap();
    let defaults = DispatchConfig::default();
    assert_eq!(manager.config().pool.size, 5);
    assert_eq!(manager.config().worker, defaults.worker);
    assert_eq!(manager.config().transport, defaults.transport);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ConfigManager::load_from_file(&dir.path().join("absent.yaml"), "development")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::FileRead { .. }));
}

#[test]
fn test_invalid_values_fail_when_the_config_is_finished() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "pool:\n  size: 0").unwrap();

    let err = ConfigManager::load_from_file(file.path(), "development")
        .unwrap()
        .finish(|_| None)
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
}
