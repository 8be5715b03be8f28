//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, per-environment override merging and
//! `TASKER_DISPATCH_*` environment variable overrides.

use super::{ConfigResult, ConfigurationError, DispatchConfig};
use crate::constants::env_vars;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Default configuration file location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/tasker-dispatch.yaml";

const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: DispatchConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection.
    ///
    /// With no explicit path the default file is used when it exists; otherwise
    /// built-in defaults apply. Environment variable overrides are applied last.
    pub fn load(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();

        let manager = match path {
            Some(path) => Self::load_from_file(path, &environment)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.is_file() {
                    Self::load_from_file(default_path, &environment)?
                } else {
                    debug!("No configuration file found, using defaults");
                    Self::from_config(DispatchConfig::default(), &environment)
                }
            }
        };

        manager.finish(|key| env::var(key).ok())
    }

    /// Load configuration from a YAML file for an explicit environment
    pub fn load_from_file(path: &Path, environment: &str) -> ConfigResult<ConfigManager> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read(path.display().to_string(), e))?;

        let config = Self::parse_yaml(&content, environment, &path.display().to_string())?;

        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            source: Some(path.to_path_buf()),
        })
    }

    /// Build a manager from YAML text (used by tests and embedders)
    pub fn load_from_str(content: &str, environment: &str) -> ConfigResult<ConfigManager> {
        let config = Self::parse_yaml(content, environment, "<inline>")?;
        Ok(ConfigManager {
            config,
            environment: environment.to_string(),
            source: None,
        })
    }

    pub fn from_config(config: DispatchConfig, environment: &str) -> ConfigManager {
        ConfigManager {
            config,
            environment: environment.to_string(),
            source: None,
        }
    }

    /// Apply variable overrides through `lookup`, validate, and freeze
    pub fn finish<F>(mut self, lookup: F) -> ConfigResult<Arc<ConfigManager>>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::apply_overrides(&mut self.config, lookup)?;
        self.config.validate()?;

        info!(
            environment = %self.environment,
            source = %self
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".to_string()),
            disabled = self.config.dispatch.disabled,
            always_eager = self.config.dispatch.always_eager,
            worker_urls = self.config.dispatch.worker_urls.len(),
            "Configuration loaded"
        );

        Ok(Arc::new(self))
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Detect current environment: TASKER_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var(env_vars::ENVIRONMENT)
            .or_else(|_| env::var(env_vars::ENVIRONMENT_FALLBACK))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn parse_yaml(content: &str, environment: &str, origin: &str) -> ConfigResult<DispatchConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::invalid_yaml(origin, e))?;

        // An empty file parses as null
        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data.get(environment).cloned() {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(section);
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                origin,
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    fn apply_overrides<F>(config: &mut DispatchConfig, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_vars::DISABLED) {
            config.dispatch.disabled = parse_bool(env_vars::DISABLED, &value)?;
        }

        if let Some(value) = lookup(env_vars::ALWAYS_EAGER) {
            config.dispatch.always_eager = parse_bool(env_vars::ALWAYS_EAGER, &value)?;
        }

        if let Some(value) = lookup(env_vars::WORKER_URLS) {
            config.dispatch.worker_urls = value
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = lookup(env_vars::BIND_URL) {
            config.worker.bind_url = Some(value);
        }

        if let Some(value) = lookup(env_vars::POOL_SIZE) {
            config.pool.size = value.trim().parse().map_err(|e| {
                ConfigurationError::invalid_value(env_vars::POOL_SIZE, format!("{e}"))
            })?;
        }

        Ok(())
    }
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigurationError::invalid_value(
            field,
            format!("expected a boolean, got '{other}'"),
        )),
    }
}
