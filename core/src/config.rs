//! Serializable connector configuration.
//!
//! [`ConnectorConfig`] carries the plain-data part of a [`ResolutionInput`]: everything except
//! typed plugin objects and a custom accelerator. It loads from JSON and can be overridden from
//! `ACCEL_*` environment variables:
//!
//! | Variable              | Field           | Example   |
//! |-----------------------|-----------------|-----------|
//! | `ACCEL_GPUS`          | `gpus`          | `2`, `0,3`, `-1` |
//! | `ACCEL_NUM_NODES`     | `num_nodes`     | `4`       |
//! | `ACCEL_NUM_PROCESSES` | `num_processes` | `8`       |
//! | `ACCEL_ACCELERATOR`   | `accelerator`   | `ddp`     |
//! | `ACCEL_PRECISION`     | `precision`     | `16`      |
//! | `ACCEL_AMP_BACKEND`   | `amp_backend`   | `apex`    |
//!
//! Values that fail to parse are ignored with a warning.

use crate::connector::{BackendSelection, ResolutionInput};
use crate::env::EnvSnapshot;
use crate::error::{ConnectorError, Result};
use crate::plugins::PluginHint;
use crate::types::{AmpType, GpuRequest, TpuCores};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub const ACCEL_GPUS: &str = "ACCEL_GPUS";
pub const ACCEL_NUM_NODES: &str = "ACCEL_NUM_NODES";
pub const ACCEL_NUM_PROCESSES: &str = "ACCEL_NUM_PROCESSES";
pub const ACCEL_ACCELERATOR: &str = "ACCEL_ACCELERATOR";
pub const ACCEL_PRECISION: &str = "ACCEL_PRECISION";
pub const ACCEL_AMP_BACKEND: &str = "ACCEL_AMP_BACKEND";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub gpus: Option<GpuRequest>,
    pub tpu_cores: Option<TpuCores>,
    pub ipus: Option<usize>,
    pub num_processes: Option<usize>,
    pub num_nodes: usize,
    /// Distributed backend or registered strategy name.
    pub accelerator: Option<String>,
    pub precision: u32,
    pub amp_backend: AmpType,
    pub amp_level: String,
    /// Plugin name hints.
    pub plugins: Vec<String>,
    pub sync_batchnorm: bool,
    pub auto_select_gpus: bool,
    pub benchmark: bool,
    pub deterministic: bool,
    pub replace_sampler_ddp: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            gpus: None,
            tpu_cores: None,
            ipus: None,
            num_processes: None,
            num_nodes: 1,
            accelerator: None,
            precision: 32,
            amp_backend: AmpType::Native,
            amp_level: "O2".to_string(),
            plugins: Vec::new(),
            sync_batchnorm: false,
            auto_select_gpus: false,
            benchmark: false,
            deterministic: false,
            replace_sampler_ddp: true,
        }
    }
}

/// Parses `key` when set; logs and returns `None` on a malformed value.
fn parse_override<T>(env: &EnvSnapshot, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env.get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(key, value = raw, %error, "ignoring invalid configuration override");
            None
        }
    }
}

impl ConnectorConfig {
    /// Loads a configuration from a JSON file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConnectorError::Config`] if the file cannot be read or is not valid JSON.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConnectorError::Config {
            path: path.to_path_buf(),
            message: format!("failed to read file: {e}"),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConnectorError::Config {
            path: path.to_path_buf(),
            message: format!("failed to parse JSON: {e}"),
        })
    }

    /// Applies `ACCEL_*` overrides from `env`.
    pub fn with_env_overrides(mut self, env: &EnvSnapshot) -> Self {
        if let Some(gpus) = parse_override(env, ACCEL_GPUS) {
            self.gpus = Some(gpus);
        }
        if let Some(num_nodes) = parse_override(env, ACCEL_NUM_NODES) {
            self.num_nodes = num_nodes;
        }
        if let Some(num_processes) = parse_override(env, ACCEL_NUM_PROCESSES) {
            self.num_processes = Some(num_processes);
        }
        if let Some(accelerator) = env.get(ACCEL_ACCELERATOR).map(str::trim) {
            if !accelerator.is_empty() {
                self.accelerator = Some(accelerator.to_string());
            }
        }
        if let Some(precision) = parse_override(env, ACCEL_PRECISION) {
            self.precision = precision;
        }
        if let Some(amp_backend) = parse_override(env, ACCEL_AMP_BACKEND) {
            self.amp_backend = amp_backend;
        }
        self
    }
}

impl From<ConnectorConfig> for ResolutionInput {
    fn from(config: ConnectorConfig) -> Self {
        Self {
            num_processes: config.num_processes,
            gpus: config.gpus,
            tpu_cores: config.tpu_cores,
            ipus: config.ipus,
            num_nodes: config.num_nodes,
            backend: config.accelerator.map(BackendSelection::Name),
            auto_select_gpus: config.auto_select_gpus,
            sync_batchnorm: config.sync_batchnorm,
            benchmark: config.benchmark,
            deterministic: config.deterministic,
            replace_sampler_ddp: config.replace_sampler_ddp,
            precision: config.precision,
            amp_backend: config.amp_backend,
            amp_level: config.amp_level,
            plugins: config.plugins.into_iter().map(PluginHint::Name).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: ConnectorConfig = serde_json::from_str(r#"{"gpus": 2}"#).unwrap();
        assert_eq!(config.gpus, Some(GpuRequest::Count(2)));
        assert_eq!(config.num_nodes, 1);
        assert_eq!(config.precision, 32);
        assert!(config.replace_sampler_ddp);
    }

    #[test]
    fn test_gpu_request_forms() {
        let config: ConnectorConfig = serde_json::from_str(r#"{"gpus": -1}"#).unwrap();
        assert_eq!(config.gpus, Some(GpuRequest::All));
        let config: ConnectorConfig = serde_json::from_str(r#"{"gpus": [0, 2]}"#).unwrap();
        assert_eq!(config.gpus, Some(GpuRequest::Ids(vec![0, 2])));
        let config: ConnectorConfig = serde_json::from_str(r#"{"gpus": "1,3"}"#).unwrap();
        assert_eq!(config.gpus, Some(GpuRequest::Ids(vec![1, 3])));
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"accelerator": "ddp", "num_nodes": 2, "precision": 16, "amp_backend": "apex", "plugins": ["fsdp"]}}"#
        )
        .unwrap();
        let config = ConnectorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.accelerator.as_deref(), Some("ddp"));
        assert_eq!(config.num_nodes, 2);
        assert_eq!(config.amp_backend, AmpType::Apex);
        assert_eq!(config.plugins, vec!["fsdp".to_string()]);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            ConnectorConfig::from_json_file(file.path()),
            Err(ConnectorError::Config { .. })
        ));
        assert!(matches!(
            ConnectorConfig::from_json_file("/nonexistent/connector.json"),
            Err(ConnectorError::Config { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvSnapshot::from_pairs([
            (ACCEL_GPUS, "0,1"),
            (ACCEL_NUM_NODES, "3"),
            (ACCEL_ACCELERATOR, "ddp2"),
            (ACCEL_PRECISION, "sixteen"),
            (ACCEL_AMP_BACKEND, "APEX"),
        ]);
        let config = ConnectorConfig::default().with_env_overrides(&env);
        assert_eq!(config.gpus, Some(GpuRequest::Ids(vec![0, 1])));
        assert_eq!(config.num_nodes, 3);
        assert_eq!(config.accelerator.as_deref(), Some("ddp2"));
        assert_eq!(config.precision, 32);
        assert_eq!(config.amp_backend, AmpType::Apex);
    }

    #[test]
    fn test_into_resolution_input() {
        let config = ConnectorConfig {
            accelerator: Some("ddp_spawn".into()),
            plugins: vec!["deepspeed".into()],
            ..ConnectorConfig::default()
        };
        let input = ResolutionInput::from(config);
        assert!(matches!(input.backend, Some(BackendSelection::Name(ref n)) if n == "ddp_spawn"));
        assert!(matches!(&input.plugins[..], [PluginHint::Name(n)] if n == "deepspeed"));
        assert_eq!(input.amp_level, "O2");
    }
}
