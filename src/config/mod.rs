// src/config/mod.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Backend addresses in registration order.
    #[serde(default)]
    pub backends: Vec<String>,

    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    /// Cap on a buffered inbound request body; larger bodies get 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            backends: Vec::new(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// The pool must be populated before the listener starts, so an empty
    /// backend list is a startup error rather than a 400 on every request.
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            bail!("no backends configured; pass --backends or set backends in the config file");
        }
        if self.upstream_timeout_secs == 0 {
            bail!("upstream_timeout_secs must be at least 1");
        }
        if self.max_body_bytes == 0 {
            bail!("max_body_bytes must be at least 1");
        }
        Ok(())
    }
}

/// Load configuration from a YAML file.
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let config: Config =
        serde_yaml::from_str(&contents).context("failed to parse YAML config")?;
    Ok(config)
}

/// Split a comma-separated backend list, dropping empty fragments.
pub fn parse_backend_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 8080).into()
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_metrics_port() -> u16 {
    9100
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_backends() {
        let backends = parse_backend_list("127.0.0.1:3000, 127.0.0.1:3001,,127.0.0.1:3002 ");
        assert_eq!(
            backends,
            vec!["127.0.0.1:3000", "127.0.0.1:3001", "127.0.0.1:3002"]
        );
    }

    #[test]
    fn empty_backend_list_fails_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_defaults_fill_in() {
        let config: Config = serde_yaml::from_str(
            "backends:\n  - 127.0.0.1:3000\n  - 127.0.0.1:3001\n",
        )
        .unwrap();

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.upstream_timeout_secs, 10);
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert!(!config.metrics.enabled);
        assert!(config.validate().is_ok());
    }
}
