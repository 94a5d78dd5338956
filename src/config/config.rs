use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClusterError, ClusterResult};

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    4646
}

fn default_update_interval_seconds() -> u64 {
    10
}

/// HTTP control-plane bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

/// One engine to seed the cluster with at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub id: String,
    pub address: Url,
    pub cpus: f64,
    pub memory: f64,
    #[serde(default)]
    pub labels: std::collections::HashMap<String, String>,
}

/// Cluster-wide settings: the refresh cadence and the initial engine list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_update_interval_seconds")]
    pub update_interval_seconds: u64,
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

/// Discovery-service registration, entirely optional — a daemon with no
/// `[discovery]` table simply never registers itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    pub url: Url,
    pub user: String,
    pub cluster: String,
    pub slave_id: String,
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    60
}

/// Resolved daemon configuration, loaded from a single TOML file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub discovery: Option<DiscoveryConfig>,
}

impl Configuration {
    pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| ClusterError::Internal(format!("reading configuration: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| ClusterError::Internal(format!("parsing configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_configuration() {
        let toml = r#"
            [cluster]
            update_interval_seconds = 5

            [[cluster.engines]]
            id = "a"
            address = "http://10.0.0.1:4242"
            cpus = 2.0
            memory = 4096.0
        "#;

        let config: Configuration = toml::from_str(toml).unwrap();
        assert_eq!(config.api.port, default_api_port());
        assert_eq!(config.cluster.update_interval_seconds, 5);
        assert_eq!(config.cluster.engines.len(), 1);
        assert_eq!(config.cluster.engines[0].id, "a");
        assert!(config.discovery.is_none());
    }

    #[test]
    fn defaults_apply_with_no_tables_present() {
        let config: Configuration = toml::from_str("").unwrap();
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.cluster.update_interval_seconds, 10);
        assert!(config.cluster.engines.is_empty());
    }
}
