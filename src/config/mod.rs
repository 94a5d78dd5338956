//! TOML-backed configuration, loaded once at startup.

mod config;

pub use config::{ApiConfig, ClusterConfig, Configuration, DiscoveryConfig, EngineConfig};
