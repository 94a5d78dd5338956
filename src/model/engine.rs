//! Host agents and cluster-wide aggregates

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use super::container::Container;

/// A connected host agent.
///
/// Created when added to the cluster; mutated only by its own refresh and
/// label updates; destroyed on removal. The client that actually talks to
/// the remote runtime lives alongside this in [`crate::engine::EngineClient`]
/// — `Engine` itself is the descriptive, cloneable half.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engine {
    pub id: String,
    pub address: Url,
    pub cpus: f64,
    pub memory: f64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Engine {
    pub fn new(id: impl Into<String>, address: Url, cpus: f64, memory: f64) -> Self {
        Self {
            id: id.into(),
            address,
            cpus,
            memory,
            labels: HashMap::new(),
        }
    }

    /// Case-insensitive label lookup, matching the scheduler comparison rule.
    pub fn label(&self, key: &str) -> Option<&str> {
        let key = key.to_lowercase();
        self.labels.get(&key).map(|s| s.as_str())
    }
}

/// A point-in-time snapshot used by the placement pipeline: one engine plus
/// its current container list. Produced on demand by `EngineClient::state`.
#[derive(Debug, Clone)]
pub struct EngineState {
    pub engine: Engine,
    pub containers: Vec<Container>,
}

impl EngineState {
    /// Sum of the cpu/memory reservations of every resident container's image.
    pub fn reserved(&self) -> (f64, f64) {
        self.containers.iter().fold((0.0, 0.0), |(cpus, mem), c| {
            (cpus + c.image.cpus, mem + c.image.memory)
        })
    }
}

/// A read-only aggregate over the whole cluster. Derived; never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cpus: f64,
    pub memory: f64,
    pub engine_count: usize,
    pub container_count: usize,
    pub image_count: usize,
    pub reserved_cpus: f64,
    pub reserved_memory: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_lookup_is_case_insensitive_on_the_key() {
        let mut engine = Engine::new("a", Url::parse("http://h:4242").unwrap(), 1.0, 2048.0);
        engine.labels.insert("env".into(), "Prod".into());
        assert_eq!(engine.label("ENV"), Some("Prod"));
    }
}
