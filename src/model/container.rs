//! Running/stopped workloads and their port bindings

use serde::{Deserialize, Serialize};

use super::image::Image;

/// A port binding, either requested (on an [`Image`]) or in effect (on a
/// [`Container`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub proto: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub port: u16,
    pub container_port: u16,
}

/// A workload bound to exactly one engine.
///
/// `engine_id` is a relation-only back-reference (§9 design notes): it is
/// resolved through the cluster's engine map on demand, never owned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    /// Runtime-assigned identifier. Empty until a successful `Start`.
    #[serde(default)]
    pub id: String,

    /// Id of the owning engine. Empty for a provisional container that has
    /// not yet been placed.
    #[serde(default)]
    pub engine_id: String,

    /// Operator-supplied name hint, carried from `Image::container_name`.
    #[serde(default)]
    pub name: Option<String>,

    pub image: Image,

    #[serde(default)]
    pub ports: Vec<Port>,

    #[serde(default = "default_state")]
    pub state: String,
}

fn default_state() -> String {
    "created".to_string()
}

impl Container {
    /// A provisional container for an image, not yet bound to an engine.
    ///
    /// Mirrors step 5 of `Cluster::start`: `Container{image, name}` before
    /// the resource manager has chosen an engine.
    pub fn provisional(image: Image) -> Self {
        let name = image.container_name.clone();
        Self {
            id: String::new(),
            engine_id: String::new(),
            name,
            image,
            ports: Vec::new(),
            state: default_state(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}
