//! Placement requests

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::container::Port;
use crate::error::ClusterError;

/// Reserved label key that pins an [`Image`] to a specific engine id.
///
/// Recognized by [`crate::scheduler::HostScheduler`] and explicitly skipped by
/// [`crate::scheduler::LabelScheduler`].
pub const HOST_LABEL_KEY: &str = "host";

/// A placement request: what to run, and where it may run.
///
/// Immutable once submitted — nothing in the cluster mutates an `Image` after
/// a client hands it to [`crate::cluster::Cluster::start`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    /// Full image reference: registry + repo + tag.
    pub name: String,

    /// Requested CPU cores (fractional).
    pub cpus: f64,

    /// Requested memory in megabytes.
    pub memory: f64,

    /// Selects the scheduler chain registered under this tag (e.g. "service").
    #[serde(rename = "type", default)]
    pub type_tag: String,

    /// Label constraints the placement pipeline must satisfy.
    ///
    /// The reserved key [`HOST_LABEL_KEY`] pins placement to one engine id.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    #[serde(default)]
    pub environment: HashMap<String, String>,

    #[serde(default)]
    pub hostname: String,

    #[serde(default)]
    pub domainname: String,

    /// Command arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,

    /// Requested port bindings, in order.
    #[serde(default)]
    pub ports: Vec<Port>,

    #[serde(default)]
    pub publish_all_ports: bool,

    /// Operator-supplied container name hint.
    #[serde(default)]
    pub container_name: Option<String>,
}

impl Image {
    /// Construct a minimal image for placement. Callers fill in the rest via
    /// struct-update syntax when more fields matter.
    pub fn new(name: impl Into<String>, cpus: f64, memory: f64, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpus,
            memory,
            type_tag: type_tag.into(),
            labels: HashMap::new(),
            environment: HashMap::new(),
            hostname: String::new(),
            domainname: String::new(),
            args: Vec::new(),
            ports: Vec::new(),
            publish_all_ports: false,
            container_name: None,
        }
    }

    /// The value of the reserved `host` label constraint, if set.
    pub fn host_constraint(&self) -> Option<&str> {
        self.labels.get(HOST_LABEL_KEY).map(|s| s.as_str())
    }
}

/// Validates the fields [`crate::cluster::Cluster::start`] depends on.
///
/// Mirrors the upstream `ValidateImage` contract: cpus and memory must be
/// strictly positive, name and type must be non-empty.
pub fn validate_image(image: &Image) -> Result<(), ClusterError> {
    if image.cpus <= 0.0 {
        return Err(ClusterError::ValidationFailed(
            "container cannot have cpus equal to 0".into(),
        ));
    }
    if image.memory <= 0.0 {
        return Err(ClusterError::ValidationFailed(
            "container cannot have memory equal to 0".into(),
        ));
    }
    if image.name.is_empty() {
        return Err(ClusterError::ValidationFailed(
            "container must have an image name".into(),
        ));
    }
    if image.type_tag.is_empty() {
        return Err(ClusterError::ValidationFailed(
            "container must have a type".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_image_accepts_well_formed_image() {
        let image = Image::new("redis:latest", 0.4, 256.0, "service");
        assert!(validate_image(&image).is_ok());
    }

    #[test]
    fn validate_image_rejects_zero_cpus() {
        let image = Image::new("redis:latest", 0.0, 256.0, "service");
        assert!(matches!(
            validate_image(&image),
            Err(ClusterError::ValidationFailed(_))
        ));
    }

    #[test]
    fn validate_image_rejects_zero_memory() {
        let image = Image::new("redis:latest", 0.4, 0.0, "service");
        assert!(validate_image(&image).is_err());
    }

    #[test]
    fn validate_image_rejects_empty_name() {
        let image = Image::new("", 0.4, 256.0, "service");
        assert!(validate_image(&image).is_err());
    }

    #[test]
    fn validate_image_rejects_empty_type() {
        let image = Image::new("redis:latest", 0.4, 256.0, "");
        assert!(validate_image(&image).is_err());
    }

    #[test]
    fn host_constraint_reads_reserved_label() {
        let mut image = Image::new("redis:latest", 0.4, 256.0, "service");
        image.labels.insert("host".into(), "engine-b".into());
        assert_eq!(image.host_constraint(), Some("engine-b"));
    }
}
