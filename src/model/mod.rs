//! Canonical in-memory entities shared by every component of the cluster.

mod container;
mod convert;
mod engine;
mod image;

pub use container::{Container, Port};
pub use convert::{decode_citadel_labels, parse_image_name, split_env, ParsedImageName};
pub use engine::{ClusterInfo, Engine, EngineState};
pub use image::{validate_image, Image};
