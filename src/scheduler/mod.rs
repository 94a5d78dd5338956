//! Placement filters: a type-keyed registry of admission predicates.

mod host;
mod label;
mod multi;

pub use host::HostScheduler;
pub use label::LabelScheduler;
pub use multi::MultiScheduler;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ClusterResult;
use crate::model::{Engine, Image};

/// A filter with the contract `schedule(image, engine) -> ok`. `ok == true`
/// means the engine is admissible for the image.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, image: &Image, engine: &Engine) -> ClusterResult<bool>;
}

/// Maps an image's type tag to the scheduler chain that governs it.
///
/// Carries no internal synchronization of its own: §5 puts the scheduler map
/// under the cluster aggregator's single exclusive lock alongside the engine
/// map and container cache, so this type is embedded in `cluster::ClusterState`
/// and only ever touched from behind that one lock.
#[derive(Default)]
pub struct SchedulerRegistry {
    schedulers: HashMap<String, Arc<dyn Scheduler>>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any prior entry for the same tag atomically (a single map
    /// insert, already atomic under the caller's lock).
    pub fn register(&mut self, type_tag: impl Into<String>, scheduler: Arc<dyn Scheduler>) {
        self.schedulers.insert(type_tag.into(), scheduler);
    }

    pub fn get(&self, type_tag: &str) -> Option<Arc<dyn Scheduler>> {
        self.schedulers.get(type_tag).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    struct AlwaysTrue;
    impl Scheduler for AlwaysTrue {
        fn schedule(&self, _image: &Image, _engine: &Engine) -> ClusterResult<bool> {
            Ok(true)
        }
    }

    #[test]
    fn register_replaces_prior_entry_for_same_tag() {
        let mut registry = SchedulerRegistry::new();
        registry.register("service", Arc::new(AlwaysTrue));
        assert!(registry.get("service").is_some());

        struct AlwaysFalse;
        impl Scheduler for AlwaysFalse {
            fn schedule(&self, _image: &Image, _engine: &Engine) -> ClusterResult<bool> {
                Ok(false)
            }
        }
        registry.register("service", Arc::new(AlwaysFalse));

        let image = Image::new("x", 1.0, 1.0, "service");
        let engine = Engine::new("e", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert_eq!(
            registry.get("service").unwrap().schedule(&image, &engine).unwrap(),
            false
        );
    }

    #[test]
    fn get_on_unregistered_tag_is_none() {
        let registry = SchedulerRegistry::new();
        assert!(registry.get("batch").is_none());
    }
}
