use crate::error::ClusterResult;
use crate::model::{Engine, Image};

use super::Scheduler;

/// Admits an engine iff the image's `host` constraint is absent or equal to
/// the engine's identifier.
pub struct HostScheduler;

impl Scheduler for HostScheduler {
    fn schedule(&self, image: &Image, engine: &Engine) -> ClusterResult<bool> {
        match image.host_constraint() {
            Some(host) => Ok(host == engine.id),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn admits_with_no_host_constraint() {
        let image = Image::new("x", 1.0, 1.0, "service");
        let engine = Engine::new("b", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert!(HostScheduler.schedule(&image, &engine).unwrap());
    }

    #[test]
    fn admits_matching_host() {
        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("host".into(), "b".into());
        let engine = Engine::new("b", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert!(HostScheduler.schedule(&image, &engine).unwrap());
    }

    #[test]
    fn rejects_mismatched_host() {
        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("host".into(), "b".into());
        let engine = Engine::new("a", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert!(!HostScheduler.schedule(&image, &engine).unwrap());
    }
}
