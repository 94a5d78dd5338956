use crate::error::ClusterResult;
use crate::model::{Engine, Image};

use super::Scheduler;

/// Composes child schedulers by conjunction, short-circuiting on the first
/// rejection. Child ordering is preserved for determinism.
pub struct MultiScheduler {
    children: Vec<Box<dyn Scheduler>>,
}

impl MultiScheduler {
    pub fn new(children: Vec<Box<dyn Scheduler>>) -> Self {
        Self { children }
    }
}

impl Scheduler for MultiScheduler {
    fn schedule(&self, image: &Image, engine: &Engine) -> ClusterResult<bool> {
        for child in &self.children {
            if !child.schedule(image, engine)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::{HostScheduler, LabelScheduler};
    use url::Url;

    #[test]
    fn admits_only_when_every_child_admits() {
        let multi = MultiScheduler::new(vec![Box::new(LabelScheduler), Box::new(HostScheduler)]);

        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("host".into(), "b".into());

        let a = Engine::new("a", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        let b = Engine::new("b", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);

        assert!(!multi.schedule(&image, &a).unwrap());
        assert!(multi.schedule(&image, &b).unwrap());
    }
}
