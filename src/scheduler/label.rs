use crate::error::ClusterResult;
use crate::model::image::HOST_LABEL_KEY;
use crate::model::{Engine, Image};

use super::Scheduler;

/// Admits an engine if the image has no label constraints, or every
/// constraint other than the reserved `host` key matches the engine's label
/// of the same key, case-insensitively on both sides.
pub struct LabelScheduler;

impl Scheduler for LabelScheduler {
    fn schedule(&self, image: &Image, engine: &Engine) -> ClusterResult<bool> {
        for (key, value) in &image.labels {
            if key == HOST_LABEL_KEY {
                continue;
            }
            match engine.label(key) {
                Some(engine_value) if engine_value.eq_ignore_ascii_case(value) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn engine_with_label(key: &str, value: &str) -> Engine {
        let mut e = Engine::new("e", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        e.labels.insert(key.to_lowercase(), value.to_lowercase());
        e
    }

    #[test]
    fn admits_with_no_constraints() {
        let image = Image::new("x", 1.0, 1.0, "service");
        let engine = Engine::new("e", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert!(LabelScheduler.schedule(&image, &engine).unwrap());
    }

    #[test]
    fn admits_on_matching_label_case_insensitively() {
        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("Env".into(), "PROD".into());
        let engine = engine_with_label("env", "prod");
        assert!(LabelScheduler.schedule(&image, &engine).unwrap());
    }

    #[test]
    fn rejects_on_mismatched_label() {
        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("env".into(), "prod".into());
        let engine = engine_with_label("env", "dev");
        assert!(!LabelScheduler.schedule(&image, &engine).unwrap());
    }

    #[test]
    fn ignores_host_constraint() {
        let mut image = Image::new("x", 1.0, 1.0, "service");
        image.labels.insert("host".into(), "some-other-engine".into());
        let engine = Engine::new("e", Url::parse("http://h:4242").unwrap(), 1.0, 1.0);
        assert!(LabelScheduler.schedule(&image, &engine).unwrap());
    }
}
