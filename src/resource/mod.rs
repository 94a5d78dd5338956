//! Resource-aware placement ranking among engines a scheduler already admitted.

use crate::error::{ClusterError, ClusterResult};
use crate::model::{Container, EngineState};

/// Chooses one candidate engine state for a container, given every engine
/// the scheduler registry admitted.
pub trait ResourceManager: Send + Sync {
    fn place_container(
        &self,
        container: &Container,
        candidates: Vec<EngineState>,
    ) -> ClusterResult<EngineState>;
}

/// Prefers the candidate with the most remaining resource after hypothetical
/// placement: remaining = advertised − resident reservations − this image's
/// reservation. Ties break on CPU-remaining, then memory-remaining, then
/// advertised CPU, then engine id — see §4.4's rationale for this order.
///
/// Overcommit is tolerated: a candidate with negative remaining on either
/// dimension can still be chosen if it is the least bad option.
#[derive(Default)]
pub struct MostRemainingResourceManager;

impl ResourceManager for MostRemainingResourceManager {
    fn place_container(
        &self,
        container: &Container,
        candidates: Vec<EngineState>,
    ) -> ClusterResult<EngineState> {
        if candidates.is_empty() {
            return Err(ClusterError::NoEligibleEngines);
        }

        let image = &container.image;

        let best = candidates
            .into_iter()
            .map(|state| {
                let (reserved_cpus, reserved_memory) = state.reserved();
                let remaining_cpus = state.engine.cpus - reserved_cpus - image.cpus;
                let remaining_memory = state.engine.memory - reserved_memory - image.memory;
                (remaining_cpus, remaining_memory, state)
            })
            .max_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| {
                        a.2.engine
                            .cpus
                            .partial_cmp(&b.2.engine.cpus)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .then_with(|| b.2.engine.id.cmp(&a.2.engine.id))
            })
            .map(|(_, _, state)| state)
            .expect("non-empty candidates checked above");

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Image;
    use url::Url;

    fn engine_state(id: &str, cpus: f64, memory: f64) -> EngineState {
        EngineState {
            engine: crate::model::Engine::new(id, Url::parse("http://h:4242").unwrap(), cpus, memory),
            containers: Vec::new(),
        }
    }

    #[test]
    fn empty_candidates_is_no_eligible_engines() {
        let container = Container::provisional(Image::new("x", 0.4, 256.0, "service"));
        let result = MostRemainingResourceManager.place_container(&container, vec![]);
        assert!(matches!(result, Err(ClusterError::NoEligibleEngines)));
    }

    #[test]
    fn ties_on_remaining_break_on_cpu_then_id() {
        let container = Container::provisional(Image::new("x", 0.4, 256.0, "service"));
        let candidates = vec![engine_state("b", 1.0, 2048.0), engine_state("a", 1.0, 2048.0)];
        let chosen = MostRemainingResourceManager
            .place_container(&container, candidates)
            .unwrap();
        assert_eq!(chosen.engine.id, "a");
    }

    #[test]
    fn prefers_engine_with_more_remaining_cpu() {
        let container = Container::provisional(Image::new("x", 0.4, 256.0, "service"));
        let busy = {
            let mut s = engine_state("busy", 2.0, 4096.0);
            s.containers
                .push(Container::provisional(Image::new("y", 1.5, 1024.0, "service")));
            s
        };
        let idle = engine_state("idle", 1.0, 2048.0);
        let chosen = MostRemainingResourceManager
            .place_container(&container, vec![busy, idle])
            .unwrap();
        assert_eq!(chosen.engine.id, "idle");
    }
}
