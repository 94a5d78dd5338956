//! Cluster state aggregator: the single exclusive-lock owner of the engine
//! set, scheduler registry, and container cache (§4.5, §5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineClient;
use crate::error::{ClusterError, ClusterResult};
use crate::events::{Event, EventHandler};
use crate::model::{validate_image, ClusterInfo, Container, Engine, EngineState, Image};
use crate::resource::ResourceManager;
use crate::scheduler::{Scheduler, SchedulerRegistry};

/// Everything protected by the cluster's single exclusive lock: the engine
/// set, the scheduler map, and the last-observed container list per engine.
struct ClusterState {
    engines: HashMap<String, Arc<EngineClient>>,
    schedulers: SchedulerRegistry,
    containers: HashMap<String, Vec<Container>>,
}

impl ClusterState {
    fn new() -> Self {
        Self {
            engines: HashMap::new(),
            schedulers: SchedulerRegistry::new(),
            containers: HashMap::new(),
        }
    }
}

/// Broadcasts engine events to every subscriber. `broadcast` tolerates slow
/// or absent receivers (they simply miss old events rather than stalling a
/// sender), matching §5's "no serialization imposed on the handler" rule.
struct Broadcaster {
    sender: broadcast::Sender<Event>,
}

#[async_trait::async_trait]
impl EventHandler for Broadcaster {
    async fn handle(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

/// Owns the engine set and orchestrates placement, lifecycle, and refresh.
///
/// Internals are `Arc`-wrapped so the background refresh loop and HTTP
/// handlers can share one instance without the caller threading a reference
/// through every layer.
pub struct Cluster {
    state: Mutex<ClusterState>,
    resource_manager: Arc<dyn ResourceManager>,
    events: broadcast::Sender<Event>,
    refresh_cancel: CancellationToken,
    refresh_handle: Mutex<Option<JoinHandle<()>>>,
    event_cancel: CancellationToken,
}

impl Cluster {
    pub fn new(resource_manager: Arc<dyn ResourceManager>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            state: Mutex::new(ClusterState::new()),
            resource_manager,
            events,
            refresh_cancel: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
            event_cancel: CancellationToken::new(),
        })
    }

    pub fn register_scheduler(&self, type_tag: impl Into<String>, scheduler: Arc<dyn Scheduler>) {
        self.state.lock().schedulers.register(type_tag, scheduler);
    }

    /// Adds and connects an engine. Fails with `NotConnected` if the probe
    /// fails, leaving the engine set unchanged.
    pub async fn add_engine(&self, engine: Engine) -> ClusterResult<()> {
        let client = Arc::new(EngineClient::new(engine.clone())?);
        client.connect().await?;

        let mut state = self.state.lock();
        state.engines.insert(engine.id.clone(), client);
        state.containers.insert(engine.id.clone(), Vec::new());
        Ok(())
    }

    pub fn remove_engine(&self, engine_id: &str) {
        let mut state = self.state.lock();
        state.engines.remove(engine_id);
        state.containers.remove(engine_id);
    }

    fn engine_clients(&self) -> Vec<Arc<EngineClient>> {
        self.state.lock().engines.values().cloned().collect()
    }

    fn engine_client(&self, engine_id: &str) -> ClusterResult<Arc<EngineClient>> {
        self.state
            .lock()
            .engines
            .get(engine_id)
            .cloned()
            .ok_or_else(|| ClusterError::EngineMissing(engine_id.to_string()))
    }

    /// Queries every engine in parallel and concatenates results. A single
    /// engine failure fails the whole call (§4.5, §5: a barrier, not a
    /// best-effort fan-out).
    pub async fn list_containers(&self, all: bool) -> ClusterResult<Vec<Container>> {
        let clients = self.engine_clients();

        let mut tasks = Vec::with_capacity(clients.len());
        for client in clients {
            tasks.push(tokio::spawn(async move { client.list_containers(all).await }));
        }

        let mut containers = Vec::new();
        for task in tasks {
            let result = task
                .await
                .map_err(|e| ClusterError::Internal(e.to_string()))??;
            containers.extend(result);
        }
        Ok(containers)
    }

    /// The placement pipeline (§4.5 step 1-7).
    pub async fn start(&self, image: Image, pull: bool) -> ClusterResult<Container> {
        validate_image(&image)?;

        let (scheduler, engines) = {
            let state = self.state.lock();
            let scheduler = state
                .schedulers
                .get(&image.type_tag)
                .ok_or_else(|| ClusterError::NoScheduler(image.type_tag.clone()))?;
            let engines: Vec<Arc<EngineClient>> = state.engines.values().cloned().collect();
            (scheduler, engines)
        };

        let mut accepted = Vec::new();
        for client in &engines {
            if scheduler.schedule(&image, client.engine())? {
                accepted.push(client.state().await?);
            }
        }

        if accepted.is_empty() {
            return Err(ClusterError::NoEligibleEngines);
        }

        let mut container = Container::provisional(image);
        let chosen = self.resource_manager.place_container(&container, accepted)?;

        let client = self.engine_client(&chosen.engine.id)?;
        client.start(&mut container, pull).await?;

        let mut state = self.state.lock();
        state
            .containers
            .entry(chosen.engine.id.clone())
            .or_default()
            .push(container.clone());

        Ok(container)
    }

    /// Starts a container that already has an assigned engine (the HTTP
    /// surface's `POST /containers/{name}/start`, §4.6) — unlike [`Cluster::start`]
    /// this bypasses the placement pipeline entirely and dispatches straight
    /// to the owning engine.
    pub async fn start_existing(&self, container: &Container, pull: bool) -> ClusterResult<String> {
        let client = self.engine_client(&container.engine_id)?;
        let mut container = container.clone();
        client.start(&mut container, pull).await?;
        Ok(container.id)
    }

    async fn with_owning_engine<F, Fut>(&self, container: &Container, op: F) -> ClusterResult<()>
    where
        F: FnOnce(Arc<EngineClient>, Container) -> Fut,
        Fut: std::future::Future<Output = ClusterResult<()>>,
    {
        let client = self.engine_client(&container.engine_id)?;
        op(client, container.clone()).await
    }

    pub async fn kill(&self, container: &Container, signal: &str) -> ClusterResult<()> {
        self.with_owning_engine(container, |client, c| async move { client.kill(&c, signal).await })
            .await
    }

    pub async fn stop(&self, container: &Container) -> ClusterResult<()> {
        self.with_owning_engine(container, |client, c| async move { client.stop(&c).await })
            .await
    }

    pub async fn restart(&self, container: &Container, timeout_seconds: i64) -> ClusterResult<()> {
        self.with_owning_engine(container, |client, c| async move {
            client.restart(&c, timeout_seconds).await
        })
        .await
    }

    pub async fn remove(&self, container: &Container) -> ClusterResult<()> {
        self.with_owning_engine(container, |client, c| async move { client.remove(&c).await })
            .await?;
        let mut state = self.state.lock();
        if let Some(list) = state.containers.get_mut(&container.engine_id) {
            list.retain(|c| c.id != container.id);
        }
        Ok(())
    }

    /// Scans the cached container map for an exact or unambiguous-prefix
    /// match. Returns `None` on no match or on an ambiguous prefix.
    pub fn container_by_id(&self, id: &str) -> Option<Container> {
        let state = self.state.lock();
        let all = state.containers.values().flatten();

        if let Some(exact) = all.clone().find(|c| c.id == id) {
            return Some(exact.clone());
        }

        let mut matches = all.filter(|c| c.id.starts_with(id));
        let first = matches.next()?.clone();
        if matches.next().is_some() {
            None
        } else {
            Some(first)
        }
    }

    /// Looks a container up by its (possibly engine-id-prefixed) name across
    /// the live cluster rather than the refresh cache, consistent with
    /// `ListContainers` always querying engines directly.
    pub async fn container_by_name(&self, name: &str) -> ClusterResult<Option<Container>> {
        let containers = self.list_containers(true).await?;
        let stripped = name.trim_start_matches('/');
        Ok(containers.into_iter().find(|c| {
            c.name.as_deref().map(|n| n.trim_start_matches('/')) == Some(stripped)
                || c.id == stripped
        }))
    }

    /// The HTTP surface's single-container lookup (§4.6): tries an exact
    /// live name/id match first, then falls back to [`Cluster::container_by_id`]'s
    /// cached unambiguous-prefix match, so a client hitting a short container
    /// id still resolves without querying every engine for a full scan.
    pub async fn find_container(&self, selector: &str) -> ClusterResult<Option<Container>> {
        if let Some(container) = self.container_by_name(selector).await? {
            return Ok(Some(container));
        }
        Ok(self.container_by_id(selector))
    }

    pub fn engine_by_id(&self, id: &str) -> Option<Engine> {
        self.state
            .lock()
            .engines
            .get(id)
            .map(|c| c.engine().clone())
    }

    /// Starts an event stream against every engine, fanning each into the
    /// shared broadcast channel. Returns once every task is spawned, not
    /// once they complete (§5).
    pub fn start_events(self: &Arc<Self>) {
        let broadcaster: Arc<dyn EventHandler> = Arc::new(Broadcaster {
            sender: self.events.clone(),
        });

        for client in self.engine_clients() {
            let handler = broadcaster.clone();
            let cancel = self.event_cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = client.events(handler, cancel).await {
                    warn!("event stream for engine {} ended: {}", client.engine().id, e);
                }
            });
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Aggregates advertised and reserved totals across every engine.
    pub async fn cluster_info(&self) -> ClusterResult<ClusterInfo> {
        let clients = self.engine_clients();

        let mut tasks = Vec::with_capacity(clients.len());
        for client in clients {
            tasks.push(tokio::spawn(async move {
                let state = client.state().await?;
                let images = client.list_images().await?;
                ClusterResult::Ok((state, images.len()))
            }));
        }

        let mut per_engine = Vec::with_capacity(tasks.len());
        for task in tasks {
            per_engine.push(
                task.await
                    .map_err(|e| ClusterError::Internal(e.to_string()))??,
            );
        }

        Ok(aggregate_cluster_info(&per_engine))
    }

    /// Starts the background refresh loop: every `period`, calls `State()` on
    /// every engine and replaces its cached container list. A failing engine
    /// keeps its previous cache entry; the loop continues (§4.5, §7).
    pub fn start_refresh(self: &Arc<Self>, period: Duration) {
        let cluster = Arc::clone(self);
        let cancel = self.refresh_cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("refresh loop stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        cluster.refresh_once().await;
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
    }

    async fn refresh_once(&self) {
        let clients = self.engine_clients();
        for client in clients {
            match client.state().await {
                Ok(state) => {
                    self.state
                        .lock()
                        .containers
                        .insert(state.engine.id.clone(), state.containers);
                }
                Err(e) => {
                    warn!("refresh failed for engine {}: {}", client.engine().id, e);
                }
            }
        }
    }

    /// Stops the refresh loop at its next wakeup and cancels every event
    /// stream. In-flight operations run to completion.
    pub fn close(&self) {
        self.refresh_cancel.cancel();
        self.event_cancel.cancel();
        if let Some(handle) = self.refresh_handle.lock().take() {
            handle.abort();
        }
        info!("cluster closed");
    }
}

/// Pure aggregation step of [`Cluster::cluster_info`]: total/reserved
/// cpu/memory plus engine/container/image counts across every
/// `(EngineState, image_count)` pair already fetched from each engine.
fn aggregate_cluster_info(per_engine: &[(EngineState, usize)]) -> ClusterInfo {
    let mut info = ClusterInfo::default();
    for (state, image_count) in per_engine {
        let (reserved_cpus, reserved_memory) = state.reserved();
        info.cpus += state.engine.cpus;
        info.memory += state.engine.memory;
        info.engine_count += 1;
        info.container_count += state.containers.len();
        info.image_count += image_count;
        info.reserved_cpus += reserved_cpus;
        info.reserved_memory += reserved_memory;
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Image;
    use url::Url;

    #[test]
    fn container_by_id_on_empty_cache_is_none() {
        let cluster_state = ClusterState::new();
        assert!(cluster_state.containers.is_empty());
    }

    fn engine_state(id: &str, cpus: f64, memory: f64, reservations: &[(f64, f64)]) -> EngineState {
        let engine = Engine::new(id, Url::parse("http://h:4242").unwrap(), cpus, memory);
        let containers = reservations
            .iter()
            .map(|&(c, m)| Container::provisional(Image::new("x", c, m, "service")))
            .collect();
        EngineState { engine, containers }
    }

    /// §8 scenario 6: two engines, advertised totals (1+1 cpu, 2048+2048 mb),
    /// A running 2 containers reserving (0.5, 512) total, B running 1
    /// reserving (0.2, 128) — expect the aggregate cluster info exactly.
    #[test]
    fn aggregate_cluster_info_matches_worked_example() {
        let a = engine_state("A", 1.0, 2048.0, &[(0.3, 256.0), (0.2, 256.0)]);
        let b = engine_state("B", 1.0, 2048.0, &[(0.2, 128.0)]);

        let info = aggregate_cluster_info(&[(a, 3), (b, 2)]);

        assert_eq!(info.cpus, 2.0);
        assert_eq!(info.memory, 4096.0);
        assert_eq!(info.engine_count, 2);
        assert_eq!(info.container_count, 3);
        assert_eq!(info.image_count, 5);
        assert!((info.reserved_cpus - 0.7).abs() < 1e-9);
        assert_eq!(info.reserved_memory, 640.0);
    }

    #[test]
    fn aggregate_cluster_info_empty_is_zeroed() {
        let info = aggregate_cluster_info(&[]);
        assert_eq!(info.engine_count, 0);
        assert_eq!(info.cpus, 0.0);
    }

    fn cluster_with_containers(entries: Vec<(&str, Vec<&str>)>) -> Cluster {
        let mut state = ClusterState::new();
        for (engine_id, ids) in entries {
            let containers = ids
                .into_iter()
                .map(|id| {
                    let mut c = Container::provisional(Image::new("x", 0.1, 64.0, "service"));
                    c.id = id.to_string();
                    c.engine_id = engine_id.to_string();
                    c
                })
                .collect();
            state.containers.insert(engine_id.to_string(), containers);
        }

        Cluster {
            state: Mutex::new(state),
            resource_manager: Arc::new(crate::resource::MostRemainingResourceManager),
            events: broadcast::channel(1).0,
            refresh_cancel: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
            event_cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn container_by_id_matches_exact_id() {
        let cluster = cluster_with_containers(vec![("a", vec!["cafebabe1234"])]);
        assert_eq!(
            cluster.container_by_id("cafebabe1234").map(|c| c.id),
            Some("cafebabe1234".to_string())
        );
    }

    #[test]
    fn container_by_id_matches_unambiguous_prefix() {
        let cluster = cluster_with_containers(vec![("a", vec!["cafebabe1234"])]);
        assert_eq!(
            cluster.container_by_id("cafeb").map(|c| c.id),
            Some("cafebabe1234".to_string())
        );
    }

    #[test]
    fn container_by_id_ambiguous_prefix_is_none() {
        let cluster = cluster_with_containers(vec![("a", vec!["cafebabe1234", "cafebeef5678"])]);
        assert!(cluster.container_by_id("cafeb").is_none());
    }

    #[test]
    fn container_by_id_no_match_is_none() {
        let cluster = cluster_with_containers(vec![("a", vec!["cafebabe1234"])]);
        assert!(cluster.container_by_id("deadbeef").is_none());
    }
}
