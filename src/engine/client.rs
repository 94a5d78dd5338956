//! One engine's connection to its container runtime.
//!
//! Grounded on the teacher's `environment/docker/{environment,container,power}.rs`:
//! a `bollard::Docker` handle owned alongside connection state, lifecycle
//! operations split into focused functions, `DockerResponseServerError` status
//! codes matched explicitly rather than stringly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig, PortBinding};
use bollard::system::EventsOptions;
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};
use crate::events::{Event, EventHandler};
use crate::model::{self, Container, Engine, EngineState, Port};

const CONNECT_TIMEOUT_SECONDS: u64 = 30;

/// One engine's connection. Owns the `bollard::Docker` handle used for every
/// call this engine makes; `connected` gates all of them per §4.1's
/// "an engine whose Connect has not succeeded fails every operation with
/// NotConnected".
pub struct EngineClient {
    engine: Engine,
    docker: Docker,
    connected: AtomicBool,
}

impl EngineClient {
    /// Builds a client for `engine` without connecting. The underlying
    /// `bollard::Docker` handle is created eagerly (it is a thin, cheaply
    /// cloneable wrapper over a connection pool) but no request is made
    /// until [`EngineClient::connect`].
    pub fn new(engine: Engine) -> ClusterResult<Self> {
        let docker = Docker::connect_with_http(
            engine.address.as_str(),
            CONNECT_TIMEOUT_SECONDS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(ClusterError::Transport)?;

        Ok(Self {
            engine,
            docker,
            connected: AtomicBool::new(false),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Probes the runtime with a version call; marks the engine connected
    /// only if the probe succeeds.
    pub async fn connect(&self) -> ClusterResult<()> {
        self.docker
            .version()
            .await
            .map_err(|_| ClusterError::NotConnected(self.engine.id.clone()))?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_connected(&self) -> ClusterResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClusterError::NotConnected(self.engine.id.clone()))
        }
    }

    /// `(engine, listContainers(all=false))`.
    pub async fn state(&self) -> ClusterResult<EngineState> {
        let containers = self.list_containers(false).await?;
        Ok(EngineState {
            engine: self.engine.clone(),
            containers,
        })
    }

    pub async fn list_containers(&self, all: bool) -> ClusterResult<Vec<Container>> {
        self.ensure_connected()?;

        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(ClusterError::Transport)?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            containers.push(self.convert_summary(summary).await?);
        }
        Ok(containers)
    }

    pub async fn list_images(&self) -> ClusterResult<Vec<bollard::models::ImageSummary>> {
        self.ensure_connected()?;
        self.docker
            .list_images(None::<bollard::image::ListImagesOptions<String>>)
            .await
            .map_err(ClusterError::Transport)
    }

    /// Container descriptor conversion, §4.2. Ports come straight off the
    /// list summary; the image's type/labels/environment require a second
    /// round trip (`InspectContainer`) to read the full env list.
    async fn convert_summary(&self, summary: ContainerSummary) -> ClusterResult<Container> {
        let id = summary.id.clone().unwrap_or_default();

        let ports = summary
            .ports
            .unwrap_or_default()
            .into_iter()
            .map(|p| Port {
                proto: p
                    .typ
                    .map(|t| format!("{:?}", t).to_lowercase())
                    .unwrap_or_default(),
                host_ip: p.ip,
                port: p.public_port.unwrap_or(0),
                container_port: p.private_port,
            })
            .collect();

        let mut container = self.inspect_container(&id).await?;
        container.ports = ports;
        container.image.name = summary.image.unwrap_or(container.image.name);
        container.state = summary.state.unwrap_or(container.state);
        Ok(container)
    }

    /// Resolves one container id to a full domain `Container` by inspecting
    /// it and splitting its environment per §4.2.
    pub async fn inspect_container(&self, id: &str) -> ClusterResult<Container> {
        let info = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(ClusterError::Transport)?;

        let config = info.config.clone().unwrap_or_default();
        let host_config = info.host_config.clone().unwrap_or_default();

        let env = config.env.clone().unwrap_or_default();
        let split = model::split_env(&env);

        let cpu_shares = host_config.cpu_shares.unwrap_or(0) as f64;
        let cpus = cpu_shares / 100.0 * self.engine.cpus;
        let memory_bytes = host_config.memory.unwrap_or(0).max(0) as f64;
        let memory = (memory_bytes / 1024.0 / 1024.0).floor();

        let image = crate::model::Image {
            name: config.image.clone().unwrap_or_default(),
            cpus,
            memory,
            type_tag: split.type_tag,
            labels: split.labels,
            environment: split.environment,
            hostname: config.hostname.clone().unwrap_or_default(),
            domainname: config.domainname.clone().unwrap_or_default(),
            args: config.cmd.clone().unwrap_or_default(),
            ports: Vec::new(),
            publish_all_ports: false,
            container_name: None,
        };

        Ok(Container {
            id: info.id.unwrap_or_else(|| id.to_string()),
            engine_id: self.engine.id.clone(),
            name: info.name.clone(),
            image,
            ports: Vec::new(),
            state: info
                .state
                .and_then(|s| s.status)
                .map(|s| format!("{:?}", s).to_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// Creates (if absent) and starts `container`'s image, pulling first
    /// when `pull` is set and the image is not present locally.
    pub async fn start(&self, container: &mut Container, pull: bool) -> ClusterResult<()> {
        self.ensure_connected()?;

        if pull && !self.image_exists(&container.image.name).await? {
            self.pull_image(&container.image.name).await?;
        }

        let id = match &container.name {
            Some(name) => match self.find_id_by_name(name).await? {
                Some(id) => id,
                None => self.create_container(container).await?,
            },
            None => self.create_container(container).await?,
        };

        self.docker
            .start_container(&id, None::<StartContainerOptions<String>>)
            .await
            .map_err(ClusterError::Transport)?;

        container.id = id;
        container.state = "running".to_string();
        Ok(())
    }

    async fn find_id_by_name(&self, name: &str) -> ClusterResult<Option<String>> {
        match self.docker.inspect_container(name, None).await {
            Ok(info) => Ok(info.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(ClusterError::Transport(e)),
        }
    }

    async fn image_exists(&self, image: &str) -> ClusterResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(ClusterError::Transport(e)),
        }
    }

    async fn pull_image(&self, image: &str) -> ClusterResult<()> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(ClusterError::Transport)?;
        }
        Ok(())
    }

    async fn create_container(&self, container: &Container) -> ClusterResult<String> {
        let image = &container.image;

        let env: Vec<String> = image
            .environment
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for port in &image.ports {
            let key = format!("{}/{}", port.container_port, port.proto);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: port.host_ip.clone(),
                    host_port: Some(port.port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            publish_all_ports: Some(image.publish_all_ports),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.name.clone()),
            env: Some(env),
            cmd: Some(image.args.clone()),
            hostname: if image.hostname.is_empty() {
                None
            } else {
                Some(image.hostname.clone())
            },
            domainname: if image.domainname.is_empty() {
                None
            } else {
                Some(image.domainname.clone())
            },
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = container.name.as_deref().map(|name| CreateContainerOptions {
            name,
            platform: None,
        });

        let result = self
            .docker
            .create_container(options, config)
            .await
            .map_err(ClusterError::Transport)?;

        Ok(result.id)
    }

    pub async fn stop(&self, container: &Container) -> ClusterResult<()> {
        self.ensure_connected()?;
        self.docker
            .stop_container(&container.id, None::<StopContainerOptions>)
            .await
            .map_err(ClusterError::Transport)
    }

    pub async fn kill(&self, container: &Container, signal: &str) -> ClusterResult<()> {
        self.ensure_connected()?;
        let options = KillContainerOptions { signal };
        self.docker
            .kill_container(&container.id, Some(options))
            .await
            .map_err(ClusterError::Transport)
    }

    pub async fn restart(&self, container: &Container, timeout_seconds: i64) -> ClusterResult<()> {
        self.ensure_connected()?;
        let options = RestartContainerOptions {
            t: timeout_seconds as isize,
        };
        self.docker
            .restart_container(&container.id, Some(options))
            .await
            .map_err(ClusterError::Transport)
    }

    pub async fn remove(&self, container: &Container) -> ClusterResult<()> {
        self.ensure_connected()?;
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .docker
            .remove_container(&container.id, Some(options))
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(ClusterError::Transport(e)),
        }
    }

    /// Opens the runtime's event stream and invokes `handler` for each
    /// event, resolving its container by inspection. Runs until the
    /// transport closes or `cancel` fires.
    pub async fn events(
        &self,
        handler: Arc<dyn EventHandler>,
        cancel: CancellationToken,
    ) -> ClusterResult<()> {
        self.ensure_connected()?;

        let options = EventsOptions::<String> {
            ..Default::default()
        };
        let mut stream = self.docker.events(Some(options));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("event stream for engine {} cancelled", self.engine.id);
                    break;
                }
                next = stream.next() => {
                    match next {
                        None => break,
                        Some(Err(e)) => {
                            warn!("event stream for engine {} failed: {}", self.engine.id, e);
                            break;
                        }
                        Some(Ok(message)) => {
                            let Some(container_id) = message.actor.as_ref().and_then(|a| a.id.clone()) else {
                                continue;
                            };

                            match self.inspect_container(&container_id).await {
                                Ok(container) => {
                                    let event = Event {
                                        kind: message.typ.map(|t| format!("{:?}", t)).unwrap_or_default(),
                                        action: message.action.unwrap_or_default(),
                                        time: message
                                            .time
                                            .and_then(|t| chrono::DateTime::from_timestamp(t, 0))
                                            .unwrap_or_else(Utc::now),
                                        container,
                                    };
                                    handler.handle(event).await;
                                }
                                Err(e) => {
                                    warn!(
                                        "failed to resolve container {} for engine {} event: {}",
                                        container_id, self.engine.id, e
                                    );
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
