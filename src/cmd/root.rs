//! Main daemon command: seeds the cluster, starts the refresh loop and event
//! fan-in, and serves the HTTP control plane.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

use citadel_cluster::cluster::Cluster;
use citadel_cluster::config::Configuration;
use citadel_cluster::discovery::DiscoveryClient;
use citadel_cluster::model::Engine;
use citadel_cluster::resource::MostRemainingResourceManager;
use citadel_cluster::router;
use citadel_cluster::scheduler::{HostScheduler, LabelScheduler, MultiScheduler};

pub async fn run(config_path: &str) -> Result<()> {
    info!("loading configuration from {}", config_path);
    let config = Configuration::load(config_path)?;

    let cluster = Cluster::new(Arc::new(MostRemainingResourceManager));

    cluster.register_scheduler(
        "service",
        Arc::new(MultiScheduler::new(vec![
            Box::new(LabelScheduler),
            Box::new(HostScheduler),
        ])),
    );

    for engine_config in &config.cluster.engines {
        let engine = Engine {
            id: engine_config.id.clone(),
            address: engine_config.address.clone(),
            cpus: engine_config.cpus,
            memory: engine_config.memory,
            labels: engine_config.labels.clone(),
        };

        match cluster.add_engine(engine).await {
            Ok(()) => info!("connected engine {}", engine_config.id),
            Err(e) => warn!("failed to connect engine {}: {}", engine_config.id, e),
        }
    }
    info!("cluster seeded with {} engine(s)", config.cluster.engines.len());

    cluster.start_refresh(Duration::from_secs(config.cluster.update_interval_seconds));
    cluster.start_events();

    if let Some(discovery) = &config.discovery {
        let client = Arc::new(DiscoveryClient::new(
            discovery.url.clone(),
            discovery.user.clone(),
            discovery.cluster.clone(),
        ));
        spawn_discovery_renewal(client, discovery.clone(), config.api.clone());
    }

    let app = router::build_router(cluster.clone());
    let bind_addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;

    info!("starting HTTP control plane on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    let shutdown_cluster = cluster.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        warn!("received shutdown signal, closing cluster");
        shutdown_cluster.close();
    });

    server.await?;
    info!("control plane stopped");
    Ok(())
}

/// Resolves on SIGINT or, on unix targets, SIGTERM — a plain `kill` sends
/// the latter and must still close the cluster cleanly.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install SIGINT handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("failed to install SIGTERM handler: {}", e),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Renews the discovery-service registration on a cadence below the
/// configured TTL — renewal is the caller's responsibility per §6; the
/// client itself performs one request per call.
fn spawn_discovery_renewal(
    client: Arc<DiscoveryClient>,
    discovery: citadel_cluster::config::DiscoveryConfig,
    api: citadel_cluster::config::ApiConfig,
) {
    tokio::spawn(async move {
        let self_address = match url::Url::parse(&format!("http://{}:{}", api.host, api.port)) {
            Ok(u) => u,
            Err(e) => {
                error!("invalid self address for discovery registration: {}", e);
                return;
            }
        };

        let renewal_period = Duration::from_secs((discovery.ttl_seconds / 2).max(1));
        let mut ticker = tokio::time::interval(renewal_period);
        loop {
            ticker.tick().await;
            if let Err(e) = client.register_slave(&discovery.slave_id, &self_address).await {
                warn!("discovery registration renewal failed: {}", e);
            }
        }
    });
}
