//! Diagnostics command: print the resolved configuration and a point-in-time
//! cluster snapshot for operator troubleshooting.

use std::sync::Arc;

use anyhow::Result;

use citadel_cluster::cluster::Cluster;
use citadel_cluster::config::Configuration;
use citadel_cluster::model::Engine;
use citadel_cluster::resource::MostRemainingResourceManager;

pub async fn run(config_path: &str) -> Result<()> {
    println!("Cluster controller diagnostics");
    println!("===============================\n");

    let config = Configuration::load(config_path)?;

    println!("Configuration:");
    println!("  config file: {}", config_path);
    println!("  api: {}:{}", config.api.host, config.api.port);
    println!(
        "  refresh period: {}s",
        config.cluster.update_interval_seconds
    );
    println!("  configured engines: {}", config.cluster.engines.len());
    for engine in &config.cluster.engines {
        println!(
            "    - {} @ {} (cpus={}, memory={})",
            engine.id, engine.address, engine.cpus, engine.memory
        );
    }
    if let Some(discovery) = &config.discovery {
        println!(
            "  discovery: {} (user={}, cluster={})",
            discovery.url, discovery.user, discovery.cluster
        );
    } else {
        println!("  discovery: not configured");
    }

    println!("\nConnecting to configured engines...");
    let cluster = Cluster::new(Arc::new(MostRemainingResourceManager));
    let mut connected = 0usize;
    for engine_config in &config.cluster.engines {
        let engine = Engine {
            id: engine_config.id.clone(),
            address: engine_config.address.clone(),
            cpus: engine_config.cpus,
            memory: engine_config.memory,
            labels: engine_config.labels.clone(),
        };
        match cluster.add_engine(engine).await {
            Ok(()) => {
                connected += 1;
                println!("  {} connected", engine_config.id);
            }
            Err(e) => println!("  {} FAILED: {}", engine_config.id, e),
        }
    }

    if connected == 0 {
        println!("\nNo engines connected; skipping cluster snapshot.");
        return Ok(());
    }

    println!("\nCluster snapshot:");
    match cluster.cluster_info().await {
        Ok(info) => {
            println!("  engines: {}", info.engine_count);
            println!("  containers: {}", info.container_count);
            println!("  images: {}", info.image_count);
            println!(
                "  cpus: {:.2} total, {:.2} reserved",
                info.cpus, info.reserved_cpus
            );
            println!(
                "  memory: {:.0} MB total, {:.0} MB reserved",
                info.memory, info.reserved_memory
            );
        }
        Err(e) => println!("  failed to gather snapshot: {}", e),
    }

    println!("\nDiagnostics complete.");
    Ok(())
}
