mod config;
mod network;

use config::ProxyConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use viaduct_protocol_core::{Protocol, ProtocolPipeline};
use viaduct_protocol_v1_9::Protocol1_9To1_8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting viaduct...");

    let config = Arc::new(ProxyConfig::load(Path::new("config/viaduct.toml"))?);
    info!(
        "Config loaded: bind={}:{}, backend={}",
        config.bind, config.port, config.backend
    );

    let protocols: Vec<Arc<dyn Protocol>> = vec![Arc::new(Protocol1_9To1_8::new(
        config.translation.clone(),
    ))];
    let pipeline = Arc::new(ProtocolPipeline::new(protocols));
    let packet_rules: usize = pipeline.registries().map(|registry| registry.len()).sum();
    info!(
        "Translating protocol {:?} clients to protocol {:?} ({} packet rules)",
        pipeline.client_version(),
        pipeline.server_version(),
        packet_rules
    );

    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = accept_loop(listener, config, pipeline) => {
            error!("Accept loop exited unexpectedly");
        }
    }

    Ok(())
}

async fn accept_loop(
    listener: TcpListener,
    config: Arc<ProxyConfig>,
    pipeline: Arc<ProtocolPipeline>,
) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!("New connection from {}", peer);
                let config = config.clone();
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    network::handle_connection(socket, config, pipeline).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
