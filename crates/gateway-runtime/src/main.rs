//! # Gateway Runtime
//!
//! Entry point for the mesh gateway.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from environment variables
//! 3. Build the bus and the REST proxy
//! 4. Start the gateway: join the mesh, open the HTTP ingress
//! 5. Wait for Ctrl+C or SIGTERM, then shut down gracefully

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mesh_gateway::{Gateway, GatewayConfig, ReqwestRestProxy};
use shared_bus::{InMemoryMessageBus, MessageBus};

/// Build the configuration from defaults plus environment overrides.
fn load_config() -> Result<GatewayConfig> {
    let mut config = GatewayConfig::default();
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("invalid environment configuration")?;
    Ok(config)
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let config = load_config()?;
    info!(
        service = %config.identity.service_id,
        http = %config.http_addr(),
        bus = config.bus.enabled,
        timeout_ms = config.timeouts.request.as_millis() as u64,
        "Configuration loaded"
    );

    if config.bus.enabled {
        info!(
            client_id = %config.bus.client_id,
            group_id = %config.bus.group_id,
            brokers = %config.bus.broker_endpoint(),
            "Broker settings"
        );
        warn!(
            brokers = %config.bus.broker_endpoint(),
            "Message bus is in-process; broker settings are not used and only \
             services running in this process can be discovered"
        );
    }

    let bus = Arc::new(InMemoryMessageBus::with_capacity(config.bus.channel_capacity));
    let proxy = Arc::new(ReqwestRestProxy::new(None).context("failed to build REST proxy")?);

    let mut gateway = Gateway::new(config, Arc::clone(&bus) as Arc<dyn MessageBus>, proxy)
        .context("failed to build gateway")?;
    gateway.start().await.context("failed to start gateway")?;

    info!("Gateway is running. Press Ctrl+C to stop.");
    shutdown_signal().await?;

    gateway.shutdown().await;
    bus.disconnect();
    Ok(())
}
