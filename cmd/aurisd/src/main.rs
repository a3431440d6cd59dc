//! aurisd - ingestion daemon for wearable voice monitors.
//!
//! Binds the TCP gateway, loads the device registry and enrolled speaker
//! profiles, and publishes gated audio, scene decisions, and telemetry to an
//! MQTT broker.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use auris_gateway::{DeviceRegistry, Gateway, MqttPublisher};
use auris_speaker::{Embedder, ProfileTable, SpectralEmbedder};
use clap::Parser;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use config::Config;

/// Ingestion daemon for wearable voice monitors.
#[derive(Parser, Debug)]
#[command(name = "aurisd")]
#[command(about = "Ingestion daemon for wearable voice monitors")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[arg(short, long)]
    listen: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if args.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.gateway.listen_addr = listen;
    }

    let registry = match &config.registry_file {
        Some(path) => DeviceRegistry::load(path)
            .with_context(|| format!("loading registry {}", path.display()))?,
        None => {
            warn!("no registry file configured; every device will be refused");
            DeviceRegistry::default()
        }
    };

    let embedder = SpectralEmbedder::new();
    let profiles = match &config.profiles_file {
        Some(path) => ProfileTable::load(path)
            .with_context(|| format!("loading profiles {}", path.display()))?,
        None => {
            warn!("no profiles file configured; no speech will verify");
            ProfileTable::default()
        }
    };
    if let Some(dimension) = profiles.dimension() {
        if dimension != embedder.dimension() {
            bail!(
                "profiles are {}-dimensional but the embedder produces {} dimensions",
                dimension,
                embedder.dimension()
            );
        }
    }

    let (client, eventloop) = connect_mqtt(&config.mqtt_url)?;
    let cancel = CancellationToken::new();
    spawn_event_loop(eventloop, cancel.child_token());

    let gateway = Arc::new(
        Gateway::builder()
            .with_config(config.gateway.clone())
            .with_registry(registry)
            .with_profiles(profiles)
            .with_embedder(Arc::new(embedder))
            .with_publisher(Arc::new(MqttPublisher::new(client.clone())))
            .build(),
    );

    let mut serve = tokio::spawn(Arc::clone(&gateway).serve());
    tokio::select! {
        joined = &mut serve => {
            joined.context("gateway task panicked")??;
            bail!("gateway stopped unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    gateway.shutdown();
    let _ = serve.await;
    cancel.cancel();
    let _ = client.disconnect().await;
    Ok(())
}

/// Builds the MQTT client from a `mqtt://[user:pass@]host:port` address.
fn connect_mqtt(addr: &str) -> Result<(AsyncClient, EventLoop)> {
    let url = url::Url::parse(addr).with_context(|| format!("bad mqtt url {addr}"))?;
    let host = url.host_str().unwrap_or("127.0.0.1").to_string();
    let port = url.port().unwrap_or(1883);

    let id = format!("aurisd-{}", std::process::id());
    let mut options = MqttOptions::new(id, host, port);
    options.set_keep_alive(Duration::from_secs(20));
    if let Some(password) = url.password() {
        options.set_credentials(url.username(), password);
    }

    Ok(AsyncClient::new(options, 100))
}

/// Drives the MQTT event loop until shutdown, logging connection health.
fn spawn_event_loop(mut eventloop: EventLoop, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to mqtt broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("mqtt connection error: {}", e);
                        tokio::time::sleep(Duration::from_secs(3)).await;
                    }
                },
            }
        }
    });
}
