use std::path::Path;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wva_client::{listener, ConnectionState, Device};
use wva_core::{format_timestamp, DeviceConfig};

const DEFAULT_INTERVAL_SECONDS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wva_client=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(target) = args.next() else {
        anyhow::bail!("usage: wva-monitor <config.json | hostname> [endpoint...]");
    };
    let requested: Vec<String> = args.collect();

    let config = if Path::new(&target).is_file() {
        DeviceConfig::load(&target).with_context(|| format!("loading {}", target))?
    } else {
        DeviceConfig::for_host(&target)
    };
    tracing::info!("WVA monitor starting for {}", config.hostname);

    let device = Device::new(config).context("creating HTTP client")?;
    let available = device
        .fetch_subscribable()
        .await
        .context("listing vehicle endpoints")?;
    tracing::info!("{} endpoints available", available.len());

    let endpoints: Vec<String> = if requested.is_empty() {
        let mut all: Vec<String> = available.into_iter().collect();
        all.sort();
        all
    } else {
        requested
    };

    device.connect_data_stream(None, None);
    let mut state = device
        .connection_state()
        .context("event channel was not opened")?;
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow();
            tracing::debug!("Event channel state: {:?}", current);
            if current == ConnectionState::Failed {
                break;
            }
        }
    });

    for endpoint in &endpoints {
        let print = listener(|endpoint, response| {
            let time = format_timestamp(&response.time);
            tracing::info!("{:<24} {:>12.3}  {}", endpoint, response.value, time);
        });
        match device.subscribe(endpoint, DEFAULT_INTERVAL_SECONDS, Some(print)) {
            Ok(pending) => {
                if let Err(e) = pending.await {
                    tracing::warn!("Could not subscribe to {}: {}", endpoint, e);
                }
            }
            Err(e) => tracing::warn!("{}", e),
        }
    }
    tracing::info!("Monitoring {} endpoints, Ctrl+C to stop", endpoints.len());

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = watcher => {
            tracing::warn!("Event channel failed");
        }
    }

    for endpoint in &endpoints {
        if let Err(e) = device.unsubscribe(endpoint, true).await {
            tracing::warn!("Could not unsubscribe from {}: {}", endpoint, e);
        }
    }
    device.disconnect_data_stream();

    Ok(())
}
