use anyhow::{bail, Context};
use chainrelay_types::Message;
use chainrelay_watcher::{ChannelSink, Watcher, WatcherConfig};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_SINK_CAPACITY: usize = 1024;

fn get_config_path() -> PathBuf {
    std::env::var("CHAINRELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config.json"))
}

fn get_sink_capacity() -> usize {
    std::env::var("SINK_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|c| *c > 0)
        .unwrap_or(DEFAULT_SINK_CAPACITY)
}

fn load_config(path: &Path) -> anyhow::Result<WatcherConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: WatcherConfig = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;

    if config.chains.is_empty() {
        bail!("config file {} defines no chains", path.display());
    }
    Ok(config)
}

// Writer side of the relayer is out of process; messages are emitted as JSON lines.
async fn relay_task(mut receiver: Receiver<Message>) {
    let mut relayed = 0u64;

    while let Some(message) = receiver.recv().await {
        match serde_json::to_string(&message) {
            Ok(json) => {
                info!(
                    source = %message.source,
                    dest = %message.destination,
                    nonce = %message.nonce,
                    "Relaying message"
                );
                println!("{}", json);
                relayed += 1;
            }
            Err(e) => error!(nonce = %message.nonce, error = %e, "Failed to serialize message"),
        }
    }

    info!(relayed, "Relay task stopped");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = get_config_path();
    let config = load_config(&config_path)?;
    info!(path = %config_path.display(), chains = config.chains.len(), "Loaded configuration");

    let (sink, receiver) = ChannelSink::new(get_sink_capacity());
    let watcher = Watcher::from_config(&config, sink)?;

    for (chain, pricer) in watcher.gas_pricers() {
        match pricer.gas_price().await {
            Ok(price) => info!(chain = %chain, %price, "Current gas price"),
            Err(e) => warn!(chain = %chain, error = %e, "Gas price unavailable"),
        }
    }

    let relay_handle = tokio::spawn(relay_task(receiver));

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Received Ctrl-C, stopping listeners");
        shutdown.cancel();
    });

    info!(chains = ?watcher.chain_ids(), "Starting chain listeners");
    watcher.start(cancel).await?;

    relay_handle.await.context("relay task panicked")?;
    Ok(())
}
