pub mod abi;
pub mod client;
pub mod config;
pub mod decimals;
pub mod decoder;
pub mod error;
pub mod events;
pub mod gas;
pub mod listener;
pub mod rpc_client;
pub mod sink;

pub use client::{ChainClient, DepositRecordReader, HandlerKind};
pub use config::{ChainConfig, RawChainConfig, WatcherConfig};
pub use decimals::{DecimalPair, DecimalTable};
pub use decoder::DepositDecoder;
pub use error::{ConfigError, DecodeError, GasError, ListenerError, RpcError, SinkError};
pub use events::{Log, RawDepositEvent};
pub use gas::{GasPriceOracle, GasPricer, GasSpeed, GasStationFactory, NodeGasOracle};
pub use listener::{ChainListener, CycleOutcome, ListenerState};
pub use rpc_client::{RpcClient, RpcSettings};
pub use sink::{ChannelSink, RelaySink};

use anyhow::{bail, Context};
use chainrelay_storage::{BlockStore, InMemoryBlockStore};
use chainrelay_types::ChainId;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type RpcListener<S> = ChainListener<RpcClient, S, Arc<dyn BlockStore>>;

/// One listener per configured chain, all feeding the same sink.
pub struct Watcher<S> {
    listeners: Vec<RpcListener<S>>,
    gas_station: Option<GasStationFactory>,
}

impl<S> Watcher<S>
where
    S: RelaySink + Clone + 'static,
{
    /// Validates every chain entry and opens its endpoint and block store.
    /// Any invalid chain aborts construction.
    pub fn from_config(config: &WatcherConfig, sink: S) -> anyhow::Result<Self> {
        let mut seen = HashSet::new();
        let mut listeners = Vec::with_capacity(config.chains.len());

        for raw in &config.chains {
            let chain = ChainConfig::from_raw(raw)
                .with_context(|| format!("invalid configuration for chain {} ({})", raw.id, raw.name))?;

            if !seen.insert(chain.id) {
                bail!("chain id {} is configured more than once", chain.id);
            }

            let client = RpcClient::new(chain.endpoint.clone(), RpcSettings::default())
                .with_context(|| format!("failed to create RPC client for {}", chain.endpoint))?;
            let block_store = open_block_store(&chain)?;

            listeners.push(ChainListener::new(chain, Arc::new(client), sink.clone(), block_store)?);
        }

        Ok(Self {
            listeners,
            gas_station: None,
        })
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.listeners.iter().map(|l| l.chain_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Oracle used for chains that configure an `egsApiKey`.
    pub fn with_gas_station(mut self, factory: GasStationFactory) -> Self {
        self.gas_station = Some(factory);
        self
    }

    /// Gas pricing for every chain. Chains with an `egsApiKey` use the gas
    /// station when one is installed; all others ask their own endpoint.
    pub fn gas_pricers(&self) -> Vec<(ChainId, GasPricer<Arc<dyn GasPriceOracle>>)> {
        self.listeners
            .iter()
            .map(|l| {
                let config = l.config();
                let oracle: Arc<dyn GasPriceOracle> = match (&config.egs_api_key, &self.gas_station) {
                    (Some(key), Some(station)) => station(key.as_str()),
                    (Some(_), None) => {
                        warn!(chain = %config.id, "egsApiKey set but no gas station installed, using node gas price");
                        Arc::new(NodeGasOracle::new(l.client().clone()))
                    }
                    (None, _) => Arc::new(NodeGasOracle::new(l.client().clone())),
                };
                (l.chain_id(), GasPricer::new(oracle, config))
            })
            .collect()
    }

    /// Runs every listener on its own task until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let handles: Vec<_> = self
            .listeners
            .into_iter()
            .map(|mut listener| {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    listener.run(&cancel).await;
                    (listener.chain_id(), listener.cursor())
                })
            })
            .collect();

        let mut failed = 0;
        for result in join_all(handles).await {
            match result {
                Ok((chain, cursor)) => info!(chain = %chain, cursor, "Listener task finished"),
                Err(e) => {
                    error!(error = %e, "Listener task panicked");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            bail!("{} chain listener(s) terminated abnormally", failed);
        }
        Ok(())
    }
}

fn open_block_store(chain: &ChainConfig) -> anyhow::Result<Arc<dyn BlockStore>> {
    if chain.blockstore_path.as_os_str().is_empty() {
        warn!(chain = %chain.id, "No blockstore_path configured, progress will not survive a restart");
        return Ok(Arc::new(InMemoryBlockStore::new()));
    }

    #[cfg(feature = "rocksdb")]
    {
        let path = chain.blockstore_path.join(format!("chain-{}", chain.id));
        let store = chainrelay_storage::RocksDBBlockStore::open(&path, chain.id)
            .with_context(|| format!("failed to open block store at {}", path.display()))?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "rocksdb"))]
    {
        let store = chainrelay_storage::FileBlockStore::open(&chain.blockstore_path, chain.id, &chain.from)
            .with_context(|| format!("failed to open block store at {}", chain.blockstore_path.display()))?;
        Ok(Arc::new(store))
    }
}
