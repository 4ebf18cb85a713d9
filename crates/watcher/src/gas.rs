use crate::config::ChainConfig;
use crate::error::GasError;
use crate::rpc_client::RpcClient;
use async_trait::async_trait;
use num_bigint::BigUint;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Multipliers are applied in fixed point with this many fractional units.
const MULTIPLIER_SCALE: u64 = 1_000_000;

/// Gas-station speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasSpeed {
    #[default]
    Average,
    Fast,
    Fastest,
}

impl GasSpeed {
    pub fn as_str(&self) -> &'static str {
        match self {
            GasSpeed::Average => "average",
            GasSpeed::Fast => "fast",
            GasSpeed::Fastest => "fastest",
        }
    }
}

impl FromStr for GasSpeed {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "average" => Ok(GasSpeed::Average),
            "fast" => Ok(GasSpeed::Fast),
            "fastest" => Ok(GasSpeed::Fastest),
            other => Err(format!("unknown gas speed {:?}", other)),
        }
    }
}

impl fmt::Display for GasSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of a suggested gas price for a speed tier. Gas-station style
/// services plug in here; [`NodeGasOracle`] is used when none is configured.
#[async_trait]
pub trait GasPriceOracle: Send + Sync {
    async fn suggested_gas_price(&self, speed: GasSpeed) -> Result<BigUint, GasError>;
}

#[async_trait]
impl<T: GasPriceOracle + ?Sized> GasPriceOracle for Arc<T> {
    async fn suggested_gas_price(&self, speed: GasSpeed) -> Result<BigUint, GasError> {
        (**self).suggested_gas_price(speed).await
    }
}

/// Builds the gas-station oracle for a chain from its `egsApiKey`.
pub type GasStationFactory = Arc<dyn Fn(&str) -> Arc<dyn GasPriceOracle> + Send + Sync>;

/// Asks the chain endpoint itself via `eth_gasPrice`. The node has a single
/// price, so the speed tier is ignored.
pub struct NodeGasOracle {
    client: Arc<RpcClient>,
}

impl NodeGasOracle {
    pub fn new(client: Arc<RpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GasPriceOracle for NodeGasOracle {
    async fn suggested_gas_price(&self, _speed: GasSpeed) -> Result<BigUint, GasError> {
        Ok(self.client.gas_price().await?)
    }
}

/// Applies `multiplier` to `suggested` and clamps the result into `[min, max]`.
pub fn bounded_gas_price(suggested: &BigUint, multiplier: f64, min: &BigUint, max: &BigUint) -> BigUint {
    let scaled_multiplier = (multiplier.max(0.0) * MULTIPLIER_SCALE as f64).round() as u64;
    let price = suggested * BigUint::from(scaled_multiplier) / BigUint::from(MULTIPLIER_SCALE);

    if &price > max {
        max.clone()
    } else if &price < min {
        min.clone()
    } else {
        price
    }
}

/// Combines an oracle with one chain's configured gas bounds.
pub struct GasPricer<O> {
    oracle: O,
    speed: GasSpeed,
    multiplier: f64,
    min: BigUint,
    max: BigUint,
}

impl<O: GasPriceOracle> GasPricer<O> {
    pub fn new(oracle: O, config: &ChainConfig) -> Self {
        Self {
            oracle,
            speed: config.egs_speed,
            multiplier: config.gas_multiplier,
            min: config.min_gas_price.clone(),
            max: config.max_gas_price.clone(),
        }
    }

    pub async fn gas_price(&self) -> Result<BigUint, GasError> {
        let suggested = self.oracle.suggested_gas_price(self.speed).await?;
        let price = bounded_gas_price(&suggested, self.multiplier, &self.min, &self.max);
        debug!(speed = %self.speed, %suggested, %price, "Computed gas price");
        Ok(price)
    }
}
