use crate::error::ConfigError;
use chainrelay_types::{ChainId, ResourceId};
use num_bigint::BigUint;
use std::collections::HashMap;

/// Decimal table as it appears in configuration: destination chain id →
/// resource id hex → `[source decimals, destination decimals]`.
pub type RawDecimals = HashMap<u8, HashMap<String, [u8; 2]>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalPair {
    pub source: u8,
    pub destination: u8,
}

/// Per-(destination chain, resource) precision table used to rescale fungible
/// amounts. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecimalTable {
    entries: HashMap<(ChainId, ResourceId), DecimalPair>,
}

impl DecimalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resource keys may carry a `0x` prefix and any hex case; they must decode
    /// to exactly 32 bytes.
    pub fn from_raw(raw: &RawDecimals) -> Result<Self, ConfigError> {
        let mut table = Self::new();
        for (chain, resources) in raw {
            for (resource, [source, destination]) in resources {
                let resource_id: ResourceId =
                    resource
                        .parse()
                        .map_err(|e: chainrelay_types::IdError| ConfigError::InvalidDecimals {
                            chain: *chain,
                            resource: resource.clone(),
                            reason: e.to_string(),
                        })?;
                table.insert(ChainId(*chain), resource_id, *source, *destination);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, destination: ChainId, resource: ResourceId, source_decimals: u8, dest_decimals: u8) {
        self.entries.insert(
            (destination, resource),
            DecimalPair {
                source: source_decimals,
                destination: dest_decimals,
            },
        );
    }

    pub fn get(&self, destination: ChainId, resource: &ResourceId) -> Option<DecimalPair> {
        self.entries.get(&(destination, *resource)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reinterprets `amount`, expressed in the source token's precision, in the
    /// destination token's precision. Scaling down truncates.
    pub fn normalize(&self, amount: &BigUint, destination: ChainId, resource: &ResourceId) -> BigUint {
        let Some(pair) = self.get(destination, resource) else {
            return amount.clone();
        };

        if pair.source > pair.destination {
            amount / pow10(pair.source - pair.destination)
        } else if pair.destination > pair.source {
            amount * pow10(pair.destination - pair.source)
        } else {
            amount.clone()
        }
    }
}

fn pow10(exp: u8) -> BigUint {
    BigUint::from(10u32).pow(u32::from(exp))
}
