mod constants;

pub use constants::*;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type Address = [u8; constants::address::ADDRESS_SIZE];

pub const ZERO_ADDRESS: Address = constants::address::ZERO_ADDRESS_BYTES;

/// Identifier of a chain taking part in the bridge. The bridge contracts store
/// it as `uint8`, so that is the widest value we accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u8);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for ChainId {
    fn from(id: u8) -> Self {
        ChainId(id)
    }
}

/// Per-source-chain deposit counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Nonce {
    fn from(nonce: u64) -> Self {
        Nonce(nonce)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// 32-byte identifier binding an asset to a logical cross-chain resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(pub [u8; constants::resource::RESOURCE_ID_SIZE]);

impl ResourceId {
    pub fn as_bytes(&self) -> &[u8; constants::resource::RESOURCE_ID_SIZE] {
        &self.0
    }

    /// Lower-case hex without a `0x` prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for ResourceId {
    type Error = IdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != constants::resource::RESOURCE_ID_SIZE {
            return Err(IdError::InvalidLength {
                expected: constants::resource::RESOURCE_ID_SIZE,
                actual: bytes.len(),
            });
        }
        let mut id = [0u8; constants::resource::RESOURCE_ID_SIZE];
        id.copy_from_slice(bytes);
        Ok(ResourceId(id))
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex(s)?;
        ResourceId::try_from(bytes.as_slice())
    }
}

impl TryFrom<String> for ResourceId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.to_hex()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId(0x{})", self.to_hex())
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, IdError> {
    let trimmed = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    hex::decode(trimmed).map_err(|e| IdError::InvalidHex(e.to_string()))
}

/// Parses a `0x`-prefixed (or bare) 20-byte hex address.
pub fn parse_address(s: &str) -> Result<Address, IdError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != constants::address::ADDRESS_SIZE {
        return Err(IdError::InvalidLength {
            expected: constants::address::ADDRESS_SIZE,
            actual: bytes.len(),
        });
    }
    let mut address = ZERO_ADDRESS;
    address.copy_from_slice(&bytes);
    Ok(address)
}

pub fn format_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

/// Deposit record as stored by the ERC721 and generic handler contracts.
///
/// Fields a handler does not track are left at their zero value (the generic
/// handler has no token address, recipient or token id).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepositRecord {
    pub token_address: Address,
    pub destination_recipient_address: Vec<u8>,
    pub destination_chain_id: ChainId,
    pub resource_id: ResourceId,
    pub depositer: Address,
    pub amount_or_token_id: BigUint,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    FungibleTransfer {
        amount: BigUint,
        #[serde(with = "serde_bytes")]
        recipient: Vec<u8>,
    },
    NonFungibleTransfer {
        token_id: BigUint,
        #[serde(with = "serde_bytes")]
        recipient: Vec<u8>,
        #[serde(with = "serde_bytes")]
        metadata: Vec<u8>,
    },
    GenericTransfer {
        #[serde(with = "serde_bytes")]
        metadata: Vec<u8>,
    },
}

/// Canonical, chain-agnostic transfer handed to the relay subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub source: ChainId,
    pub destination: ChainId,
    pub nonce: Nonce,
    pub resource_id: ResourceId,
    pub payload: Payload,
}

impl Message {
    pub fn fungible_transfer(
        source: ChainId,
        destination: ChainId,
        nonce: Nonce,
        amount: BigUint,
        resource_id: ResourceId,
        recipient: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            nonce,
            resource_id,
            payload: Payload::FungibleTransfer { amount, recipient },
        }
    }

    pub fn non_fungible_transfer(
        source: ChainId,
        destination: ChainId,
        nonce: Nonce,
        resource_id: ResourceId,
        token_id: BigUint,
        recipient: Vec<u8>,
        metadata: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            nonce,
            resource_id,
            payload: Payload::NonFungibleTransfer {
                token_id,
                recipient,
                metadata,
            },
        }
    }

    pub fn generic_transfer(
        source: ChainId,
        destination: ChainId,
        nonce: Nonce,
        resource_id: ResourceId,
        metadata: Vec<u8>,
    ) -> Self {
        Self {
            source,
            destination,
            nonce,
            resource_id,
            payload: Payload::GenericTransfer { metadata },
        }
    }

    /// Idempotency key used downstream to drop duplicate deliveries.
    pub fn key(&self) -> (ChainId, Nonce) {
        (self.source, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_rejects_wrong_length() {
        let short = [0u8; 31];
        match ResourceId::try_from(&short[..]) {
            Err(IdError::InvalidLength { expected, actual }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 31);
            }
            other => panic!("Expected InvalidLength, got {:?}", other),
        }
        assert!(ResourceId::try_from(&[0u8; 33][..]).is_err());
    }

    #[test]
    fn test_resource_id_hex_parsing_is_case_insensitive() {
        let lower = "00000000000000000000000000000000000000000000000000000000000000ab";
        let upper = "0x00000000000000000000000000000000000000000000000000000000000000AB";
        let a: ResourceId = lower.parse().unwrap();
        let b: ResourceId = upper.parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex(), lower);
        assert_eq!(a.as_bytes()[31], 0xab);
    }

    #[test]
    fn test_resource_id_serializes_as_hex() {
        let id = ResourceId([7u8; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: ResourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("0x1111111111111111111111111111111111111122").unwrap();
        assert_eq!(addr[0], 0x11);
        assert_eq!(addr[19], 0x22);
        assert_eq!(format_address(&addr), "0x1111111111111111111111111111111111111122");
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("0xzz11111111111111111111111111111111111122").is_err());
    }

    #[test]
    fn test_message_key() {
        let msg = Message::generic_transfer(
            ChainId(1),
            ChainId(2),
            Nonce(42),
            ResourceId::default(),
            vec![1, 2, 3],
        );
        assert_eq!(msg.key(), (ChainId(1), Nonce(42)));
    }
}
