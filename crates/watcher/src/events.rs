use crate::abi::{keccak256, AbiReader};
use crate::error::{DecodeError, RpcError};
use chainrelay_types::{parse_address, Address, ChainId, Nonce, ResourceId, ZERO_ADDRESS};
use serde_json::Value;

/// `Deposit` event emitted by the bridge contract. `user` is the only indexed
/// argument, everything else is in the log data.
pub const DEPOSIT_EVENT_SIGNATURE: &str = "Deposit(uint8,bytes32,uint64,address,bytes,bytes)";

pub fn deposit_event_topic() -> [u8; 32] {
    keccak256(DEPOSIT_EVENT_SIGNATURE.as_bytes())
}

/// An `eth_getLogs` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: [u8; 32],
}

impl Log {
    pub fn from_json(log: &Value) -> Result<Self, RpcError> {
        let address = parse_address(field_str(log, "address")?)
            .map_err(|e| RpcError::InvalidResponse(format!("log address: {}", e)))?;

        let topics = log["topics"]
            .as_array()
            .ok_or_else(|| RpcError::InvalidResponse("Missing topics in log".to_string()))?
            .iter()
            .map(|topic| {
                topic
                    .as_str()
                    .ok_or_else(|| RpcError::InvalidResponse("Non-string topic in log".to_string()))
                    .and_then(decode_hash)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let data = decode_hex(field_str(log, "data")?)?;
        let block_number = decode_quantity(field_str(log, "blockNumber")?)?;
        let log_index = decode_quantity(field_str(log, "logIndex")?)?;
        let transaction_hash = decode_hash(field_str(log, "transactionHash")?)?;

        Ok(Self {
            address,
            topics,
            data,
            block_number,
            log_index,
            transaction_hash,
        })
    }
}

fn field_str<'a>(log: &'a Value, field: &str) -> Result<&'a str, RpcError> {
    log[field]
        .as_str()
        .ok_or_else(|| RpcError::InvalidResponse(format!("Missing {} in log", field)))
}

fn decode_hex(s: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RpcError::InvalidResponse(format!("Failed to decode hex: {}", e)))
}

fn decode_hash(s: &str) -> Result<[u8; 32], RpcError> {
    let bytes = decode_hex(s)?;
    if bytes.len() != 32 {
        return Err(RpcError::InvalidResponse(format!(
            "Invalid hash length {}, expected 32",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

pub(crate) fn decode_quantity(s: &str) -> Result<u64, RpcError> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::InvalidResponse(format!("Failed to parse quantity {:?}: {}", s, e)))
}

/// Decoded bridge `Deposit` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDepositEvent {
    pub destination: ChainId,
    pub resource_id: ResourceId,
    pub nonce: Nonce,
    pub user: Address,
    /// Handler-specific deposit data; for fungible deposits this is the amount
    /// and recipient.
    pub call_data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: [u8; 32],
}

impl RawDepositEvent {
    pub fn from_log(log: &Log) -> Result<Self, DecodeError> {
        if log.topics.first() != Some(&deposit_event_topic()) {
            return Err(DecodeError::InvalidLog("not a Deposit event".to_string()));
        }

        let user = match log.topics.get(1) {
            Some(topic) => {
                let mut user = ZERO_ADDRESS;
                user.copy_from_slice(&topic[12..]);
                user
            }
            None => return Err(DecodeError::InvalidLog("missing user topic".to_string())),
        };

        let reader = AbiReader::new(&log.data);
        let invalid = |e: crate::abi::AbiError| DecodeError::InvalidLog(e.to_string());

        Ok(Self {
            destination: ChainId(reader.u8(0).map_err(invalid)?),
            resource_id: reader.resource_id(1).map_err(invalid)?,
            nonce: Nonce(reader.u64(2).map_err(invalid)?),
            user,
            call_data: reader.bytes(3).map_err(invalid)?,
            block_number: log.block_number,
            log_index: log.log_index,
            transaction_hash: log.transaction_hash,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::deposit_log;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decodes_deposit_event() {
        let log = deposit_log(
            [1u8; 20],
            12,
            0,
            ChainId(2),
            ResourceId([9u8; 32]),
            Nonce(77),
            vec![0xde, 0xad],
        );

        let event = RawDepositEvent::from_log(&log).unwrap();
        assert_eq!(event.destination, ChainId(2));
        assert_eq!(event.resource_id, ResourceId([9u8; 32]));
        assert_eq!(event.nonce, Nonce(77));
        assert_eq!(event.user, [0x55; 20]);
        assert_eq!(event.call_data, vec![0xde, 0xad]);
        assert_eq!(event.block_number, 12);
    }

    #[test]
    fn test_rejects_other_events() {
        let mut log = deposit_log([1u8; 20], 1, 0, ChainId(2), ResourceId::default(), Nonce(1), vec![]);
        log.topics[0] = [0u8; 32];
        assert!(matches!(RawDepositEvent::from_log(&log), Err(DecodeError::InvalidLog(_))));
    }

    #[test]
    fn test_rejects_truncated_data() {
        let mut log = deposit_log([1u8; 20], 1, 0, ChainId(2), ResourceId::default(), Nonce(1), vec![]);
        log.data.truncate(64);
        assert!(matches!(RawDepositEvent::from_log(&log), Err(DecodeError::InvalidLog(_))));
    }

    #[test]
    fn test_log_from_json() {
        let value = json!({
            "address": "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B",
            "topics": [format!("0x{}", hex::encode(deposit_event_topic()))],
            "data": "0x0102",
            "blockNumber": "0x1b4",
            "logIndex": "0x3",
            "transactionHash": format!("0x{}", "ab".repeat(32)),
        });

        let log = Log::from_json(&value).unwrap();
        assert_eq!(log.address[0], 0x62);
        assert_eq!(log.topics, vec![deposit_event_topic()]);
        assert_eq!(log.data, vec![1, 2]);
        assert_eq!(log.block_number, 436);
        assert_eq!(log.log_index, 3);
    }

    #[test]
    fn test_log_from_json_missing_field() {
        let value = json!({ "address": "0x62877dDCd49aD22f5eDfc6ac108e9a4b5D2bD88B" });
        assert!(matches!(Log::from_json(&value), Err(RpcError::InvalidResponse(_))));
    }
}
