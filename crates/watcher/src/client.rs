use crate::abi::{encode_call, encode_u64, encode_u8, AbiError, AbiReader};
use crate::error::RpcError;
use crate::events::{deposit_event_topic, Log};
use crate::rpc_client::RpcClient;
use async_trait::async_trait;
use chainrelay_types::{Address, ChainId, DepositRecord, Nonce, ResourceId};
use std::sync::Arc;

pub const GET_DEPOSIT_RECORD_SIGNATURE: &str = "getDepositRecord(uint64,uint8)";
pub const RESOURCE_HANDLER_SIGNATURE: &str = "_resourceIDToHandlerAddress(bytes32)";

/// Asset class of a handler contract; decides how its deposits are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Fungible,
    NonFungible,
    Generic,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Fungible => "erc20",
            HandlerKind::NonFungible => "erc721",
            HandlerKind::Generic => "generic",
        }
    }
}

/// Read access to the source chain needed by the listener.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<u64, RpcError>;

    /// Bridge `Deposit` logs in `[from_block, to_block]`, ordered by block and
    /// log index.
    async fn deposit_logs(&self, bridge: &Address, from_block: u64, to_block: u64) -> Result<Vec<Log>, RpcError>;

    /// Handler contract the bridge routes `resource_id` deposits to.
    async fn resource_handler(&self, bridge: &Address, resource_id: &ResourceId) -> Result<Address, RpcError>;
}

/// Handler `getDepositRecord(nonce, destination)` accessor.
#[async_trait]
pub trait DepositRecordReader: Send + Sync {
    async fn deposit_record(
        &self,
        kind: HandlerKind,
        handler: &Address,
        nonce: Nonce,
        destination: ChainId,
    ) -> Result<DepositRecord, RpcError>;
}

#[async_trait]
impl<T: ChainClient + ?Sized> ChainClient for Arc<T> {
    async fn latest_block(&self) -> Result<u64, RpcError> {
        (**self).latest_block().await
    }

    async fn deposit_logs(&self, bridge: &Address, from_block: u64, to_block: u64) -> Result<Vec<Log>, RpcError> {
        (**self).deposit_logs(bridge, from_block, to_block).await
    }

    async fn resource_handler(&self, bridge: &Address, resource_id: &ResourceId) -> Result<Address, RpcError> {
        (**self).resource_handler(bridge, resource_id).await
    }
}

#[async_trait]
impl<T: DepositRecordReader + ?Sized> DepositRecordReader for Arc<T> {
    async fn deposit_record(
        &self,
        kind: HandlerKind,
        handler: &Address,
        nonce: Nonce,
        destination: ChainId,
    ) -> Result<DepositRecord, RpcError> {
        (**self).deposit_record(kind, handler, nonce, destination).await
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn latest_block(&self) -> Result<u64, RpcError> {
        self.get_block_number().await
    }

    async fn deposit_logs(&self, bridge: &Address, from_block: u64, to_block: u64) -> Result<Vec<Log>, RpcError> {
        self.get_logs(from_block, to_block, bridge, &deposit_event_topic())
            .await
    }

    async fn resource_handler(&self, bridge: &Address, resource_id: &ResourceId) -> Result<Address, RpcError> {
        let data = encode_call(RESOURCE_HANDLER_SIGNATURE, &[*resource_id.as_bytes()]);
        let output = self.eth_call(bridge, &data).await?;
        AbiReader::new(&output).address(0).map_err(invalid_output)
    }
}

#[async_trait]
impl DepositRecordReader for RpcClient {
    async fn deposit_record(
        &self,
        kind: HandlerKind,
        handler: &Address,
        nonce: Nonce,
        destination: ChainId,
    ) -> Result<DepositRecord, RpcError> {
        let data = encode_call(
            GET_DEPOSIT_RECORD_SIGNATURE,
            &[encode_u64(nonce.0), encode_u8(destination.0)],
        );
        let output = self.eth_call(handler, &data).await?;
        decode_deposit_record(kind, &output).map_err(invalid_output)
    }
}

fn invalid_output(e: AbiError) -> RpcError {
    RpcError::InvalidResponse(format!("undecodable contract output: {}", e))
}

/// Decodes the `DepositRecord` struct returned by each handler flavour.
pub fn decode_deposit_record(kind: HandlerKind, output: &[u8]) -> Result<DepositRecord, AbiError> {
    let record = AbiReader::new(output).tuple(0)?;

    match kind {
        // (tokenAddress, lenRecipient, destinationChainID, resourceID,
        //  destinationRecipientAddress, depositer, amount)
        HandlerKind::Fungible => Ok(DepositRecord {
            token_address: record.address(0)?,
            destination_chain_id: ChainId(record.u8(2)?),
            resource_id: record.resource_id(3)?,
            destination_recipient_address: record.bytes(4)?,
            depositer: record.address(5)?,
            amount_or_token_id: record.uint(6)?,
            metadata: Vec::new(),
        }),
        // (tokenAddress, lenRecipient, destinationChainID, resourceID,
        //  destinationRecipientAddress, depositer, tokenID, metaData)
        HandlerKind::NonFungible => Ok(DepositRecord {
            token_address: record.address(0)?,
            destination_chain_id: ChainId(record.u8(2)?),
            resource_id: record.resource_id(3)?,
            destination_recipient_address: record.bytes(4)?,
            depositer: record.address(5)?,
            amount_or_token_id: record.uint(6)?,
            metadata: record.bytes(7)?,
        }),
        // (destinationChainID, depositer, resourceID, metaData)
        HandlerKind::Generic => Ok(DepositRecord {
            destination_chain_id: ChainId(record.u8(0)?),
            depositer: record.address(1)?,
            resource_id: record.resource_id(2)?,
            metadata: record.bytes(3)?,
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::testing::{address_word, encode_struct_return, uint_word, Token};
    use num_bigint::BigUint;

    #[test]
    fn test_decode_erc721_record() {
        let output = encode_struct_return(&[
            Token::Word(address_word(&[0x0a; 20])),
            Token::Word(encode_u8(20)),
            Token::Word(encode_u8(2)),
            Token::Word([0x33; 32]),
            Token::Bytes(vec![0x11; 20]),
            Token::Word(address_word(&[0x0d; 20])),
            Token::Word(uint_word(&BigUint::from(4242u32))),
            Token::Bytes(b"ipfs://token".to_vec()),
        ]);

        let record = decode_deposit_record(HandlerKind::NonFungible, &output).unwrap();
        assert_eq!(record.token_address, [0x0a; 20]);
        assert_eq!(record.destination_chain_id, ChainId(2));
        assert_eq!(record.resource_id, ResourceId([0x33; 32]));
        assert_eq!(record.destination_recipient_address, vec![0x11; 20]);
        assert_eq!(record.depositer, [0x0d; 20]);
        assert_eq!(record.amount_or_token_id, BigUint::from(4242u32));
        assert_eq!(record.metadata, b"ipfs://token".to_vec());
    }

    #[test]
    fn test_decode_generic_record() {
        let output = encode_struct_return(&[
            Token::Word(encode_u8(4)),
            Token::Word(address_word(&[0x0d; 20])),
            Token::Word([0x44; 32]),
            Token::Bytes(vec![1, 2, 3, 4, 5]),
        ]);

        let record = decode_deposit_record(HandlerKind::Generic, &output).unwrap();
        assert_eq!(record.destination_chain_id, ChainId(4));
        assert_eq!(record.resource_id, ResourceId([0x44; 32]));
        assert_eq!(record.metadata, vec![1, 2, 3, 4, 5]);
        assert!(record.destination_recipient_address.is_empty());
    }

    #[test]
    fn test_decode_empty_output_fails() {
        assert!(decode_deposit_record(HandlerKind::Generic, &[]).is_err());
    }
}
