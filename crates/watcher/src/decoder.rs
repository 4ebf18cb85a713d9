use crate::abi::word_to_u64;
use crate::client::{DepositRecordReader, HandlerKind};
use crate::config::ChainConfig;
use crate::decimals::DecimalTable;
use crate::error::DecodeError;
use crate::events::RawDepositEvent;
use chainrelay_types::abi::WORD_SIZE;
use chainrelay_types::calldata::MIN_FUNGIBLE_CALLDATA_LEN;
use chainrelay_types::{Address, ChainId, Message, Nonce, ResourceId, ZERO_ADDRESS};
use num_bigint::BigUint;
use tracing::{error, info};

/// Turns deposit events into canonical messages, one decoder per handler
/// flavour.
pub struct DepositDecoder<R> {
    source: ChainId,
    decimals: DecimalTable,
    erc20_handler: Address,
    erc721_handler: Address,
    generic_handler: Address,
    reader: R,
}

impl<R: DepositRecordReader> DepositDecoder<R> {
    pub fn new(config: &ChainConfig, reader: R) -> Self {
        Self {
            source: config.id,
            decimals: config.decimals.clone(),
            erc20_handler: config.erc20_handler_contract,
            erc721_handler: config.erc721_handler_contract,
            generic_handler: config.generic_handler_contract,
            reader,
        }
    }

    /// Which configured handler `address` is. Unset (zero) handlers never match.
    pub fn handler_kind(&self, address: &Address) -> Option<HandlerKind> {
        if *address == ZERO_ADDRESS {
            None
        } else if *address == self.erc20_handler {
            Some(HandlerKind::Fungible)
        } else if *address == self.erc721_handler {
            Some(HandlerKind::NonFungible)
        } else if *address == self.generic_handler {
            Some(HandlerKind::Generic)
        } else {
            None
        }
    }

    /// Dispatches on the handler contract that processed the deposit.
    pub async fn decode(&self, handler: &Address, event: &RawDepositEvent) -> Result<Message, DecodeError> {
        match self.handler_kind(handler) {
            Some(HandlerKind::Fungible) => {
                self.decode_fungible(event.destination, event.nonce, event.resource_id, &event.call_data)
            }
            Some(HandlerKind::NonFungible) => self.decode_non_fungible(event.destination, event.nonce).await,
            Some(HandlerKind::Generic) => self.decode_generic(event.destination, event.nonce).await,
            None => Err(DecodeError::UnknownHandler(*handler)),
        }
    }

    /// Call data layout: `amount (32) | recipient length (32) | recipient`.
    pub fn decode_fungible(
        &self,
        destination: ChainId,
        nonce: Nonce,
        resource_id: ResourceId,
        call_data: &[u8],
    ) -> Result<Message, DecodeError> {
        info!(
            chain = %self.source,
            dest = %destination,
            %nonce,
            resource_id = %resource_id,
            "Handling fungible deposit event"
        );

        let len = call_data.len();
        if len < MIN_FUNGIBLE_CALLDATA_LEN {
            return Err(DecodeError::MalformedCallData {
                len,
                reason: "less than 84 bytes",
            });
        }

        let recipient_len = word_to_u64(&call_data[WORD_SIZE..2 * WORD_SIZE])
            .and_then(|l| usize::try_from(l).ok())
            .ok_or(DecodeError::MalformedCallData {
                len,
                reason: "recipient length overflows",
            })?;
        let recipient_end = (2 * WORD_SIZE)
            .checked_add(recipient_len)
            .filter(|end| *end <= len)
            .ok_or(DecodeError::MalformedCallData {
                len,
                reason: "recipient runs past end of call data",
            })?;
        let recipient = call_data[2 * WORD_SIZE..recipient_end].to_vec();

        let amount = BigUint::from_bytes_be(&call_data[..WORD_SIZE]);
        let amount = self.decimals.normalize(&amount, destination, &resource_id);

        Ok(Message::fungible_transfer(
            self.source,
            destination,
            nonce,
            amount,
            resource_id,
            recipient,
        ))
    }

    pub async fn decode_non_fungible(&self, destination: ChainId, nonce: Nonce) -> Result<Message, DecodeError> {
        info!(chain = %self.source, dest = %destination, %nonce, "Handling nonfungible deposit event");

        let record = self
            .reader
            .deposit_record(HandlerKind::NonFungible, &self.erc721_handler, nonce, destination)
            .await
            .map_err(|source| {
                error!(chain = %self.source, %nonce, error = %source, "Error unpacking ERC721 deposit record");
                DecodeError::DepositRecord {
                    handler: HandlerKind::NonFungible.as_str(),
                    nonce,
                    source,
                }
            })?;

        Ok(Message::non_fungible_transfer(
            self.source,
            destination,
            nonce,
            record.resource_id,
            record.amount_or_token_id,
            record.destination_recipient_address,
            record.metadata,
        ))
    }

    pub async fn decode_generic(&self, destination: ChainId, nonce: Nonce) -> Result<Message, DecodeError> {
        info!(chain = %self.source, dest = %destination, %nonce, "Handling generic deposit event");

        let record = self
            .reader
            .deposit_record(HandlerKind::Generic, &self.generic_handler, nonce, destination)
            .await
            .map_err(|source| {
                error!(chain = %self.source, %nonce, error = %source, "Error unpacking generic deposit record");
                DecodeError::DepositRecord {
                    handler: HandlerKind::Generic.as_str(),
                    nonce,
                    source,
                }
            })?;

        Ok(Message::generic_transfer(
            self.source,
            destination,
            nonce,
            record.resource_id,
            record.metadata,
        ))
    }
}
