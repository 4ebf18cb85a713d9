use crate::client::{ChainClient, DepositRecordReader};
use crate::config::ChainConfig;
use crate::decoder::DepositDecoder;
use crate::error::{ListenerError, SinkError};
use crate::events::{Log, RawDepositEvent};
use crate::sink::RelaySink;
use chainrelay_storage::BlockStore;
use chainrelay_types::{ChainId, Message};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Polling,
    Confirming,
    Extracting,
    ErrorBackoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The cursor block does not have enough blocks on top of it yet.
    AwaitingConfirmations { head: u64, cursor: u64 },
    /// Every event of `block` was forwarded (or skipped as undecodable) and
    /// the cursor moved to the next block.
    BlockProcessed {
        block: u64,
        forwarded: usize,
        skipped: usize,
    },
}

/// Follows one source chain block by block and forwards its deposits.
///
/// A block is only read once `block_confirmations` blocks have been mined on
/// top of it, and the cursor only moves after all of the block's messages
/// reached the sink. Failures leave the cursor in place and the block is
/// retried after `block_retry_interval`.
pub struct ChainListener<C, S, B> {
    config: Arc<ChainConfig>,
    client: Arc<C>,
    decoder: DepositDecoder<Arc<C>>,
    sink: S,
    block_store: B,
    cursor: u64,
    seek_head: bool,
    /// Log indices of the cursor block already handed to the sink, so a retried
    /// block does not deliver them twice.
    forwarded: HashSet<u64>,
    state: ListenerState,
}

impl<C, S, B> ChainListener<C, S, B>
where
    C: ChainClient + DepositRecordReader,
    S: RelaySink,
    B: BlockStore,
{
    pub fn new(config: ChainConfig, client: Arc<C>, sink: S, block_store: B) -> Result<Self, ListenerError> {
        let cursor = resolve_start_block(&config, &block_store)?;
        let decoder = DepositDecoder::new(&config, client.clone());

        Ok(Self {
            seek_head: config.latest_block,
            config: Arc::new(config),
            client,
            decoder,
            sink,
            block_store,
            cursor,
            forwarded: HashSet::new(),
            state: ListenerState::Idle,
        })
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.id
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Next block to be processed.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Polls until `cancel` fires or the sink is closed. Cancellation is
    /// honoured between cycles and while waiting; a block that is being
    /// delivered is always finished.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        info!(
            chain = %self.config.id,
            name = %self.config.name,
            endpoint = %self.config.endpoint,
            start_block = self.cursor,
            confirmations = self.config.block_confirmations,
            http = self.config.http,
            "Starting chain listener"
        );

        while !cancel.is_cancelled() {
            let wait = match self.poll_once().await {
                Ok(CycleOutcome::BlockProcessed { .. }) => false,
                Ok(CycleOutcome::AwaitingConfirmations { .. }) => true,
                Err(ListenerError::Sink(SinkError::Closed)) => {
                    error!(
                        chain = %self.config.id,
                        block = self.cursor,
                        "Relay sink closed, stopping listener"
                    );
                    break;
                }
                Err(e) => {
                    self.state = ListenerState::ErrorBackoff;
                    warn!(
                        chain = %self.config.id,
                        block = self.cursor,
                        error = %e,
                        "Listener cycle failed, retrying"
                    );
                    true
                }
            };

            if wait {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(self.config.block_retry_interval()) => {}
                }
            }
        }

        self.state = ListenerState::Idle;
        info!(chain = %self.config.id, cursor = self.cursor, "Chain listener stopped");
    }

    /// One Polling → Confirming/Extracting cycle.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, ListenerError> {
        self.state = ListenerState::Polling;
        let head = self.client.latest_block().await?;

        if self.seek_head {
            info!(chain = %self.config.id, head, "Starting from the latest block");
            self.cursor = head;
            self.seek_head = false;
        }

        if head < self.cursor || head - self.cursor < self.config.block_confirmations {
            self.state = ListenerState::Confirming;
            debug!(
                chain = %self.config.id,
                head,
                cursor = self.cursor,
                "Block not ready, will retry"
            );
            return Ok(CycleOutcome::AwaitingConfirmations {
                head,
                cursor: self.cursor,
            });
        }

        self.state = ListenerState::Extracting;
        let block = self.cursor;
        let (forwarded, skipped) = self.process_block(block).await?;

        self.block_store.store_block(block)?;
        self.cursor = block + 1;
        self.forwarded.clear();
        self.state = ListenerState::Idle;

        Ok(CycleOutcome::BlockProcessed {
            block,
            forwarded,
            skipped,
        })
    }

    async fn process_block(&mut self, block: u64) -> Result<(usize, usize), ListenerError> {
        let logs = self
            .client
            .deposit_logs(&self.config.bridge_contract, block, block)
            .await?;

        let mut forwarded = 0;
        let mut skipped = 0;

        for log in &logs {
            if self.forwarded.contains(&log.log_index) {
                continue;
            }

            match self.decode_log(log).await {
                Ok(message) => {
                    debug!(
                        chain = %self.config.id,
                        block,
                        nonce = %message.nonce,
                        dest = %message.destination,
                        "Forwarding deposit"
                    );
                    self.sink.forward(message).await?;
                    self.forwarded.insert(log.log_index);
                    forwarded += 1;
                }
                Err(ListenerError::Decode(e)) if !e.is_transient() => {
                    error!(
                        chain = %self.config.id,
                        block,
                        log_index = log.log_index,
                        tx = %hex::encode(log.transaction_hash),
                        error = %e,
                        "Skipping undecodable deposit event"
                    );
                    skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if !logs.is_empty() {
            info!(chain = %self.config.id, block, forwarded, skipped, "Processed deposit events");
        }

        Ok((forwarded, skipped))
    }

    async fn decode_log(&self, log: &Log) -> Result<Message, ListenerError> {
        let event = RawDepositEvent::from_log(log)?;
        let handler = self
            .client
            .resource_handler(&self.config.bridge_contract, &event.resource_id)
            .await?;

        self.decoder.decode(&handler, &event).await.map_err(|e| {
            if e.is_transient() {
                warn!(
                    chain = %self.config.id,
                    block = event.block_number,
                    nonce = %event.nonce,
                    error = %e,
                    "Deposit record read failed"
                );
            }
            ListenerError::Decode(e)
        })
    }
}

/// Where a listener starts: `startBlock`, unless a stored cursor is further
/// ahead and `fresh_start` is off.
pub fn resolve_start_block<B: BlockStore>(config: &ChainConfig, block_store: &B) -> Result<u64, ListenerError> {
    if config.fresh_start {
        return Ok(config.start_block);
    }

    match block_store.latest_block()? {
        Some(stored) if stored >= config.start_block => {
            let resume = stored.saturating_add(1);
            info!(chain = %config.id, stored, resume, "Resuming from stored block");
            Ok(resume)
        }
        _ => Ok(config.start_block),
    }
}
