use chainrelay_storage::StorageError;
use chainrelay_types::{Address, IdError, Nonce};
use thiserror::Error;

/// Fatal, startup-time configuration problems. The affected chain must not start.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("must provide opts.bridge field for ethereum config")]
    MissingBridge,

    #[error("opts.bridge must not be the zero address")]
    ZeroBridgeAddress,

    #[error("unable to parse {option} address {value:?}: {reason}")]
    InvalidAddress {
        option: &'static str,
        value: String,
        reason: String,
    },

    #[error("unable to parse {option}: {value:?} is not a decimal or 0x-prefixed hex integer")]
    InvalidNumber { option: &'static str, value: String },

    #[error("{option} must be greater than zero")]
    NotPositive { option: &'static str },

    #[error("unable to parse {option} to float: {value:?}")]
    InvalidFloat { option: &'static str, value: String },

    #[error("invalid decimals entry for chain {chain}, resource {resource:?}: {reason}")]
    InvalidDecimals {
        chain: u8,
        resource: String,
        reason: String,
    },

    #[error("unknown opts encountered: {0:?}")]
    UnknownOptions(Vec<String>),
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("RPC error ({code}): {message}")]
    Rpc { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Failure to turn one deposit event into a message.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed call data: {reason} (len {len})")]
    MalformedCallData { len: usize, reason: &'static str },

    #[error("invalid deposit log: {0}")]
    InvalidLog(String),

    #[error("invalid identifier in deposit log: {0}")]
    InvalidId(#[from] IdError),

    #[error("resource is handled by unknown contract 0x{}", hex::encode(.0))]
    UnknownHandler(Address),

    #[error("failed to read {handler} deposit record for nonce {nonce}: {source}")]
    DepositRecord {
        handler: &'static str,
        nonce: Nonce,
        #[source]
        source: RpcError,
    },
}

impl DecodeError {
    /// Read failures come from the endpoint, not from the event, and are
    /// retried with the whole block. Everything else is bad data on this one
    /// event.
    pub fn is_transient(&self) -> bool {
        matches!(self, DecodeError::DepositRecord { .. })
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("relay sink closed")]
    Closed,

    #[error("relay sink rejected message: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum GasError {
    #[error("gas oracle request failed: {0}")]
    Rpc(#[from] RpcError),

    #[error("gas oracle returned an unusable price: {0}")]
    InvalidPrice(String),
}

/// Cycle-level failure. The cursor is not advanced and the cycle is retried.
#[derive(Error, Debug)]
pub enum ListenerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("block store: {0}")]
    Storage(#[from] StorageError),
}
