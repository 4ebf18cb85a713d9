pub mod address {
    pub const ADDRESS_SIZE: usize = 20;
    pub const ZERO_ADDRESS_BYTES: [u8; ADDRESS_SIZE] = [0u8; ADDRESS_SIZE];
}

pub mod resource {
    pub const RESOURCE_ID_SIZE: usize = 32;
}

pub mod abi {
    /// Every static ABI value occupies one 32-byte word.
    pub const WORD_SIZE: usize = 32;
}

pub mod calldata {
    use super::{abi::WORD_SIZE, address::ADDRESS_SIZE};

    /// amount word + recipient length word + a 20-byte recipient
    pub const MIN_FUNGIBLE_CALLDATA_LEN: usize = 2 * WORD_SIZE + ADDRESS_SIZE;
}

pub mod defaults {
    pub const DEFAULT_GAS_LIMIT: u64 = 6_721_975;
    pub const DEFAULT_MAX_GAS_PRICE: u64 = 20_000_000_000;
    pub const DEFAULT_MIN_GAS_PRICE: u64 = 0;
    pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.0;
    pub const DEFAULT_BLOCK_CONFIRMATIONS: u64 = 10;
    /// Milliseconds between checks while waiting for a block to be confirmed.
    pub const DEFAULT_BLOCK_RETRY_INTERVAL_MS: u64 = 400;
}
