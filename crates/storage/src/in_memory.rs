use crate::block_store::{BlockStore, StorageError};
use std::sync::RwLock;

pub struct InMemoryBlockStore {
    latest_block: RwLock<Option<u64>>,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self {
            latest_block: RwLock::new(None),
        }
    }

    pub fn with_block(block: u64) -> Self {
        Self {
            latest_block: RwLock::new(Some(block)),
        }
    }
}

impl BlockStore for InMemoryBlockStore {
    fn latest_block(&self) -> Result<Option<u64>, StorageError> {
        let latest = self
            .latest_block
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(*latest)
    }

    fn store_block(&self, block: u64) -> Result<(), StorageError> {
        let mut latest = self
            .latest_block
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *latest = Some(block);
        Ok(())
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}
