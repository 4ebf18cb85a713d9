use crate::block_store::{BlockStore, StorageError};
use chainrelay_types::ChainId;
use rocksdb_rs::{Options, DB};
use std::path::Path;
use std::sync::Arc;

const LATEST_BLOCK_PREFIX: &str = "latest_block";

/// Block store sharing one RocksDB instance between every chain of a process;
/// each chain writes under its own key.
pub struct RocksDBBlockStore {
    db: Arc<DB>,
    key: Vec<u8>,
}

impl RocksDBBlockStore {
    pub fn open<P: AsRef<Path>>(path: P, chain_id: ChainId) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| StorageError::DatabaseError(e.to_string()))?;

        Ok(Self::with_db(Arc::new(db), chain_id))
    }

    pub fn with_db(db: Arc<DB>, chain_id: ChainId) -> Self {
        Self {
            db,
            key: Self::encode_key(chain_id),
        }
    }

    fn encode_key(chain_id: ChainId) -> Vec<u8> {
        format!("{}/{}", LATEST_BLOCK_PREFIX, chain_id).into_bytes()
    }

    fn decode_block(bytes: &[u8]) -> Result<u64, StorageError> {
        if bytes.len() != 8 {
            return Err(StorageError::DeserializationFailed);
        }
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }
}

impl BlockStore for RocksDBBlockStore {
    fn latest_block(&self) -> Result<Option<u64>, StorageError> {
        match self
            .db
            .get(&self.key)
            .map_err(|e| StorageError::DatabaseError(e.to_string()))?
        {
            Some(bytes) => Ok(Some(Self::decode_block(&bytes)?)),
            None => Ok(None),
        }
    }

    fn store_block(&self, block: u64) -> Result<(), StorageError> {
        self.db
            .put(&self.key, block.to_le_bytes())
            .map_err(|e| StorageError::DatabaseError(e.to_string()))
    }
}
