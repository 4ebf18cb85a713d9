use std::fmt;

#[derive(Debug)]
pub enum StorageError {
    DeserializationFailed,
    DatabaseError(String),
    IOError(String),
    LockPoisoned,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::DeserializationFailed => write!(f, "stored block number is corrupt"),
            StorageError::DatabaseError(e) => write!(f, "database error: {}", e),
            StorageError::IOError(e) => write!(f, "io error: {}", e),
            StorageError::LockPoisoned => write!(f, "block store lock poisoned"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Persists a listener's cursor so a restart resumes where it stopped.
///
/// `store_block` is called only after every event of that block has been
/// handed to the relay sink, so the stored value is the last fully delivered
/// block.
pub trait BlockStore: Send + Sync {
    fn latest_block(&self) -> Result<Option<u64>, StorageError>;
    fn store_block(&self, block: u64) -> Result<(), StorageError>;
}

impl<T: BlockStore + ?Sized> BlockStore for std::sync::Arc<T> {
    fn latest_block(&self) -> Result<Option<u64>, StorageError> {
        (**self).latest_block()
    }

    fn store_block(&self, block: u64) -> Result<(), StorageError> {
        (**self).store_block(block)
    }
}
