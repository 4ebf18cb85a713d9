use crate::block_store::{BlockStore, StorageError};
use chainrelay_types::ChainId;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keeps the last delivered block as decimal text in
/// `<dir>/<chain id>-<relayer address>.block`.
pub struct FileBlockStore {
    path: PathBuf,
}

impl FileBlockStore {
    pub fn open<P: AsRef<Path>>(dir: P, chain_id: ChainId, relayer: &str) -> Result<Self, StorageError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| StorageError::IOError(e.to_string()))?;

        let path = dir.join(format!("{}-{}.block", chain_id, relayer));
        debug!(path = %path.display(), "Using file block store");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockStore for FileBlockStore {
    fn latest_block(&self) -> Result<Option<u64>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents =
            fs::read_to_string(&self.path).map_err(|e| StorageError::IOError(e.to_string()))?;
        let block = contents
            .trim()
            .parse::<u64>()
            .map_err(|_| StorageError::DeserializationFailed)?;

        Ok(Some(block))
    }

    fn store_block(&self, block: u64) -> Result<(), StorageError> {
        // Write to a sibling file first so a crash never leaves a truncated cursor.
        let tmp = self.path.with_extension("block.tmp");
        fs::write(&tmp, block.to_string()).map_err(|e| StorageError::IOError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StorageError::IOError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_means_no_block() {
        let dir = TempDir::new().unwrap();
        let store = FileBlockStore::open(dir.path(), ChainId(1), "0xabc").unwrap();
        assert_eq!(store.latest_block().unwrap(), None);
    }

    #[test]
    fn test_store_and_reload() {
        let dir = TempDir::new().unwrap();
        let store = FileBlockStore::open(dir.path(), ChainId(3), "0xabc").unwrap();
        store.store_block(1234).unwrap();
        assert!(store.path().ends_with("3-0xabc.block"));

        let reopened = FileBlockStore::open(dir.path(), ChainId(3), "0xabc").unwrap();
        assert_eq!(reopened.latest_block().unwrap(), Some(1234));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileBlockStore::open(dir.path(), ChainId(1), "0xabc").unwrap();
        fs::write(store.path(), "not a number").unwrap();
        match store.latest_block() {
            Err(StorageError::DeserializationFailed) => {}
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }
}
