mod block_store;
mod file;
mod in_memory;

#[cfg(feature = "rocksdb")]
mod rocksdb_impl;

pub use block_store::{BlockStore, StorageError};
pub use file::FileBlockStore;
pub use in_memory::InMemoryBlockStore;

#[cfg(feature = "rocksdb")]
pub use rocksdb_impl::RocksDBBlockStore;
