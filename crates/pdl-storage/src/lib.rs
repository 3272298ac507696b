//! Ledger storage: blocks and their private data, committed together.
//!
//! A [`Store`] pairs a [`BlockStore`](pdl_blkstore::BlockStore) with a
//! [`PvtDataStore`](pdl_pvtstore::PvtDataStore) for one ledger. Private data
//! is always written before its block, so after a crash the private-data
//! store is at most one block ahead, and that block is still a pending
//! batch. Opening a store reconciles the two heights before it accepts any
//! call.
//!
//! [`Provider`] opens stores by ledger id and owns the underlying
//! per-backend providers.
//!
//! ```no_run
//! use pdl_storage::{Provider, StorageConfig};
//!
//! let provider = Provider::new(&StorageConfig::default());
//! let store = provider.open("mychannel")?;
//! println!("height {}", store.height()?);
//! provider.close();
//! # Ok::<(), pdl_storage::StorageError>(())
//! ```

pub mod config;
pub mod error;
pub mod provider;
pub mod store;

#[cfg(test)]
mod testutil;

pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use provider::Provider;
pub use store::Store;
