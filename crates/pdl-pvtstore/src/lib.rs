//! Private-data storage for the private-data ledger.
//!
//! Stores, per block number, the private write sets of the block's
//! transactions. Writes are two-phase: a block's data is first staged as a
//! pending batch ([`PvtDataStore::prepare`]) and only becomes visible on
//! [`PvtDataStore::commit_pending`]. The pending batch survives a crash, so
//! the composition layer can decide after restart whether to keep it (its
//! block made it to the block store) or discard it.
//!
//! # Storage Backends
//!
//! - [`FsPvtDataStore`] -- one journal file per ledger
//! - [`InMemoryPvtDataStore`] -- for tests and embedding

pub mod batch;
pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{PvtStoreError, PvtStoreResult};
pub use fs::{FsPvtDataStore, FsPvtDataStoreProvider};
pub use memory::{InMemoryPvtDataStore, InMemoryPvtDataStoreProvider};
pub use traits::{PvtDataStore, PvtDataStoreProvider};
