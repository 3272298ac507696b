//! Foundation types for the private-data ledger (PDL).
//!
//! This crate provides the block and private-data model shared by the block
//! store, the private-data store, and the storage composition layer. Every
//! other PDL crate depends on `pdl-types`.
//!
//! # Key Types
//!
//! - [`Block`] -- Hash-chained block carrying ordered transaction envelopes
//! - [`BlockHash`] -- BLAKE3 digest of a block header
//! - [`TxPvtData`] -- Private write set of one transaction, keyed by its position in the block
//! - [`BlockAndPvtData`] -- A block together with its per-transaction private data
//! - [`PvtNsCollFilter`] -- The (namespace, collection) pairs a caller may see

pub mod block;
pub mod error;
pub mod filter;
#[cfg(any(test, feature = "test-util"))]
pub mod fixtures;
pub mod ledger_id;
pub mod pvtdata;

pub use block::{Block, BlockData, BlockHash, BlockHeader, BlockMetadata, BlockchainInfo};
pub use error::TypeError;
pub use filter::PvtNsCollFilter;
pub use ledger_id::validate_ledger_id;
pub use pvtdata::{
    BlockAndPvtData, CollectionPvtReadWriteSet, DataModel, NsPvtReadWriteSet, TxPvtData,
    TxPvtReadWriteSet,
};
