use std::sync::Arc;

use pdl_types::{Block, BlockHash, BlockchainInfo};

use crate::error::BlkStoreResult;

/// Append-only store of the blocks of one ledger.
///
/// All implementations must satisfy these invariants:
/// - `add_block` accepts only `block.number() == height()` and a
///   `previous_hash` equal to the current tip's header hash.
/// - Retrieval of a number `>= height()` fails with
///   [`BlkStoreError::BlockNotFound`](crate::BlkStoreError::BlockNotFound).
/// - Reads of committed blocks never wait on an in-flight `add_block`.
/// - After `shutdown`, every call fails with
///   [`BlkStoreError::Closed`](crate::BlkStoreError::Closed).
pub trait BlockStore: Send + Sync {
    /// Append the next block.
    fn add_block(&self, block: &Block) -> BlkStoreResult<()>;

    /// Height and the hashes of the two most recent blocks.
    fn blockchain_info(&self) -> BlkStoreResult<BlockchainInfo>;

    fn retrieve_block_by_number(&self, number: u64) -> BlkStoreResult<Block>;

    fn retrieve_block_by_hash(&self, hash: &BlockHash) -> BlkStoreResult<Block>;

    /// Number of committed blocks, i.e. the next block number to accept.
    fn height(&self) -> BlkStoreResult<u64> {
        Ok(self.blockchain_info()?.height)
    }

    /// Release resources. Idempotent.
    fn shutdown(&self);
}

/// Opens block stores by ledger id.
pub trait BlockStoreProvider: Send + Sync {
    /// Open the store for `ledger_id`, creating it if needed.
    ///
    /// While a store is open, repeated calls return the same instance.
    fn open_block_store(&self, ledger_id: &str) -> BlkStoreResult<Arc<dyn BlockStore>>;

    /// Returns `true` if a store exists for `ledger_id`.
    fn exists(&self, ledger_id: &str) -> BlkStoreResult<bool>;

    /// Ledger ids with a store, sorted.
    fn list(&self) -> BlkStoreResult<Vec<String>>;

    /// Shut down every store opened through this provider.
    fn close(&self);
}
