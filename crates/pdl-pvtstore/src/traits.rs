use std::sync::Arc;

use pdl_types::TxPvtData;
use tracing::debug;

use crate::batch::sorted_entries;
use crate::error::{PvtStoreError, PvtStoreResult};

/// Per-block private data of one ledger.
///
/// The height is the number of blocks whose private data (possibly none) has
/// been committed. A prepared batch does not count toward it until
/// [`commit_pending`](PvtDataStore::commit_pending).
///
/// All implementations must satisfy these invariants:
/// - At most one batch is pending, and it is always for block `height()`.
/// - A pending batch survives reopening the store.
/// - Committed entries are returned ascending by `seq_in_block`.
/// - After `shutdown`, every call fails with
///   [`PvtStoreError::Closed`].
pub trait PvtDataStore: Send + Sync {
    /// Stage the private data of block `block_num` as the pending batch.
    fn prepare(&self, block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<()>;

    /// Make the pending batch visible and advance the height.
    fn commit_pending(&self) -> PvtStoreResult<()>;

    /// Discard the pending batch.
    fn rollback_pending(&self) -> PvtStoreResult<()>;

    /// Block number of the pending batch, if any.
    fn pending_block(&self) -> PvtStoreResult<Option<u64>>;

    /// Committed private data of `block_num`.
    ///
    /// `Ok(None)` means the block has no private data. A block at or beyond
    /// the height is [`PvtStoreError::NotFound`].
    fn get_pvt_data_by_block_num(&self, block_num: u64) -> PvtStoreResult<Option<Vec<TxPvtData>>>;

    fn height(&self) -> PvtStoreResult<u64>;

    /// Height as of the last committed batch. Equal to [`height`](Self::height)
    /// for stores that commit one block at a time.
    fn last_committed_block_height(&self) -> PvtStoreResult<u64> {
        self.height()
    }

    fn is_empty(&self) -> PvtStoreResult<bool> {
        Ok(self.height()? == 0)
    }

    /// Prepare and commit in one step.
    ///
    /// Re-committing an already committed block with the same entries is a
    /// no-op.
    fn commit(&self, block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<()> {
        if block_num < self.height()? {
            let stored = self.get_pvt_data_by_block_num(block_num)?.unwrap_or_default();
            if stored == sorted_entries(block_num, entries)? {
                debug!(block_num, "private data already committed");
                return Ok(());
            }
            return Err(PvtStoreError::AlreadyCommitted(block_num));
        }
        self.prepare(block_num, entries)?;
        self.commit_pending()
    }

    /// Release resources. Idempotent.
    fn shutdown(&self);
}

/// Opens private-data stores by ledger id.
pub trait PvtDataStoreProvider: Send + Sync {
    /// Open the store for `ledger_id`, creating it if needed.
    fn open_pvt_data_store(&self, ledger_id: &str) -> PvtStoreResult<Arc<dyn PvtDataStore>>;

    /// Shut down every store opened through this provider.
    fn close(&self);
}
