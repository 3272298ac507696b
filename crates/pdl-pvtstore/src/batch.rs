use pdl_types::TxPvtData;

use crate::error::{PvtStoreError, PvtStoreResult};

/// Check that a batch for `block_num` may be staged on a store at `height`
/// with the given pending batch.
pub fn check_prepare(height: u64, pending: Option<u64>, block_num: u64) -> PvtStoreResult<()> {
    if let Some(pending) = pending {
        return Err(PvtStoreError::PendingBatchExists(pending));
    }
    if block_num != height {
        return Err(PvtStoreError::UnexpectedBlockNumber {
            expected: height,
            got: block_num,
        });
    }
    Ok(())
}

/// Entries ascending by sequence number, rejecting duplicates.
pub fn sorted_entries(block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<Vec<TxPvtData>> {
    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|e| e.seq_in_block);
    if let Some(pair) = sorted.windows(2).find(|w| w[0].seq_in_block == w[1].seq_in_block) {
        return Err(PvtStoreError::DuplicateSeq {
            block_num,
            seq: pair[0].seq_in_block,
        });
    }
    Ok(sorted)
}
