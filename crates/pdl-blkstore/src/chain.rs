use pdl_types::{Block, BlockHash, BlockchainInfo};

use crate::error::{BlkStoreError, BlkStoreResult};

/// Check that `block` may be appended to a chain described by `info`.
///
/// Block 0 may carry any previous hash.
pub fn check_next_block(info: &BlockchainInfo, block: &Block) -> BlkStoreResult<()> {
    if block.number() != info.height {
        return Err(BlkStoreError::UnexpectedBlockNumber {
            expected: info.height,
            got: block.number(),
        });
    }
    if info.height > 0 && block.header.previous_hash != info.current_block_hash {
        return Err(BlkStoreError::PreviousHashMismatch {
            number: block.number(),
            expected: info.current_block_hash,
            got: block.header.previous_hash,
        });
    }
    if !block.verify_data_hash() {
        return Err(BlkStoreError::DataHashMismatch(block.number()));
    }
    Ok(())
}

/// Chain summary after appending a block with hash `hash`.
pub fn advance(info: &BlockchainInfo, hash: BlockHash) -> BlockchainInfo {
    BlockchainInfo {
        height: info.height + 1,
        current_block_hash: hash,
        previous_block_hash: info.current_block_hash,
    }
}
