use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pdl_blkstore::{BlkStoreResult, BlockStore};
use pdl_pvtstore::{PvtDataStore, PvtStoreError, PvtStoreResult};
use pdl_types::fixtures::{construct_test_blocks, sample_pvt_data};
use pdl_types::{Block, BlockAndPvtData, BlockHash, BlockchainInfo, TxPvtData};

/// Ten chained blocks; blocks 2 and 3 carry private data for txs 3,5 and
/// 4,6.
pub fn sample_data() -> Vec<BlockAndPvtData> {
    let mut data: Vec<_> = construct_test_blocks(10)
        .into_iter()
        .map(BlockAndPvtData::new)
        .collect();
    data[2] = BlockAndPvtData::with_pvt_data(data[2].block.clone(), sample_pvt_data(&[3, 5]));
    data[3] = BlockAndPvtData::with_pvt_data(data[3].block.clone(), sample_pvt_data(&[4, 6]));
    data
}

/// Block store that sleeps before every append and numbered read.
pub struct SlowBlockStore {
    inner: Arc<dyn BlockStore>,
    delay: Duration,
}

impl SlowBlockStore {
    pub fn new(inner: Arc<dyn BlockStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl BlockStore for SlowBlockStore {
    fn add_block(&self, block: &Block) -> BlkStoreResult<()> {
        thread::sleep(self.delay);
        self.inner.add_block(block)
    }

    fn blockchain_info(&self) -> BlkStoreResult<BlockchainInfo> {
        self.inner.blockchain_info()
    }

    fn retrieve_block_by_number(&self, number: u64) -> BlkStoreResult<Block> {
        thread::sleep(self.delay);
        self.inner.retrieve_block_by_number(number)
    }

    fn retrieve_block_by_hash(&self, hash: &BlockHash) -> BlkStoreResult<Block> {
        self.inner.retrieve_block_by_hash(hash)
    }

    fn shutdown(&self) {
        self.inner.shutdown()
    }
}

/// Private-data store whose next `commit_pending` fails once armed.
pub struct FlakyPvtDataStore {
    inner: Arc<dyn PvtDataStore>,
    fail_commit: AtomicBool,
}

impl FlakyPvtDataStore {
    pub fn new(inner: Arc<dyn PvtDataStore>) -> Self {
        Self {
            inner,
            fail_commit: AtomicBool::new(false),
        }
    }

    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::Release);
    }
}

impl PvtDataStore for FlakyPvtDataStore {
    fn prepare(&self, block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<()> {
        self.inner.prepare(block_num, entries)
    }

    fn commit_pending(&self) -> PvtStoreResult<()> {
        if self.fail_commit.swap(false, Ordering::AcqRel) {
            return Err(PvtStoreError::Io(io::Error::other("disk full")));
        }
        self.inner.commit_pending()
    }

    fn rollback_pending(&self) -> PvtStoreResult<()> {
        self.inner.rollback_pending()
    }

    fn pending_block(&self) -> PvtStoreResult<Option<u64>> {
        self.inner.pending_block()
    }

    fn get_pvt_data_by_block_num(&self, block_num: u64) -> PvtStoreResult<Option<Vec<TxPvtData>>> {
        self.inner.get_pvt_data_by_block_num(block_num)
    }

    fn height(&self) -> PvtStoreResult<u64> {
        self.inner.height()
    }

    fn shutdown(&self) {
        self.inner.shutdown()
    }
}
