use std::cmp::Ordering as HeightOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pdl_blkstore::BlockStore;
use pdl_pvtstore::PvtDataStore;
use pdl_types::{Block, BlockAndPvtData, BlockHash, BlockchainInfo, PvtNsCollFilter, TxPvtData};
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};

/// Storage for one ledger: its blocks and their private data.
///
/// Commits are serialized by an internal lock; reads take no lock of their
/// own and never wait on a commit in progress.
///
/// # Commit order
///
/// Private data is staged first, then the block is appended, then the staged
/// data is committed. A crash at any point leaves the private-data store
/// either level with the block store or holding one pending batch, which
/// [`Store::new`] resolves. If promoting the batch fails after the block is
/// appended, the next commit resolves it the same way before proceeding.
pub struct Store {
    ledger_id: String,
    block_store: Arc<dyn BlockStore>,
    pvt_data_store: Arc<dyn PvtDataStore>,
    commit_lock: Mutex<()>,
    needs_recovery: AtomicBool,
    shut_down: AtomicBool,
}

impl Store {
    /// Combine the two stores of `ledger_id`, reconciling their heights.
    ///
    /// Fails with [`StorageError::Corruption`] if the private-data store has
    /// committed data for blocks the block store does not have.
    pub fn new(
        ledger_id: impl Into<String>,
        block_store: Arc<dyn BlockStore>,
        pvt_data_store: Arc<dyn PvtDataStore>,
    ) -> StorageResult<Self> {
        let store = Self {
            ledger_id: ledger_id.into(),
            block_store,
            pvt_data_store,
            commit_lock: Mutex::new(()),
            needs_recovery: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        };
        let height = store.sync_pvt_data_with_blocks()?;
        info!(ledger_id = %store.ledger_id, height, "ledger store ready");
        Ok(store)
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    pub fn block_store(&self) -> &Arc<dyn BlockStore> {
        &self.block_store
    }

    pub fn pvt_data_store(&self) -> &Arc<dyn PvtDataStore> {
        &self.pvt_data_store
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_shut_down() {
            return Err(StorageError::ShutDown(self.ledger_id.clone()));
        }
        Ok(())
    }

    /// Resolve a leftover pending batch and backfill missing entries.
    /// Returns the block height.
    fn sync_pvt_data_with_blocks(&self) -> StorageResult<u64> {
        let block_height = self.block_store.height()?;

        if let Some(pending) = self.pvt_data_store.pending_block()? {
            if pending < block_height {
                self.pvt_data_store.commit_pending()?;
                info!(ledger_id = %self.ledger_id, block_num = pending, "completed interrupted private data commit");
            } else {
                self.pvt_data_store.rollback_pending()?;
                warn!(ledger_id = %self.ledger_id, block_num = pending, "discarded private data of uncommitted block");
            }
        }

        let pvt_height = self.pvt_data_store.height()?;
        match pvt_height.cmp(&block_height) {
            HeightOrdering::Equal => {}
            HeightOrdering::Less => {
                info!(
                    ledger_id = %self.ledger_id,
                    pvt_height,
                    block_height,
                    "private data store behind block store; filling with empty entries"
                );
                for block_num in pvt_height..block_height {
                    self.pvt_data_store.commit(block_num, &[])?;
                }
            }
            HeightOrdering::Greater => {
                return Err(StorageError::Corruption {
                    ledger_id: self.ledger_id.clone(),
                    pvt_height,
                    block_height,
                });
            }
        }

        Ok(block_height)
    }

    /// Commit a block together with its private data.
    pub fn commit_with_pvt_data(&self, block_and_pvt_data: &BlockAndPvtData) -> StorageResult<()> {
        self.ensure_open()?;
        let _commit = self.commit_lock.lock().expect("commit lock poisoned");

        if self.needs_recovery.load(Ordering::Acquire) {
            self.sync_pvt_data_with_blocks()?;
            self.needs_recovery.store(false, Ordering::Release);
            info!(ledger_id = %self.ledger_id, "private data store resynchronized");
        }

        let block = &block_and_pvt_data.block;
        let block_num = block.number();
        let height = self.block_store.height()?;
        if block_num != height {
            return Err(StorageError::Sequencing {
                expected: height,
                got: block_num,
            });
        }

        let entries = block_and_pvt_data
            .pvt_data_entries()
            .map_err(|e| StorageError::invalid_pvt_data(block_num, e))?;

        self.pvt_data_store.prepare(block_num, &entries)?;
        if let Err(e) = self.block_store.add_block(block) {
            if let Err(rollback) = self.pvt_data_store.rollback_pending() {
                warn!(ledger_id = %self.ledger_id, block_num, error = %rollback, "failed to roll back private data");
            }
            return Err(e.into());
        }
        // The block is durable now; a failure here leaves a pending batch that
        // has to be committed before anything else is staged.
        if let Err(e) = self.pvt_data_store.commit_pending() {
            self.needs_recovery.store(true, Ordering::Release);
            warn!(ledger_id = %self.ledger_id, block_num, error = %e, "block appended but private data commit failed");
            return Err(e.into());
        }

        debug!(ledger_id = %self.ledger_id, block_num, pvt_entries = entries.len(), "block committed");
        Ok(())
    }

    /// Private data of block `block_num`, ascending by sequence number.
    ///
    /// `Ok(None)` means the block has no private data. With a non-empty
    /// `filter`, each entry is narrowed to the allowed collections; entries
    /// are kept even if nothing in them remains visible.
    pub fn get_pvt_data_by_num(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> StorageResult<Option<Vec<TxPvtData>>> {
        self.ensure_open()?;
        let entries = self.pvt_data_store.get_pvt_data_by_block_num(block_num)?;
        Ok(match filter.filter(|f| !f.is_empty()) {
            Some(filter) => entries.map(|entries| entries.iter().map(|e| e.filtered(filter)).collect()),
            None => entries,
        })
    }

    /// Block `block_num` with its (filtered) private data.
    ///
    /// Private data is read first: a block whose commit has not finished is
    /// reported as not found rather than returned without its private data.
    pub fn get_pvt_data_and_block_by_num(
        &self,
        block_num: u64,
        filter: Option<&PvtNsCollFilter>,
    ) -> StorageResult<BlockAndPvtData> {
        let entries = self.get_pvt_data_by_num(block_num, filter)?;
        let block = self.block_store.retrieve_block_by_number(block_num)?;
        let block_pvt_data: BTreeMap<u64, TxPvtData> = entries
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.seq_in_block, entry))
            .collect();
        Ok(BlockAndPvtData {
            block,
            block_pvt_data,
        })
    }

    pub fn retrieve_block_by_number(&self, block_num: u64) -> StorageResult<Block> {
        self.ensure_open()?;
        Ok(self.block_store.retrieve_block_by_number(block_num)?)
    }

    pub fn retrieve_block_by_hash(&self, hash: &BlockHash) -> StorageResult<Block> {
        self.ensure_open()?;
        Ok(self.block_store.retrieve_block_by_hash(hash)?)
    }

    pub fn blockchain_info(&self) -> StorageResult<BlockchainInfo> {
        self.ensure_open()?;
        Ok(self.block_store.blockchain_info()?)
    }

    pub fn height(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(self.block_store.height()?)
    }

    /// Shut down both underlying stores. Idempotent.
    ///
    /// Waits for an in-flight commit to finish.
    pub fn shutdown(&self) {
        let _commit = self.commit_lock.lock().expect("commit lock poisoned");
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pvt_data_store.shutdown();
        self.block_store.shutdown();
        info!(ledger_id = %self.ledger_id, "ledger store shut down");
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("ledger_id", &self.ledger_id)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sample_data, FlakyPvtDataStore, SlowBlockStore};
    use pdl_blkstore::{BlkStoreError, InMemoryBlockStore};
    use pdl_pvtstore::{InMemoryPvtDataStore, PvtStoreError};
    use pdl_types::fixtures::{construct_test_blocks, sample_pvt_data};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn memory_store() -> (Store, Arc<InMemoryBlockStore>, Arc<InMemoryPvtDataStore>) {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let pvt = Arc::new(InMemoryPvtDataStore::new());
        let store = Store::new("testLedger", blocks.clone(), pvt.clone()).unwrap();
        (store, blocks, pvt)
    }

    #[test]
    fn commit_and_retrieve() {
        let (store, _, _) = memory_store();
        let data = sample_data();
        for datum in &data {
            store.commit_with_pvt_data(datum).unwrap();
        }
        assert_eq!(store.height().unwrap(), 10);

        assert_eq!(store.get_pvt_data_by_num(1, None).unwrap(), None);
        assert_eq!(store.get_pvt_data_by_num(4, None).unwrap(), None);

        let pvt = store.get_pvt_data_by_num(2, None).unwrap().unwrap();
        assert_eq!(pvt.len(), 2);
        assert_eq!(pvt[0].seq_in_block, 3);
        assert_eq!(pvt[1].seq_in_block, 5);

        let pvt = store.get_pvt_data_by_num(3, None).unwrap().unwrap();
        assert_eq!(pvt.len(), 2);
        assert_eq!(pvt[0].seq_in_block, 4);
        assert_eq!(pvt[1].seq_in_block, 6);

        assert_eq!(store.get_pvt_data_and_block_by_num(2, None).unwrap(), data[2]);
        assert_eq!(store.get_pvt_data_and_block_by_num(3, None).unwrap(), data[3]);
        assert_eq!(store.get_pvt_data_and_block_by_num(5, None).unwrap(), data[5]);
    }

    #[test]
    fn filtered_retrieval() {
        let (store, _, _) = memory_store();
        let data = sample_data();
        for datum in &data {
            store.commit_with_pvt_data(datum).unwrap();
        }

        let mut filter = PvtNsCollFilter::new();
        filter.add("ns-1", "coll-1");
        let result = store.get_pvt_data_and_block_by_num(3, Some(&filter)).unwrap();

        assert_eq!(result.block, data[3].block);
        assert_eq!(result.block_pvt_data.len(), 2);
        for seq in [4, 6] {
            let entry = &result.block_pvt_data[&seq];
            assert_eq!(entry.write_set.ns_pvt_rwset.len(), 1);
            assert_eq!(entry.write_set.collection_count(), 1);
            assert!(entry.has("ns-1", "coll-1"));
        }
        assert!(result.block_pvt_data.get(&2).is_none());
    }

    #[test]
    fn empty_filter_returns_everything() {
        let (store, _, _) = memory_store();
        for datum in &sample_data()[..3] {
            store.commit_with_pvt_data(datum).unwrap();
        }
        let all = store.get_pvt_data_by_num(2, None).unwrap();
        let empty = PvtNsCollFilter::new();
        assert_eq!(store.get_pvt_data_by_num(2, Some(&empty)).unwrap(), all);
    }

    #[test]
    fn filter_keeps_entries_with_nothing_visible() {
        let (store, _, _) = memory_store();
        for datum in &sample_data()[..3] {
            store.commit_with_pvt_data(datum).unwrap();
        }
        let mut filter = PvtNsCollFilter::new();
        filter.add("ns-9", "coll-1");

        let pvt = store.get_pvt_data_by_num(2, Some(&filter)).unwrap().unwrap();
        assert_eq!(pvt.len(), 2);
        assert!(pvt.iter().all(|e| e.write_set.ns_pvt_rwset.is_empty()));
    }

    #[test]
    fn retrieval_past_height_is_not_found() {
        let (store, _, _) = memory_store();
        store.commit_with_pvt_data(&sample_data()[0]).unwrap();

        assert!(store.get_pvt_data_by_num(1, None).unwrap_err().is_not_found());
        assert!(store.get_pvt_data_and_block_by_num(1, None).unwrap_err().is_not_found());
        assert!(store.retrieve_block_by_number(1).unwrap_err().is_not_found());
        assert!(store
            .retrieve_block_by_hash(&BlockHash::from_hash([7; 32]))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn out_of_sequence_commit_is_rejected() {
        let (store, _, pvt) = memory_store();
        let data = sample_data();
        store.commit_with_pvt_data(&data[0]).unwrap();

        for bad in [&data[0], &data[2]] {
            assert!(matches!(
                store.commit_with_pvt_data(bad),
                Err(StorageError::Sequencing { expected: 1, .. })
            ));
        }
        assert_eq!(store.height().unwrap(), 1);
        assert_eq!(pvt.height().unwrap(), 1);
    }

    #[test]
    fn invalid_pvt_data_is_rejected_before_any_write() {
        let (store, blocks, pvt) = memory_store();
        let block = construct_test_blocks(1).remove(0);
        let tx_count = block.tx_count();
        let bad = BlockAndPvtData::with_pvt_data(block, sample_pvt_data(&[tx_count]));

        assert!(matches!(
            store.commit_with_pvt_data(&bad),
            Err(StorageError::InvalidPvtData { block_num: 0, .. })
        ));
        assert_eq!(blocks.height().unwrap(), 0);
        assert_eq!(pvt.pending_block().unwrap(), None);
    }

    #[test]
    fn failed_block_append_rolls_back_private_data() {
        let (store, blocks, pvt) = memory_store();
        let mut block = construct_test_blocks(1).remove(0);
        block.data.data[0] = b"tampered".to_vec();
        let datum = BlockAndPvtData::with_pvt_data(block, sample_pvt_data(&[1]));

        assert!(matches!(
            store.commit_with_pvt_data(&datum),
            Err(StorageError::BlockStore(BlkStoreError::DataHashMismatch(0)))
        ));
        assert_eq!(blocks.height().unwrap(), 0);
        assert_eq!(pvt.height().unwrap(), 0);
        assert_eq!(pvt.pending_block().unwrap(), None);

        store.commit_with_pvt_data(&sample_data()[0]).unwrap();
        assert_eq!(store.height().unwrap(), 1);
    }

    #[test]
    fn existing_blockchain_is_backfilled() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let test_blocks = construct_test_blocks(10);
        for block in &test_blocks[..9] {
            blocks.add_block(block).unwrap();
        }

        let pvt = Arc::new(InMemoryPvtDataStore::new());
        let store = Store::new("test-ledger", blocks, pvt.clone()).unwrap();
        assert_eq!(pvt.last_committed_block_height().unwrap(), 9);
        assert_eq!(store.get_pvt_data_by_num(4, None).unwrap(), None);

        let datum = BlockAndPvtData::with_pvt_data(test_blocks[9].clone(), sample_pvt_data(&[0]));
        store.commit_with_pvt_data(&datum).unwrap();
        assert_eq!(pvt.last_committed_block_height().unwrap(), 10);
    }

    #[test]
    fn pending_batch_of_durable_block_is_committed() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let pvt = Arc::new(InMemoryPvtDataStore::new());
        let data = sample_data();
        {
            let store = Store::new("ledger", blocks.clone(), pvt.clone()).unwrap();
            for datum in &data[..2] {
                store.commit_with_pvt_data(datum).unwrap();
            }
        }
        // Crash after the block append, before commit_pending.
        pvt.prepare(2, &data[2].pvt_data_entries().unwrap()).unwrap();
        blocks.add_block(&data[2].block).unwrap();

        let store = Store::new("ledger", blocks, pvt.clone()).unwrap();
        assert_eq!(pvt.pending_block().unwrap(), None);
        assert_eq!(store.get_pvt_data_and_block_by_num(2, None).unwrap(), data[2]);
    }

    #[test]
    fn pending_batch_of_missing_block_is_rolled_back() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let pvt = Arc::new(InMemoryPvtDataStore::new());
        let data = sample_data();
        {
            let store = Store::new("ledger", blocks.clone(), pvt.clone()).unwrap();
            for datum in &data[..2] {
                store.commit_with_pvt_data(datum).unwrap();
            }
        }
        // Crash before the block append.
        pvt.prepare(2, &data[2].pvt_data_entries().unwrap()).unwrap();

        let store = Store::new("ledger", blocks, pvt.clone()).unwrap();
        assert_eq!(pvt.pending_block().unwrap(), None);
        assert_eq!(pvt.height().unwrap(), 2);
        store.commit_with_pvt_data(&data[2]).unwrap();
        assert_eq!(store.get_pvt_data_by_num(2, None).unwrap().unwrap().len(), 2);
    }

    #[test]
    fn pvt_data_ahead_of_blocks_is_corruption() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let pvt = Arc::new(InMemoryPvtDataStore::new());
        blocks.add_block(&construct_test_blocks(1)[0]).unwrap();
        pvt.commit(0, &[]).unwrap();
        pvt.commit(1, &[]).unwrap();

        let err = Store::new("ledger", blocks, pvt).unwrap_err();
        assert!(matches!(
            err,
            StorageError::Corruption {
                pvt_height: 2,
                block_height: 1,
                ..
            }
        ));
    }

    #[test]
    fn recovery_is_idempotent() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        for block in &construct_test_blocks(3) {
            blocks.add_block(block).unwrap();
        }
        let pvt = Arc::new(InMemoryPvtDataStore::new());

        Store::new("ledger", blocks.clone(), pvt.clone()).unwrap();
        Store::new("ledger", blocks.clone(), pvt.clone()).unwrap();
        assert_eq!(pvt.height().unwrap(), 3);
        assert_eq!(blocks.height().unwrap(), 3);
    }

    #[test]
    fn calls_after_shutdown_fail() {
        let (store, _, _) = memory_store();
        store.commit_with_pvt_data(&sample_data()[0]).unwrap();
        store.shutdown();
        store.shutdown();

        assert!(store.is_shut_down());
        assert!(matches!(store.height(), Err(StorageError::ShutDown(_))));
        assert!(matches!(
            store.get_pvt_data_by_num(0, None),
            Err(StorageError::ShutDown(_))
        ));
        assert!(matches!(
            store.commit_with_pvt_data(&sample_data()[1]),
            Err(StorageError::ShutDown(_))
        ));
    }

    #[test]
    fn read_does_not_wait_for_slow_commits() {
        let inner: Arc<dyn BlockStore> = Arc::new(InMemoryBlockStore::new());
        let slow = Arc::new(SlowBlockStore::new(inner, Duration::from_millis(200)));
        let store = Arc::new(
            Store::new("testLedger", slow, Arc::new(InMemoryPvtDataStore::new())).unwrap(),
        );
        let data = sample_data();
        store.commit_with_pvt_data(&data[0]).unwrap();

        let writer = {
            let store = Arc::clone(&store);
            let data = data.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                for datum in &data[1..] {
                    store.commit_with_pvt_data(datum).unwrap();
                }
            })
        };

        let (tx, rx) = mpsc::channel();
        {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _ = tx.send(store.get_pvt_data_and_block_by_num(0, None));
            });
        }

        let read = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("read did not finish in time; commit and read may be deadlocked");
        assert_eq!(read.unwrap(), data[0]);

        writer.join().unwrap();
        assert_eq!(store.height().unwrap(), 10);
    }

    #[test]
    fn failed_pvt_commit_is_resolved_by_next_commit() {
        let blocks = Arc::new(InMemoryBlockStore::new());
        let pvt = Arc::new(FlakyPvtDataStore::new(Arc::new(InMemoryPvtDataStore::new())));
        let store = Store::new("ledger", blocks.clone(), pvt.clone()).unwrap();
        let data = sample_data();
        for datum in &data[..2] {
            store.commit_with_pvt_data(datum).unwrap();
        }

        pvt.fail_next_commit();
        assert!(matches!(
            store.commit_with_pvt_data(&data[2]),
            Err(StorageError::PvtDataStore(PvtStoreError::Io(_)))
        ));
        // The block landed; its private data is still staged.
        assert_eq!(blocks.height().unwrap(), 3);
        assert_eq!(pvt.pending_block().unwrap(), Some(2));

        store.commit_with_pvt_data(&data[3]).unwrap();
        assert_eq!(pvt.pending_block().unwrap(), None);
        assert_eq!(pvt.height().unwrap(), 4);
        assert_eq!(store.get_pvt_data_and_block_by_num(2, None).unwrap(), data[2]);
        assert_eq!(store.get_pvt_data_and_block_by_num(3, None).unwrap(), data[3]);
    }

    #[test]
    fn pvt_store_errors_pass_through() {
        let (store, _, pvt) = memory_store();
        pvt.prepare(0, &[]).unwrap();
        assert!(matches!(
            store.commit_with_pvt_data(&sample_data()[0]),
            Err(StorageError::PvtDataStore(PvtStoreError::PendingBatchExists(0)))
        ));
    }
}
