use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use pdl_journal::{Journal, JournalConfig};
use pdl_types::{validate_ledger_id, TxPvtData};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::batch::{check_prepare, sorted_entries};
use crate::error::{PvtStoreError, PvtStoreResult};
use crate::traits::{PvtDataStore, PvtDataStoreProvider};

const PVT_DATA_FILE: &str = "pvtdata.log";

/// Journal record. A batch is a `Prepared` record followed by exactly one
/// `Committed` or `RolledBack` record for the same block, or by nothing if
/// it is still pending.
#[derive(Debug, Serialize, Deserialize)]
enum PvtRecord {
    Prepared {
        block_num: u64,
        entries: Vec<TxPvtData>,
    },
    Committed {
        block_num: u64,
    },
    RolledBack {
        block_num: u64,
    },
}

#[derive(Clone, Copy, Debug)]
struct PendingBatch {
    block_num: u64,
    /// Offset of the `Prepared` record, `None` when the batch is empty.
    offset: Option<u64>,
}

#[derive(Default)]
struct PvtIndex {
    /// Offset of each committed block's `Prepared` record, `None` for blocks
    /// without private data.
    committed: Vec<Option<u64>>,
    pending: Option<PendingBatch>,
}

impl PvtIndex {
    fn height(&self) -> u64 {
        self.committed.len() as u64
    }

    /// Apply one record read back from the journal.
    fn replay(&mut self, offset: u64, record: PvtRecord) -> Result<(), String> {
        match record {
            PvtRecord::Prepared { block_num, entries } => {
                check_prepare(self.height(), self.pending.map(|p| p.block_num), block_num)
                    .map_err(|e| e.to_string())?;
                self.pending = Some(PendingBatch {
                    block_num,
                    offset: (!entries.is_empty()).then_some(offset),
                });
            }
            PvtRecord::Committed { block_num } => {
                let pending = self.take_pending(block_num)?;
                self.committed.push(pending.offset);
            }
            PvtRecord::RolledBack { block_num } => {
                self.take_pending(block_num)?;
            }
        }
        Ok(())
    }

    fn take_pending(&mut self, block_num: u64) -> Result<PendingBatch, String> {
        match self.pending.take() {
            Some(p) if p.block_num == block_num => Ok(p),
            Some(p) => Err(format!(
                "resolution of block {block_num} while block {} is pending",
                p.block_num
            )),
            None => Err(format!("resolution of block {block_num} without a prepared batch")),
        }
    }
}

/// File-backed private-data store.
///
/// Every state change is a record appended to one [`Journal`]: preparing a
/// batch writes its entries, committing or rolling back writes a marker.
/// Reopening replays the markers to rebuild the per-block index and the
/// pending batch; entries themselves are read lazily by offset.
pub struct FsPvtDataStore {
    ledger_id: String,
    journal: Journal,
    index: RwLock<PvtIndex>,
    /// Serializes prepare/commit/rollback.
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FsPvtDataStore {
    /// Open (or create) the store for `ledger_id` under `root`.
    pub fn open(root: &Path, ledger_id: &str, config: JournalConfig) -> PvtStoreResult<Self> {
        validate_ledger_id(ledger_id)?;
        let journal = Journal::open(&root.join(ledger_id).join(PVT_DATA_FILE), config)?;

        let mut index = PvtIndex::default();
        for entry in journal.entries()? {
            let record: PvtRecord = entry.decode()?;
            index
                .replay(entry.offset, record)
                .map_err(|reason| PvtStoreError::Corrupt {
                    ledger_id: ledger_id.to_string(),
                    reason: format!("record at offset {}: {reason}", entry.offset),
                })?;
        }

        info!(
            ledger_id,
            height = index.height(),
            pending = ?index.pending.map(|p| p.block_num),
            "private data store opened"
        );

        Ok(Self {
            ledger_id: ledger_id.to_string(),
            journal,
            index: RwLock::new(index),
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> PvtStoreResult<()> {
        if self.is_closed() {
            return Err(PvtStoreError::Closed(self.ledger_id.clone()));
        }
        Ok(())
    }

    fn pending(&self) -> Option<PendingBatch> {
        self.index.read().expect("index lock poisoned").pending
    }
}

impl PvtDataStore for FsPvtDataStore {
    fn prepare(&self, block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().expect("write lock poisoned");

        {
            let index = self.index.read().expect("index lock poisoned");
            check_prepare(index.height(), index.pending.map(|p| p.block_num), block_num)?;
        }
        let entries = sorted_entries(block_num, entries)?;
        let is_empty = entries.is_empty();
        let offset = self
            .journal
            .append_record(&PvtRecord::Prepared { block_num, entries })?;

        self.index.write().expect("index lock poisoned").pending = Some(PendingBatch {
            block_num,
            offset: (!is_empty).then_some(offset),
        });
        debug!(ledger_id = %self.ledger_id, block_num, offset, "private data prepared");
        Ok(())
    }

    fn commit_pending(&self) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().expect("write lock poisoned");

        let pending = self.pending().ok_or(PvtStoreError::NoPendingBatch)?;
        self.journal.append_record(&PvtRecord::Committed {
            block_num: pending.block_num,
        })?;

        let mut index = self.index.write().expect("index lock poisoned");
        index.committed.push(pending.offset);
        index.pending = None;
        debug!(ledger_id = %self.ledger_id, block_num = pending.block_num, "private data committed");
        Ok(())
    }

    fn rollback_pending(&self) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().expect("write lock poisoned");

        let pending = self.pending().ok_or(PvtStoreError::NoPendingBatch)?;
        self.journal.append_record(&PvtRecord::RolledBack {
            block_num: pending.block_num,
        })?;

        self.index.write().expect("index lock poisoned").pending = None;
        warn!(ledger_id = %self.ledger_id, block_num = pending.block_num, "private data rolled back");
        Ok(())
    }

    fn pending_block(&self) -> PvtStoreResult<Option<u64>> {
        self.ensure_open()?;
        Ok(self.pending().map(|p| p.block_num))
    }

    fn get_pvt_data_by_block_num(&self, block_num: u64) -> PvtStoreResult<Option<Vec<TxPvtData>>> {
        self.ensure_open()?;
        let offset = {
            let index = self.index.read().expect("index lock poisoned");
            usize::try_from(block_num)
                .ok()
                .and_then(|n| index.committed.get(n).copied())
                .ok_or(PvtStoreError::NotFound {
                    block_num,
                    height: index.height(),
                })?
        };
        let Some(offset) = offset else {
            return Ok(None);
        };
        match self.journal.read_record(offset)? {
            PvtRecord::Prepared { entries, .. } => Ok(Some(entries)),
            other => Err(PvtStoreError::Corrupt {
                ledger_id: self.ledger_id.clone(),
                reason: format!("expected prepared batch at offset {offset}, found {other:?}"),
            }),
        }
    }

    fn height(&self) -> PvtStoreResult<u64> {
        self.ensure_open()?;
        Ok(self.index.read().expect("index lock poisoned").height())
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.journal.sync() {
            warn!(ledger_id = %self.ledger_id, error = %e, "failed to sync private data journal on shutdown");
        }
        info!(ledger_id = %self.ledger_id, "private data store shut down");
    }
}

impl std::fmt::Debug for FsPvtDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (height, pending) = self
            .index
            .read()
            .map(|i| (i.height(), i.pending.map(|p| p.block_num)))
            .unwrap_or_default();
        f.debug_struct("FsPvtDataStore")
            .field("ledger_id", &self.ledger_id)
            .field("height", &height)
            .field("pending", &pending)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens [`FsPvtDataStore`]s under `<root>/<ledger_id>/`, sharing open
/// instances per ledger.
pub struct FsPvtDataStoreProvider {
    root: PathBuf,
    config: JournalConfig,
    stores: Mutex<HashMap<String, Arc<FsPvtDataStore>>>,
}

impl FsPvtDataStoreProvider {
    pub fn new(root: impl Into<PathBuf>, config: JournalConfig) -> Self {
        Self {
            root: root.into(),
            config,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PvtDataStoreProvider for FsPvtDataStoreProvider {
    fn open_pvt_data_store(&self, ledger_id: &str) -> PvtStoreResult<Arc<dyn PvtDataStore>> {
        let mut stores = self.stores.lock().expect("provider lock poisoned");
        if let Some(store) = stores.get(ledger_id).filter(|s| !s.is_closed()) {
            return Ok(Arc::clone(store) as Arc<dyn PvtDataStore>);
        }
        let store = Arc::new(FsPvtDataStore::open(&self.root, ledger_id, self.config.clone())?);
        stores.insert(ledger_id.to_string(), Arc::clone(&store));
        Ok(store as Arc<dyn PvtDataStore>)
    }

    fn close(&self) {
        let mut stores = self.stores.lock().expect("provider lock poisoned");
        for store in stores.values() {
            store.shutdown();
        }
        stores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdl_types::fixtures::sample_pvt_data;

    fn open(dir: &Path) -> FsPvtDataStore {
        FsPvtDataStore::open(dir, "testledger", JournalConfig::default()).unwrap()
    }

    #[test]
    fn commit_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        assert!(store.is_empty().unwrap());

        store.commit(0, &[]).unwrap();
        store.commit(1, &sample_pvt_data(&[5, 3])).unwrap();

        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(store.last_committed_block_height().unwrap(), 2);
        assert_eq!(store.get_pvt_data_by_block_num(0).unwrap(), None);
        let entries = store.get_pvt_data_by_block_num(1).unwrap().unwrap();
        let seqs: Vec<_> = entries.iter().map(|e| e.seq_in_block).collect();
        assert_eq!(seqs, vec![3, 5]);
    }

    #[test]
    fn lookup_past_height_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.commit(0, &[]).unwrap();

        let err = store.get_pvt_data_by_block_num(1).unwrap_err();
        assert!(matches!(err, PvtStoreError::NotFound { block_num: 1, height: 1 }));
        assert!(err.is_not_found());
    }

    #[test]
    fn prepared_batch_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.prepare(0, &sample_pvt_data(&[1])).unwrap();

        assert_eq!(store.pending_block().unwrap(), Some(0));
        assert_eq!(store.height().unwrap(), 0);
        assert!(store.get_pvt_data_by_block_num(0).unwrap_err().is_not_found());
        assert!(matches!(
            store.prepare(0, &[]),
            Err(PvtStoreError::PendingBatchExists(0))
        ));

        store.commit_pending().unwrap();
        assert_eq!(store.pending_block().unwrap(), None);
        assert_eq!(store.get_pvt_data_by_block_num(0).unwrap(), Some(sample_pvt_data(&[1])));
    }

    #[test]
    fn rollback_discards_batch() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.prepare(0, &sample_pvt_data(&[1])).unwrap();
        store.rollback_pending().unwrap();

        assert_eq!(store.pending_block().unwrap(), None);
        assert_eq!(store.height().unwrap(), 0);
        assert!(matches!(store.rollback_pending(), Err(PvtStoreError::NoPendingBatch)));
        assert!(matches!(store.commit_pending(), Err(PvtStoreError::NoPendingBatch)));

        store.commit(0, &[]).unwrap();
        assert_eq!(store.get_pvt_data_by_block_num(0).unwrap(), None);
    }

    #[test]
    fn prepare_rejects_wrong_block_number() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        assert!(matches!(
            store.prepare(1, &[]),
            Err(PvtStoreError::UnexpectedBlockNumber { expected: 0, got: 1 })
        ));
    }

    #[test]
    fn recommit_is_idempotent_only_for_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.commit(0, &[]).unwrap();
        store.commit(1, &sample_pvt_data(&[2])).unwrap();

        store.commit(0, &[]).unwrap();
        store.commit(1, &sample_pvt_data(&[2])).unwrap();
        assert_eq!(store.height().unwrap(), 2);

        assert!(matches!(
            store.commit(1, &sample_pvt_data(&[4])),
            Err(PvtStoreError::AlreadyCommitted(1))
        ));
    }

    #[test]
    fn reopen_restores_committed_and_pending_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path());
            store.commit(0, &sample_pvt_data(&[0])).unwrap();
            store.prepare(1, &[]).unwrap();
            store.rollback_pending().unwrap();
            store.commit(1, &[]).unwrap();
            store.prepare(2, &sample_pvt_data(&[7])).unwrap();
            store.shutdown();
        }

        let store = open(dir.path());
        assert_eq!(store.height().unwrap(), 2);
        assert_eq!(store.pending_block().unwrap(), Some(2));
        assert_eq!(store.get_pvt_data_by_block_num(0).unwrap(), Some(sample_pvt_data(&[0])));
        assert_eq!(store.get_pvt_data_by_block_num(1).unwrap(), None);

        store.commit_pending().unwrap();
        assert_eq!(store.get_pvt_data_by_block_num(2).unwrap(), Some(sample_pvt_data(&[7])));
    }

    #[test]
    fn out_of_order_history_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testledger").join(PVT_DATA_FILE);
        {
            let journal = Journal::open(&path, JournalConfig::default()).unwrap();
            journal
                .append_record(&PvtRecord::Committed { block_num: 0 })
                .unwrap();
        }

        assert!(matches!(
            FsPvtDataStore::open(dir.path(), "testledger", JournalConfig::default()),
            Err(PvtStoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn calls_after_shutdown_fail() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path());
        store.shutdown();
        store.shutdown();
        assert!(matches!(store.height(), Err(PvtStoreError::Closed(_))));
        assert!(matches!(store.prepare(0, &[]), Err(PvtStoreError::Closed(_))));
    }

    #[test]
    fn provider_shares_and_reopens_stores() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FsPvtDataStoreProvider::new(dir.path(), JournalConfig::default());
        let a = provider.open_pvt_data_store("ledger").unwrap();
        let again = provider.open_pvt_data_store("ledger").unwrap();
        a.commit(0, &[]).unwrap();
        assert_eq!(again.height().unwrap(), 1);

        provider.close();
        assert!(matches!(a.height(), Err(PvtStoreError::Closed(_))));
        assert_eq!(provider.open_pvt_data_store("ledger").unwrap().height().unwrap(), 1);
    }
}
