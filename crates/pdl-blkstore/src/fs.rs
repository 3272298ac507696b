use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use pdl_journal::{Journal, JournalConfig};
use pdl_types::{validate_ledger_id, Block, BlockHash, BlockchainInfo};
use tracing::{debug, info, warn};

use crate::chain::{advance, check_next_block};
use crate::error::{BlkStoreError, BlkStoreResult};
use crate::traits::{BlockStore, BlockStoreProvider};

const BLOCKS_FILE: &str = "blocks.log";

#[derive(Default)]
struct BlockIndex {
    /// Journal offset of each block, indexed by block number.
    offsets: Vec<u64>,
    by_hash: HashMap<BlockHash, u64>,
    info: BlockchainInfo,
}

/// File-backed block store.
///
/// Blocks are bincode records in a single [`Journal`]. The number and hash
/// indexes live in memory and are rebuilt by scanning the journal on open.
/// The index lock is only held for map lookups and updates, never across
/// file I/O, so a slow append does not stall readers of earlier blocks.
pub struct FsBlockStore {
    ledger_id: String,
    journal: Journal,
    index: RwLock<BlockIndex>,
    /// Serializes appends.
    append_lock: Mutex<()>,
    closed: AtomicBool,
}

impl FsBlockStore {
    /// Open (or create) the store for `ledger_id` under `chains_dir`.
    pub fn open(chains_dir: &Path, ledger_id: &str, config: JournalConfig) -> BlkStoreResult<Self> {
        validate_ledger_id(ledger_id)?;
        let journal = Journal::open(&chains_dir.join(ledger_id).join(BLOCKS_FILE), config)?;

        let mut index = BlockIndex::default();
        for entry in journal.entries()? {
            let block: Block = entry.decode()?;
            check_next_block(&index.info, &block).map_err(|e| BlkStoreError::Corrupt {
                ledger_id: ledger_id.to_string(),
                reason: format!("block at offset {}: {e}", entry.offset),
            })?;
            let hash = block.hash();
            index.offsets.push(entry.offset);
            index.by_hash.insert(hash, block.number());
            index.info = advance(&index.info, hash);
        }

        info!(ledger_id, height = index.info.height, "block store opened");

        Ok(Self {
            ledger_id: ledger_id.to_string(),
            journal,
            index: RwLock::new(index),
            append_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Returns `true` once [`BlockStore::shutdown`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> BlkStoreResult<()> {
        if self.is_closed() {
            return Err(BlkStoreError::Closed(self.ledger_id.clone()));
        }
        Ok(())
    }

    fn read_block_at(&self, offset: u64) -> BlkStoreResult<Block> {
        Ok(self.journal.read_record(offset)?)
    }
}

impl BlockStore for FsBlockStore {
    fn add_block(&self, block: &Block) -> BlkStoreResult<()> {
        self.ensure_open()?;
        let _append = self.append_lock.lock().expect("append lock poisoned");

        let info = self.index.read().expect("index lock poisoned").info.clone();
        check_next_block(&info, block)?;

        let offset = self.journal.append_record(block)?;
        let hash = block.hash();

        let mut index = self.index.write().expect("index lock poisoned");
        index.offsets.push(offset);
        index.by_hash.insert(hash, block.number());
        index.info = advance(&info, hash);

        debug!(ledger_id = %self.ledger_id, block_num = block.number(), offset, "block appended");
        Ok(())
    }

    fn blockchain_info(&self) -> BlkStoreResult<BlockchainInfo> {
        self.ensure_open()?;
        Ok(self.index.read().expect("index lock poisoned").info.clone())
    }

    fn retrieve_block_by_number(&self, number: u64) -> BlkStoreResult<Block> {
        self.ensure_open()?;
        let offset = {
            let index = self.index.read().expect("index lock poisoned");
            usize::try_from(number)
                .ok()
                .and_then(|n| index.offsets.get(n).copied())
                .ok_or(BlkStoreError::BlockNotFound(number))?
        };
        self.read_block_at(offset)
    }

    fn retrieve_block_by_hash(&self, hash: &BlockHash) -> BlkStoreResult<Block> {
        self.ensure_open()?;
        let offset = {
            let index = self.index.read().expect("index lock poisoned");
            index
                .by_hash
                .get(hash)
                .and_then(|n| index.offsets.get(*n as usize).copied())
                .ok_or(BlkStoreError::HashNotFound(*hash))?
        };
        self.read_block_at(offset)
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.journal.sync() {
            warn!(ledger_id = %self.ledger_id, error = %e, "failed to sync block journal on shutdown");
        }
        info!(ledger_id = %self.ledger_id, "block store shut down");
    }
}

impl std::fmt::Debug for FsBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let height = self.index.read().map(|i| i.info.height).unwrap_or_default();
        f.debug_struct("FsBlockStore")
            .field("ledger_id", &self.ledger_id)
            .field("height", &height)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens [`FsBlockStore`]s under `<root>/<ledger_id>/`.
///
/// An open store is shared by every caller asking for the same ledger, so a
/// ledger never has two journal writers.
pub struct FsBlockStoreProvider {
    root: PathBuf,
    config: JournalConfig,
    stores: Mutex<HashMap<String, Arc<FsBlockStore>>>,
}

impl FsBlockStoreProvider {
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

impl BlockStoreProvider for FsBlockStoreProvider {
    fn open_block_store(&self, ledger_id: &str) -> BlkStoreResult<Arc<dyn BlockStore>> {
        let mut stores = self.stores.lock().expect("provider lock poisoned");
        if let Some(store) = stores.get(ledger_id).filter(|s| !s.is_closed()) {
            return Ok(Arc::clone(store) as Arc<dyn BlockStore>);
        }
        let store = Arc::new(FsBlockStore::open(&self.root, ledger_id, self.config.clone())?);
        stores.insert(ledger_id.to_string(), Arc::clone(&store));
        Ok(store as Arc<dyn BlockStore>)
    }

    fn exists(&self, ledger_id: &str) -> BlkStoreResult<bool> {
        validate_ledger_id(ledger_id)?;
        Ok(self.root.join(ledger_id).join(BLOCKS_FILE).is_file())
    }

    fn list(&self) -> BlkStoreResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.path().join(BLOCKS_FILE).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn close(&self) {
        let mut stores = self.stores.lock().expect("provider lock poisoned");
        for store in stores.values() {
            store.shutdown();
        }
        stores.clear();
    }
}
