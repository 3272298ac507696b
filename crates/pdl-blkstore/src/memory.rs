use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use pdl_types::{validate_ledger_id, Block, BlockHash, BlockchainInfo};

use crate::chain::{advance, check_next_block};
use crate::error::{BlkStoreError, BlkStoreResult};
use crate::traits::{BlockStore, BlockStoreProvider};

#[derive(Default)]
struct ChainState {
    blocks: Vec<Block>,
    by_hash: HashMap<BlockHash, u64>,
    info: BlockchainInfo,
}

/// In-memory block store.
///
/// Intended for tests and embedding. Blocks are held in a `Vec` behind a
/// `RwLock` and cloned on read. After `shutdown` this handle refuses every
/// call; the blocks stay with the provider, which hands out a fresh handle
/// on the next open.
pub struct InMemoryBlockStore {
    ledger_id: String,
    inner: Arc<RwLock<ChainState>>,
    closed: AtomicBool,
}

impl InMemoryBlockStore {
    pub fn new() -> Self {
        Self::with_state("in-memory".to_string(), Arc::default())
    }

    fn with_state(ledger_id: String, inner: Arc<RwLock<ChainState>>) -> Self {
        Self {
            ledger_id,
            inner,
            closed: AtomicBool::new(false),
        }
    }

    /// A new open handle over the same blocks.
    fn reopen(&self) -> Self {
        Self::with_state(self.ledger_id.clone(), Arc::clone(&self.inner))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> BlkStoreResult<()> {
        if self.is_closed() {
            return Err(BlkStoreError::Closed(self.ledger_id.clone()));
        }
        Ok(())
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for InMemoryBlockStore {
    fn add_block(&self, block: &Block) -> BlkStoreResult<()> {
        self.ensure_open()?;
        let mut state = self.inner.write().expect("lock poisoned");
        check_next_block(&state.info, block)?;
        let hash = block.hash();
        state.by_hash.insert(hash, block.number());
        state.info = advance(&state.info, hash);
        state.blocks.push(block.clone());
        Ok(())
    }

    fn blockchain_info(&self) -> BlkStoreResult<BlockchainInfo> {
        self.ensure_open()?;
        Ok(self.inner.read().expect("lock poisoned").info.clone())
    }

    fn retrieve_block_by_number(&self, number: u64) -> BlkStoreResult<Block> {
        self.ensure_open()?;
        let state = self.inner.read().expect("lock poisoned");
        usize::try_from(number)
            .ok()
            .and_then(|n| state.blocks.get(n).cloned())
            .ok_or(BlkStoreError::BlockNotFound(number))
    }

    fn retrieve_block_by_hash(&self, hash: &BlockHash) -> BlkStoreResult<Block> {
        self.ensure_open()?;
        let state = self.inner.read().expect("lock poisoned");
        state
            .by_hash
            .get(hash)
            .and_then(|n| state.blocks.get(*n as usize).cloned())
            .ok_or(BlkStoreError::HashNotFound(*hash))
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for InMemoryBlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBlockStore")
            .field("ledger_id", &self.ledger_id)
            .field("block_count", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Provider of [`InMemoryBlockStore`]s.
///
/// Stores outlive `close`, so a fresh composition layer built over the same
/// provider sees the earlier blocks, the way a restarted process sees its
/// files.
#[derive(Default)]
pub struct InMemoryBlockStoreProvider {
    stores: Mutex<HashMap<String, Arc<InMemoryBlockStore>>>,
}

impl InMemoryBlockStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store for `ledger_id`, created if needed. A handle that
    /// was shut down is replaced by an open one over the same blocks.
    pub fn store(&self, ledger_id: &str) -> BlkStoreResult<Arc<InMemoryBlockStore>> {
        validate_ledger_id(ledger_id)?;
        let mut stores = self.stores.lock().expect("lock poisoned");
        let store = stores
            .entry(ledger_id.to_string())
            .or_insert_with(|| Arc::new(InMemoryBlockStore::with_state(ledger_id.to_string(), Arc::default())));
        if store.is_closed() {
            *store = Arc::new(store.reopen());
        }
        Ok(Arc::clone(store))
    }
}

impl BlockStoreProvider for InMemoryBlockStoreProvider {
    fn open_block_store(&self, ledger_id: &str) -> BlkStoreResult<Arc<dyn BlockStore>> {
        Ok(self.store(ledger_id)? as Arc<dyn BlockStore>)
    }

    fn exists(&self, ledger_id: &str) -> BlkStoreResult<bool> {
        Ok(self.stores.lock().expect("lock poisoned").contains_key(ledger_id))
    }

    fn list(&self) -> BlkStoreResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .stores
            .lock()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Shut down every handed-out handle. The blocks are kept.
    fn close(&self) {
        for store in self.stores.lock().expect("lock poisoned").values() {
            store.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdl_types::fixtures::construct_test_blocks;

    #[test]
    fn add_and_retrieve() {
        let store = InMemoryBlockStore::new();
        let blocks = construct_test_blocks(3);
        for block in &blocks {
            store.add_block(block).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.height().unwrap(), 3);
        assert_eq!(store.retrieve_block_by_number(2).unwrap(), blocks[2]);
        assert_eq!(store.retrieve_block_by_hash(&blocks[1].hash()).unwrap(), blocks[1]);
        assert!(matches!(
            store.retrieve_block_by_number(3),
            Err(BlkStoreError::BlockNotFound(3))
        ));
    }

    #[test]
    fn rejects_out_of_sequence_block() {
        let store = InMemoryBlockStore::default();
        let blocks = construct_test_blocks(2);
        assert!(matches!(
            store.add_block(&blocks[1]),
            Err(BlkStoreError::UnexpectedBlockNumber { expected: 0, got: 1 })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn provider_keeps_stores_across_close() {
        let provider = InMemoryBlockStoreProvider::new();
        provider
            .open_block_store("ledger")
            .unwrap()
            .add_block(&construct_test_blocks(1)[0])
            .unwrap();
        provider.close();

        assert!(provider.exists("ledger").unwrap());
        assert_eq!(provider.list().unwrap(), vec!["ledger"]);
        assert_eq!(provider.open_block_store("ledger").unwrap().height().unwrap(), 1);
    }

    #[test]
    fn calls_after_shutdown_fail() {
        let store = InMemoryBlockStore::new();
        let blocks = construct_test_blocks(2);
        store.add_block(&blocks[0]).unwrap();
        store.shutdown();

        assert!(store.is_closed());
        assert!(matches!(store.height(), Err(BlkStoreError::Closed(_))));
        assert!(matches!(store.add_block(&blocks[1]), Err(BlkStoreError::Closed(_))));
        assert!(matches!(
            store.retrieve_block_by_number(0),
            Err(BlkStoreError::Closed(_))
        ));
        assert!(matches!(
            store.retrieve_block_by_hash(&blocks[0].hash()),
            Err(BlkStoreError::Closed(_))
        ));
    }

    #[test]
    fn provider_reopens_shut_down_handles() {
        let provider = InMemoryBlockStoreProvider::new();
        let first = provider.open_block_store("ledger").unwrap();
        first.add_block(&construct_test_blocks(1)[0]).unwrap();
        first.shutdown();

        let second = provider.open_block_store("ledger").unwrap();
        assert_eq!(second.height().unwrap(), 1);
        assert!(matches!(first.height(), Err(BlkStoreError::Closed(_))));

        provider.close();
        assert!(matches!(second.height(), Err(BlkStoreError::Closed(_))));
    }

    #[test]
    fn debug_format() {
        let store = InMemoryBlockStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryBlockStore"));
        assert!(debug.contains("block_count"));
    }
}
