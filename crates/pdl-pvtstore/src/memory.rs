use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use pdl_types::{validate_ledger_id, TxPvtData};

use crate::batch::{check_prepare, sorted_entries};
use crate::error::{PvtStoreError, PvtStoreResult};
use crate::traits::{PvtDataStore, PvtDataStoreProvider};

#[derive(Default)]
struct PvtState {
    blocks: Vec<Vec<TxPvtData>>,
    pending: Option<(u64, Vec<TxPvtData>)>,
}

impl PvtState {
    fn height(&self) -> u64 {
        self.blocks.len() as u64
    }
}

/// In-memory private-data store for tests and embedding.
///
/// A handle refuses every call after `shutdown`; its data stays with the
/// provider.
pub struct InMemoryPvtDataStore {
    ledger_id: String,
    inner: Arc<RwLock<PvtState>>,
    closed: AtomicBool,
}

impl InMemoryPvtDataStore {
    pub fn new() -> Self {
        Self::with_state("in-memory".to_string(), Arc::default())
    }

    fn with_state(ledger_id: String, inner: Arc<RwLock<PvtState>>) -> Self {
        Self {
            ledger_id,
            inner,
            closed: AtomicBool::new(false),
        }
    }

    fn reopen(&self) -> Self {
        Self::with_state(self.ledger_id.clone(), Arc::clone(&self.inner))
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
}

impl Default for InMemoryPvtDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PvtDataStore for InMemoryPvtDataStore {
    fn prepare(&self, block_num: u64, entries: &[TxPvtData]) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let mut state = self.inner.write().expect("lock poisoned");
        check_prepare(state.height(), state.pending.as_ref().map(|p| p.0), block_num)?;
        state.pending = Some((block_num, sorted_entries(block_num, entries)?));
        Ok(())
    }

    fn commit_pending(&self) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let mut state = self.inner.write().expect("lock poisoned");
        let (_, entries) = state.pending.take().ok_or(PvtStoreError::NoPendingBatch)?;
        state.blocks.push(entries);
        Ok(())
    }

    fn rollback_pending(&self) -> PvtStoreResult<()> {
        self.ensure_open()?;
        let mut state = self.inner.write().expect("lock poisoned");
        state.pending.take().ok_or(PvtStoreError::NoPendingBatch)?;
        Ok(())
    }

    fn pending_block(&self) -> PvtStoreResult<Option<u64>> {
        self.ensure_open()?;
        Ok(self.inner.read().expect("lock poisoned").pending.as_ref().map(|p| p.0))
    }

    fn get_pvt_data_by_block_num(&self, block_num: u64) -> PvtStoreResult<Option<Vec<TxPvtData>>> {
        self.ensure_open()?;
        let state = self.inner.read().expect("lock poisoned");
        let entries = usize::try_from(block_num)
            .ok()
            .and_then(|n| state.blocks.get(n))
            .ok_or(PvtStoreError::NotFound {
                block_num,
                height: state.height(),
            })?;
        Ok((!entries.is_empty()).then(|| entries.clone()))
    }

    fn height(&self) -> PvtStoreResult<u64> {
        self.ensure_open()?;
        Ok(self.inner.read().expect("lock poisoned").height())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for InMemoryPvtDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.read().expect("lock poisoned");
        f.debug_struct("InMemoryPvtDataStore")
            .field("ledger_id", &self.ledger_id)
            .field("height", &state.height())
            .field("pending", &state.pending.as_ref().map(|p| p.0))
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Provider of [`InMemoryPvtDataStore`]s. Data persists across `close`.
#[derive(Default)]
pub struct InMemoryPvtDataStoreProvider {
    stores: Mutex<HashMap<String, Arc<InMemoryPvtDataStore>>>,
}

impl InMemoryPvtDataStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete store for `ledger_id`, created if needed. A handle that
    /// was shut down is replaced by an open one over the same data.
    pub fn store(&self, ledger_id: &str) -> PvtStoreResult<Arc<InMemoryPvtDataStore>> {
        validate_ledger_id(ledger_id)?;
        let mut stores = self.stores.lock().expect("lock poisoned");
        let store = stores
            .entry(ledger_id.to_string())
            .or_insert_with(|| Arc::new(InMemoryPvtDataStore::with_state(ledger_id.to_string(), Arc::default())));
        if store.is_closed() {
            *store = Arc::new(store.reopen());
        }
        Ok(Arc::clone(store))
    }
}

impl PvtDataStoreProvider for InMemoryPvtDataStoreProvider {
    fn open_pvt_data_store(&self, ledger_id: &str) -> PvtStoreResult<Arc<dyn PvtDataStore>> {
        Ok(self.store(ledger_id)? as Arc<dyn PvtDataStore>)
    }

    fn close(&self) {
        for store in self.stores.lock().expect("lock poisoned").values() {
            store.shutdown();
        }
    }
}
