use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pdl_blkstore::{BlockStoreProvider, FsBlockStoreProvider};
use pdl_pvtstore::{FsPvtDataStoreProvider, PvtDataStoreProvider};
use pdl_types::validate_ledger_id;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::store::Store;

/// Opens ledger [`Store`]s by id.
///
/// One `Store` per ledger is tracked; asking for an open ledger again returns
/// the same instance.
pub struct Provider {
    block_store_provider: Arc<dyn BlockStoreProvider>,
    pvt_data_store_provider: Arc<dyn PvtDataStoreProvider>,
    stores: Mutex<HashMap<String, Arc<Store>>>,
    closed: AtomicBool,
}

impl Provider {
    /// File-backed provider rooted at `config.root_dir`.
    pub fn new(config: &StorageConfig) -> Self {
        let journal = config.journal_config();
        Self::with_providers(
            Arc::new(FsBlockStoreProvider::new(config.block_store_dir(), journal.clone())),
            Arc::new(FsPvtDataStoreProvider::new(config.pvt_data_store_dir(), journal)),
        )
    }

    pub fn with_providers(
        block_store_provider: Arc<dyn BlockStoreProvider>,
        pvt_data_store_provider: Arc<dyn PvtDataStoreProvider>,
    ) -> Self {
        Self {
            block_store_provider,
            pvt_data_store_provider,
            stores: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::ProviderClosed);
        }
        Ok(())
    }

    /// Open the store for `ledger_id`, creating and recovering it as needed.
    pub fn open(&self, ledger_id: &str) -> StorageResult<Arc<Store>> {
        self.ensure_open()?;
        validate_ledger_id(ledger_id).map_err(|e| StorageError::Initialization {
            ledger_id: ledger_id.to_string(),
            reason: e.to_string(),
        })?;

        let mut stores = self.stores.lock().expect("provider lock poisoned");
        if let Some(store) = stores.get(ledger_id).filter(|s| !s.is_shut_down()) {
            return Ok(Arc::clone(store));
        }

        let init_error = |reason: String| StorageError::Initialization {
            ledger_id: ledger_id.to_string(),
            reason,
        };
        let block_store = self
            .block_store_provider
            .open_block_store(ledger_id)
            .map_err(|e| init_error(format!("block store: {e}")))?;
        let pvt_data_store = self
            .pvt_data_store_provider
            .open_pvt_data_store(ledger_id)
            .map_err(|e| init_error(format!("private data store: {e}")))?;
        let store = Arc::new(Store::new(ledger_id, block_store, pvt_data_store)?);
        stores.insert(ledger_id.to_string(), Arc::clone(&store));
        Ok(store)
    }

    pub fn exists(&self, ledger_id: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.block_store_provider.exists(ledger_id)?)
    }

    /// Ids of all ledgers with a block store, sorted.
    pub fn list(&self) -> StorageResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.block_store_provider.list()?)
    }

    /// Shut down every store and both underlying providers. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut stores = self.stores.lock().expect("provider lock poisoned");
        for store in stores.values() {
            store.shutdown();
        }
        stores.clear();
        self.block_store_provider.close();
        self.pvt_data_store_provider.close();
        info!("ledger storage provider closed");
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let open = self.stores.lock().map(|s| s.len()).unwrap_or_default();
        f.debug_struct("Provider")
            .field("open_stores", &open)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
