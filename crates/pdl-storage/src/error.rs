use pdl_blkstore::BlkStoreError;
use pdl_pvtstore::PvtStoreError;
use pdl_types::TypeError;

/// Errors from the ledger storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A store could not be opened.
    #[error("cannot open ledger {ledger_id}: {reason}")]
    Initialization { ledger_id: String, reason: String },

    /// A block was committed out of order.
    #[error("unexpected block number: expected {expected}, got {got}")]
    Sequencing { expected: u64, got: u64 },

    /// Retrieval of a block or private data beyond what is committed.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The private-data store is ahead of the block store.
    #[error(
        "ledger {ledger_id} is corrupt: private data height {pvt_height} exceeds block height {block_height}"
    )]
    Corruption {
        ledger_id: String,
        pvt_height: u64,
        block_height: u64,
    },

    /// The private-data map does not match the block it accompanies.
    #[error("invalid private data for tx {seq} in block {block_num}: {reason}")]
    InvalidPvtData {
        block_num: u64,
        seq: u64,
        reason: String,
    },

    #[error("store for ledger {0} is shut down")]
    ShutDown(String),

    #[error("provider is closed")]
    ProviderClosed,

    #[error("block store error: {0}")]
    BlockStore(BlkStoreError),

    #[error("private data store error: {0}")]
    PvtDataStore(PvtStoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Map a private-data validation failure for `block_num`.
    pub(crate) fn invalid_pvt_data(block_num: u64, err: TypeError) -> Self {
        let seq = match err {
            TypeError::SeqMismatch { key, .. } => key,
            TypeError::SeqOutOfRange { seq, .. } => seq,
            _ => 0,
        };
        Self::InvalidPvtData {
            block_num,
            seq,
            reason: err.to_string(),
        }
    }
}

impl From<BlkStoreError> for StorageError {
    fn from(err: BlkStoreError) -> Self {
        if err.is_not_found() {
            Self::NotFound {
                what: err.to_string(),
            }
        } else {
            Self::BlockStore(err)
        }
    }
}

impl From<PvtStoreError> for StorageError {
    fn from(err: PvtStoreError) -> Self {
        if err.is_not_found() {
            Self::NotFound {
                what: err.to_string(),
            }
        } else {
            Self::PvtDataStore(err)
        }
    }
}

/// Result alias for ledger storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
