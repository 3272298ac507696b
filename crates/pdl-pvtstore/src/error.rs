use pdl_journal::JournalError;
use pdl_types::TypeError;

/// Errors from private-data store operations.
#[derive(Debug, thiserror::Error)]
pub enum PvtStoreError {
    /// A batch was prepared for a block other than the next one.
    #[error("unexpected block number: expected {expected}, got {got}")]
    UnexpectedBlockNumber { expected: u64, got: u64 },

    /// A batch is already staged and must be committed or rolled back first.
    #[error("a batch for block {0} is already pending")]
    PendingBatchExists(u64),

    #[error("no pending batch")]
    NoPendingBatch,

    /// Two entries of one batch carry the same sequence number.
    #[error("duplicate private data for tx {seq} in block {block_num}")]
    DuplicateSeq { block_num: u64, seq: u64 },

    /// Lookup of a block at or beyond the committed height.
    #[error("private data for block {block_num} not found (height {height})")]
    NotFound { block_num: u64, height: u64 },

    /// A different write set is already committed for this block.
    #[error("block {0} already committed with different private data")]
    AlreadyCommitted(u64),

    #[error("private data store for ledger {0} is shut down")]
    Closed(String),

    #[error(transparent)]
    InvalidLedgerId(#[from] TypeError),

    /// The persisted record sequence is not a valid batch history.
    #[error("corrupt private data store for ledger {ledger_id}: {reason}")]
    Corrupt { ledger_id: String, reason: String },

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PvtStoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result alias for private-data store operations.
pub type PvtStoreResult<T> = Result<T, PvtStoreError>;
