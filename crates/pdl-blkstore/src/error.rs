use pdl_journal::JournalError;
use pdl_types::{BlockHash, TypeError};

/// Errors from block store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlkStoreError {
    /// A block was offered out of sequence.
    #[error("unexpected block number: expected {expected}, got {got}")]
    UnexpectedBlockNumber { expected: u64, got: u64 },

    /// The block does not link to the current tip.
    #[error("block {number} does not link to the chain tip: expected previous hash {expected}, got {got}")]
    PreviousHashMismatch {
        number: u64,
        expected: BlockHash,
        got: BlockHash,
    },

    /// The header's data hash does not match the carried transactions.
    #[error("data hash mismatch in block {0}")]
    DataHashMismatch(u64),

    /// No block with this number has been committed.
    #[error("block {0} not found")]
    BlockNotFound(u64),

    /// No block with this header hash has been committed.
    #[error("block with hash {0} not found")]
    HashNotFound(BlockHash),

    /// The store was shut down.
    #[error("block store for ledger {0} is shut down")]
    Closed(String),

    #[error(transparent)]
    InvalidLedgerId(#[from] TypeError),

    /// Persisted blocks do not form a valid chain.
    #[error("corrupt block store for ledger {ledger_id}: {reason}")]
    Corrupt { ledger_id: String, reason: String },

    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BlkStoreError {
    /// Returns `true` for lookups of blocks that do not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BlockNotFound(_) | Self::HashNotFound(_))
    }
}

/// Result alias for block store operations.
pub type BlkStoreResult<T> = Result<T, BlkStoreError>;
