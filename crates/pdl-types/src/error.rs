use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid ledger id {id:?}: {reason}")]
    InvalidLedgerId { id: String, reason: String },

    #[error("private data for tx {seq} is keyed as {key}")]
    SeqMismatch { key: u64, seq: u64 },

    #[error("private data references tx {seq} but the block has {tx_count} transactions")]
    SeqOutOfRange { seq: u64, tx_count: u64 },
}
