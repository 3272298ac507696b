use std::io;
use std::path::PathBuf;

/// Errors produced by journal files.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// I/O error during file operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A damaged frame is followed by further data, so it is not a torn tail.
    #[error("corrupt journal {path} at offset {offset}: {reason}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        reason: String,
    },

    /// A read addressed an offset that holds no complete frame.
    #[error("no frame at offset {offset} (journal length {len})")]
    InvalidOffset { offset: u64, len: u64 },

    /// CRC check failed when re-reading a frame.
    #[error("CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },
}

/// Convenience alias used throughout the journal crate.
pub type Result<T> = std::result::Result<T, JournalError>;
