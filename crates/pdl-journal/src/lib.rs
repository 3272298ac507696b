//! Append-only record files for the private-data ledger.
//!
//! A [`Journal`] is a single file of length- and CRC-framed records. Both the
//! block store and the private-data store persist through it. A torn write at
//! the tail (crash mid-append) is cut off when the file is reopened; damage
//! anywhere before the tail is reported as corruption.

pub mod error;
pub mod journal;

pub use error::{JournalError, Result};
pub use journal::{Journal, JournalConfig, JournalEntry, SyncMode};
