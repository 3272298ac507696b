//! Block storage for the private-data ledger.
//!
//! A block store is an append-only sequence of hash-chained blocks for one
//! ledger. It knows nothing about private data; the storage composition
//! layer pairs it with a private-data store.
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait and are opened through a
//! [`BlockStoreProvider`]:
//!
//! - [`FsBlockStore`] -- one journal file per ledger, indexes rebuilt on open
//! - [`InMemoryBlockStore`] -- `Vec`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once appended.
//! 2. A block is accepted only as the next number, linked to the current tip.
//! 3. Reads never wait on an in-flight append.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod chain;
pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{BlkStoreError, BlkStoreResult};
pub use fs::{FsBlockStore, FsBlockStoreProvider};
pub use memory::{InMemoryBlockStore, InMemoryBlockStoreProvider};
pub use traits::{BlockStore, BlockStoreProvider};
