use std::path::{Path, PathBuf};

use pdl_journal::{JournalConfig, SyncMode};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

const CHAINS_DIR: &str = "chains";
const PVT_DATA_DIR: &str = "pvtdata";

/// Ledger storage configuration.
///
/// ```toml
/// root_dir = "/var/lib/ledgers"
/// sync_writes = true
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding every ledger's block and private-data files.
    pub root_dir: PathBuf,
    /// `fsync` each journal append.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./ledgersData"),
            sync_writes: true,
        }
    }
}

impl StorageConfig {
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(s: &str) -> StorageResult<Self> {
        toml::from_str(s).map_err(|e| StorageError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> StorageResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StorageError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn block_store_dir(&self) -> PathBuf {
        self.root_dir.join(CHAINS_DIR)
    }

    pub fn pvt_data_store_dir(&self) -> PathBuf {
        self.root_dir.join(PVT_DATA_DIR)
    }

    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig::with_sync_mode(if self.sync_writes {
            SyncMode::EveryWrite
        } else {
            SyncMode::OsDefault
        })
    }
}
