use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::error::TypeError;
use crate::filter::PvtNsCollFilter;

/// Encoding of the opaque read/write set payloads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataModel {
    /// Key-value read/write sets.
    #[default]
    Kv,
}

/// Private write set of one collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPvtReadWriteSet {
    pub collection_name: String,
    pub rwset: Vec<u8>,
}

/// Private write sets of one namespace, one entry per collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsPvtReadWriteSet {
    pub namespace: String,
    pub collection_pvt_rwset: Vec<CollectionPvtReadWriteSet>,
}

/// Private write set of a whole transaction, one entry per namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPvtReadWriteSet {
    pub data_model: DataModel,
    pub ns_pvt_rwset: Vec<NsPvtReadWriteSet>,
}

impl TxPvtReadWriteSet {
    /// Keep only the collections allowed by `filter`.
    ///
    /// Namespaces left without any collection are removed.
    pub fn filtered(&self, filter: &PvtNsCollFilter) -> Self {
        let ns_pvt_rwset = self
            .ns_pvt_rwset
            .iter()
            .filter_map(|ns| {
                let collections: Vec<_> = ns
                    .collection_pvt_rwset
                    .iter()
                    .filter(|coll| filter.has(&ns.namespace, &coll.collection_name))
                    .cloned()
                    .collect();
                (!collections.is_empty()).then(|| NsPvtReadWriteSet {
                    namespace: ns.namespace.clone(),
                    collection_pvt_rwset: collections,
                })
            })
            .collect();
        Self {
            data_model: self.data_model,
            ns_pvt_rwset,
        }
    }

    /// Total number of collection write sets across all namespaces.
    pub fn collection_count(&self) -> usize {
        self.ns_pvt_rwset
            .iter()
            .map(|ns| ns.collection_pvt_rwset.len())
            .sum()
    }
}

/// Private data of one transaction, tagged with its position in the block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPvtData {
    pub seq_in_block: u64,
    pub write_set: TxPvtReadWriteSet,
}

impl TxPvtData {
    pub fn new(seq_in_block: u64, write_set: TxPvtReadWriteSet) -> Self {
        Self {
            seq_in_block,
            write_set,
        }
    }

    /// Copy of this entry with its write set narrowed to `filter`. The entry
    /// itself is kept even if nothing remains visible.
    pub fn filtered(&self, filter: &PvtNsCollFilter) -> Self {
        Self {
            seq_in_block: self.seq_in_block,
            write_set: self.write_set.filtered(filter),
        }
    }

    /// Returns `true` if the write set contains the given collection.
    pub fn has(&self, namespace: &str, collection: &str) -> bool {
        self.write_set.ns_pvt_rwset.iter().any(|ns| {
            ns.namespace == namespace
                && ns
                    .collection_pvt_rwset
                    .iter()
                    .any(|coll| coll.collection_name == collection)
        })
    }
}

/// A block together with the private data of its transactions.
///
/// `block_pvt_data` is keyed by sequence number within the block. A missing
/// key means the transaction has no private data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAndPvtData {
    pub block: Block,
    pub block_pvt_data: BTreeMap<u64, TxPvtData>,
}

impl BlockAndPvtData {
    /// A block without private data.
    pub fn new(block: Block) -> Self {
        Self {
            block,
            block_pvt_data: BTreeMap::new(),
        }
    }

    /// A block with private data, keyed by each entry's own sequence number.
    pub fn with_pvt_data(block: Block, entries: impl IntoIterator<Item = TxPvtData>) -> Self {
        Self {
            block,
            block_pvt_data: entries
                .into_iter()
                .map(|entry| (entry.seq_in_block, entry))
                .collect(),
        }
    }

    /// Validated private data as a list ascending by sequence number.
    ///
    /// Every key must equal its entry's `seq_in_block` and must index a
    /// transaction of the block.
    pub fn pvt_data_entries(&self) -> Result<Vec<TxPvtData>, TypeError> {
        let tx_count = self.block.tx_count();
        self.block_pvt_data
            .iter()
            .map(|(key, entry)| {
                if *key != entry.seq_in_block {
                    return Err(TypeError::SeqMismatch {
                        key: *key,
                        seq: entry.seq_in_block,
                    });
                }
                if *key >= tx_count {
                    return Err(TypeError::SeqOutOfRange { seq: *key, tx_count });
                }
                Ok(entry.clone())
            })
            .collect()
    }
}
