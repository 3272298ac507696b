//! Deterministic sample blocks and private data.
//!
//! Shared by the test suites of the store, storage and CLI crates.

use crate::block::{Block, BlockHash};
use crate::pvtdata::{
    CollectionPvtReadWriteSet, DataModel, NsPvtReadWriteSet, TxPvtData, TxPvtReadWriteSet,
};

/// Transactions per generated block.
pub const TXS_PER_BLOCK: usize = 10;

/// Build `count` hash-chained blocks starting at block 0, each carrying
/// [`TXS_PER_BLOCK`] transaction envelopes.
pub fn construct_test_blocks(count: usize) -> Vec<Block> {
    let mut blocks = Vec::with_capacity(count);
    let mut previous_hash = BlockHash::zero();
    for number in 0..count as u64 {
        let txs = (0..TXS_PER_BLOCK)
            .map(|tx| format!("block-{number}-tx-{tx}").into_bytes())
            .collect();
        let block = Block::new(number, previous_hash, txs);
        previous_hash = block.hash();
        blocks.push(block);
    }
    blocks
}

/// Write set with namespace `ns-1` holding collections `coll-1` and `coll-2`.
pub fn sample_pvt_write_set() -> TxPvtReadWriteSet {
    TxPvtReadWriteSet {
        data_model: DataModel::Kv,
        ns_pvt_rwset: vec![NsPvtReadWriteSet {
            namespace: "ns-1".into(),
            collection_pvt_rwset: vec![
                CollectionPvtReadWriteSet {
                    collection_name: "coll-1".into(),
                    rwset: b"RandomBytes-PvtRWSet-ns1-coll1".to_vec(),
                },
                CollectionPvtReadWriteSet {
                    collection_name: "coll-2".into(),
                    rwset: b"RandomBytes-PvtRWSet-ns1-coll2".to_vec(),
                },
            ],
        }],
    }
}

/// One [`sample_pvt_write_set`] entry per requested transaction number.
pub fn sample_pvt_data(tx_nums: &[u64]) -> Vec<TxPvtData> {
    tx_nums
        .iter()
        .map(|seq| TxPvtData::new(*seq, sample_pvt_write_set()))
        .collect()
}
