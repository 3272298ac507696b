use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const HEADER_DOMAIN: &[u8] = b"pdl-block-header-v1:";
const DATA_DOMAIN: &[u8] = b"pdl-block-data-v1:";

/// BLAKE3 digest identifying a block header (and, through `data_hash`, its
/// transactions).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Create a `BlockHash` from a pre-computed digest.
    pub const fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The all-zero hash, used as the previous hash of block 0.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self.short_hex())
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Block header: position in the chain plus the two digests that bind it to
/// its predecessor and to its own transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    pub previous_hash: BlockHash,
    pub data_hash: BlockHash,
}

impl BlockHeader {
    /// Domain-separated hash of the header fields.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(HEADER_DOMAIN);
        hasher.update(&self.number.to_be_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.data_hash.as_bytes());
        BlockHash(*hasher.finalize().as_bytes())
    }
}

/// Ordered transaction envelopes. The index of an envelope is the
/// transaction's sequence number within the block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockData {
    pub data: Vec<Vec<u8>>,
}

impl BlockData {
    /// Digest over the length-prefixed envelopes.
    pub fn hash(&self) -> BlockHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DATA_DOMAIN);
        for envelope in &self.data {
            hasher.update(&(envelope.len() as u64).to_be_bytes());
            hasher.update(envelope);
        }
        BlockHash(*hasher.finalize().as_bytes())
    }
}

/// Opaque per-block metadata slots (signatures, validation flags, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub metadata: Vec<Vec<u8>>,
}

/// An immutable, hash-chained block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub data: BlockData,
    pub metadata: BlockMetadata,
}

impl Block {
    /// Build a block with the given transaction envelopes, computing its
    /// data hash.
    pub fn new(number: u64, previous_hash: BlockHash, transactions: Vec<Vec<u8>>) -> Self {
        let data = BlockData { data: transactions };
        Self {
            header: BlockHeader {
                number,
                previous_hash,
                data_hash: data.hash(),
            },
            data,
            metadata: BlockMetadata::default(),
        }
    }

    /// Block number (position in the chain, 0-based).
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Hash of this block's header.
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    /// Number of transactions carried by the block.
    pub fn tx_count(&self) -> u64 {
        self.data.data.len() as u64
    }

    /// Returns `true` if `data_hash` matches the carried transactions.
    pub fn verify_data_hash(&self) -> bool {
        self.header.data_hash == self.data.hash()
    }
}

/// Summary of a chain: its height and the two most recent header hashes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainInfo {
    pub height: u64,
    pub current_block_hash: BlockHash,
    pub previous_block_hash: BlockHash,
}
