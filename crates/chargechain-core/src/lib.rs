use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod constants;
pub mod error;
pub mod mine;
pub mod recorder;

pub use error::{ChainFault, MineError, RecordError, ValidationError};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Compact JSON with object keys sorted, independent of map iteration order.
fn write_canonical_json(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_json(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical_json(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn put_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "fromNumber")]
    pub from_number: String,
    #[serde(rename = "toNumber")]
    pub to_number: String,
    #[serde(rename = "amountUSD")]
    pub amount_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<serde_json::Value>,
    pub timestamp: u64,
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.amount_usd.to_bits() == other.amount_usd.to_bits()
            && self.from_number == other.from_number
            && self.to_number == other.to_number
            && self.bytes == other.bytes
    }
}

impl Transaction {
    /// Field-ordered encoding fed to the block hasher. The payload is written as
    /// compact JSON with sorted object keys.
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + self.from_number.len() + self.to_number.len());
        put_str(&mut bytes, &self.from_number);
        put_str(&mut bytes, &self.to_number);
        bytes.extend_from_slice(&self.amount_usd.to_bits().to_le_bytes());
        match &self.bytes {
            None => bytes.push(0),
            Some(payload) => {
                bytes.push(1);
                let mut json = String::new();
                write_canonical_json(payload, &mut json);
                put_str(&mut bytes, &json);
            }
        }
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

impl Block {
    /// Builds an unmined block stamped with the current time. The hash is
    /// computed once at nonce 0.
    pub fn new(index: u64, previous_hash: String, transactions: Vec<Transaction>) -> Self {
        let mut block = Self {
            index,
            timestamp: now_millis(),
            transactions,
            previous_hash,
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128 + self.previous_hash.len());
        bytes.extend_from_slice(&self.index.to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            bytes.extend_from_slice(&tx.hash_bytes());
        }
        put_str(&mut bytes, &self.previous_hash);
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Hex SHA-256 over [`Block::hash_bytes`]. Ignores the stored `hash`.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}

pub mod chain {
    use super::*;
    use crate::constants::{GENESIS_HASH, GENESIS_PREVIOUS_HASH};
    use crate::mine::meets_difficulty;
    use anyhow::{anyhow, Result};
    use std::sync::Arc;
    use tracing::info;

    /// Trait the storage backends implement for the chain to operate.
    /// Appends must be atomic from a reader's point of view.
    pub trait ChainStore: Send + Sync {
        /// Stores `block` only when the store is empty. Returns whether it was stored.
        fn put_genesis(&self, block: &Block) -> Result<bool>;
        /// Appends unconditionally; no checks on the block itself.
        fn put_block(&self, block: &Block) -> Result<()>;
        fn get_block(&self, index: u64) -> Result<Option<Block>>;
        fn tip_block(&self) -> Result<Option<Block>>;
        fn len(&self) -> Result<usize>;
        fn blocks(&self) -> Result<Vec<Block>>;

        fn is_empty(&self) -> Result<bool> {
            Ok(self.len()? == 0)
        }
    }

    /// Chain façade that delegates storage to a `ChainStore`.
    pub struct Chain<S: ChainStore> {
        store: Arc<S>,
    }

    impl<S: ChainStore> Clone for Chain<S> {
        fn clone(&self) -> Self {
            Self {
                store: Arc::clone(&self.store),
            }
        }
    }

    impl<S: ChainStore> Chain<S> {
        pub fn new(store: Arc<S>) -> Self {
            Self { store }
        }

        pub fn store(&self) -> &Arc<S> {
            &self.store
        }

        /// Ensure a genesis block exists. Idempotent.
        pub fn ensure_genesis(&self) -> Result<()> {
            if self.store.put_genesis(&genesis_block())? {
                info!("genesis block created");
            }
            Ok(())
        }

        pub fn append(&self, block: Block) -> Result<()> {
            self.store.put_block(&block)
        }

        pub fn tip(&self) -> Result<Block> {
            self.store
                .tip_block()?
                .ok_or_else(|| anyhow!("chain has no genesis block"))
        }

        pub fn snapshot(&self) -> Result<Vec<Block>> {
            self.store.blocks()
        }

        /// Number of blocks, genesis included.
        pub fn height(&self) -> Result<usize> {
            self.store.len()
        }
    }

    /// The unmined genesis block with sentinel hashes.
    pub fn genesis_block() -> Block {
        Block {
            index: 0,
            timestamp: now_millis(),
            transactions: vec![],
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: GENESIS_HASH.to_string(),
        }
    }

    /// Re-checks genesis sentinels, indices, linkage and proof of work.
    /// Not part of the append path.
    pub fn validate_chain(blocks: &[Block], difficulty: u32) -> Result<(), ChainFault> {
        let Some(genesis) = blocks.first() else {
            return Err(ChainFault::Empty);
        };
        if genesis.index != 0
            || genesis.hash != GENESIS_HASH
            || genesis.previous_hash != GENESIS_PREVIOUS_HASH
            || !genesis.transactions.is_empty()
        {
            return Err(ChainFault::BadGenesis);
        }

        for (offset, pair) in blocks.windows(2).enumerate() {
            let (prev, block) = (&pair[0], &pair[1]);
            let position = offset + 1;
            if block.index != position as u64 {
                return Err(ChainFault::IndexMismatch {
                    position,
                    found: block.index,
                });
            }
            if block.previous_hash != prev.hash {
                return Err(ChainFault::BrokenLink { index: block.index });
            }
            if block.calculate_hash() != block.hash {
                return Err(ChainFault::HashMismatch { index: block.index });
            }
            if !meets_difficulty(&block.hash, difficulty) {
                return Err(ChainFault::InsufficientWork {
                    index: block.index,
                    difficulty,
                });
            }
        }
        Ok(())
    }
}
