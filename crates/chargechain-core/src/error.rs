use std::time::Duration;
use thiserror::Error;

/// A charge request that cannot be turned into a transaction.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("amount must be a positive finite number, got {0}")]
    InvalidAmount(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MineError {
    #[error("mining gave up after {attempts} attempts ({elapsed:?})")]
    Timeout { attempts: u64, elapsed: Duration },
    #[error("mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Mining(#[from] MineError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Problems found by [`crate::chain::validate_chain`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainFault {
    #[error("chain is empty")]
    Empty,
    #[error("block 0 is not the genesis block")]
    BadGenesis,
    #[error("block at position {position} has index {found}")]
    IndexMismatch { position: usize, found: u64 },
    #[error("block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: u64 },
    #[error("block {index} hash does not match its contents")]
    HashMismatch { index: u64 },
    #[error("block {index} hash does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
}
