pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const DEFAULT_DIFFICULTY: u32 = 4;
pub const GENESIS_HASH: &str = "GENESIS_HASH";
pub const GENESIS_PREVIOUS_HASH: &str = "0";
/// How many nonces the bounded miner tries between wall-clock checks.
pub const DEADLINE_CHECK_INTERVAL: u64 = 1024;
/// Nonces handed to the rayon pool per round of the parallel miner.
pub const PARALLEL_BATCH_SIZE: u64 = 8192;
