use crate::{
    constants::{DEADLINE_CHECK_INTERVAL, PARALLEL_BATCH_SIZE},
    Block, MineError,
};
use rayon::prelude::*;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Number of leading `'0'` characters in a hex digest.
pub fn leading_zero_nibbles(hash: &str) -> u32 {
    hash.bytes().take_while(|b| *b == b'0').count() as u32
}

pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_nibbles(hash) >= difficulty
}

/// Mine the block by incrementing the nonce until its hash starts with
/// `difficulty` zero hex characters. Expects `block.hash` to hold the hash at
/// the current nonce. There is no bound on the search.
pub fn mine_block(mut block: Block, difficulty: u32) -> Block {
    while !meets_difficulty(&block.hash, difficulty) {
        block.nonce = block.nonce.wrapping_add(1);
        block.hash = block.calculate_hash();
    }
    block
}

/// Advance the search by at most `max_steps` nonces. Returns `true` once the
/// block satisfies `difficulty`; on `false` the block can be handed back in to
/// carry on where it stopped.
pub fn mine_step(block: &mut Block, difficulty: u32, max_steps: u64) -> bool {
    let mut steps = 0u64;
    while !meets_difficulty(&block.hash, difficulty) {
        if steps == max_steps {
            return false;
        }
        block.nonce = block.nonce.wrapping_add(1);
        block.hash = block.calculate_hash();
        steps += 1;
    }
    true
}

/// Limits and a cancellation flag for a single mining run.
#[derive(Clone, Debug, Default)]
pub struct MineControl {
    cancel: Arc<AtomicBool>,
    max_attempts: Option<u64>,
    timeout: Option<Duration>,
}

impl MineControl {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u64>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Sequential search that stops on cancellation, after `max_attempts` nonce
/// increments, or once the timeout elapses.
pub fn mine_block_bounded(
    mut block: Block,
    difficulty: u32,
    control: &MineControl,
) -> Result<Block, MineError> {
    let started = Instant::now();
    let deadline = control.timeout.map(|t| started + t);
    let mut attempts = 0u64;

    while !meets_difficulty(&block.hash, difficulty) {
        if control.is_cancelled() {
            debug!(index = block.index, attempts, "mining cancelled");
            return Err(MineError::Cancelled { attempts });
        }
        let out_of_attempts = control.max_attempts.is_some_and(|max| attempts >= max);
        let out_of_time = attempts % DEADLINE_CHECK_INTERVAL == 0
            && deadline.is_some_and(|d| Instant::now() >= d);
        if out_of_attempts || out_of_time {
            return Err(MineError::Timeout {
                attempts,
                elapsed: started.elapsed(),
            });
        }
        block.nonce = block.nonce.wrapping_add(1);
        block.hash = block.calculate_hash();
        attempts += 1;
    }

    info!(
        index = block.index,
        nonce = block.nonce,
        hash = %block.hash,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "mined block"
    );
    Ok(block)
}

/// Where a batched nonce search stopped.
#[derive(Debug, PartialEq, Eq)]
enum Search {
    Found(u64),
    Stopped { searched: u64 },
    Exhausted,
}

/// Walks offsets `1..upper` one batch at a time, each batch split across the
/// rayon pool. `find_first` keeps the lowest hit, and no offset past the end of
/// the winning batch is ever tried. `stop` is consulted between batches.
fn search_batches<T, I, F>(
    upper: u64,
    batch: u64,
    stop: impl Fn() -> bool,
    init: I,
    is_winner: F,
) -> Search
where
    I: Fn() -> T + Sync + Send,
    F: Fn(&mut T, u64) -> bool + Sync + Send,
{
    let batch = batch.max(1);
    let mut base = 1u64;
    while base < upper {
        if stop() {
            return Search::Stopped {
                searched: base - 1,
            };
        }
        let end = base.saturating_add(batch).min(upper);
        let hit = (base..end)
            .into_par_iter()
            .map_init(&init, |state, offset| (offset, is_winner(state, offset)))
            .find_first(|(_, hit)| *hit);
        if let Some((offset, _)) = hit {
            return Search::Found(offset);
        }
        base = end;
    }
    Search::Exhausted
}

/// Searches nonces in parallel starting from `block.nonce`, in batches of
/// [`PARALLEL_BATCH_SIZE`]. The lowest winning nonce is returned, so the
/// result matches [`mine_block_bounded`] when neither runs out of budget.
pub fn mine_block_parallel(
    block: Block,
    difficulty: u32,
    control: &MineControl,
) -> Result<Block, MineError> {
    if meets_difficulty(&block.hash, difficulty) {
        return Ok(block);
    }

    let started = Instant::now();
    let deadline = control.timeout.map(|t| started + t);
    let start = block.nonce;
    // Offsets from `start`; offset 0 was already checked above.
    let upper = control
        .max_attempts
        .map_or(u64::MAX, |max| max.saturating_add(1));

    let search = search_batches(
        upper,
        PARALLEL_BATCH_SIZE,
        || control.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d),
        || block.clone(),
        |candidate: &mut Block, offset| {
            candidate.nonce = start.wrapping_add(offset);
            meets_difficulty(&candidate.calculate_hash(), difficulty)
        },
    );

    let elapsed = started.elapsed();
    match search {
        Search::Found(offset) => {
            let mut mined = block;
            mined.nonce = start.wrapping_add(offset);
            mined.hash = mined.calculate_hash();
            info!(
                index = mined.index,
                nonce = mined.nonce,
                hash = %mined.hash,
                elapsed_ms = elapsed.as_millis() as u64,
                "mined block (parallel)"
            );
            Ok(mined)
        }
        Search::Stopped { searched } if control.is_cancelled() => {
            debug!(index = block.index, attempts = searched, "mining cancelled");
            Err(MineError::Cancelled { attempts: searched })
        }
        Search::Stopped { searched } => Err(MineError::Timeout {
            attempts: searched,
            elapsed,
        }),
        Search::Exhausted => Err(MineError::Timeout {
            attempts: upper - 1,
            elapsed,
        }),
    }
}
