use anyhow::{anyhow, Result};
use chargechain_core::{chain::ChainStore, Block};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Process-memory block store. Appends take the write lock, so readers see a
/// block either fully appended or not at all.
#[derive(Default)]
pub struct MemoryStore {
  blocks: RwLock<Vec<Block>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    info!("memory store opened");
    Self::default()
  }

  fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Block>>> {
    self.blocks.read().map_err(|_| anyhow!("block store lock poisoned"))
  }

  fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Block>>> {
    self.blocks.write().map_err(|_| anyhow!("block store lock poisoned"))
  }
}

impl ChainStore for MemoryStore {
  fn put_genesis(&self, block: &Block) -> Result<bool> {
    let mut blocks = self.write()?;
    if !blocks.is_empty() {
      return Ok(false);
    }
    blocks.push(block.clone());
    Ok(true)
  }

  fn put_block(&self, block: &Block) -> Result<()> {
    let mut blocks = self.write()?;
    blocks.push(block.clone());
    debug!(index = block.index, len = blocks.len(), "block stored");
    Ok(())
  }

  fn get_block(&self, index: u64) -> Result<Option<Block>> {
    let blocks = self.read()?;
    Ok(usize::try_from(index).ok().and_then(|i| blocks.get(i)).cloned())
  }

  fn tip_block(&self) -> Result<Option<Block>> {
    Ok(self.read()?.last().cloned())
  }

  fn len(&self) -> Result<usize> {
    Ok(self.read()?.len())
  }

  fn blocks(&self) -> Result<Vec<Block>> {
    Ok(self.read()?.clone())
  }
}
