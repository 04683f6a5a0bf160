// src/core/storage/transactor.rs

//! `Transactor`: a scoped unit of work over one cache, opened in a declared access mode
//! and closed implicitly when it goes out of scope — every buf-lock it handed out is
//! already released (and any write already durable-in-cache) well before that point.

use super::block::BlockId;
use super::cache::{BufLock, Cache, LockMode};
use crate::core::errors::LatticeError;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxMode {
    Read,
    Write,
}

/// One in-progress operation's view of the cache. Read-mode transactors may only take
/// read buf-locks; this is enforced here rather than left to the cache, so a read
/// operation can never accidentally race a concurrent writer into thinking it has
/// exclusive access.
pub struct Transactor {
    cache: Arc<Cache>,
    mode: TxMode,
}

impl Transactor {
    pub fn new(cache: Arc<Cache>, mode: TxMode) -> Self {
        Self { cache, mode }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// Acquires a buf-lock on `block_id` in `mode`. A write-mode lock is only obtainable
    /// from a write-mode transactor.
    pub async fn lock(&self, block_id: BlockId, mode: LockMode) -> Result<BufLock, LatticeError> {
        if self.mode == TxMode::Read && mode == LockMode::Write {
            return Err(LatticeError::Internal(
                "cannot acquire a write buf-lock inside a read transactor".to_string(),
            ));
        }
        self.cache.lock_block(block_id, mode).await
    }

    /// Locks several blocks at once, in a fixed order that prevents deadlock against
    /// another transactor locking an overlapping set.
    pub async fn lock_many(&self, block_ids: &[BlockId], mode: LockMode) -> Result<Vec<BufLock>, LatticeError> {
        if self.mode == TxMode::Read && mode == LockMode::Write {
            return Err(LatticeError::Internal(
                "cannot acquire write buf-locks inside a read transactor".to_string(),
            ));
        }
        self.cache.lock_blocks_sorted(block_ids, mode).await
    }
}
