// src/core/storage/serializer.rs

//! The `Serializer` trait: a block-addressable persistent store underneath the cache.
//! Allocation hands out a fresh id; read/write move whole blocks by id. The cache is the
//! only caller — nothing above it ever touches the serializer directly.

use super::block::{BlockId, SUPERBLOCK_ID};
use crate::core::errors::LatticeError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[async_trait]
pub trait Serializer: Send + Sync {
    /// Hands out a block id that has never been returned before.
    async fn allocate(&self) -> Result<BlockId, LatticeError>;

    /// Reads the current contents of `block_id`, or `None` if nothing has ever been
    /// written there.
    async fn read(&self, block_id: BlockId) -> Result<Option<Bytes>, LatticeError>;

    /// Overwrites `block_id` with `data` in full.
    async fn write(&self, block_id: BlockId, data: Bytes) -> Result<(), LatticeError>;
}

/// An in-memory serializer, for tests and for a single-process deployment where the
/// write-back cache's own flush cadence is the only durability boundary that matters.
pub struct MemorySerializer {
    blocks: DashMap<BlockId, Bytes>,
    next_id: AtomicU64,
}

impl MemorySerializer {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            next_id: AtomicU64::new(SUPERBLOCK_ID + 1),
        }
    }
}

impl Default for MemorySerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Serializer for MemorySerializer {
    async fn allocate(&self) -> Result<BlockId, LatticeError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn read(&self, block_id: BlockId) -> Result<Option<Bytes>, LatticeError> {
        Ok(self.blocks.get(&block_id).map(|entry| entry.value().clone()))
    }

    async fn write(&self, block_id: BlockId, data: Bytes) -> Result<(), LatticeError> {
        self.blocks.insert(block_id, data);
        Ok(())
    }
}
