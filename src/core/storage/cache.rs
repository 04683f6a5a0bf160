// src/core/storage/cache.rs

//! The write-back cache: maps `BlockId -> buffered block`, hands out scoped read/write
//! locks per block, and flushes dirty blocks back to the serializer off the caller's path.

use super::block::BlockId;
use super::serializer::Serializer;
use crate::config::CacheConfig;
use crate::core::errors::LatticeError;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

struct BlockState {
    data: Option<Bytes>,
    /// Distinguishes "never read from the serializer" from "read and confirmed empty",
    /// so a freshly-allocated block isn't re-fetched on every touch.
    loaded: bool,
}

/// A write-back block cache. Blocks are loaded from the serializer lazily on first touch
/// and held in memory until a flush tick (or an immediate flush past the dirty-block
/// watermark) writes them back; readers always see the most recently written value.
pub struct Cache {
    serializer: Arc<dyn Serializer>,
    blocks: DashMap<BlockId, Arc<RwLock<BlockState>>>,
    dirty: DashSet<BlockId>,
    high_watermark: usize,
    flush_notify: Arc<Notify>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl Cache {
    /// Starts the cache's background flush task. Asynchronous per the write-back cache's
    /// contract, though this implementation never needs to suspend before it's ready.
    pub async fn start(serializer: Arc<dyn Serializer>, config: CacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self {
            serializer,
            blocks: DashMap::new(),
            dirty: DashSet::new(),
            high_watermark: config.dirty_block_high_watermark,
            flush_notify: Arc::new(Notify::new()),
            shutdown_tx: Mutex::new(None),
            flush_task: Mutex::new(None),
        });
        cache.spawn_flush_task(config.flush_interval_ms);
        cache
    }

    fn spawn_flush_task(self: &Arc<Self>, flush_interval_ms: u64) {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(flush_interval_ms));
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        cache.flush_dirty().await;
                        break;
                    }
                    _ = cache.flush_notify.notified() => {
                        cache.flush_dirty().await;
                    }
                    _ = ticker.tick() => {
                        cache.flush_dirty().await;
                    }
                }
            }
        });
        *self.flush_task.lock() = Some(handle);
    }

    /// Signals the flush task to perform one last flush and stop, then waits for it.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        let handle = self.flush_task.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Acquires a scoped lock on `block_id`, loading it from the serializer first if this
    /// is the first time the cache has seen it.
    pub async fn lock_block(self: &Arc<Self>, block_id: BlockId, mode: LockMode) -> Result<BufLock, LatticeError> {
        let handle = self
            .blocks
            .entry(block_id)
            .or_insert_with(|| {
                Arc::new(RwLock::new(BlockState {
                    data: None,
                    loaded: false,
                }))
            })
            .clone();

        self.ensure_loaded(&handle, block_id).await?;

        let guard = match mode {
            LockMode::Read => BufGuard::Read(handle.read_owned().await),
            LockMode::Write => BufGuard::Write(handle.write_owned().await),
        };
        Ok(BufLock {
            block_id,
            cache: self.clone(),
            guard,
        })
    }

    /// Hands out a block id the serializer has never returned before. Used when a tree
    /// operation needs to materialize a node that doesn't exist yet.
    pub async fn allocate_block(&self) -> Result<BlockId, LatticeError> {
        self.serializer.allocate().await
    }

    /// Locks several blocks at once in a fixed id order, the way `Db::lock_shards_for_keys`
    /// sorts shard indices before acquiring them, so two callers locking an overlapping set
    /// can never deadlock against each other.
    pub async fn lock_blocks_sorted(
        self: &Arc<Self>,
        block_ids: &[BlockId],
        mode: LockMode,
    ) -> Result<Vec<BufLock>, LatticeError> {
        let mut sorted = block_ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let mut locks = Vec::with_capacity(sorted.len());
        for block_id in sorted {
            locks.push(self.lock_block(block_id, mode).await?);
        }
        Ok(locks)
    }

    async fn ensure_loaded(&self, handle: &Arc<RwLock<BlockState>>, block_id: BlockId) -> Result<(), LatticeError> {
        {
            let state = handle.read().await;
            if state.loaded {
                return Ok(());
            }
        }
        let data = self.serializer.read(block_id).await?;
        let mut state = handle.write().await;
        if !state.loaded {
            state.data = data;
            state.loaded = true;
        }
        Ok(())
    }

    fn mark_dirty(&self, block_id: BlockId) {
        self.dirty.insert(block_id);
        if self.high_watermark != 0 && self.dirty.len() >= self.high_watermark {
            self.flush_notify.notify_one();
        }
    }

    async fn flush_dirty(&self) {
        let pending: Vec<BlockId> = self.dirty.iter().map(|id| *id).collect();
        for block_id in pending {
            let handle = self.blocks.get(&block_id).map(|entry| entry.value().clone());
            if let Some(handle) = handle {
                let data = handle.read().await.data.clone();
                if let Some(data) = data {
                    if let Err(e) = self.serializer.write(block_id, data).await {
                        warn!("failed to flush block {block_id}: {e}");
                        continue;
                    }
                }
            }
            self.dirty.remove(&block_id);
        }
    }
}

enum BufGuard {
    Read(OwnedRwLockReadGuard<BlockState>),
    Write(OwnedRwLockWriteGuard<BlockState>),
}

/// A scoped lock on one cached block. Doubles as its own `Buf` handle: `data()` reads
/// under either lock mode, `set_data()` writes and is only valid under a write lock.
/// Dropping it releases the per-block lock; any write made through it is already durable
/// in the cache and eligible for the next flush the instant it's set, not at drop time.
pub struct BufLock {
    block_id: BlockId,
    cache: Arc<Cache>,
    guard: BufGuard,
}

impl BufLock {
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn data(&self) -> Option<&Bytes> {
        match &self.guard {
            BufGuard::Read(g) => g.data.as_ref(),
            BufGuard::Write(g) => g.data.as_ref(),
        }
    }

    pub fn set_data(&mut self, data: Bytes) {
        match &mut self.guard {
            BufGuard::Write(g) => {
                g.data = Some(data);
                g.loaded = true;
                self.cache.mark_dirty(self.block_id);
            }
            BufGuard::Read(_) => unreachable!("set_data called on a read-mode buf lock"),
        }
    }
}
