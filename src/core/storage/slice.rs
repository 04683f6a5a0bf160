// src/core/storage/slice.rs

//! `BtreeSlice`: one logical key-space rooted at a superblock, exposing the memcached-style
//! operation surface on top of a transactor and a write-back cache. Every operation opens
//! its own transactor and buf-locks its way from the superblock down to the tree's single
//! root/leaf block, hand-over-hand: the superblock lock is released the instant the child
//! is locked on a read path, and held alongside it for the duration of a write.

use super::block::{BlockId, NULL_BLOCK_ID, SUPERBLOCK_ID};
use super::btree::node::{Entry, Leaf};
use super::cache::{Cache, LockMode};
use super::cas::CasTime;
use super::key::StoreKey;
use super::serializer::Serializer;
use super::superblock::SuperBlock;
use super::transactor::{Transactor, TxMode};
use crate::config::CacheConfig;
use crate::core::errors::LatticeError;
use bytes::Bytes;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetResult {
    Found { data: Bytes, flags: u32, cas: CasTime },
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddPolicy {
    /// The key must not already exist (memcached's `add`).
    RequireAbsent,
    Unconditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacePolicy {
    /// The key must already exist (memcached's `replace`/`cas`).
    RequirePresent,
    Unconditional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetResult {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrDecrKind {
    Incr,
    Decr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrDecrResult {
    NewValue(u64),
    NotNumeric,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendPrependKind {
    Append,
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendPrependResult {
    Stored,
    NotStored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

/// One page of an `rget` scan. `next_start` is `Some` exactly when the leaf had more
/// matching entries than `batch_size`; feeding it back as the next call's (closed) start
/// bound resumes the scan without holding any lock across the gap.
#[derive(Debug, Clone)]
pub struct RgetBatch {
    pub items: Vec<(StoreKey, Bytes)>,
    pub next_start: Option<StoreKey>,
}

pub struct BtreeSlice {
    cache: Arc<Cache>,
}

impl BtreeSlice {
    /// Formats a brand-new store: starts a cache just long enough to write an empty
    /// superblock, then shuts it down. Used once, to prepare a store before any `new()`
    /// opens it for traffic.
    pub async fn create(serializer: Arc<dyn Serializer>, cache_config: CacheConfig) -> Result<(), LatticeError> {
        let cache = Cache::start(serializer, cache_config).await;
        {
            let transactor = Transactor::new(cache.clone(), TxMode::Write);
            let mut superblock_lock = transactor.lock(SUPERBLOCK_ID, LockMode::Write).await?;
            superblock_lock.set_data(SuperBlock::new_empty().encode());
        }
        cache.shutdown().await;
        Ok(())
    }

    /// Opens an already-formatted store, starting its cache.
    pub async fn new(serializer: Arc<dyn Serializer>, cache_config: CacheConfig) -> Result<Self, LatticeError> {
        let cache = Cache::start(serializer, cache_config).await;
        Ok(Self { cache })
    }

    /// Shuts the slice's cache down, flushing every dirty block first.
    pub async fn close(self) {
        self.cache.shutdown().await;
    }

    fn read_transactor(&self) -> Transactor {
        Transactor::new(self.cache.clone(), TxMode::Read)
    }

    fn write_transactor(&self) -> Transactor {
        Transactor::new(self.cache.clone(), TxMode::Write)
    }

    async fn load_superblock(&self, transactor: &Transactor) -> Result<SuperBlock, LatticeError> {
        let lock = transactor.lock(SUPERBLOCK_ID, LockMode::Read).await?;
        match lock.data() {
            Some(bytes) => SuperBlock::decode(bytes),
            None => Ok(SuperBlock::new_empty()),
        }
    }

    async fn load_leaf(&self, transactor: &Transactor, root_block: BlockId) -> Result<Leaf, LatticeError> {
        let lock = transactor.lock(root_block, LockMode::Read).await?;
        match lock.data() {
            Some(bytes) => Leaf::decode(bytes),
            None => Ok(Leaf::default()),
        }
    }

    pub async fn get(&self, key: &StoreKey) -> Result<GetResult, LatticeError> {
        let transactor = self.read_transactor();
        let superblock = self.load_superblock(&transactor).await?;
        if superblock.root_block == NULL_BLOCK_ID {
            return Ok(GetResult::NotFound);
        }
        let leaf = self.load_leaf(&transactor, superblock.root_block).await?;
        Ok(match leaf.get(key.as_bytes()) {
            Some(entry) => GetResult::Found {
                data: Bytes::copy_from_slice(&entry.data),
                flags: entry.flags,
                cas: entry.cas,
            },
            None => GetResult::NotFound,
        })
    }

    pub async fn rget(
        &self,
        start: &StoreKey,
        end: &StoreKey,
        left_open: bool,
        right_open: bool,
        batch_size: usize,
    ) -> Result<RgetBatch, LatticeError> {
        let transactor = self.read_transactor();
        let superblock = self.load_superblock(&transactor).await?;
        if superblock.root_block == NULL_BLOCK_ID {
            return Ok(RgetBatch { items: Vec::new(), next_start: None });
        }
        let leaf = self.load_leaf(&transactor, superblock.root_block).await?;
        let raw = leaf.range(
            start.as_bytes(),
            end.as_bytes(),
            left_open,
            right_open,
            batch_size.saturating_add(1),
        );

        let mut items = Vec::new();
        let mut next_start = None;
        for (i, (k, entry)) in raw.into_iter().enumerate() {
            if i == batch_size {
                next_start = Some(StoreKey::new(k)?);
                break;
            }
            items.push((StoreKey::new(k)?, Bytes::from(entry.data)));
        }
        Ok(RgetBatch { items, next_start })
    }

    /// Opens the superblock and root leaf under a single write transactor, lets `mutate`
    /// update the leaf in place, then persists both. Allocates the root block on first
    /// write to an empty store.
    async fn mutate_leaf<R>(&self, mutate: impl FnOnce(&mut Leaf) -> R) -> Result<R, LatticeError> {
        let transactor = self.write_transactor();
        let mut superblock_lock = transactor.lock(SUPERBLOCK_ID, LockMode::Write).await?;
        let mut superblock = match superblock_lock.data() {
            Some(bytes) => SuperBlock::decode(bytes)?,
            None => SuperBlock::new_empty(),
        };

        let root_block = if superblock.root_block == NULL_BLOCK_ID {
            self.cache.allocate_block().await?
        } else {
            superblock.root_block
        };

        let mut leaf_lock = transactor.lock(root_block, LockMode::Write).await?;
        let mut leaf = match leaf_lock.data() {
            Some(bytes) => Leaf::decode(bytes)?,
            None => Leaf::default(),
        };

        let result = mutate(&mut leaf);
        leaf_lock.set_data(Bytes::from(leaf.encode()));

        if superblock.root_block != root_block {
            superblock.root_block = root_block;
            superblock_lock.set_data(superblock.encode());
        }
        Ok(result)
    }

    pub async fn get_cas(&self, key: &StoreKey, castime: CasTime) -> Result<GetResult, LatticeError> {
        let key_bytes = key.as_bytes().to_vec();
        let result = self
            .mutate_leaf(move |leaf| match leaf.get(&key_bytes).cloned() {
                Some(mut entry) => {
                    entry.cas = castime;
                    leaf.insert(key_bytes, entry.clone());
                    Some(entry)
                }
                None => None,
            })
            .await?;
        Ok(match result {
            Some(entry) => GetResult::Found {
                data: Bytes::copy_from_slice(&entry.data),
                flags: entry.flags,
                cas: entry.cas,
            },
            None => GetResult::NotFound,
        })
    }

    /// Set/add/replace/CAS, unified: the presence policy (`add_policy`/`replace_policy`)
    /// is checked first, then the CAS policy (`old_cas`) if the presence check passed and
    /// the caller supplied one. Both policies collapse onto the same four outcomes.
    #[allow(clippy::too_many_arguments)]
    pub async fn sarc(
        &self,
        key: &StoreKey,
        data: Bytes,
        flags: u32,
        exptime: u32,
        castime: CasTime,
        add_policy: AddPolicy,
        replace_policy: ReplacePolicy,
        old_cas: Option<CasTime>,
    ) -> Result<SetResult, LatticeError> {
        let key_bytes = key.as_bytes().to_vec();
        self.mutate_leaf(move |leaf| {
            let existing = leaf.get(&key_bytes).cloned();
            let exists = existing.is_some();

            if add_policy == AddPolicy::RequireAbsent && exists {
                return SetResult::NotStored;
            }
            if replace_policy == ReplacePolicy::RequirePresent && !exists {
                return SetResult::NotFound;
            }
            if let Some(expected) = old_cas {
                match &existing {
                    Some(entry) if entry.cas != expected => return SetResult::Exists,
                    None => return SetResult::NotFound,
                    _ => {}
                }
            }

            leaf.insert(
                key_bytes,
                Entry {
                    data: data.to_vec(),
                    flags,
                    exptime,
                    cas: castime,
                },
            );
            SetResult::Stored
        })
        .await
    }

    pub async fn incr_decr(
        &self,
        kind: IncrDecrKind,
        key: &StoreKey,
        amount: u64,
        castime: CasTime,
    ) -> Result<IncrDecrResult, LatticeError> {
        let key_bytes = key.as_bytes().to_vec();
        self.mutate_leaf(move |leaf| {
            let Some(mut entry) = leaf.get(&key_bytes).cloned() else {
                return IncrDecrResult::NotFound;
            };
            let Ok(text) = std::str::from_utf8(&entry.data) else {
                return IncrDecrResult::NotNumeric;
            };
            let Ok(current) = text.trim().parse::<u64>() else {
                return IncrDecrResult::NotNumeric;
            };
            let new_value = match kind {
                IncrDecrKind::Incr => current.saturating_add(amount),
                IncrDecrKind::Decr => current.saturating_sub(amount),
            };
            entry.data = new_value.to_string().into_bytes();
            entry.cas = castime;
            leaf.insert(key_bytes, entry);
            IncrDecrResult::NewValue(new_value)
        })
        .await
    }

    pub async fn append_prepend(
        &self,
        kind: AppendPrependKind,
        key: &StoreKey,
        data: Bytes,
        castime: CasTime,
    ) -> Result<AppendPrependResult, LatticeError> {
        let key_bytes = key.as_bytes().to_vec();
        self.mutate_leaf(move |leaf| {
            let Some(mut entry) = leaf.get(&key_bytes).cloned() else {
                return AppendPrependResult::NotStored;
            };
            match kind {
                AppendPrependKind::Append => entry.data.extend_from_slice(&data),
                AppendPrependKind::Prepend => {
                    let mut combined = data.to_vec();
                    combined.extend_from_slice(&entry.data);
                    entry.data = combined;
                }
            }
            entry.cas = castime;
            leaf.insert(key_bytes, entry);
            AppendPrependResult::Stored
        })
        .await
    }

    /// `timestamp` is recorded purely for a replication layer outside this core to order
    /// against; deletion itself doesn't consult it.
    pub async fn delete_key(&self, key: &StoreKey, _timestamp: u64) -> Result<DeleteResult, LatticeError> {
        let key_bytes = key.as_bytes().to_vec();
        self.mutate_leaf(move |leaf| match leaf.remove(&key_bytes) {
            Some(_) => DeleteResult::Deleted,
            None => DeleteResult::NotFound,
        })
        .await
    }
}
