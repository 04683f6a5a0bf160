// src/core/storage/btree/node.rs

//! The leaf node format: a sorted key/entry map, persisted as the tree's single root
//! block. `TODO`: split into internal + leaf nodes once an encoded leaf would exceed one
//! block; today a slice's whole keyspace lives in one block.

use crate::core::errors::LatticeError;
use crate::core::storage::cas::CasTime;
use bincode::config::standard;
use bincode::{Decode, Encode};
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Clone, Debug, Encode, Decode)]
pub struct Entry {
    pub data: Vec<u8>,
    pub flags: u32,
    pub exptime: u32,
    pub cas: CasTime,
}

#[derive(Clone, Debug, Default, Encode, Decode)]
pub struct Leaf {
    entries: BTreeMap<Vec<u8>, Entry>,
}

impl Leaf {
    pub fn encode(&self) -> Vec<u8> {
        bincode::encode_to_vec(self, standard()).expect("leaf encoding is infallible")
    }

    pub fn decode(data: &[u8]) -> Result<Self, LatticeError> {
        let (leaf, _) = bincode::decode_from_slice(data, standard())?;
        Ok(leaf)
    }

    pub fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: Vec<u8>, entry: Entry) -> Option<Entry> {
        self.entries.insert(key, entry)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        self.entries.remove(key)
    }

    /// Keys in `[start, end]` order, respecting open/closed endpoints, starting strictly
    /// after `start` if `left_open`. Collects at most `limit` entries so a caller can
    /// restart from the last key it saw.
    pub fn range(
        &self,
        start: &[u8],
        end: &[u8],
        left_open: bool,
        right_open: bool,
        limit: usize,
    ) -> Vec<(Vec<u8>, Entry)> {
        let lower = if left_open {
            Bound::Excluded(start)
        } else {
            Bound::Included(start)
        };
        let upper = if right_open {
            Bound::Excluded(end)
        } else {
            Bound::Included(end)
        };
        self.entries
            .range::<[u8], _>((lower, upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
