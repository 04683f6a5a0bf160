// src/core/storage/key.rs

//! `StoreKey`: the caller-supplied lookup key, length-bounded the way the wire format
//! length-prefixes it (a single byte of length).

use crate::core::errors::LatticeError;
use bytes::Bytes;
use std::fmt;

/// Longest key a single length byte on the wire can describe.
pub const MAX_KEY_LEN: usize = 255;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(Bytes);

impl StoreKey {
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, LatticeError> {
        let bytes = bytes.into();
        if bytes.len() > MAX_KEY_LEN {
            return Err(LatticeError::KeyTooLong);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({:?})", String::from_utf8_lossy(&self.0))
    }
}
