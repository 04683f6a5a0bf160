// src/core/storage/superblock.rs

//! The superblock: the fixed root-pointer record every slice keeps at `SUPERBLOCK_ID`.

use super::block::{BlockId, NULL_BLOCK_ID};
use crate::core::errors::LatticeError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Arbitrary but fixed magic stamped into every superblock this slice implementation
/// creates; ASCII "LTSB" read big-endian.
pub const EXPECTED_MAGIC: u32 = 0x4c54_5342;

const ENCODED_LEN: usize = 4 + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub root_block: BlockId,
}

impl SuperBlock {
    pub fn new_empty() -> Self {
        Self {
            magic: EXPECTED_MAGIC,
            root_block: NULL_BLOCK_ID,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ENCODED_LEN);
        buf.put_u32(self.magic);
        buf.put_u64(self.root_block);
        buf.freeze()
    }

    pub fn decode(mut data: &[u8]) -> Result<Self, LatticeError> {
        if data.len() < ENCODED_LEN {
            return Err(LatticeError::BadSuperblockMagic {
                expected: format!("{EXPECTED_MAGIC:#x}"),
                found: "short read".to_string(),
            });
        }
        let magic = data.get_u32();
        let root_block = data.get_u64();
        if magic != EXPECTED_MAGIC {
            return Err(LatticeError::BadSuperblockMagic {
                expected: format!("{EXPECTED_MAGIC:#x}"),
                found: format!("{magic:#x}"),
            });
        }
        Ok(Self { magic, root_block })
    }
}
