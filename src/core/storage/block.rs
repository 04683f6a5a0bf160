// src/core/storage/block.rs

//! Block identity: the unit the serializer and cache address blocks by.

/// Identifies one fixed-size block in the serializer's address space.
pub type BlockId = u64;

/// Sentinel meaning "no block" — a tree pointer that has never been allocated.
pub const NULL_BLOCK_ID: BlockId = u64::MAX;

/// The fixed block id every slice's superblock is persisted at.
pub const SUPERBLOCK_ID: BlockId = 0;
