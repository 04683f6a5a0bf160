// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
///
/// Logical outcomes that are not failures (not-found, stored, cas-mismatch, ...) are modeled as
/// plain return values from the relevant operations, never as variants here. This enum is
/// reserved for I/O, protocol, and startup failures.
#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("connection closed before a complete frame was received")]
    IncompleteFrame,

    #[error("frame exceeds the maximum allowed length ({0} bytes)")]
    FrameTooLarge(usize),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("peer reported cluster version '{theirs}', expected '{ours}'")]
    VersionMismatch { ours: String, theirs: String },

    #[error("peer reported architecture '{theirs}', expected '{ours}'")]
    ArchMismatch { ours: String, theirs: String },

    #[error("peer reported build mode '{theirs}', expected '{ours}'")]
    BuildModeMismatch { ours: String, theirs: String },

    #[error("peer {0} is already connected")]
    AlreadyConnected(String),

    #[error("sub-channel {0} has no registered handler")]
    UnknownSubChannel(u8),

    #[error("store key exceeds the maximum length of 255 bytes")]
    KeyTooLong,

    #[error("superblock magic mismatch: expected '{expected}', found '{found}'")]
    BadSuperblockMagic { expected: String, found: String },

    #[error("block {0} was never allocated")]
    UnallocatedBlock(u64),

    #[error("cache has already been shut down")]
    CacheShutdown,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for LatticeError {
    fn clone(&self) -> Self {
        match self {
            LatticeError::Io(e) => LatticeError::Io(Arc::clone(e)),
            LatticeError::IncompleteFrame => LatticeError::IncompleteFrame,
            LatticeError::FrameTooLarge(n) => LatticeError::FrameTooLarge(*n),
            LatticeError::HandshakeFailed(s) => LatticeError::HandshakeFailed(s.clone()),
            LatticeError::VersionMismatch { ours, theirs } => LatticeError::VersionMismatch {
                ours: ours.clone(),
                theirs: theirs.clone(),
            },
            LatticeError::ArchMismatch { ours, theirs } => LatticeError::ArchMismatch {
                ours: ours.clone(),
                theirs: theirs.clone(),
            },
            LatticeError::BuildModeMismatch { ours, theirs } => LatticeError::BuildModeMismatch {
                ours: ours.clone(),
                theirs: theirs.clone(),
            },
            LatticeError::AlreadyConnected(s) => LatticeError::AlreadyConnected(s.clone()),
            LatticeError::UnknownSubChannel(t) => LatticeError::UnknownSubChannel(*t),
            LatticeError::KeyTooLong => LatticeError::KeyTooLong,
            LatticeError::BadSuperblockMagic { expected, found } => {
                LatticeError::BadSuperblockMagic {
                    expected: expected.clone(),
                    found: found.clone(),
                }
            }
            LatticeError::UnallocatedBlock(id) => LatticeError::UnallocatedBlock(*id),
            LatticeError::CacheShutdown => LatticeError::CacheShutdown,
            LatticeError::Config(s) => LatticeError::Config(s.clone()),
            LatticeError::Internal(s) => LatticeError::Internal(s.clone()),
        }
    }
}

impl PartialEq for LatticeError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LatticeError::Io(e1), LatticeError::Io(e2)) => e1.to_string() == e2.to_string(),
            (LatticeError::FrameTooLarge(a), LatticeError::FrameTooLarge(b)) => a == b,
            (LatticeError::HandshakeFailed(a), LatticeError::HandshakeFailed(b)) => a == b,
            (
                LatticeError::VersionMismatch { ours: o1, theirs: t1 },
                LatticeError::VersionMismatch { ours: o2, theirs: t2 },
            ) => o1 == o2 && t1 == t2,
            (
                LatticeError::ArchMismatch { ours: o1, theirs: t1 },
                LatticeError::ArchMismatch { ours: o2, theirs: t2 },
            ) => o1 == o2 && t1 == t2,
            (
                LatticeError::BuildModeMismatch { ours: o1, theirs: t1 },
                LatticeError::BuildModeMismatch { ours: o2, theirs: t2 },
            ) => o1 == o2 && t1 == t2,
            (LatticeError::AlreadyConnected(a), LatticeError::AlreadyConnected(b)) => a == b,
            (LatticeError::UnknownSubChannel(a), LatticeError::UnknownSubChannel(b)) => a == b,
            (
                LatticeError::BadSuperblockMagic { expected: e1, found: f1 },
                LatticeError::BadSuperblockMagic { expected: e2, found: f2 },
            ) => e1 == e2 && f1 == f2,
            (LatticeError::UnallocatedBlock(a), LatticeError::UnallocatedBlock(b)) => a == b,
            (LatticeError::Config(a), LatticeError::Config(b)) => a == b,
            (LatticeError::Internal(a), LatticeError::Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for LatticeError {
    fn from(e: std::io::Error) -> Self {
        LatticeError::Io(Arc::new(e))
    }
}

impl From<bincode::error::EncodeError> for LatticeError {
    fn from(e: bincode::error::EncodeError) -> Self {
        LatticeError::Internal(format!("failed to encode wire payload: {e}"))
    }
}

impl From<bincode::error::DecodeError> for LatticeError {
    fn from(e: bincode::error::DecodeError) -> Self {
        LatticeError::Internal(format!("failed to decode wire payload: {e}"))
    }
}

/// Helper matching non-critical disconnection errors, analogous to ordinary peer hangups.
pub fn is_normal_disconnect(e: &LatticeError) -> bool {
    matches!(e, LatticeError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
