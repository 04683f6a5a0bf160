// src/core/cluster/peer_id.rs

//! 128-bit peer identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Uniquely identifies one cluster node instance, generated once at process start.
///
/// `PeerId::nil()` is a sentinel that never identifies a live peer; it's used as a
/// placeholder before a connection's handshake has completed, and its ordering relative
/// to every generated id is used to break ties between simultaneous duplicate connections.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct PeerId([u8; 16]);

impl PeerId {
    pub fn generate() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub const fn nil() -> Self {
        Self([0u8; 16])
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", Uuid::from_bytes(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_nil() {
        assert!(PeerId::nil().is_nil());
        assert!(PeerId::default().is_nil());
    }

    #[test]
    fn generated_ids_are_not_nil_and_differ() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert!(!a.is_nil());
        assert!(!b.is_nil());
        assert_ne!(a, b);
    }

    #[test]
    fn ordering_is_total_and_consistent_with_bytes() {
        let a = PeerId([1u8; 16]);
        let b = PeerId([2u8; 16]);
        assert!(a < b);
    }
}
