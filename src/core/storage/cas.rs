// src/core/storage/cas.rs

//! `CasTime`: the monotonically-advancing (timestamp, cas-counter) pair a caller mints
//! and the slice stamps onto a stored entry, letting later writers assert "nothing else
//! touched this key since I last read it."

/// A point in the CAS/timestamp order. Callers are responsible for advancing both fields
/// monotonically across calls; the slice only compares and stores what it's given.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, bincode::Encode, bincode::Decode)]
pub struct CasTime {
    pub timestamp: u64,
    pub cas: u64,
}

impl CasTime {
    pub fn new(timestamp: u64, cas: u64) -> Self {
        Self { timestamp, cas }
    }
}
