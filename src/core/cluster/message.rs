// src/core/cluster/message.rs

//! The opaque payload type exchanged between peers and the single-byte tag identifying
//! which logical client of the multiplexer a given message belongs to.

use bytes::Bytes;

/// Identifies one logical client of the `MessageMultiplexer` sharing a cluster connection.
pub type SubChannelTag = u8;

/// An opaque byte payload written by a sender and delivered verbatim to the matching
/// sub-channel handler on the receiving peer.
pub type Message = Bytes;
