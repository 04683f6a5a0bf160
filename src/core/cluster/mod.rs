// src/core/cluster/mod.rs

//! The connectivity cluster: peer handshake, routing-table gossip, and the single-byte-tag
//! message multiplexer layered on top of one TCP connection per peer.

pub mod address;
mod cluster;
pub mod connection;
pub mod events;
pub mod message;
pub mod multiplexer;
pub mod peer_id;
pub mod routing;
pub mod wire;

pub use address::{HostAndPort, IpAndPort, PeerAddress};
pub use cluster::ConnectivityCluster;
pub use events::{DisconnectWatcher, PeerListEvent, PeersListFreeze, PeersListSubscription};
pub use message::{Message, SubChannelTag};
pub use multiplexer::MessageMultiplexer;
pub use peer_id::PeerId;
pub use routing::RoutingEntry;
