// src/core/cluster/address.rs

//! Host/port addressing: the configuration-time `HostAndPort`, the wire-level `IpAndPort`,
//! and `PeerAddress`, which tracks both a peer's bound addresses and any canonical override.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// A host/port pair as configured by the user. `port == 0` means "ask the OS for an
/// ephemeral port"; the actually-bound port is resolved once the listener is up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostAndPort {
    pub host: String,
    pub port: u16,
}

impl HostAndPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn is_any_port(&self) -> bool {
        self.port == 0
    }
}

impl fmt::Display for HostAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A resolved IP/port pair, as actually observed on a socket or explicitly configured.
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct IpAndPort {
    pub ip: String,
    pub port: u16,
}

impl IpAndPort {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self {
            ip: addr.ip().to_string(),
            port: addr.port(),
        }
    }

    pub fn to_socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.ip, self.port).parse().ok()
    }
}

impl fmt::Display for IpAndPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Everything known about how to reach one peer.
#[derive(
    Clone, Debug, Default, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct PeerAddress {
    /// Every address this peer is actually bound to / reachable at.
    pub addresses: Vec<IpAndPort>,
    /// Addresses explicitly configured as canonical, e.g. when the peer sits behind a NAT
    /// or load balancer. When non-empty, other peers advertise these instead of `addresses`.
    pub canonical: Vec<IpAndPort>,
}

impl PeerAddress {
    pub fn new(addresses: Vec<IpAndPort>) -> Self {
        Self {
            addresses,
            canonical: Vec::new(),
        }
    }

    pub fn with_canonical(mut self, canonical: Vec<IpAndPort>) -> Self {
        self.canonical = canonical;
        self
    }

    /// The addresses that should actually be advertised to other peers.
    pub fn advertised(&self) -> &[IpAndPort] {
        if self.canonical.is_empty() {
            &self.addresses
        } else {
            &self.canonical
        }
    }
}
