// src/core/cluster/routing.rs

//! The routing table mapping every known peer to its advertised address, and the
//! tie-break rule that resolves simultaneous duplicate connections between two peers.

use super::address::PeerAddress;
use super::peer_id::PeerId;
use dashmap::DashMap;

/// One entry in the routing table.
#[derive(Clone, Debug)]
pub struct RoutingEntry {
    pub peer_id: PeerId,
    pub address: PeerAddress,
}

/// The live routing table: every peer this node currently holds a connection to, or has
/// learned about via a peer's gossiped snapshot. Entries are created on connect and
/// removed on disconnect; `remove` is the only path that ever shrinks the table, so a
/// stale read never observes a peer vanish except through an explicit disconnect.
#[derive(Default)]
pub struct RoutingTable {
    entries: DashMap<PeerId, PeerAddress>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn insert(&self, peer_id: PeerId, address: PeerAddress) {
        self.entries.insert(peer_id, address);
    }

    pub fn remove(&self, peer_id: &PeerId) -> Option<(PeerId, PeerAddress)> {
        self.entries.remove(peer_id)
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.entries.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerAddress> {
        self.entries.get(peer_id).map(|e| e.value().clone())
    }

    /// Every peer currently known, sorted by id for a deterministic snapshot.
    pub fn snapshot(&self) -> Vec<(PeerId, PeerAddress)> {
        let mut v: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        v.sort_by_key(|(id, _)| *id);
        v
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.entries.iter().map(|e| *e.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges a snapshot received from a peer's handshake or gossip into this table.
    /// Peers already known keep the address this node already has; the table only grows
    /// from a merge, entries only ever shrink via an explicit `remove` on disconnect.
    pub fn merge_snapshot(&self, snapshot: Vec<(PeerId, PeerAddress)>, my_id: PeerId) {
        for (peer_id, address) in snapshot {
            if peer_id == my_id {
                continue;
            }
            self.entries.entry(peer_id).or_insert(address);
        }
    }
}

/// When two peers race to open connections to each other at nearly the same time, exactly
/// one connection must survive so intra-peer message ordering stays well-defined on a
/// single FIFO lane. The peer with the lower id keeps the connection *it* initiated; the
/// peer with the higher id keeps the connection *it* accepted. Both sides compute the same
/// winner independently, without any further negotiation over the wire.
pub fn should_keep_connection(my_id: PeerId, peer_id: PeerId, i_initiated: bool) -> bool {
    let i_am_lower = my_id < peer_id;
    i_am_lower == i_initiated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_does_not_overwrite_existing_addresses() {
        let table = RoutingTable::new();
        let peer = PeerId::generate();
        let original = PeerAddress::new(vec![super::super::address::IpAndPort::new(
            "10.0.0.1", 7000,
        )]);
        table.insert(peer, original.clone());
        let stale = PeerAddress::new(vec![super::super::address::IpAndPort::new(
            "10.0.0.2", 7001,
        )]);
        table.merge_snapshot(vec![(peer, stale)], PeerId::generate());
        assert_eq!(table.get(&peer), Some(original));
    }

    #[test]
    fn merge_skips_self() {
        let table = RoutingTable::new();
        let my_id = PeerId::generate();
        table.merge_snapshot(vec![(my_id, PeerAddress::default())], my_id);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_connection_winner_is_deterministic_on_both_sides() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        // The lower id keeps the connection it initiated.
        assert!(should_keep_connection(low, high, true));
        assert!(!should_keep_connection(low, high, false));
        // The higher id keeps the connection it accepted (the other side's initiation).
        assert!(should_keep_connection(high, low, false));
        assert!(!should_keep_connection(high, low, true));
    }
}
