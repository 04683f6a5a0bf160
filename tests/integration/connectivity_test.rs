// tests/integration/connectivity_test.rs

//! End-to-end tests of `ConnectivityCluster` over real loopback TCP sockets: handshake,
//! message delivery and ordering, the peer-list event bus, and handshake rejection.

use super::test_helpers::{bind_node, ephemeral_config};
use latticedb::core::cluster::{ConnectivityCluster, PeerListEvent};
use latticedb::core::errors::LatticeError;
use std::time::Duration;
use tokio::time::timeout;

/// `get_peers_list()` is backed by a `DashMap`, whose iteration order is unspecified;
/// sort before comparing so these tests don't depend on it.
fn sorted(mut ids: Vec<latticedb::core::cluster::PeerId>) -> Vec<latticedb::core::cluster::PeerId> {
    ids.sort();
    ids
}

/// A freshly-bound cluster's peer list always contains itself, even with no connections
/// ever accepted.
#[tokio::test]
async fn start_stop() {
    let node = bind_node().await;
    assert_eq!(node.get_peers_list(), vec![node.get_me()]);
    node.shutdown();
}

/// Two nodes complete a handshake, exchange a message on a registered sub-channel, and
/// each observes the other as a connected peer by id.
#[tokio::test]
async fn message_round_trip() {
    let a = bind_node().await;
    let b = bind_node().await;

    let b_id = a.connect(b.local_addr()).await.unwrap();
    assert_eq!(sorted(a.get_peers_list()), sorted(vec![a.my_id, b_id]));
    assert_eq!(sorted(b.get_peers_list()), sorted(vec![a.my_id, b_id]));
    assert!(a.is_connected(&b_id));

    let mux_a = a.multiplexer();
    let mux_b = b.multiplexer();
    let mut chan_a = mux_a.register(1);
    let mut chan_b = mux_b.register(1);

    for payload in [873usize, 66663, 6849, 999] {
        let bytes = vec![0xAB; payload];
        chan_a
            .send(b_id, bytes.clone().into())
            .expect("send to a connected peer should succeed");
        let (from, msg) = timeout(Duration::from_secs(2), chan_b.recv())
            .await
            .expect("message should arrive")
            .expect("sub-channel should stay open");
        assert_eq!(from, a.my_id);
        assert_eq!(msg.len(), payload);
        assert_eq!(msg.as_ref(), bytes.as_slice());
    }

    a.shutdown();
    b.shutdown();
}

/// Messages sent back-to-back on one sub-channel arrive at the receiver in the order they
/// were sent, since a connection's writes share one FIFO lane.
#[tokio::test]
async fn message_ordering_is_preserved() {
    let a = bind_node().await;
    let b = bind_node().await;
    let b_id = a.connect(b.local_addr()).await.unwrap();

    let mux_a = a.multiplexer();
    let mux_b = b.multiplexer();
    let chan_a = mux_a.register(7);
    let mut chan_b = mux_b.register(7);

    for i in 0u8..20 {
        chan_a.send(b_id, vec![i].into()).unwrap();
    }
    for expected in 0u8..20 {
        let (_, msg) = timeout(Duration::from_secs(2), chan_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.as_ref(), &[expected]);
    }

    a.shutdown();
    b.shutdown();
}

/// Sending to a peer id this node has no connection to is a silent no-op: the message is
/// dropped, there is no retry, and the caller sees `Ok(())` rather than an error.
#[tokio::test]
async fn sending_to_an_unreachable_peer_is_a_silent_no_op() {
    let a = bind_node().await;
    let mux_a = a.multiplexer();
    let chan_a = mux_a.register(1);

    let ghost = latticedb::core::cluster::PeerId::generate();
    assert!(chan_a.send(ghost, vec![1, 2, 3].into()).is_ok());

    a.shutdown();
}

/// A full byte-range payload (every value 0..=255) survives the length-delimited codec and
/// bincode-free pass-through untouched.
#[tokio::test]
async fn full_byte_range_payload_round_trips() {
    let a = bind_node().await;
    let b = bind_node().await;
    let b_id = a.connect(b.local_addr()).await.unwrap();

    let mux_a = a.multiplexer();
    let mux_b = b.multiplexer();
    let chan_a = mux_a.register(2);
    let mut chan_b = mux_b.register(2);

    let payload: Vec<u8> = (0u16..=255).map(|b| b as u8).collect();
    chan_a.send(b_id, payload.clone().into()).unwrap();
    let (_, msg) = timeout(Duration::from_secs(2), chan_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.as_ref(), payload.as_slice());

    a.shutdown();
    b.shutdown();
}

/// Two sub-channels registered on the same pair of nodes never see each other's messages.
#[tokio::test]
async fn multiplexer_keeps_sub_channels_isolated() {
    let a = bind_node().await;
    let b = bind_node().await;
    let b_id = a.connect(b.local_addr()).await.unwrap();

    let mux_a = a.multiplexer();
    let mux_b = b.multiplexer();
    let chan_a_1 = mux_a.register(1);
    let chan_a_2 = mux_a.register(2);
    let mut chan_b_1 = mux_b.register(1);
    let mut chan_b_2 = mux_b.register(2);

    chan_a_1.send(b_id, b"on channel one".to_vec().into()).unwrap();
    chan_a_2.send(b_id, b"on channel two".to_vec().into()).unwrap();

    let (_, msg1) = timeout(Duration::from_secs(2), chan_b_1.recv())
        .await
        .unwrap()
        .unwrap();
    let (_, msg2) = timeout(Duration::from_secs(2), chan_b_2.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg1.as_ref(), b"on channel one");
    assert_eq!(msg2.as_ref(), b"on channel two");

    a.shutdown();
    b.shutdown();
}

/// Subscribing and freezing the peer list together never miss a connect event that races
/// with the snapshot.
#[tokio::test]
async fn freeze_and_subscribe_observes_a_connect_event() {
    let a = bind_node().await;
    let b = bind_node().await;

    let (freeze, mut sub) = a.freeze_and_subscribe();
    assert!(freeze.connected_peers.is_empty());

    let b_id = a.connect(b.local_addr()).await.unwrap();
    let event = timeout(Duration::from_secs(2), sub.next()).await.unwrap();
    assert!(matches!(event, Some(PeerListEvent::Connected(id)) if id == b_id));

    a.shutdown();
    b.shutdown();
}

/// A disconnect watcher fires once the watched peer's connection closes.
#[tokio::test]
async fn watch_disconnect_fires_on_shutdown() {
    let a = bind_node().await;
    let b = bind_node().await;
    let b_id = a.connect(b.local_addr()).await.unwrap();

    let watcher = a.watch_disconnect(b_id);
    b.shutdown();
    timeout(Duration::from_secs(2), watcher.wait()).await.unwrap();

    a.shutdown();
}

/// A watcher for a peer that was never connected is already pulsed.
#[tokio::test]
async fn watch_disconnect_on_an_unknown_peer_is_already_pulsed() {
    let a = bind_node().await;
    let mut watcher = a.watch_disconnect(latticedb::core::cluster::PeerId::generate());
    assert!(watcher.is_pulsed());
    a.shutdown();
}

/// A peer reporting an incompatible cluster version is rejected during the handshake.
#[tokio::test]
async fn mismatched_cluster_version_is_rejected() {
    let a = bind_node().await;
    let mut b_config = ephemeral_config();
    b_config.cluster_version = "2.0".to_string();
    let b = ConnectivityCluster::bind(&b_config).await.unwrap();

    let err = a.connect(b.local_addr()).await.unwrap_err();
    assert!(matches!(err, LatticeError::VersionMismatch { .. }));
    assert_eq!(a.get_peers_list(), vec![a.my_id]);

    a.shutdown();
    b.shutdown();
}

/// A peer reporting an incompatible build mode is rejected during the handshake.
#[tokio::test]
async fn mismatched_build_mode_is_rejected() {
    let a = bind_node().await;
    let mut b_config = ephemeral_config();
    b_config.cluster_build_mode = "release".to_string();
    let b = ConnectivityCluster::bind(&b_config).await.unwrap();

    let err = a.connect(b.local_addr()).await.unwrap_err();
    assert!(matches!(err, LatticeError::BuildModeMismatch { .. }));

    a.shutdown();
    b.shutdown();
}

/// Re-connecting to an already-connected peer collapses to a single registered connection
/// rather than accumulating duplicates.
#[tokio::test]
async fn reconnecting_to_the_same_peer_does_not_duplicate_the_entry() {
    let a = bind_node().await;
    let b = bind_node().await;

    let first = a.connect(b.local_addr()).await.unwrap();
    let second = a.connect(b.local_addr()).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(a.get_peers_list().len(), 2);

    a.shutdown();
    b.shutdown();
}
