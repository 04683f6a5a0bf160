// src/core/cluster/cluster.rs

//! `ConnectivityCluster`: the listening socket, per-peer connection table, routing table,
//! and peer-list event bus, all bound to one node instance.

use super::address::{IpAndPort, PeerAddress};
use super::connection::{self, Connection, SubChannelDispatch};
use super::events::{DisconnectWatcher, PeerListEvent, PeersListFreeze, PeersListSubscription};
use super::multiplexer::MessageMultiplexer;
use super::peer_id::PeerId;
use super::routing::{RoutingTable, should_keep_connection};
use super::wire::{self, Handshake, HandshakeIdentity};
use crate::config::ClusterConfig;
use crate::core::errors::LatticeError;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Owns the listening socket and every live peer connection for one node instance.
/// Constructing a cluster binds the listener (or fails fast on an address-in-use error)
/// and spawns the accept loop; calling `shutdown` asks every live connection's tasks to
/// unwind, mirroring a scope-bound "run" object rather than a detached background service.
pub struct ConnectivityCluster {
    pub my_id: PeerId,
    my_listening_addr: SocketAddr,
    advertised: PeerAddress,
    identity: HandshakeIdentity,
    routing: Arc<RoutingTable>,
    connections: Arc<DashMap<PeerId, Arc<Connection>>>,
    dispatch: SubChannelDispatch,
    peer_events_tx: broadcast::Sender<PeerListEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectivityCluster {
    /// Binds the configured listen address and spawns the accept loop. `config.port == 0`
    /// asks the OS for an ephemeral port; the resolved port is folded into the advertised
    /// address immediately, before any canonical-address gossip can go out.
    pub async fn bind(config: &ClusterConfig) -> Result<Arc<Self>, LatticeError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let bound_addr = listener.local_addr()?;

        let canonical: Vec<IpAndPort> = config
            .canonical_addresses
            .iter()
            .filter_map(|raw| parse_canonical(raw, bound_addr.port()))
            .collect();

        let advertised =
            PeerAddress::new(vec![IpAndPort::from_socket_addr(bound_addr)]).with_canonical(canonical);

        let (peer_events_tx, _) = broadcast::channel(1024);
        let (shutdown_tx, _) = broadcast::channel(1);

        let cluster = Arc::new(Self {
            my_id: PeerId::generate(),
            my_listening_addr: bound_addr,
            advertised,
            identity: HandshakeIdentity {
                cluster_version: config.cluster_version.clone(),
                cluster_arch_bitsize: config.cluster_arch_bitsize.clone(),
                cluster_build_mode: config.cluster_build_mode.clone(),
            },
            routing: Arc::new(RoutingTable::new()),
            connections: Arc::new(DashMap::new()),
            dispatch: Arc::new(DashMap::new()),
            peer_events_tx,
            shutdown_tx,
        });

        info!(
            "cluster node {} listening on {}",
            cluster.my_id, bound_addr
        );

        let accept_cluster = cluster.clone();
        tokio::spawn(async move {
            accept_cluster.accept_loop(listener).await;
        });

        Ok(cluster)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.my_listening_addr
    }

    /// This node's own id, the same value every peer's routing table knows it by.
    pub fn get_me(&self) -> PeerId {
        self.my_id
    }

    /// Every peer this node currently knows about, including itself: a lone, unconnected
    /// node still reports a list of size one.
    pub fn get_peers_list(&self) -> Vec<PeerId> {
        let mut peers = self.routing.peer_ids();
        peers.push(self.my_id);
        peers
    }

    pub fn is_connected(&self, peer_id: &PeerId) -> bool {
        self.connections.contains_key(peer_id)
    }

    /// Subscribes to membership changes, returning a snapshot consistent with the
    /// subscription: any event delivered after this call is guaranteed to be observed,
    /// even if it raced with the snapshot being taken.
    pub fn freeze_and_subscribe(&self) -> (PeersListFreeze, PeersListSubscription) {
        let receiver = self.peer_events_tx.subscribe();
        let freeze = PeersListFreeze {
            connected_peers: self.routing.peer_ids(),
        };
        (freeze, PeersListSubscription::new(receiver))
    }

    /// Returns a watcher that fires when `peer_id` disconnects. If the peer isn't
    /// currently connected, the watcher is already pulsed.
    pub fn watch_disconnect(&self, peer_id: PeerId) -> DisconnectWatcher {
        match self.connections.get(&peer_id) {
            Some(conn) => DisconnectWatcher::pending(conn.add_disconnect_waiter()),
            None => DisconnectWatcher::already_fired(),
        }
    }

    /// Hands out a multiplexer handle clients use to claim a sub-channel tag.
    pub fn multiplexer(self: &Arc<Self>) -> MessageMultiplexer {
        let cluster = self.clone();
        MessageMultiplexer::new(self.dispatch.clone(), move |peer, tag, message| {
            match cluster.connections.get(&peer) {
                Some(conn) => conn.send(tag, message),
                None => {
                    debug!("dropping message to {peer}: no connection (unreachable)");
                    Ok(())
                }
            }
        })
    }

    /// Opens an outbound connection to `addr` and completes the handshake. Returns the
    /// peer's id once the connection is registered (which may not be *this* connection,
    /// if the peer already had one and the duplicate-connection tie-break favored it).
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<PeerId, LatticeError> {
        let mut stream = TcpStream::connect(addr).await?;
        wire::write_header(&mut stream).await?;
        wire::read_header(&mut stream).await?;

        let mut framed = wire::framed(stream);
        framed.send(self.my_handshake().encode()?).await?;
        let frame = framed
            .next()
            .await
            .ok_or_else(|| LatticeError::HandshakeFailed("peer closed during handshake".into()))??;
        let theirs = Handshake::decode(&frame)?;
        self.identity.check(&theirs)?;

        self.routing
            .merge_snapshot(theirs.routing_snapshot.clone(), self.my_id);
        let peer_advertised = PeerAddress::new(vec![theirs.listening_addr.clone()]);
        let stream = framed.into_inner();
        self.finalize_connection(stream, addr, theirs.peer_id, peer_advertised, true);
        self.connect_to_newly_learned_peers(&theirs.routing_snapshot);
        Ok(theirs.peer_id)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    info!("cluster {} shutting down accept loop", self.my_id);
                    break;
                }
                res = listener.accept() => {
                    match res {
                        Ok((stream, addr)) => {
                            let cluster = self.clone();
                            tokio::spawn(async move { cluster.handle_incoming(stream, addr).await; });
                        }
                        Err(e) => warn!("failed to accept connection: {e}"),
                    }
                }
            }
        }
    }

    async fn handle_incoming(self: Arc<Self>, mut stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = wire::read_header(&mut stream).await {
            debug!("rejecting connection from {addr}: {e}");
            return;
        }
        if let Err(e) = wire::write_header(&mut stream).await {
            debug!("failed to write header to {addr}: {e}");
            return;
        }

        let mut framed = wire::framed(stream);
        let encoded = match self.my_handshake().encode() {
            Ok(e) => e,
            Err(e) => {
                warn!("failed to encode handshake for {addr}: {e}");
                return;
            }
        };
        if framed.send(encoded).await.is_err() {
            return;
        }

        let frame = match framed.next().await {
            Some(Ok(frame)) => frame,
            _ => {
                debug!("{addr} closed before sending a handshake");
                return;
            }
        };
        let theirs = match Handshake::decode(&frame) {
            Ok(h) => h,
            Err(e) => {
                warn!("malformed handshake from {addr}: {e}");
                return;
            }
        };
        if let Err(e) = self.identity.check(&theirs) {
            warn!("rejecting peer {} ({addr}): {e}", theirs.peer_id);
            return;
        }

        self.routing
            .merge_snapshot(theirs.routing_snapshot.clone(), self.my_id);
        let peer_advertised = PeerAddress::new(vec![theirs.listening_addr.clone()]);
        let stream = framed.into_inner();
        self.finalize_connection(stream, addr, theirs.peer_id, peer_advertised, false);
        self.connect_to_newly_learned_peers(&theirs.routing_snapshot);
    }

    /// Turns every peer gossiped to us in a handshake snapshot that we don't already hold
    /// a connection to into an actual outbound connection attempt, so an introduction
    /// propagates into a real mesh edge instead of sitting inert as a routing-table entry.
    /// Best-effort: a peer we can't reach (or already raced a connection to) is skipped.
    fn connect_to_newly_learned_peers(self: &Arc<Self>, snapshot: &[(PeerId, PeerAddress)]) {
        for (peer_id, address) in snapshot {
            let peer_id = *peer_id;
            if peer_id == self.my_id || self.is_connected(&peer_id) {
                continue;
            }
            let Some(addr) = address.advertised().first().and_then(|ip| ip.to_socket_addr()) else {
                continue;
            };
            let cluster = self.clone();
            tokio::spawn(async move {
                if let Err(e) = cluster.connect(addr).await {
                    debug!("gossip-driven connect to {peer_id} at {addr} failed: {e}");
                }
            });
        }
    }

    /// Registers a successfully-handshaken connection, resolving duplicate connections to
    /// the same peer per the lexicographic tie-break in `routing::should_keep_connection`.
    fn finalize_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        peer_addr: SocketAddr,
        peer_id: PeerId,
        advertised: PeerAddress,
        i_initiated: bool,
    ) {
        let keep = match self.connections.get(&peer_id) {
            Some(existing) => {
                let keep = should_keep_connection(self.my_id, peer_id, i_initiated);
                if keep {
                    existing.close();
                }
                keep
            }
            None => true,
        };
        if !keep {
            debug!("dropping duplicate connection to {peer_id}, an existing one wins the tie-break");
            return;
        }

        let cluster = self.clone();
        let conn = connection::spawn(
            stream,
            peer_id,
            peer_addr,
            advertised.clone(),
            wire::frame_codec(),
            self.dispatch.clone(),
            self.shutdown_tx.subscribe(),
            move |closed_peer_id| {
                cluster.routing.remove(&closed_peer_id);
                cluster.connections.remove(&closed_peer_id);
                let _ = cluster
                    .peer_events_tx
                    .send(PeerListEvent::Disconnected(closed_peer_id));
                info!("peer {closed_peer_id} disconnected");
            },
        );
        self.connections.insert(peer_id, conn);
        self.routing.insert(peer_id, advertised);
        let _ = self.peer_events_tx.send(PeerListEvent::Connected(peer_id));
        info!("peer {peer_id} connected ({peer_addr})");
    }

    fn my_handshake(&self) -> Handshake {
        let listening_addr = self
            .advertised
            .advertised()
            .first()
            .cloned()
            .unwrap_or_else(|| IpAndPort::from_socket_addr(self.my_listening_addr));
        // Include ourselves so a peer two hops away, who only ever sees this snapshot
        // relayed third-hand, still learns we exist and can connect back to us directly.
        let mut routing_snapshot = self.routing.snapshot();
        routing_snapshot.push((self.my_id, self.advertised.clone()));
        Handshake {
            peer_id: self.my_id,
            cluster_version: self.identity.cluster_version.clone(),
            cluster_arch_bitsize: self.identity.cluster_arch_bitsize.clone(),
            cluster_build_mode: self.identity.cluster_build_mode.clone(),
            listening_addr,
            routing_snapshot,
        }
    }

    /// Signals every connection's tasks to stop and the accept loop to exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Parses one configured canonical address string, `"host"` or `"host:port"`. `port == 0`
/// (or an omitted port) resolves to the actually-bound listener port.
fn parse_canonical(raw: &str, bound_port: u16) -> Option<IpAndPort> {
    let (ip, port) = match raw.rsplit_once(':') {
        Some((ip, port_str)) => (ip.to_string(), port_str.parse::<u16>().ok()?),
        None => (raw.to_string(), 0),
    };
    let port = if port == 0 { bound_port } else { port };
    Some(IpAndPort::new(ip, port))
}
