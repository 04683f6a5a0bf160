// src/core/cluster/connection.rs

//! One live TCP connection to a peer: a FIFO write lane feeding a dedicated writer task,
//! a reader task demultiplexing inbound frames by their leading tag byte, and the
//! disconnect-waiter bookkeeping `DisconnectWatcher` relies on.

use super::address::PeerAddress;
use super::message::{Message, SubChannelTag};
use super::peer_id::PeerId;
use crate::core::errors::LatticeError;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::warn;

/// Registry of subscribers to inbound sub-channel traffic, shared by every connection on
/// this node. `MessageMultiplexer::register` inserts into it; the reader task looks up the
/// tag byte of every inbound frame here.
pub type SubChannelDispatch = Arc<DashMap<SubChannelTag, mpsc::UnboundedSender<(PeerId, Message)>>>;

/// A live connection to one peer. Cheap to clone (it's always handed around as an `Arc`);
/// sending never blocks the caller beyond an unbounded channel push, so a slow peer cannot
/// stall whichever task is producing outbound traffic.
pub struct Connection {
    pub peer_id: PeerId,
    pub peer_addr: SocketAddr,
    pub advertised: PeerAddress,
    write_tx: mpsc::UnboundedSender<Bytes>,
    local_shutdown: broadcast::Sender<()>,
    disconnect_waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl Connection {
    /// Enqueues a tagged message on this connection's FIFO write lane. Messages sent from
    /// the same task are delivered to the peer in the order `send` was called, since a
    /// single writer task drains this channel strictly in order.
    pub fn send(&self, tag: SubChannelTag, message: Message) -> Result<(), LatticeError> {
        let mut frame = BytesMut::with_capacity(1 + message.len());
        frame.extend_from_slice(&[tag]);
        frame.extend_from_slice(&message);
        self.write_tx
            .send(frame.freeze())
            .map_err(|_| LatticeError::Internal("connection write lane is closed".to_string()))
    }

    /// Registers interest in this connection's teardown. Returns a receiver that resolves
    /// (by the sender being dropped, or fired explicitly) exactly once, when the connection
    /// closes.
    pub fn add_disconnect_waiter(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.disconnect_waiters.lock().push(tx);
        rx
    }

    /// Asks this connection's tasks to stop. Idempotent: a second call is a no-op.
    pub fn close(&self) {
        let _ = self.local_shutdown.send(());
    }

    fn fire_disconnect_waiters(&self) {
        for tx in self.disconnect_waiters.lock().drain(..) {
            let _ = tx.send(());
        }
    }
}

/// Spawns the reader and writer tasks for a freshly handshaken connection and returns the
/// shared handle. `on_close` runs exactly once, from whichever task notices the connection
/// has ended, and is the cluster's hook for routing-table removal and peer-list events.
pub fn spawn(
    stream: TcpStream,
    peer_id: PeerId,
    peer_addr: SocketAddr,
    advertised: PeerAddress,
    codec: LengthDelimitedCodec,
    dispatch: SubChannelDispatch,
    mut global_shutdown: broadcast::Receiver<()>,
    on_close: impl FnOnce(PeerId) + Send + 'static,
) -> Arc<Connection> {
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Bytes>();
    let (local_shutdown, _) = broadcast::channel(1);

    let conn = Arc::new(Connection {
        peer_id,
        peer_addr,
        advertised,
        write_tx,
        local_shutdown: local_shutdown.clone(),
        disconnect_waiters: Mutex::new(Vec::new()),
    });

    let (mut sink, mut stream) = Framed::new(stream, codec).split();

    let mut writer_shutdown = local_shutdown.subscribe();
    let mut writer_global_shutdown = global_shutdown.resubscribe();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = writer_global_shutdown.recv() => break,
                _ = writer_shutdown.recv() => break,
                maybe_frame = write_rx.recv() => {
                    match maybe_frame {
                        Some(frame) => {
                            if sink.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let mut reader_shutdown = local_shutdown.subscribe();
    let reader_local_shutdown = local_shutdown.clone();
    let reader_peer_id = peer_id;
    let reader = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = global_shutdown.recv() => break,
                _ = reader_shutdown.recv() => break,
                frame = stream.next() => {
                    match frame {
                        Some(Ok(bytes)) => {
                            if bytes.is_empty() {
                                warn!("peer {} sent an empty frame, dropping it", reader_peer_id);
                                continue;
                            }
                            let tag = bytes[0];
                            let body = Message::copy_from_slice(&bytes[1..]);
                            match dispatch.get(&tag) {
                                Some(sender) => {
                                    let _ = sender.send((reader_peer_id, body));
                                }
                                None => {
                                    warn!(
                                        "peer {reader_peer_id} sent frame for unregistered sub-channel {tag}, closing connection (framing violation)"
                                    );
                                    let _ = reader_local_shutdown.send(());
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            let err: crate::core::errors::LatticeError = e.into();
                            if !crate::core::errors::is_normal_disconnect(&err) {
                                warn!("connection error from peer {}: read failure", reader_peer_id);
                            }
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    });

    let teardown_conn = conn.clone();
    tokio::spawn(async move {
        let _ = tokio::join!(writer, reader);
        teardown_conn.fire_disconnect_waiters();
        on_close(peer_id);
    });

    conn
}
