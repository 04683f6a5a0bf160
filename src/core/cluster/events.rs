// src/core/cluster/events.rs

//! Observing cluster membership: a freeze-and-subscribe pattern for the live peer list,
//! plus a one-shot watcher that fires when a specific peer disconnects.

use super::peer_id::PeerId;
use tokio::sync::{broadcast, oneshot};

/// A single membership change.
#[derive(Clone, Debug)]
pub enum PeerListEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}

/// A subscription to the stream of connect/disconnect events. Obtained together with a
/// `PeersListFreeze` snapshot so that no event between the snapshot and the subscription
/// call is ever missed or double-counted.
pub struct PeersListSubscription {
    receiver: broadcast::Receiver<PeerListEvent>,
}

impl PeersListSubscription {
    pub(super) fn new(receiver: broadcast::Receiver<PeerListEvent>) -> Self {
        Self { receiver }
    }

    /// Awaits the next membership change. Returns `None` once the cluster itself has shut
    /// down. A lagging subscriber silently skips the events it missed rather than erroring,
    /// since the caller can always re-freeze the list to recover a consistent view.
    pub async fn next(&mut self) -> Option<PeerListEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A consistent snapshot of the peer list, taken at the moment a subscription was opened.
#[derive(Debug, Clone)]
pub struct PeersListFreeze {
    pub connected_peers: Vec<PeerId>,
}

/// Fires exactly once, when the watched peer disconnects. If the peer was already
/// disconnected (or never connected) at the time the watcher was constructed, it is
/// already pulsed and `wait` returns immediately.
pub struct DisconnectWatcher {
    inner: Inner,
}

enum Inner {
    AlreadyFired,
    Pending(oneshot::Receiver<()>),
}

impl DisconnectWatcher {
    pub(super) fn already_fired() -> Self {
        Self {
            inner: Inner::AlreadyFired,
        }
    }

    pub(super) fn pending(rx: oneshot::Receiver<()>) -> Self {
        Self {
            inner: Inner::Pending(rx),
        }
    }

    /// Non-blocking check of whether the disconnect has already happened.
    pub fn is_pulsed(&mut self) -> bool {
        match &mut self.inner {
            Inner::AlreadyFired => true,
            Inner::Pending(rx) => !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)),
        }
    }

    /// Waits until the watched peer disconnects.
    pub async fn wait(self) {
        if let Inner::Pending(rx) = self.inner {
            let _ = rx.await;
        }
    }
}
