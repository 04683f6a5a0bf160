// src/core/cluster/multiplexer.rs

//! Demultiplexes the single byte-stream connection to each peer into N logical
//! sub-channels, identified by a single tag byte prefixed to every frame.

use super::connection::SubChannelDispatch;
use super::message::{Message, SubChannelTag};
use super::peer_id::PeerId;
use crate::core::errors::LatticeError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A client's registered slot on the multiplexer: an inbound queue of `(sender, message)`
/// pairs and the tag used to address outbound sends back through the owning cluster.
pub struct SubChannel {
    tag: SubChannelTag,
    inbox: mpsc::UnboundedReceiver<(PeerId, Message)>,
    send_fn: Arc<dyn Fn(PeerId, SubChannelTag, Message) -> Result<(), LatticeError> + Send + Sync>,
}

impl SubChannel {
    pub fn tag(&self) -> SubChannelTag {
        self.tag
    }

    /// Awaits the next message delivered to this sub-channel from any peer.
    pub async fn recv(&mut self) -> Option<(PeerId, Message)> {
        self.inbox.recv().await
    }

    /// Sends a message to a specific peer on this sub-channel's tag.
    pub fn send(&self, peer: PeerId, message: Message) -> Result<(), LatticeError> {
        (self.send_fn)(peer, self.tag, message)
    }
}

/// Owns the tag -> inbox registry shared by every connection on this node, and hands out
/// `SubChannel` handles to clients that want to send/receive on a given tag.
#[derive(Clone)]
pub struct MessageMultiplexer {
    dispatch: SubChannelDispatch,
    send_fn: Arc<dyn Fn(PeerId, SubChannelTag, Message) -> Result<(), LatticeError> + Send + Sync>,
}

impl MessageMultiplexer {
    pub(super) fn new(
        dispatch: SubChannelDispatch,
        send_fn: impl Fn(PeerId, SubChannelTag, Message) -> Result<(), LatticeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dispatch,
            send_fn: Arc::new(send_fn),
        }
    }

    /// Claims a sub-channel tag for this client. Panics-free: registering a tag twice
    /// replaces the previous registration's inbox (the old handle simply stops receiving).
    pub fn register(&self, tag: SubChannelTag) -> SubChannel {
        let (tx, rx) = mpsc::unbounded_channel();
        self.dispatch.insert(tag, tx);
        SubChannel {
            tag,
            inbox: rx,
            send_fn: self.send_fn.clone(),
        }
    }

    pub fn unregister(&self, tag: SubChannelTag) {
        self.dispatch.remove(&tag);
    }
}
