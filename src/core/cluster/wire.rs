// src/core/cluster/wire.rs

//! Wire-level framing for peer connections: the fixed header every connection starts
//! with, the handshake payload exchanged immediately after it, and the length-delimited
//! codec used for every frame (handshake and application alike) that follows the header.

use super::address::{IpAndPort, PeerAddress};
use super::peer_id::PeerId;
use crate::core::errors::LatticeError;
use bincode::config::standard;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Sent as the very first bytes of every connection, before any length-delimited framing
/// begins. A peer that doesn't see this exact sequence closes the connection immediately,
/// which is what lets an unrelated TCP client be rejected cheaply.
pub const CLUSTER_PROTO_HEADER: &[u8; 8] = b"LTCLUS01";

/// Maximum size of a single length-delimited frame payload.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// The handshake payload exchanged by both sides immediately after the fixed header.
/// Both peers send this before either one reads the other's, so neither side blocks
/// waiting for a turn.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Handshake {
    pub peer_id: PeerId,
    pub cluster_version: String,
    pub cluster_arch_bitsize: String,
    pub cluster_build_mode: String,
    /// The address this node listens on, used by the peer to learn our canonical address
    /// when we were configured with `port = 0` (ephemeral-port binding).
    pub listening_addr: IpAndPort,
    /// A snapshot of the routing table as known at connect time, merged into the peer's
    /// own table as part of gossip bootstrap.
    pub routing_snapshot: Vec<(PeerId, PeerAddress)>,
}

impl Handshake {
    pub fn encode(&self) -> Result<Bytes, LatticeError> {
        Ok(Bytes::from(bincode::encode_to_vec(self, standard())?))
    }

    pub fn decode(buf: &[u8]) -> Result<Self, LatticeError> {
        let (value, _) = bincode::decode_from_slice(buf, standard())?;
        Ok(value)
    }
}

/// The three compatibility fields a handshake is checked against. A mismatch on any one
/// of them is fatal to the connection attempt.
#[derive(Debug, Clone)]
pub struct HandshakeIdentity {
    pub cluster_version: String,
    pub cluster_arch_bitsize: String,
    pub cluster_build_mode: String,
}

impl HandshakeIdentity {
    /// Verifies a peer's reported identity against ours, returning the first mismatch found.
    pub fn check(&self, theirs: &Handshake) -> Result<(), LatticeError> {
        if theirs.cluster_version != self.cluster_version {
            return Err(LatticeError::VersionMismatch {
                ours: self.cluster_version.clone(),
                theirs: theirs.cluster_version.clone(),
            });
        }
        if theirs.cluster_arch_bitsize != self.cluster_arch_bitsize {
            return Err(LatticeError::ArchMismatch {
                ours: self.cluster_arch_bitsize.clone(),
                theirs: theirs.cluster_arch_bitsize.clone(),
            });
        }
        if theirs.cluster_build_mode != self.cluster_build_mode {
            return Err(LatticeError::BuildModeMismatch {
                ours: self.cluster_build_mode.clone(),
                theirs: theirs.cluster_build_mode.clone(),
            });
        }
        Ok(())
    }
}

/// Builds the length-delimited codec used for every frame after the fixed header: the
/// handshake payload first, then every application-level multiplexed message.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .length_field_length(4)
        .new_codec()
}

/// Writes the fixed header and returns a `Framed` stream ready to send/receive
/// length-delimited frames.
pub async fn write_header(stream: &mut TcpStream) -> Result<(), LatticeError> {
    stream.write_all(CLUSTER_PROTO_HEADER).await?;
    Ok(())
}

/// Reads and validates the fixed header from the peer. An error here (including a short
/// read caused by the peer closing early) means the caller must close the connection
/// without proceeding to the handshake payload.
pub async fn read_header(stream: &mut TcpStream) -> Result<(), LatticeError> {
    let mut buf = [0u8; 8];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(|e| LatticeError::HandshakeFailed(format!("failed to read protocol header: {e}")))?;
    if &buf != CLUSTER_PROTO_HEADER {
        return Err(LatticeError::HandshakeFailed(
            "protocol header mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Wraps a stream (after the fixed header has been written and read) in the shared
/// length-delimited frame codec.
pub fn framed(stream: TcpStream) -> Framed<TcpStream, LengthDelimitedCodec> {
    Framed::new(stream, frame_codec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cluster::address::PeerAddress;

    #[test]
    fn handshake_round_trips_through_bincode() {
        let hs = Handshake {
            peer_id: PeerId::generate(),
            cluster_version: "1.0".into(),
            cluster_arch_bitsize: "64bit".into(),
            cluster_build_mode: "release".into(),
            listening_addr: IpAndPort::new("127.0.0.1", 7000),
            routing_snapshot: vec![(PeerId::generate(), PeerAddress::default())],
        };
        let encoded = hs.encode().unwrap();
        let decoded = Handshake::decode(&encoded).unwrap();
        assert_eq!(hs.peer_id, decoded.peer_id);
        assert_eq!(hs.cluster_version, decoded.cluster_version);
        assert_eq!(hs.routing_snapshot.len(), decoded.routing_snapshot.len());
    }

    #[test]
    fn identity_check_flags_the_first_mismatching_field() {
        let ours = HandshakeIdentity {
            cluster_version: "1.0".into(),
            cluster_arch_bitsize: "64bit".into(),
            cluster_build_mode: "release".into(),
        };
        let mut theirs = Handshake {
            peer_id: PeerId::generate(),
            cluster_version: "2.0".into(),
            cluster_arch_bitsize: "64bit".into(),
            cluster_build_mode: "release".into(),
            listening_addr: IpAndPort::new("127.0.0.1", 7000),
            routing_snapshot: vec![],
        };
        assert!(matches!(
            ours.check(&theirs),
            Err(LatticeError::VersionMismatch { .. })
        ));
        theirs.cluster_version = "1.0".into();
        theirs.cluster_arch_bitsize = "32bit".into();
        assert!(matches!(
            ours.check(&theirs),
            Err(LatticeError::ArchMismatch { .. })
        ));
    }
}
