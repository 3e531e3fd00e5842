//! The seam to the external reliable-UDP transport.
//!
//! Connection establishment, fragmentation, and retransmission all live in
//! the transport library outside this workspace. Sessions drive it through
//! the [`Host`] trait: a non-blocking event poll plus per-channel sends with
//! explicit delivery flags. [`crate::loopback`] provides an in-process
//! implementation for tests and listen-server play.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum number of concurrent players. Shared by the wire layout (a slot
/// index fits in one byte) and the server's slot arena.
pub const MAX_PLAYERS: usize = 32;

/// Default port a dedicated server binds.
pub const DEFAULT_PORT: u16 = 3011;

/// Channel for join/leave control traffic (sent reliable + ordered).
pub const CHANNEL_CONTROL: u8 = 0;
/// Channel for per-tick player input and position snapshots (unreliable).
pub const CHANNEL_PLAYER: u8 = 1;
/// Channel for world rigid-body sync (unreliable).
pub const CHANNEL_WORLD: u8 = 2;
/// Number of channels every host is created with.
pub const CHANNEL_COUNT: u8 = 3;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Numeric identity the transport assigns to a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u64);

/// Delivery guarantees requested for an outgoing packet. Reliability and
/// ordering are entirely the transport's job; the protocol layer only picks
/// the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered exactly once, in order, within its channel.
    ReliableOrdered,
    /// Best-effort; may be dropped or reordered. Used for per-tick state
    /// that the next tick supersedes anyway.
    Unreliable,
}

/// A discrete transport message: payload bytes plus requested delivery.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Raw message bytes.
    pub payload: Vec<u8>,
    /// Requested delivery guarantees.
    pub delivery: Delivery,
}

/// Reason code carried in a disconnect event. The numeric value travels in
/// the transport's disconnect payload, so the discriminants are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DisconnectReason {
    /// No reason supplied (or an unrecognized code).
    Unknown = 0,
    /// The server had no free player slot.
    ServerFull = 1,
    /// The server removed the player.
    Kicked = 2,
    /// The server hit an internal error.
    ServerError = 3,
    /// The client misbehaved (e.g. mismatched build version).
    ClientError = 4,
    /// The server is shutting down.
    ServerShutdown = 5,
    /// The player quit voluntarily.
    PlayerLeaving = 6,
}

impl DisconnectReason {
    /// Decodes a wire reason code, falling back to [`Unknown`].
    ///
    /// [`Unknown`]: DisconnectReason::Unknown
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::ServerFull,
            2 => Self::Kicked,
            3 => Self::ServerError,
            4 => Self::ClientError,
            5 => Self::ServerShutdown,
            6 => Self::PlayerLeaving,
            _ => Self::Unknown,
        }
    }

    /// The numeric code sent over the wire.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// One event drained from a host.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A connection completed (inbound on a listener, outbound elsewhere).
    Connected {
        /// The new peer.
        peer: PeerId,
    },
    /// A connection ended, carrying the remote side's reason code.
    Disconnected {
        /// The departed peer.
        peer: PeerId,
        /// Raw reason code; decode with [`DisconnectReason::from_code`].
        reason: u32,
    },
    /// A message arrived on a channel.
    Received {
        /// The sending peer.
        peer: PeerId,
        /// Channel the message arrived on.
        channel: u8,
        /// Message bytes, exactly as sent.
        payload: Vec<u8>,
    },
}

/// Parameters for binding a listening host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Port to bind.
    pub port: u16,
    /// Peer capacity to reserve.
    pub max_peers: usize,
    /// Number of channels; must be at least [`CHANNEL_COUNT`].
    pub channel_count: u8,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The requested listen port is already bound.
    #[error("port {0} is already bound")]
    PortInUse(u16),

    /// No listener exists at the target address.
    #[error("no listener on port {0}")]
    NoRoute(u16),

    /// The peer is not (or no longer) connected on this host.
    #[error("unknown peer {0:?}")]
    UnknownPeer(PeerId),

    /// The channel index exceeds the host's channel count.
    #[error("channel {channel} out of range (host has {count})")]
    BadChannel {
        /// Requested channel.
        channel: u8,
        /// Channels the host was created with.
        count: u8,
    },
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// One transport endpoint: a bound listener on the server, an outbound
/// endpoint on the client.
///
/// All methods are non-blocking. [`service`](Host::service) must be drained
/// to completion once per simulation tick from the thread that owns the
/// session, or the transport's queues grow without bound.
pub trait Host {
    /// Address type used to reach a remote listener.
    type Addr;

    /// Polls the next pending event, if any. Never blocks.
    fn service(&mut self) -> Option<TransportEvent>;

    /// Starts an outbound connection. Completion is signalled later by a
    /// [`TransportEvent::Connected`] for the returned peer.
    fn connect(&mut self, addr: Self::Addr) -> Result<PeerId, TransportError>;

    /// Queues a packet to one peer on one channel.
    fn send(&mut self, peer: PeerId, channel: u8, packet: Packet) -> Result<(), TransportError>;

    /// Starts a graceful disconnect, delivering `reason` to the remote side.
    /// Disconnecting an unknown peer is a no-op.
    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_reason_codes_roundtrip() {
        for reason in [
            DisconnectReason::Unknown,
            DisconnectReason::ServerFull,
            DisconnectReason::Kicked,
            DisconnectReason::ServerError,
            DisconnectReason::ClientError,
            DisconnectReason::ServerShutdown,
            DisconnectReason::PlayerLeaving,
        ] {
            assert_eq!(DisconnectReason::from_code(reason.code()), reason);
        }
    }

    #[test]
    fn test_unrecognized_reason_code_is_unknown() {
        assert_eq!(DisconnectReason::from_code(999), DisconnectReason::Unknown);
    }

    #[test]
    fn test_slot_index_fits_in_one_byte() {
        assert!(MAX_PLAYERS <= u8::MAX as usize + 1);
    }
}
