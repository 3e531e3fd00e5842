//! Networking for Trundle: the wire protocol, the seam to the channelled
//! reliable-UDP transport, and the server/client session state machines.

pub mod client;
pub mod loopback;
pub mod messages;
pub mod sequence;
pub mod server;
pub mod transport;

pub use client::{ClientEvent, ClientSession};
pub use loopback::{LoopbackHost, LoopbackNetwork};
pub use messages::{
    DecodeError, GAME_VERSION, Message, MessageTag, OtherPlayerJoin, OtherPlayerLeave,
    PlayerInput, PlayerJoinAccept, PlayerJoinRequest, PlayerPosition, RigidbodySync, WireMessage,
};
pub use sequence::{sequence_greater_than, sequence_less_than, wrapping_diff};
pub use server::{NetPlayer, ServerEvent, ServerSession};
pub use transport::{
    CHANNEL_CONTROL, CHANNEL_COUNT, CHANNEL_PLAYER, CHANNEL_WORLD, DEFAULT_PORT, Delivery,
    DisconnectReason, Host, HostConfig, MAX_PLAYERS, Packet, PeerId, TransportError,
    TransportEvent,
};
