//! Wire protocol: tag-first, fixed-layout binary messages.
//!
//! Every message is one tag byte followed by a fixed-size little-endian
//! body; there is no length prefix, so the decoder validates the payload
//! against the per-type wire size before touching any field. Encode and
//! decode are exact inverses. Build compatibility is enforced at the join
//! handshake (the request carries [`GAME_VERSION`]), not per message.

use glam::{Quat, Vec2, Vec3};
use thiserror::Error;

use crate::transport::{Delivery, Packet};

/// Build version exchanged in the join handshake. Bump on any wire-layout
/// or simulation-affecting change; the server rejects mismatched clients at
/// admission.
pub const GAME_VERSION: u64 = 1;

// ---------------------------------------------------------------------------
// MessageTag
// ---------------------------------------------------------------------------

/// The first byte of every payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageTag {
    /// Client asks to join after connecting.
    JoinRequest = 0,
    /// Server confirms a join with the assigned slot.
    JoinAccept = 1,
    /// Per-tick movement intent from a client.
    PlayerInput = 2,
    /// Authoritative player pose snapshot from the server.
    PlayerPosition = 3,
    /// Another player entered the session.
    OtherPlayerJoin = 4,
    /// Another player left the session.
    OtherPlayerLeave = 5,
    /// Authoritative pose of a synced non-player body.
    RigidbodySync = 6,
}

impl MessageTag {
    /// Decodes a tag byte; `None` for unrecognized values.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::JoinRequest),
            1 => Some(Self::JoinAccept),
            2 => Some(Self::PlayerInput),
            3 => Some(Self::PlayerPosition),
            4 => Some(Self::OtherPlayerJoin),
            5 => Some(Self::OtherPlayerLeave),
            6 => Some(Self::RigidbodySync),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while decoding a payload. Callers drop the packet and
/// mutate nothing else.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload had no tag byte.
    #[error("empty payload")]
    Empty,

    /// The tag byte is not a known message type.
    #[error("unknown message tag {0}")]
    UnknownTag(u8),

    /// The payload length does not match the type's fixed wire size.
    #[error("{tag:?}: expected {expected} bytes, got {actual}")]
    Length {
        /// The decoded tag.
        tag: MessageTag,
        /// The type's fixed wire size.
        expected: usize,
        /// The actual payload length.
        actual: usize,
    },

    /// The payload carries a different type than the caller asked for.
    #[error("expected {expected:?}, found {found:?}")]
    WrongTag {
        /// The requested type's tag.
        expected: MessageTag,
        /// The tag actually present.
        found: MessageTag,
    },
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// Sequential little-endian reader over a size-validated body.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        bytes
    }

    fn u8(&mut self) -> u8 {
        let byte = self.buf[self.pos];
        self.pos += 1;
        byte
    }

    fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }

    fn vec2(&mut self) -> Vec2 {
        Vec2::new(self.f32(), self.f32())
    }

    fn vec3(&mut self) -> Vec3 {
        Vec3::new(self.f32(), self.f32(), self.f32())
    }

    fn quat(&mut self) -> Quat {
        Quat::from_xyzw(self.f32(), self.f32(), self.f32(), self.f32())
    }
}

fn put_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_f32(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_vec2(out: &mut Vec<u8>, value: Vec2) {
    put_f32(out, value.x);
    put_f32(out, value.y);
}

fn put_vec3(out: &mut Vec<u8>, value: Vec3) {
    put_f32(out, value.x);
    put_f32(out, value.y);
    put_f32(out, value.z);
}

fn put_quat(out: &mut Vec<u8>, value: Quat) {
    put_f32(out, value.x);
    put_f32(out, value.y);
    put_f32(out, value.z);
    put_f32(out, value.w);
}

// ---------------------------------------------------------------------------
// WireMessage
// ---------------------------------------------------------------------------

/// A fixed-layout wire message: one tag byte plus `WIRE_SIZE - 1` body
/// bytes.
pub trait WireMessage: Sized {
    /// Tag identifying this type on the wire.
    const TAG: MessageTag;
    /// Exact encoded size, including the tag byte.
    const WIRE_SIZE: usize;

    /// Appends the little-endian body (everything after the tag).
    fn encode_body(&self, out: &mut Vec<u8>);

    /// Reads the body back. Only called on a size-validated payload.
    fn decode_body(cur: &mut Cursor<'_>) -> Self;

    /// Encodes into a transport packet with the requested delivery.
    fn to_packet(&self, delivery: Delivery) -> Packet {
        let mut payload = Vec::with_capacity(Self::WIRE_SIZE);
        payload.push(Self::TAG as u8);
        self.encode_body(&mut payload);
        debug_assert_eq!(payload.len(), Self::WIRE_SIZE);
        Packet { payload, delivery }
    }

    /// Validates length and tag, then reconstructs the struct.
    fn from_packet(payload: &[u8]) -> Result<Self, DecodeError> {
        let first = *payload.first().ok_or(DecodeError::Empty)?;
        let found = MessageTag::from_byte(first).ok_or(DecodeError::UnknownTag(first))?;
        if found != Self::TAG {
            return Err(DecodeError::WrongTag {
                expected: Self::TAG,
                found,
            });
        }
        if payload.len() != Self::WIRE_SIZE {
            return Err(DecodeError::Length {
                tag: found,
                expected: Self::WIRE_SIZE,
                actual: payload.len(),
            });
        }
        Ok(Self::decode_body(&mut Cursor::new(&payload[1..])))
    }
}

// ---------------------------------------------------------------------------
// Message structs
// ---------------------------------------------------------------------------

/// Sent by the client right after its connection goes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerJoinRequest {
    /// The sender's build version; must match the server's.
    pub game_version: u64,
    /// Opaque account identifier.
    pub auth_id: u64,
    /// Which auth backend issued `auth_id` (0 = first-party).
    pub auth_universe: u16,
}

impl WireMessage for PlayerJoinRequest {
    const TAG: MessageTag = MessageTag::JoinRequest;
    const WIRE_SIZE: usize = 19;

    fn encode_body(&self, out: &mut Vec<u8>) {
        put_u64(out, self.game_version);
        put_u64(out, self.auth_id);
        put_u16(out, self.auth_universe);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            game_version: cur.u64(),
            auth_id: cur.u64(),
            auth_universe: cur.u16(),
        }
    }
}

/// Server reply to a valid join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerJoinAccept {
    /// The slot assigned to the joining player.
    pub slot_index: u8,
}

impl WireMessage for PlayerJoinAccept {
    const TAG: MessageTag = MessageTag::JoinAccept;
    const WIRE_SIZE: usize = 2;

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.push(self.slot_index);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            slot_index: cur.u8(),
        }
    }
}

/// One tick of movement intent, sent unreliably every client tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerInput {
    /// Horizontal movement on the XZ plane, each axis in [-1, 1].
    pub xz_move_input: Vec2,
    /// Sprint modifier held.
    pub sprint: bool,
    /// Jump pressed this tick.
    pub jump: bool,
    /// Monotonically increasing sequence number, wrapping at 2^16.
    pub input_sequence: u16,
}

impl WireMessage for PlayerInput {
    const TAG: MessageTag = MessageTag::PlayerInput;
    const WIRE_SIZE: usize = 13;

    fn encode_body(&self, out: &mut Vec<u8>) {
        put_vec2(out, self.xz_move_input);
        put_bool(out, self.sprint);
        put_bool(out, self.jump);
        put_u16(out, self.input_sequence);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            xz_move_input: cur.vec2(),
            sprint: cur.bool(),
            jump: cur.bool(),
            input_sequence: cur.u16(),
        }
    }
}

/// Authoritative locosphere state for one player, broadcast at the send
/// rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    /// Which player this snapshot describes.
    pub slot_index: u8,
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
    /// Linear velocity.
    pub linear_velocity: Vec3,
    /// Angular velocity.
    pub angular_velocity: Vec3,
    /// Newest input sequence the server has received from this player;
    /// predictions up to and including it are confirmed.
    pub acknowledged_input_sequence: u16,
}

impl WireMessage for PlayerPosition {
    const TAG: MessageTag = MessageTag::PlayerPosition;
    const WIRE_SIZE: usize = 56;

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.push(self.slot_index);
        put_vec3(out, self.position);
        put_quat(out, self.rotation);
        put_vec3(out, self.linear_velocity);
        put_vec3(out, self.angular_velocity);
        put_u16(out, self.acknowledged_input_sequence);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            slot_index: cur.u8(),
            position: cur.vec3(),
            rotation: cur.quat(),
            linear_velocity: cur.vec3(),
            angular_velocity: cur.vec3(),
            acknowledged_input_sequence: cur.u16(),
        }
    }
}

/// Reliable notice that a player entered the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherPlayerJoin {
    /// The newcomer's slot.
    pub slot_index: u8,
}

impl WireMessage for OtherPlayerJoin {
    const TAG: MessageTag = MessageTag::OtherPlayerJoin;
    const WIRE_SIZE: usize = 2;

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.push(self.slot_index);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            slot_index: cur.u8(),
        }
    }
}

/// Reliable notice that a player left the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtherPlayerLeave {
    /// The departed player's slot.
    pub slot_index: u8,
}

impl WireMessage for OtherPlayerLeave {
    const TAG: MessageTag = MessageTag::OtherPlayerLeave;
    const WIRE_SIZE: usize = 2;

    fn encode_body(&self, out: &mut Vec<u8>) {
        out.push(self.slot_index);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            slot_index: cur.u8(),
        }
    }
}

/// Authoritative pose of a synced non-player dynamic body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RigidbodySync {
    /// Stable network id of the body (assigned at scene load, shared by
    /// server and clients).
    pub network_id: u32,
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
    /// Linear velocity.
    pub linear_velocity: Vec3,
    /// Angular velocity.
    pub angular_velocity: Vec3,
}

impl WireMessage for RigidbodySync {
    const TAG: MessageTag = MessageTag::RigidbodySync;
    const WIRE_SIZE: usize = 57;

    fn encode_body(&self, out: &mut Vec<u8>) {
        put_u32(out, self.network_id);
        put_vec3(out, self.position);
        put_quat(out, self.rotation);
        put_vec3(out, self.linear_velocity);
        put_vec3(out, self.angular_velocity);
    }

    fn decode_body(cur: &mut Cursor<'_>) -> Self {
        Self {
            network_id: cur.u32(),
            position: cur.vec3(),
            rotation: cur.quat(),
            linear_velocity: cur.vec3(),
            angular_velocity: cur.vec3(),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Any decoded wire message, for generic dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    /// See [`PlayerJoinRequest`].
    JoinRequest(PlayerJoinRequest),
    /// See [`PlayerJoinAccept`].
    JoinAccept(PlayerJoinAccept),
    /// See [`PlayerInput`].
    PlayerInput(PlayerInput),
    /// See [`PlayerPosition`].
    PlayerPosition(PlayerPosition),
    /// See [`OtherPlayerJoin`].
    OtherPlayerJoin(OtherPlayerJoin),
    /// See [`OtherPlayerLeave`].
    OtherPlayerLeave(OtherPlayerLeave),
    /// See [`RigidbodySync`].
    RigidbodySync(RigidbodySync),
}

impl Message {
    /// Decodes any known message, validating tag and exact size.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let first = *payload.first().ok_or(DecodeError::Empty)?;
        let tag = MessageTag::from_byte(first).ok_or(DecodeError::UnknownTag(first))?;
        match tag {
            MessageTag::JoinRequest => {
                PlayerJoinRequest::from_packet(payload).map(Self::JoinRequest)
            }
            MessageTag::JoinAccept => PlayerJoinAccept::from_packet(payload).map(Self::JoinAccept),
            MessageTag::PlayerInput => PlayerInput::from_packet(payload).map(Self::PlayerInput),
            MessageTag::PlayerPosition => {
                PlayerPosition::from_packet(payload).map(Self::PlayerPosition)
            }
            MessageTag::OtherPlayerJoin => {
                OtherPlayerJoin::from_packet(payload).map(Self::OtherPlayerJoin)
            }
            MessageTag::OtherPlayerLeave => {
                OtherPlayerLeave::from_packet(payload).map(Self::OtherPlayerLeave)
            }
            MessageTag::RigidbodySync => {
                RigidbodySync::from_packet(payload).map(Self::RigidbodySync)
            }
        }
    }

    /// The tag of the contained message.
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::JoinRequest(_) => MessageTag::JoinRequest,
            Self::JoinAccept(_) => MessageTag::JoinAccept,
            Self::PlayerInput(_) => MessageTag::PlayerInput,
            Self::PlayerPosition(_) => MessageTag::PlayerPosition,
            Self::OtherPlayerJoin(_) => MessageTag::OtherPlayerJoin,
            Self::OtherPlayerLeave(_) => MessageTag::OtherPlayerLeave,
            Self::RigidbodySync(_) => MessageTag::RigidbodySync,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<M: WireMessage + PartialEq + std::fmt::Debug + Copy>(msg: M) {
        let packet = msg.to_packet(Delivery::Unreliable);
        assert_eq!(packet.payload.len(), M::WIRE_SIZE);
        assert_eq!(packet.payload[0], M::TAG as u8);
        let decoded = M::from_packet(&packet.payload).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_join_request_roundtrip() {
        roundtrip(PlayerJoinRequest {
            game_version: GAME_VERSION,
            auth_id: u64::MAX,
            auth_universe: 1,
        });
    }

    #[test]
    fn test_join_accept_roundtrip_boundary_slots() {
        roundtrip(PlayerJoinAccept { slot_index: 0 });
        roundtrip(PlayerJoinAccept {
            slot_index: crate::transport::MAX_PLAYERS as u8 - 1,
        });
    }

    #[test]
    fn test_player_input_roundtrip_boundary_sequences() {
        for sequence in [0u16, 1, 65535] {
            roundtrip(PlayerInput {
                xz_move_input: Vec2::new(-1.0, 0.5),
                sprint: true,
                jump: false,
                input_sequence: sequence,
            });
        }
    }

    #[test]
    fn test_player_position_roundtrip() {
        roundtrip(PlayerPosition {
            slot_index: 31,
            position: Vec3::new(1.5, -2.25, 300.0),
            rotation: Quat::from_xyzw(0.0, 0.707, 0.0, 0.707),
            linear_velocity: Vec3::new(0.1, 0.0, -9.8),
            angular_velocity: Vec3::new(6.2, 0.0, 0.0),
            acknowledged_input_sequence: 65535,
        });
    }

    #[test]
    fn test_join_leave_notices_roundtrip() {
        roundtrip(OtherPlayerJoin { slot_index: 0 });
        roundtrip(OtherPlayerLeave { slot_index: 31 });
    }

    #[test]
    fn test_rigidbody_sync_roundtrip() {
        roundtrip(RigidbodySync {
            network_id: u32::MAX,
            position: Vec3::splat(-4.0),
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::new(0.0, 3.0, 0.0),
        });
    }

    #[test]
    fn test_empty_payload_rejected() {
        assert_eq!(Message::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(Message::decode(&[200, 0]), Err(DecodeError::UnknownTag(200)));
    }

    #[test]
    fn test_undersized_payload_rejected() {
        let packet = PlayerPosition {
            slot_index: 0,
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acknowledged_input_sequence: 0,
        }
        .to_packet(Delivery::Unreliable);

        let truncated = &packet.payload[..packet.payload.len() - 1];
        assert!(matches!(
            Message::decode(truncated),
            Err(DecodeError::Length {
                tag: MessageTag::PlayerPosition,
                expected: 56,
                actual: 55,
            })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut payload = OtherPlayerJoin { slot_index: 3 }
            .to_packet(Delivery::ReliableOrdered)
            .payload;
        payload.push(0xFF);
        assert!(matches!(
            Message::decode(&payload),
            Err(DecodeError::Length { .. })
        ));
    }

    #[test]
    fn test_typed_decode_rejects_wrong_tag() {
        let packet = OtherPlayerJoin { slot_index: 1 }.to_packet(Delivery::ReliableOrdered);
        assert_eq!(
            OtherPlayerLeave::from_packet(&packet.payload),
            Err(DecodeError::WrongTag {
                expected: MessageTag::OtherPlayerLeave,
                found: MessageTag::OtherPlayerJoin,
            })
        );
    }

    #[test]
    fn test_generic_decode_matches_tag() {
        let input = PlayerInput {
            xz_move_input: Vec2::new(1.0, 0.0),
            sprint: false,
            jump: true,
            input_sequence: 42,
        };
        let packet = input.to_packet(Delivery::Unreliable);
        match Message::decode(&packet.payload).unwrap() {
            Message::PlayerInput(decoded) => assert_eq!(decoded, input),
            other => panic!("expected PlayerInput, got {:?}", other.tag()),
        }
    }

    #[test]
    fn test_body_layout_is_little_endian() {
        let packet = PlayerJoinAccept { slot_index: 7 }.to_packet(Delivery::ReliableOrdered);
        assert_eq!(packet.payload, vec![MessageTag::JoinAccept as u8, 7]);

        let input = PlayerInput {
            xz_move_input: Vec2::ZERO,
            sprint: false,
            jump: false,
            input_sequence: 0x0201,
        };
        let payload = input.to_packet(Delivery::Unreliable).payload;
        // Sequence is the trailing u16, low byte first.
        assert_eq!(&payload[11..13], &[0x01, 0x02]);
    }
}
