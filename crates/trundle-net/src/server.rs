//! Server session: slot admission, join handshake, and fan-out.
//!
//! Each connection occupies one slot in a fixed-capacity arena for the
//! lifetime of the connection (Empty → Present on join, Present → Empty on
//! disconnect). Game-level reactions happen in the caller: every tick it
//! drains [`ServerSession::process_messages`] and handles the returned
//! [`ServerEvent`]s.

use std::collections::HashMap;

use crate::messages::{
    GAME_VERSION, Message, OtherPlayerJoin, PlayerJoinAccept, PlayerJoinRequest, WireMessage,
};
use crate::transport::{
    CHANNEL_CONTROL, Delivery, DisconnectReason, Host, MAX_PLAYERS, Packet, PeerId, TransportEvent,
};

// ---------------------------------------------------------------------------
// Slot arena
// ---------------------------------------------------------------------------

/// One present player's connection record.
#[derive(Debug, Clone, Copy)]
pub struct NetPlayer {
    /// Transport identity of the connection.
    pub peer: PeerId,
    /// The slot this connection occupies.
    pub slot: u8,
}

/// Fixed-capacity arena of player slots with an explicit free list.
/// Connecting never allocates.
struct SlotTable {
    slots: Box<[Option<NetPlayer>]>,
    /// Free slot indices, lowest on top.
    free: Vec<u8>,
}

impl SlotTable {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            free: (0..capacity as u8).rev().collect(),
        }
    }

    fn allocate(&mut self, peer: PeerId) -> Option<u8> {
        let slot = self.free.pop()?;
        self.slots[slot as usize] = Some(NetPlayer { peer, slot });
        Some(slot)
    }

    fn release(&mut self, slot: u8) -> Option<NetPlayer> {
        let player = self.slots.get_mut(slot as usize)?.take()?;
        self.free.push(slot);
        Some(player)
    }

    fn get(&self, slot: u8) -> Option<&NetPlayer> {
        self.slots.get(slot as usize)?.as_ref()
    }

    fn iter_present(&self) -> impl Iterator<Item = &NetPlayer> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    fn present_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Domain-level event surfaced to the owning game server each tick.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A connection was admitted into a slot.
    PlayerConnected {
        /// The assigned slot.
        slot: u8,
    },
    /// A present player's connection ended; the slot is free again.
    PlayerDisconnected {
        /// The vacated slot.
        slot: u8,
    },
    /// A decoded message from a present player. Join requests never appear
    /// here; the session answers them itself.
    Message {
        /// Sender's slot.
        slot: u8,
        /// Channel the message arrived on.
        channel: u8,
        /// The decoded message.
        message: Message,
    },
}

// ---------------------------------------------------------------------------
// ServerSession
// ---------------------------------------------------------------------------

/// Owns the listening host and the slot arena.
pub struct ServerSession<H: Host> {
    host: H,
    table: SlotTable,
    peer_slots: HashMap<PeerId, u8>,
}

impl<H: Host> ServerSession<H> {
    /// Wraps a bound host with a slot arena of `max_players` (clamped to
    /// [`MAX_PLAYERS`]). Binding the host is the transport's job; a failed
    /// bind is fatal for a dedicated server and surfaces there.
    pub fn start(host: H, max_players: usize) -> Self {
        let capacity = max_players.clamp(1, MAX_PLAYERS);
        Self {
            host,
            table: SlotTable::new(capacity),
            peer_slots: HashMap::with_capacity(capacity),
        }
    }

    /// Drains all pending transport events and returns the resulting
    /// domain events. Non-blocking; call exactly once per tick.
    pub fn process_messages(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.host.service() {
            match event {
                TransportEvent::Connected { peer } => self.handle_connection(peer, &mut events),
                TransportEvent::Disconnected { peer, reason } => {
                    self.handle_disconnection(peer, reason, &mut events);
                }
                TransportEvent::Received {
                    peer,
                    channel,
                    payload,
                } => self.handle_received_packet(peer, channel, payload, &mut events),
            }
        }
        events
    }

    fn handle_connection(&mut self, peer: PeerId, events: &mut Vec<ServerEvent>) {
        tracing::info!(?peer, "received new connection");

        let Some(slot) = self.table.allocate(peer) else {
            tracing::warn!(?peer, "rejecting connection, server is full");
            self.host.disconnect(peer, DisconnectReason::ServerFull);
            return;
        };
        self.peer_slots.insert(peer, slot);
        events.push(ServerEvent::PlayerConnected { slot });

        // Roster backfill: one reliable join notice per player already
        // present, so the newcomer can reconstruct the roster.
        let roster: Vec<OtherPlayerJoin> = self
            .table
            .iter_present()
            .filter(|player| player.slot != slot)
            .map(|player| OtherPlayerJoin {
                slot_index: player.slot,
            })
            .collect();
        for notice in roster {
            self.send_to_peer(
                peer,
                CHANNEL_CONTROL,
                notice.to_packet(Delivery::ReliableOrdered),
            );
        }
    }

    fn handle_disconnection(&mut self, peer: PeerId, reason: u32, events: &mut Vec<ServerEvent>) {
        let Some(slot) = self.peer_slots.remove(&peer) else {
            // Peers rejected before slot assignment land here; nothing to do.
            tracing::debug!(?peer, reason, "disconnect for slotless peer ignored");
            return;
        };
        tracing::info!(
            slot,
            reason = ?DisconnectReason::from_code(reason),
            "player disconnected"
        );
        events.push(ServerEvent::PlayerDisconnected { slot });
        self.table.release(slot);
    }

    fn handle_received_packet(
        &mut self,
        peer: PeerId,
        channel: u8,
        payload: Vec<u8>,
        events: &mut Vec<ServerEvent>,
    ) {
        if payload.is_empty() {
            tracing::debug!(?peer, "discarding zero-length payload");
            return;
        }
        let message = match Message::decode(&payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(?peer, %err, "dropping malformed packet");
                return;
            }
        };
        let Some(&slot) = self.peer_slots.get(&peer) else {
            tracing::debug!(?peer, "dropping packet from slotless peer");
            return;
        };
        match message {
            Message::JoinRequest(request) => self.handle_join_request(peer, slot, request),
            message => events.push(ServerEvent::Message {
                slot,
                channel,
                message,
            }),
        }
    }

    /// Join requests are answered here rather than surfaced: the slot was
    /// already assigned at connection time, so the reply just carries it.
    fn handle_join_request(&mut self, peer: PeerId, slot: u8, request: PlayerJoinRequest) {
        if request.game_version != GAME_VERSION {
            tracing::warn!(
                slot,
                theirs = request.game_version,
                ours = GAME_VERSION,
                "rejecting join with mismatched game version"
            );
            // The disconnect event does the slot bookkeeping.
            self.host.disconnect(peer, DisconnectReason::ClientError);
            return;
        }
        tracing::info!(slot, auth_id = request.auth_id, "accepting join request");
        let accept = PlayerJoinAccept { slot_index: slot };
        self.send_to_peer(
            peer,
            CHANNEL_CONTROL,
            accept.to_packet(Delivery::ReliableOrdered),
        );
    }

    /// Fan-out to every present peer. Each recipient gets an independently
    /// encoded packet.
    pub fn broadcast<M: WireMessage>(&mut self, message: &M, channel: u8, delivery: Delivery) {
        let peers: Vec<PeerId> = self.table.iter_present().map(|player| player.peer).collect();
        for peer in peers {
            self.send_to_peer(peer, channel, message.to_packet(delivery));
        }
    }

    /// Fan-out to every present peer except `excluded_slot` (e.g. to avoid
    /// echoing a join/leave notice to its originator). Excluding an absent
    /// slot excludes nobody.
    pub fn broadcast_excluding<M: WireMessage>(
        &mut self,
        message: &M,
        excluded_slot: u8,
        channel: u8,
        delivery: Delivery,
    ) {
        let peers: Vec<PeerId> = self
            .table
            .iter_present()
            .filter(|player| player.slot != excluded_slot)
            .map(|player| player.peer)
            .collect();
        for peer in peers {
            self.send_to_peer(peer, channel, message.to_packet(delivery));
        }
    }

    /// Sends to a single present slot; an empty slot drops the message.
    pub fn send_to_slot<M: WireMessage>(
        &mut self,
        slot: u8,
        message: &M,
        channel: u8,
        delivery: Delivery,
    ) {
        let Some(peer) = self.table.get(slot).map(|player| player.peer) else {
            tracing::debug!(slot, "send to empty slot dropped");
            return;
        };
        self.send_to_peer(peer, channel, message.to_packet(delivery));
    }

    fn send_to_peer(&mut self, peer: PeerId, channel: u8, packet: Packet) {
        if let Err(err) = self.host.send(peer, channel, packet) {
            tracing::warn!(?peer, channel, %err, "send failed");
        }
    }

    /// Disconnects every present peer with `ServerShutdown` and drains the
    /// remaining events so slot bookkeeping still runs. The host itself is
    /// torn down when the session drops.
    pub fn stop(&mut self) {
        let peers: Vec<PeerId> = self.table.iter_present().map(|player| player.peer).collect();
        for peer in peers {
            self.host.disconnect(peer, DisconnectReason::ServerShutdown);
        }
        let _ = self.process_messages();
    }

    /// Number of present players.
    pub fn player_count(&self) -> usize {
        self.table.present_count()
    }

    /// Whether `slot` is occupied.
    pub fn is_present(&self, slot: u8) -> bool {
        self.table.get(slot).is_some()
    }

    /// Slots currently occupied, in index order.
    pub fn present_slots(&self) -> Vec<u8> {
        self.table.iter_present().map(|player| player.slot).collect()
    }

    /// Slot capacity of this session.
    pub fn capacity(&self) -> usize {
        self.table.slots.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
