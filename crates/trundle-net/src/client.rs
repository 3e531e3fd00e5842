//! Client session: one outbound connection to the server.
//!
//! The session requests a join as soon as the connection is live, remembers
//! the slot the server assigns, and surfaces everything else as
//! [`ClientEvent`]s for the game client to handle. Sends are
//! fire-and-forget: a failure is a logged warning, never an error — a lost
//! send is only visible indirectly, via a later disconnect.

use crate::messages::{GAME_VERSION, Message, PlayerJoinRequest, WireMessage};
use crate::transport::{
    CHANNEL_CONTROL, Delivery, DisconnectReason, Host, PeerId, TransportEvent,
};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Domain-level event surfaced to the owning game client each tick.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The connection to the server is live; a join request is on the wire.
    Connected,
    /// The server accepted the join and assigned a slot.
    JoinAccepted {
        /// Our slot on the server.
        slot: u8,
    },
    /// The connection ended.
    Disconnected {
        /// Raw reason code; decode with [`DisconnectReason::from_code`].
        reason: u32,
    },
    /// A decoded message from the server.
    Message {
        /// Channel the message arrived on.
        channel: u8,
        /// The decoded message.
        message: Message,
    },
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// Owns the outbound host and the handshake state.
pub struct ClientSession<H: Host> {
    host: H,
    server_peer: Option<PeerId>,
    connected: bool,
    local_slot: Option<u8>,
    auth_id: u64,
}

impl<H: Host> ClientSession<H> {
    /// Wraps an outbound host. Nothing happens until [`connect`].
    ///
    /// [`connect`]: ClientSession::connect
    pub fn new(host: H) -> Self {
        Self {
            host,
            server_peer: None,
            connected: false,
            local_slot: None,
            auth_id: 0,
        }
    }

    /// Sets the account id sent in the join request.
    pub fn set_auth_id(&mut self, auth_id: u64) {
        self.auth_id = auth_id;
    }

    /// Starts the handshake. A second call while a connection exists is
    /// logged and ignored; disconnect first.
    pub fn connect(&mut self, addr: H::Addr) {
        if self.server_peer.is_some() {
            tracing::warn!("already connected, disconnect first");
            return;
        }
        match self.host.connect(addr) {
            Ok(peer) => self.server_peer = Some(peer),
            Err(err) => tracing::warn!(%err, "connect failed"),
        }
    }

    /// Leaves the server gracefully.
    pub fn disconnect(&mut self) {
        if let Some(peer) = self.server_peer {
            self.host.disconnect(peer, DisconnectReason::PlayerLeaving);
        }
    }

    /// Whether the connection is live (handshake may still be in flight).
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// The slot the server assigned us, once the join was accepted. Used to
    /// tell our own authoritative snapshots from other players'.
    pub fn local_slot(&self) -> Option<u8> {
        self.local_slot
    }

    /// Sends one message to the server. Failures are logged, never raised.
    pub fn send_to_server<M: WireMessage>(&mut self, message: &M, channel: u8, delivery: Delivery) {
        let Some(peer) = self.server_peer else {
            tracing::debug!("send while not connected dropped");
            return;
        };
        if let Err(err) = self.host.send(peer, channel, message.to_packet(delivery)) {
            tracing::warn!(channel, %err, "send to server failed");
        }
    }

    /// Drains all pending transport events and returns the resulting
    /// domain events. Non-blocking; call exactly once per tick.
    pub fn process_messages(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.host.service() {
            match event {
                TransportEvent::Connected { peer } => self.handle_connection(peer, &mut events),
                TransportEvent::Disconnected { peer, reason } => {
                    self.handle_disconnection(peer, reason, &mut events);
                }
                TransportEvent::Received {
                    channel, payload, ..
                } => self.handle_received_packet(channel, payload, &mut events),
            }
        }
        events
    }

    fn handle_connection(&mut self, peer: PeerId, events: &mut Vec<ClientEvent>) {
        if self.server_peer != Some(peer) {
            tracing::debug!(?peer, "ignoring connect event for unexpected peer");
            return;
        }
        self.connected = true;
        tracing::info!("connected to server, requesting join");
        let request = PlayerJoinRequest {
            game_version: GAME_VERSION,
            auth_id: self.auth_id,
            auth_universe: 0,
        };
        self.send_to_server(&request, CHANNEL_CONTROL, Delivery::ReliableOrdered);
        events.push(ClientEvent::Connected);
    }

    fn handle_disconnection(&mut self, peer: PeerId, reason: u32, events: &mut Vec<ClientEvent>) {
        if self.server_peer != Some(peer) {
            return;
        }
        tracing::info!(
            reason,
            decoded = ?DisconnectReason::from_code(reason),
            "disconnected from server"
        );
        self.connected = false;
        self.server_peer = None;
        self.local_slot = None;
        events.push(ClientEvent::Disconnected { reason });
    }

    fn handle_received_packet(
        &mut self,
        channel: u8,
        payload: Vec<u8>,
        events: &mut Vec<ClientEvent>,
    ) {
        if payload.is_empty() {
            tracing::debug!("discarding zero-length payload");
            return;
        }
        match Message::decode(&payload) {
            Ok(Message::JoinAccept(accept)) => {
                tracing::info!(slot = accept.slot_index, "join accepted");
                self.local_slot = Some(accept.slot_index);
                events.push(ClientEvent::JoinAccepted {
                    slot: accept.slot_index,
                });
            }
            Ok(message) => events.push(ClientEvent::Message { channel, message }),
            Err(err) => tracing::warn!(%err, "dropping malformed packet"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackHost, LoopbackNetwork};
    use crate::server::ServerSession;
    use crate::transport::{CHANNEL_COUNT, HostConfig, Packet};

    const PORT: u16 = 3011;

    fn start_server(net: &LoopbackNetwork) -> ServerSession<LoopbackHost> {
        let host = net
            .listen(HostConfig {
                port: PORT,
                max_peers: 4,
                channel_count: CHANNEL_COUNT,
            })
            .expect("bind loopback listener");
        ServerSession::start(host, 4)
    }

    #[test]
    fn test_handshake_assigns_local_slot() {
        let net = LoopbackNetwork::new();
        let mut server = start_server(&net);
        let mut client = ClientSession::new(net.client(CHANNEL_COUNT));

        client.connect(PORT);
        assert!(!client.is_connected());

        // Client observes the connection and fires the join request.
        let events = client.process_messages();
        assert!(matches!(events.as_slice(), [ClientEvent::Connected]));
        assert!(client.is_connected());
        assert_eq!(client.local_slot(), None);

        // Server admits and answers; client learns its slot.
        let _ = server.process_messages();
        let events = client.process_messages();
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::JoinAccepted { slot: 0 }]
        ));
        assert_eq!(client.local_slot(), Some(0));
    }

    #[test]
    fn test_disconnect_clears_session_state() {
        let net = LoopbackNetwork::new();
        let mut server = start_server(&net);
        let mut client = ClientSession::new(net.client(CHANNEL_COUNT));

        client.connect(PORT);
        let _ = client.process_messages();
        let _ = server.process_messages();
        let _ = client.process_messages();
        assert_eq!(client.local_slot(), Some(0));

        client.disconnect();
        let events = client.process_messages();
        assert!(matches!(
            events.as_slice(),
            [ClientEvent::Disconnected { reason }]
                if *reason == DisconnectReason::PlayerLeaving.code()
        ));
        assert!(!client.is_connected());
        assert_eq!(client.local_slot(), None);
    }

    #[test]
    fn test_send_while_disconnected_is_swallowed() {
        let net = LoopbackNetwork::new();
        let mut client = ClientSession::new(net.client(CHANNEL_COUNT));
        // Must not panic or error.
        client.send_to_server(
            &PlayerJoinRequest {
                game_version: GAME_VERSION,
                auth_id: 0,
                auth_universe: 0,
            },
            CHANNEL_CONTROL,
            Delivery::ReliableOrdered,
        );
    }

    #[test]
    fn test_second_connect_ignored_while_live() {
        let net = LoopbackNetwork::new();
        let mut server = start_server(&net);
        let mut client = ClientSession::new(net.client(CHANNEL_COUNT));

        client.connect(PORT);
        let _ = client.process_messages();
        client.connect(PORT);

        // Only the first connection exists server-side.
        let _ = server.process_messages();
        assert_eq!(server.player_count(), 1);
    }

    #[test]
    fn test_zero_length_and_malformed_payloads_dropped() {
        let net = LoopbackNetwork::new();
        let mut server_host = net
            .listen(HostConfig {
                port: PORT,
                max_peers: 4,
                channel_count: CHANNEL_COUNT,
            })
            .unwrap();
        let mut client = ClientSession::new(net.client(CHANNEL_COUNT));

        client.connect(PORT);
        let _ = client.process_messages();
        let peer = match server_host.service() {
            Some(TransportEvent::Connected { peer }) => peer,
            other => panic!("expected Connected, got {other:?}"),
        };

        for payload in [Vec::new(), vec![99u8, 0, 0]] {
            server_host
                .send(
                    peer,
                    CHANNEL_CONTROL,
                    Packet {
                        payload,
                        delivery: Delivery::Unreliable,
                    },
                )
                .unwrap();
        }
        // Drain the join request the client sent on connect, then check
        // that the bad payloads produced no client events.
        let events = client.process_messages();
        assert!(events.is_empty());
    }
}
