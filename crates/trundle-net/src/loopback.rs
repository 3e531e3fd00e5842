//! In-process transport: a [`Host`] implementation backed by shared queues.
//!
//! Used by tests and by listen-server play (hosting and playing in one
//! process). Delivery is perfect and ordered regardless of the requested
//! flags, and both endpoints observe a [`TransportEvent::Disconnected`] when
//! either side disconnects. Everything is single-threaded (`Rc<RefCell>`),
//! matching the layer's cooperative tick model.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::transport::{
    DisconnectReason, Host, HostConfig, Packet, PeerId, TransportError, TransportEvent,
};

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

/// One side of an established loopback connection.
struct Link {
    /// The remote endpoint's queue state.
    remote: Rc<RefCell<Endpoint>>,
    /// The peer id the remote endpoint knows us by.
    remote_peer: PeerId,
}

/// Shared per-host state: the pending event queue and active links.
struct Endpoint {
    queue: VecDeque<TransportEvent>,
    links: HashMap<PeerId, Link>,
    channel_count: u8,
}

impl Endpoint {
    fn new(channel_count: u8) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            queue: VecDeque::new(),
            links: HashMap::new(),
            channel_count,
        }))
    }
}

/// Hub state shared by every host created from one [`LoopbackNetwork`].
struct Hub {
    listeners: HashMap<u16, Rc<RefCell<Endpoint>>>,
    next_peer: u64,
}

// ---------------------------------------------------------------------------
// LoopbackNetwork
// ---------------------------------------------------------------------------

/// Factory for loopback hosts sharing one in-process "network".
#[derive(Clone)]
pub struct LoopbackNetwork {
    hub: Rc<RefCell<Hub>>,
}

impl LoopbackNetwork {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self {
            hub: Rc::new(RefCell::new(Hub {
                listeners: HashMap::new(),
                next_peer: 1,
            })),
        }
    }

    /// Binds a listening host. Fails if the port is already taken.
    ///
    /// `config.max_peers` is accepted for parity with real transports but
    /// not enforced; admission control is the session's job.
    pub fn listen(&self, config: HostConfig) -> Result<LoopbackHost, TransportError> {
        let mut hub = self.hub.borrow_mut();
        if hub.listeners.contains_key(&config.port) {
            return Err(TransportError::PortInUse(config.port));
        }
        let endpoint = Endpoint::new(config.channel_count);
        hub.listeners.insert(config.port, Rc::clone(&endpoint));
        Ok(LoopbackHost {
            endpoint,
            hub: Rc::clone(&self.hub),
        })
    }

    /// Creates an outbound-only host.
    pub fn client(&self, channel_count: u8) -> LoopbackHost {
        LoopbackHost {
            endpoint: Endpoint::new(channel_count),
            hub: Rc::clone(&self.hub),
        }
    }
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LoopbackHost
// ---------------------------------------------------------------------------

/// A [`Host`] whose wire is a pair of in-process queues.
pub struct LoopbackHost {
    endpoint: Rc<RefCell<Endpoint>>,
    hub: Rc<RefCell<Hub>>,
}

impl Host for LoopbackHost {
    type Addr = u16;

    fn service(&mut self) -> Option<TransportEvent> {
        self.endpoint.borrow_mut().queue.pop_front()
    }

    fn connect(&mut self, addr: u16) -> Result<PeerId, TransportError> {
        let remote = {
            let hub = self.hub.borrow();
            hub.listeners
                .get(&addr)
                .cloned()
                .ok_or(TransportError::NoRoute(addr))?
        };

        let (server_peer, client_peer) = {
            let mut hub = self.hub.borrow_mut();
            let server_peer = PeerId(hub.next_peer);
            let client_peer = PeerId(hub.next_peer + 1);
            hub.next_peer += 2;
            (server_peer, client_peer)
        };

        // Link both directions, then notify both endpoints.
        self.endpoint.borrow_mut().links.insert(
            server_peer,
            Link {
                remote: Rc::clone(&remote),
                remote_peer: client_peer,
            },
        );
        {
            let mut remote = remote.borrow_mut();
            remote.links.insert(
                client_peer,
                Link {
                    remote: Rc::clone(&self.endpoint),
                    remote_peer: server_peer,
                },
            );
            remote
                .queue
                .push_back(TransportEvent::Connected { peer: client_peer });
        }
        self.endpoint
            .borrow_mut()
            .queue
            .push_back(TransportEvent::Connected { peer: server_peer });

        Ok(server_peer)
    }

    fn send(&mut self, peer: PeerId, channel: u8, packet: Packet) -> Result<(), TransportError> {
        let (remote, remote_peer) = {
            let endpoint = self.endpoint.borrow();
            if channel >= endpoint.channel_count {
                return Err(TransportError::BadChannel {
                    channel,
                    count: endpoint.channel_count,
                });
            }
            let link = endpoint
                .links
                .get(&peer)
                .ok_or(TransportError::UnknownPeer(peer))?;
            (Rc::clone(&link.remote), link.remote_peer)
        };

        remote
            .borrow_mut()
            .queue
            .push_back(TransportEvent::Received {
                peer: remote_peer,
                channel,
                payload: packet.payload,
            });
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId, reason: DisconnectReason) {
        let Some(link) = self.endpoint.borrow_mut().links.remove(&peer) else {
            return;
        };

        {
            let mut remote = link.remote.borrow_mut();
            remote.links.remove(&link.remote_peer);
            remote.queue.push_back(TransportEvent::Disconnected {
                peer: link.remote_peer,
                reason: reason.code(),
            });
        }
        // The local side observes its own disconnect too, so session
        // bookkeeping runs symmetrically on both ends.
        self.endpoint
            .borrow_mut()
            .queue
            .push_back(TransportEvent::Disconnected {
                peer,
                reason: reason.code(),
            });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
