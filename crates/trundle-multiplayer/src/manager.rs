//! Role selection at startup: one process is either the authoritative
//! server or a predicted client, decided once and forwarded per tick.

use bevy_ecs::prelude::*;

use trundle_net::transport::Host;

use crate::client::GameClient;
use crate::config::MultiplayerConfig;
use crate::server::GameServer;

/// Which side of the session this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplayerRole {
    /// Authoritative dedicated server.
    Server,
    /// Predicted client.
    Client,
}

enum Mode<H: Host> {
    Server(GameServer<H>),
    Client(GameClient<H>),
}

/// Forwards per-tick calls to whichever side this process runs.
pub struct MultiplayerManager<H: Host> {
    mode: Mode<H>,
}

impl<H: Host> MultiplayerManager<H> {
    /// Runs as the authoritative server on an already-bound host.
    pub fn new_server(host: H, config: MultiplayerConfig) -> Self {
        Self {
            mode: Mode::Server(GameServer::start(host, config)),
        }
    }

    /// Runs as a client; call [`GameClient::connect`] via [`client_mut`] to
    /// join a server.
    ///
    /// [`client_mut`]: MultiplayerManager::client_mut
    pub fn new_client(host: H) -> Self {
        Self {
            mode: Mode::Client(GameClient::new(host)),
        }
    }

    /// Which side this manager runs.
    pub fn role(&self) -> MultiplayerRole {
        match self.mode {
            Mode::Server(_) => MultiplayerRole::Server,
            Mode::Client(_) => MultiplayerRole::Client,
        }
    }

    /// One fixed-step tick.
    pub fn simulate(&mut self, world: &mut World, dt: f32) {
        match &mut self.mode {
            Mode::Server(server) => server.simulate(world, dt),
            Mode::Client(client) => client.simulate(world, dt),
        }
    }

    /// Tears the session down: the server disconnects everyone, the client
    /// leaves.
    pub fn shutdown(&mut self, world: &mut World) {
        match &mut self.mode {
            Mode::Server(server) => server.stop(world),
            Mode::Client(client) => client.shutdown(world),
        }
    }

    /// The server side, when running as one.
    pub fn server_mut(&mut self) -> Option<&mut GameServer<H>> {
        match &mut self.mode {
            Mode::Server(server) => Some(server),
            Mode::Client(_) => None,
        }
    }

    /// The client side, when running as one.
    pub fn client_mut(&mut self) -> Option<&mut GameClient<H>> {
        match &mut self.mode {
            Mode::Server(_) => None,
            Mode::Client(client) => Some(client),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
