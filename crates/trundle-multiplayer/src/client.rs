//! Prediction client glue.
//!
//! Each tick the client ships its movement intent with a fresh sequence
//! number and snapshots the pre-send physics state. Authoritative snapshots
//! for the local player are reconciled against that ring; everything else
//! (remote players, synced world bodies) is applied directly, since remote
//! bodies are never predicted.

use std::collections::HashMap;

use bevy_ecs::prelude::*;
use glam::Vec3;

use trundle_net::client::{ClientEvent, ClientSession};
use trundle_net::messages::{Message, PlayerInput, PlayerPosition, RigidbodySync};
use trundle_net::transport::{CHANNEL_PLAYER, Delivery, Host, MAX_PLAYERS};

use crate::components::{
    LocosphereDriver, RigidBodyState, SyncedBody, create_player_rig, destroy_player_rig,
};
use crate::prediction::{
    LocosphereState, PredictionDiagnostics, PredictionRing, reintegrate,
};

// ---------------------------------------------------------------------------
// GameClient
// ---------------------------------------------------------------------------

/// Owns the client session, the prediction ring, and the remote avatar
/// tables.
pub struct GameClient<H: Host> {
    session: ClientSession<H>,
    input_sequence: u16,
    ring: PredictionRing,
    diagnostics: PredictionDiagnostics,
    previous_velocity: Vec3,
    /// Explicit slot → remote locosphere mapping.
    remote_locospheres: [Option<Entity>; MAX_PLAYERS],
    /// Wire network id → synced body entity, rebuilt per scene.
    synced_bodies: HashMap<u32, Entity>,
}

impl<H: Host> GameClient<H> {
    /// Wraps an outbound host. Call [`connect`] to start the handshake.
    ///
    /// [`connect`]: GameClient::connect
    pub fn new(host: H) -> Self {
        Self {
            session: ClientSession::new(host),
            input_sequence: 0,
            ring: PredictionRing::default(),
            diagnostics: PredictionDiagnostics::default(),
            previous_velocity: Vec3::ZERO,
            remote_locospheres: [None; MAX_PLAYERS],
            synced_bodies: HashMap::new(),
        }
    }

    /// Starts connecting to a server.
    pub fn connect(&mut self, addr: H::Addr) {
        self.session.connect(addr);
    }

    /// Leaves the server; rig cleanup happens when the disconnect event
    /// arrives.
    pub fn disconnect(&mut self) {
        self.session.disconnect();
    }

    /// Leaves immediately and removes remote rigs without waiting for the
    /// disconnect event (e.g. on application shutdown).
    pub fn shutdown(&mut self, world: &mut World) {
        self.session.disconnect();
        self.clear_session_state(world);
    }

    /// Whether the connection is live.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// The slot the server assigned us.
    pub fn local_slot(&self) -> Option<u8> {
        self.session.local_slot()
    }

    /// Positional prediction error samples.
    pub fn diagnostics(&self) -> &PredictionDiagnostics {
        &self.diagnostics
    }

    /// Rebuilds the network id → entity index for synced world bodies.
    /// Call after scene load, before the first world-sync message.
    pub fn index_synced_bodies(&mut self, world: &mut World) {
        self.synced_bodies.clear();
        let mut bodies = world.query::<(Entity, &SyncedBody)>();
        for (entity, synced) in bodies.iter(world) {
            self.synced_bodies.insert(synced.network_id, entity);
        }
    }

    /// One client tick. Call from the fixed-step simulation callback,
    /// exactly once per tick.
    pub fn simulate(&mut self, world: &mut World, dt: f32) {
        for event in self.session.process_messages() {
            match event {
                ClientEvent::Connected | ClientEvent::JoinAccepted { .. } => {}
                ClientEvent::Disconnected { .. } => self.clear_session_state(world),
                ClientEvent::Message { message, .. } => self.on_message(world, message, dt),
            }
        }

        if !self.session.is_connected() {
            return;
        }
        self.send_local_input(world, dt);
    }

    /// Ships the local intent and snapshots the pre-send physics state,
    /// keyed by the sequence just sent.
    fn send_local_input(&mut self, world: &mut World, dt: f32) {
        let Some(entity) = find_local_locosphere(world) else {
            return;
        };
        let Some(driver) = world.get::<LocosphereDriver>(entity) else {
            return;
        };
        let input = PlayerInput {
            xz_move_input: driver.xz_move_input,
            sprint: driver.sprint,
            jump: driver.jump,
            input_sequence: self.input_sequence,
        };
        let Some(body) = world.get::<RigidBodyState>(entity) else {
            return;
        };
        let acceleration = if dt > 0.0 {
            (body.linear_velocity - self.previous_velocity) / dt
        } else {
            Vec3::ZERO
        };
        let snapshot = LocosphereState {
            position: body.position,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
            acceleration_estimate: acceleration,
            input_sequence: self.input_sequence,
        };
        self.previous_velocity = body.linear_velocity;

        self.session
            .send_to_server(&input, CHANNEL_PLAYER, Delivery::Unreliable);
        self.ring.push(snapshot);
        self.input_sequence = self.input_sequence.wrapping_add(1);
    }

    fn on_message(&mut self, world: &mut World, message: Message, dt: f32) {
        match message {
            Message::PlayerPosition(snapshot) => {
                if Some(snapshot.slot_index) == self.session.local_slot() {
                    self.reconcile_local(world, &snapshot, dt);
                } else {
                    self.apply_remote_player(world, &snapshot);
                }
            }
            Message::RigidbodySync(sync) => self.apply_rigidbody_sync(world, &sync),
            Message::OtherPlayerJoin(join) => self.on_other_player_join(world, join.slot_index),
            Message::OtherPlayerLeave(leave) => self.on_other_player_leave(world, leave.slot_index),
            other => tracing::debug!(tag = ?other.tag(), "unexpected message from server"),
        }
    }

    /// Corrects the local locosphere: evict confirmed predictions, adopt
    /// the authoritative state, then re-integrate the unacknowledged window
    /// so the visible position does not snap backward.
    fn reconcile_local(&mut self, world: &mut World, snapshot: &PlayerPosition, dt: f32) {
        if !snapshot_is_finite(snapshot) {
            tracing::warn!("dropping non-finite authoritative snapshot");
            return;
        }
        let Some(entity) = find_local_locosphere(world) else {
            return;
        };

        let ack = snapshot.acknowledged_input_sequence;
        if let Some(predicted) = self.ring.get(ack) {
            self.diagnostics
                .record(predicted.position.distance(snapshot.position));
        }
        self.ring.discard_through(ack);

        let (position, velocity) = reintegrate(
            snapshot.position,
            snapshot.linear_velocity,
            dt,
            self.ring.iter(),
        );

        let Some(mut body) = world.get_mut::<RigidBodyState>(entity) else {
            return;
        };
        body.position = position;
        body.rotation = snapshot.rotation;
        body.linear_velocity = velocity;
        body.angular_velocity = snapshot.angular_velocity;
        body.sleeping = false;
    }

    /// Remote players are never predicted; the snapshot applies as-is.
    fn apply_remote_player(&mut self, world: &mut World, snapshot: &PlayerPosition) {
        if !snapshot_is_finite(snapshot) {
            tracing::warn!("dropping non-finite remote snapshot");
            return;
        }
        let Some(entity) = self
            .remote_locospheres
            .get(snapshot.slot_index as usize)
            .copied()
            .flatten()
        else {
            tracing::debug!(
                slot = snapshot.slot_index,
                "position for unknown remote player dropped"
            );
            return;
        };
        let Some(mut body) = world.get_mut::<RigidBodyState>(entity) else {
            return;
        };
        body.position = snapshot.position;
        body.rotation = snapshot.rotation;
        body.linear_velocity = snapshot.linear_velocity;
        body.angular_velocity = snapshot.angular_velocity;
        body.sleeping = false;
    }

    fn apply_rigidbody_sync(&mut self, world: &mut World, sync: &RigidbodySync) {
        let Some(&entity) = self.synced_bodies.get(&sync.network_id) else {
            tracing::debug!(network_id = sync.network_id, "sync for unknown body dropped");
            return;
        };
        let Some(mut body) = world.get_mut::<RigidBodyState>(entity) else {
            return;
        };
        if !sync.position.is_finite() || !sync.rotation.is_finite() {
            tracing::warn!(network_id = sync.network_id, "dropping non-finite body sync");
            return;
        }
        body.position = sync.position;
        body.rotation = sync.rotation;
        body.linear_velocity = sync.linear_velocity;
        body.angular_velocity = sync.angular_velocity;
        body.sleeping = false;
    }

    fn on_other_player_join(&mut self, world: &mut World, slot: u8) {
        let Some(entry) = self.remote_locospheres.get_mut(slot as usize) else {
            tracing::warn!(slot, "join notice with out-of-range slot dropped");
            return;
        };
        if let Some(stale) = entry.take() {
            tracing::warn!(slot, "join notice for occupied slot, replacing rig");
            destroy_player_rig(world, stale);
        }
        tracing::info!(slot, "remote player joined, creating rig");
        let rig = create_player_rig(world, false);
        self.remote_locospheres[slot as usize] = Some(rig.locosphere);
    }

    fn on_other_player_leave(&mut self, world: &mut World, slot: u8) {
        let Some(entity) = self
            .remote_locospheres
            .get_mut(slot as usize)
            .and_then(Option::take)
        else {
            tracing::debug!(slot, "leave notice for empty slot ignored");
            return;
        };
        tracing::info!(slot, "remote player left, destroying rig");
        destroy_player_rig(world, entity);
    }

    /// Drops prediction state and remote rigs after the connection ends.
    fn clear_session_state(&mut self, world: &mut World) {
        self.ring.clear();
        self.previous_velocity = Vec3::ZERO;
        for slot in 0..MAX_PLAYERS {
            if let Some(entity) = self.remote_locospheres[slot].take() {
                destroy_player_rig(world, entity);
            }
        }
    }

    /// The remote avatar entity for `slot`, if one exists.
    pub fn remote_locosphere_for_slot(&self, slot: u8) -> Option<Entity> {
        self.remote_locospheres.get(slot as usize).copied().flatten()
    }

    /// Number of snapshots waiting for acknowledgement.
    pub fn pending_prediction_count(&self) -> usize {
        self.ring.len()
    }

    #[cfg(test)]
    pub(crate) fn set_input_sequence(&mut self, sequence: u16) {
        self.input_sequence = sequence;
    }
}

/// The locally-controlled locosphere, if the scene has one.
fn find_local_locosphere(world: &mut World) -> Option<Entity> {
    let mut drivers = world.query::<(Entity, &LocosphereDriver)>();
    drivers
        .iter(world)
        .find(|(_, driver)| driver.is_local)
        .map(|(entity, _)| entity)
}

fn snapshot_is_finite(snapshot: &PlayerPosition) -> bool {
    snapshot.position.is_finite()
        && snapshot.rotation.is_finite()
        && snapshot.linear_velocity.is_finite()
        && snapshot.angular_velocity.is_finite()
}
