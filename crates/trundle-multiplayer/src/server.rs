//! Authoritative server glue.
//!
//! Each tick: drain session events, feed at most one buffered input per
//! player into its locosphere driver, and broadcast authoritative state
//! when the send-rate counter comes due. Avatar rigs are created on join
//! and destroyed on leave.

use bevy_ecs::prelude::*;

use trundle_net::messages::{
    Message, OtherPlayerJoin, OtherPlayerLeave, PlayerPosition, RigidbodySync,
};
use trundle_net::server::{ServerEvent, ServerSession};
use trundle_net::transport::{
    CHANNEL_CONTROL, CHANNEL_PLAYER, CHANNEL_WORLD, Delivery, Host, MAX_PLAYERS,
};

use crate::components::{
    LocosphereDriver, RigidBodyState, ServerPlayer, SyncedBody, create_player_rig,
    destroy_player_rig,
};
use crate::config::MultiplayerConfig;

// ---------------------------------------------------------------------------
// GameServer
// ---------------------------------------------------------------------------

/// Owns the server session and the slot → avatar entity table.
pub struct GameServer<H: Host> {
    session: ServerSession<H>,
    config: MultiplayerConfig,
    sync_timer: u32,
    /// Explicit slot → locosphere mapping; entity handles never come from
    /// the wire.
    player_locospheres: [Option<Entity>; MAX_PLAYERS],
}

impl<H: Host> GameServer<H> {
    /// Wraps a bound host. Binding happens at the transport layer; a
    /// dedicated server treats a failed bind as fatal before ever reaching
    /// this constructor.
    pub fn start(host: H, config: MultiplayerConfig) -> Self {
        let session = ServerSession::start(host, config.clamped_max_players());
        Self {
            session,
            config,
            sync_timer: 0,
            player_locospheres: [None; MAX_PLAYERS],
        }
    }

    /// One authoritative tick. Call from the fixed-step simulation
    /// callback, exactly once per tick.
    pub fn simulate(&mut self, world: &mut World, _dt: f32) {
        for event in self.session.process_messages() {
            match event {
                ServerEvent::PlayerConnected { slot } => self.on_player_join(world, slot),
                ServerEvent::PlayerDisconnected { slot } => self.on_player_leave(world, slot),
                ServerEvent::Message { slot, message, .. } => self.on_message(world, slot, message),
            }
        }

        self.drain_player_inputs(world);

        self.sync_timer += 1;
        if self.sync_timer >= self.config.send_rate {
            self.broadcast_authoritative_state(world);
            self.sync_timer = 0;
        }
    }

    fn on_message(&mut self, world: &mut World, slot: u8, message: Message) {
        match message {
            Message::PlayerInput(input) => {
                let Some(entity) = self.player_locospheres[slot as usize] else {
                    tracing::debug!(slot, "input for slot without an avatar dropped");
                    return;
                };
                let Some(mut player) = world.get_mut::<ServerPlayer>(entity) else {
                    return;
                };
                player.acknowledged_input_sequence = input.input_sequence;
                player.pending_inputs.push_back(input);
            }
            other => {
                tracing::debug!(slot, tag = ?other.tag(), "unexpected message from client");
            }
        }
    }

    /// Pops at most ONE buffered input per player per tick, capping how
    /// fast a delivery burst can drive the physics.
    fn drain_player_inputs(&mut self, world: &mut World) {
        let mut players = world.query::<(&mut ServerPlayer, &mut LocosphereDriver)>();
        for (mut player, mut driver) in players.iter_mut(world) {
            let Some(input) = player.pending_inputs.pop_front() else {
                continue;
            };
            driver.xz_move_input = input.xz_move_input;
            driver.sprint = input.sprint;
            // OR so a tap is never lost between windows; physics clears it.
            driver.jump |= input.jump;
        }
    }

    fn broadcast_authoritative_state(&mut self, world: &mut World) {
        for slot in self.session.present_slots() {
            let Some(entity) = self.player_locospheres[slot as usize] else {
                continue;
            };
            let (Some(body), Some(player)) = (
                world.get::<RigidBodyState>(entity),
                world.get::<ServerPlayer>(entity),
            ) else {
                continue;
            };
            let snapshot = PlayerPosition {
                slot_index: slot,
                position: body.position,
                rotation: body.rotation,
                linear_velocity: body.linear_velocity,
                angular_velocity: body.angular_velocity,
                acknowledged_input_sequence: player.acknowledged_input_sequence,
            };
            self.session
                .broadcast(&snapshot, CHANNEL_PLAYER, Delivery::Unreliable);
        }

        for sync in collect_rigidbody_syncs(world, false) {
            self.session
                .broadcast(&sync, CHANNEL_WORLD, Delivery::Unreliable);
        }
    }

    fn on_player_join(&mut self, world: &mut World, slot: u8) {
        tracing::info!(slot, "player joined, creating avatar rig");
        let rig = create_player_rig(world, false);
        world.entity_mut(rig.locosphere).insert(ServerPlayer::default());
        self.player_locospheres[slot as usize] = Some(rig.locosphere);

        let notice = OtherPlayerJoin { slot_index: slot };
        self.session
            .broadcast_excluding(&notice, slot, CHANNEL_CONTROL, Delivery::ReliableOrdered);

        // World backfill: the newcomer gets every synced body's current
        // state reliably, sleeping ones included.
        for sync in collect_rigidbody_syncs(world, true) {
            self.session
                .send_to_slot(slot, &sync, CHANNEL_WORLD, Delivery::ReliableOrdered);
        }
    }

    fn on_player_leave(&mut self, world: &mut World, slot: u8) {
        let Some(entity) = self.player_locospheres[slot as usize].take() else {
            return;
        };
        tracing::info!(slot, "player left, destroying avatar rig");
        destroy_player_rig(world, entity);

        let notice = OtherPlayerLeave { slot_index: slot };
        self.session
            .broadcast_excluding(&notice, slot, CHANNEL_CONTROL, Delivery::ReliableOrdered);
    }

    /// Rebuilds avatar rigs after a scene change: connected players keep
    /// their slots, but their entities died with the old scene.
    pub fn on_scene_start(&mut self, world: &mut World) {
        for slot in self.session.present_slots() {
            let rig = create_player_rig(world, false);
            world.entity_mut(rig.locosphere).insert(ServerPlayer::default());
            self.player_locospheres[slot as usize] = Some(rig.locosphere);
        }
    }

    /// Disconnects everyone, tears the session down, and removes the
    /// remaining avatar rigs.
    pub fn stop(&mut self, world: &mut World) {
        self.session.stop();
        for slot in 0..MAX_PLAYERS {
            if let Some(entity) = self.player_locospheres[slot].take() {
                destroy_player_rig(world, entity);
            }
        }
    }

    /// The avatar entity for `slot`, if present.
    pub fn locosphere_for_slot(&self, slot: u8) -> Option<Entity> {
        self.player_locospheres.get(slot as usize).copied().flatten()
    }

    /// Number of connected players.
    pub fn player_count(&self) -> usize {
        self.session.player_count()
    }

    /// The active configuration.
    pub fn config(&self) -> &MultiplayerConfig {
        &self.config
    }

    /// The underlying session (roster queries, manual sends).
    pub fn session_mut(&mut self) -> &mut ServerSession<H> {
        &mut self.session
    }
}

/// Snapshots every synced body, optionally skipping sleeping ones.
fn collect_rigidbody_syncs(world: &mut World, include_sleeping: bool) -> Vec<RigidbodySync> {
    let mut bodies = world.query::<(&SyncedBody, &RigidBodyState)>();
    bodies
        .iter(world)
        .filter(|(_, body)| include_sleeping || !body.sleeping)
        .map(|(synced, body)| RigidbodySync {
            network_id: synced.network_id,
            position: body.position,
            rotation: body.rotation,
            linear_velocity: body.linear_velocity,
            angular_velocity: body.angular_velocity,
        })
        .collect()
}
