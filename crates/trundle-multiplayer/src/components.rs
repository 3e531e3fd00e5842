//! ECS-facing data model: the components this layer reads and writes, plus
//! avatar rig lifecycle helpers.
//!
//! The entity/component store itself belongs to the engine; physics
//! integration happens outside this crate. [`RigidBodyState`] is the
//! engine's rigid-body mirror: the physics backend writes it after every
//! step, and this layer reads it for broadcast or overwrites it when an
//! authoritative snapshot arrives.

use std::collections::VecDeque;

use bevy_ecs::prelude::*;
use glam::{Quat, Vec2, Vec3};

use trundle_net::messages::PlayerInput;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Movement intent for a locosphere, consumed by the player-physics system.
/// On the server this is fed from buffered client input; on the client the
/// input layer writes it directly for the local avatar.
#[derive(Component, Debug, Clone, Default)]
pub struct LocosphereDriver {
    /// Horizontal movement on the XZ plane, each axis in [-1, 1].
    pub xz_move_input: Vec2,
    /// Sprint modifier held.
    pub sprint: bool,
    /// Jump requested. Cleared by the physics system once consumed.
    pub jump: bool,
    /// `true` only on the avatar owned by this process.
    pub is_local: bool,
}

/// Mirror of a rigid body's dynamic state as integrated by the physics
/// engine.
#[derive(Component, Debug, Clone, PartialEq)]
pub struct RigidBodyState {
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
    /// Linear velocity.
    pub linear_velocity: Vec3,
    /// Angular velocity.
    pub angular_velocity: Vec3,
    /// Whether the body is asleep; sleeping bodies are skipped by world
    /// sync broadcasts.
    pub sleeping: bool,
}

impl Default for RigidBodyState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            sleeping: false,
        }
    }
}

/// Server-side input bookkeeping attached to a connected player's
/// locosphere. The FIFO absorbs bursty delivery; the tick drains it one
/// input at a time.
#[derive(Component, Debug, Default)]
pub struct ServerPlayer {
    /// Newest input sequence received from this player.
    pub acknowledged_input_sequence: u16,
    /// Received-but-unapplied inputs, oldest first.
    pub pending_inputs: VecDeque<PlayerInput>,
}

/// Marks a non-player dynamic body for world sync. The id is assigned at
/// scene load and identical on server and clients; entity handles never
/// travel over the wire.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncedBody {
    /// Stable wire identity of this body.
    pub network_id: u32,
}

/// Declares the constraint binding the fender to its locosphere. The
/// physics backend materializes the actual joint and releases it when this
/// entity despawns.
#[derive(Component, Debug, Clone, Copy)]
pub struct FenderJoint {
    /// The rolling body.
    pub locosphere: Entity,
    /// The body suspended above it.
    pub fender: Entity,
}

/// The avatar rig: a rolling locosphere with a fender suspended above it by
/// a joint. Lives on the locosphere entity.
#[derive(Component, Debug, Clone, Copy)]
pub struct PlayerRig {
    /// The rolling body and movement root.
    pub locosphere: Entity,
    /// The suspended body.
    pub fender: Entity,
    /// The joint entity binding the two.
    pub joint: Entity,
}

// ---------------------------------------------------------------------------
// Rig lifecycle
// ---------------------------------------------------------------------------

/// Spawns a fresh avatar rig and returns it. The rig record is also
/// inserted on the locosphere entity.
pub fn create_player_rig(world: &mut World, is_local: bool) -> PlayerRig {
    let fender = world.spawn(RigidBodyState::default()).id();
    let locosphere = world
        .spawn((
            LocosphereDriver {
                is_local,
                ..Default::default()
            },
            RigidBodyState::default(),
        ))
        .id();
    let joint = world
        .spawn(FenderJoint { locosphere, fender })
        .id();

    let rig = PlayerRig {
        locosphere,
        fender,
        joint,
    };
    world.entity_mut(locosphere).insert(rig);
    rig
}

/// Destroys the rig rooted at `locosphere`: joint first (so the physics
/// backend releases the constraint), then both bodies.
pub fn destroy_player_rig(world: &mut World, locosphere: Entity) {
    let Some(rig) = world.get::<PlayerRig>(locosphere).copied() else {
        // A bare body without a rig record; just remove it.
        world.despawn(locosphere);
        return;
    };
    world.despawn(rig.joint);
    world.despawn(rig.fender);
    world.despawn(rig.locosphere);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rig_spawns_three_entities() {
        let mut world = World::new();
        let rig = create_player_rig(&mut world, true);

        assert!(world.get::<LocosphereDriver>(rig.locosphere).unwrap().is_local);
        assert!(world.get::<RigidBodyState>(rig.locosphere).is_some());
        assert!(world.get::<RigidBodyState>(rig.fender).is_some());

        let joint = world.get::<FenderJoint>(rig.joint).unwrap();
        assert_eq!(joint.locosphere, rig.locosphere);
        assert_eq!(joint.fender, rig.fender);
    }

    #[test]
    fn test_destroy_removes_whole_rig() {
        let mut world = World::new();
        let rig = create_player_rig(&mut world, false);
        destroy_player_rig(&mut world, rig.locosphere);

        assert!(world.get_entity(rig.locosphere).is_err());
        assert!(world.get_entity(rig.fender).is_err());
        assert!(world.get_entity(rig.joint).is_err());
    }

    #[test]
    fn test_destroy_tolerates_bare_body() {
        let mut world = World::new();
        let lone = world.spawn(RigidBodyState::default()).id();
        destroy_player_rig(&mut world, lone);
        assert!(world.get_entity(lone).is_err());
    }

    #[test]
    fn test_remote_rig_is_not_local() {
        let mut world = World::new();
        let rig = create_player_rig(&mut world, false);
        assert!(!world.get::<LocosphereDriver>(rig.locosphere).unwrap().is_local);
    }
}
