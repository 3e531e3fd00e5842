//! High-level multiplayer: the authoritative server tick, client-side
//! prediction with server reconciliation, and the role switch between the
//! two.
//!
//! This layer keeps one locosphere per player consistent across the server
//! and every client. It talks to the transport through `trundle-net` and
//! mutates the ECS world directly; physics integration stays outside.

pub mod client;
pub mod components;
pub mod config;
pub mod manager;
pub mod prediction;
pub mod server;

pub use client::GameClient;
pub use components::{
    FenderJoint, LocosphereDriver, PlayerRig, RigidBodyState, ServerPlayer, SyncedBody,
    create_player_rig, destroy_player_rig,
};
pub use config::MultiplayerConfig;
pub use manager::{MultiplayerManager, MultiplayerRole};
pub use prediction::{
    DEFAULT_RING_CAPACITY, LocosphereState, PredictionDiagnostics, PredictionRing, reintegrate,
};
pub use server::GameServer;
