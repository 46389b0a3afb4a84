//! # Tilestorm Core
//!
//! Deterministic simulation core for Tilestorm, a tile-based multiplayer
//! arcade shooter.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No audio (sounds and screen shakes leave as [`dispatch::Cue`]s)
//! - No system randomness
//! - No floating-point math (uses fixed-point)
//!
//! One participant, the host, detects hits and rolls dice. Everything it
//! decides travels as [`events::Event`]s, so every participant that applies
//! the same events in the same order ends up in the same state.
//!
//! ## Crate Structure
//!
//! - [`queue`] - Deferred, ordered event queue
//! - [`dispatch`] - Applies events to the world
//! - [`physics`] - Per-tick projectile stepping
//! - [`collision`] - Swept hit detection and resolution
//! - [`authority`] - Host and replica decision making
//! - [`session`] - Tick loop tying the above together
//! - [`replay`] - Recording and verifying games
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod authority;
pub mod collision;
pub mod components;
pub mod config;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod map;
pub mod math;
pub mod mission;
pub mod physics;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod session;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::authority::{Authority, GunShot, HostAuthority, ReplicaAuthority};
    pub use crate::components::*;
    pub use crate::config::{ConfigValue, ConfigValues, GameMode, SessionConfig};
    pub use crate::data::{BulletClass, GameData};
    pub use crate::dispatch::Cue;
    pub use crate::error::{Result, SimError};
    pub use crate::events::{
        ActorSpawn, BulletBounce, BulletSpawn, Damage, Event, HitType, Scope, ThingRef,
    };
    pub use crate::map::{TileMap, TilePos};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::registry::{Registry, Uid};
    pub use crate::replay::{Replay, ReplayPlayer, ReplayRecorder};
    pub use crate::session::{Session, TickReport};
    pub use crate::world::World;
}
