//! Shared world state: registries, tile map, mission and config.
//!
//! The world is plain data. Only the dispatcher mutates it, apart from the
//! physics step advancing each bullet's own kinematic fields.
//!
//! # Hashing
//!
//! [`World::state_hash`] covers everything that every participant must
//! agree on. Cosmetic particles, the local-player flag and bullet hit
//! cooldowns are left out because they legitimately differ between host
//! and replicas.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::components::{Actor, Bullet, MapObject, Particle, Pickup, Player};
use crate::config::{ConfigValues, GameMode, SessionConfig};
use crate::data::{BulletClass, GameData};
use crate::error::{Result, SimError};
use crate::events::ParticleSpawn;
use crate::map::{TileMap, TilePos};
use crate::mission::Mission;
use crate::registry::{Registry, Uid};

/// Everything a session simulates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    /// Linked class data.
    pub data: GameData,
    /// Tile grid.
    pub map: TileMap,
    /// Characters.
    pub actors: Registry<Actor>,
    /// Static objects.
    pub objects: Registry<MapObject>,
    /// Items on the ground.
    pub pickups: Registry<Pickup>,
    /// Live projectiles.
    pub bullets: Registry<Bullet>,
    /// Cosmetic particles, ids assigned locally.
    pub particles: Registry<Particle>,
    /// Player slots.
    pub players: Registry<Player>,
    /// Mission progress.
    pub mission: Mission,
    /// Runtime config values.
    pub config: ConfigValues,
    /// Game mode.
    pub mode: GameMode,
    next_particle_id: Uid,
}

impl World {
    /// Create an empty world on a map.
    #[must_use]
    pub fn new(data: GameData, map: TileMap, mode: GameMode, config: ConfigValues) -> Self {
        Self {
            data,
            map,
            actors: Registry::new(),
            objects: Registry::new(),
            pickups: Registry::new(),
            bullets: Registry::new(),
            particles: Registry::new(),
            players: Registry::new(),
            mission: Mission::default(),
            config,
            mode,
            next_particle_id: 0,
        }
    }

    /// Create an empty world from a session config.
    ///
    /// # Errors
    ///
    /// Returns an error if a config override fails to apply.
    pub fn with_session(data: GameData, map: TileMap, session: &SessionConfig) -> Result<Self> {
        Ok(Self::new(data, map, session.mode, session.values()?))
    }

    /// Bullet class by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownBulletClass`] for unknown names.
    pub fn bullet_class(&self, name: &str) -> Result<&BulletClass> {
        self.data.bullets.get(name)
    }

    /// Whether any live actor stands on a tile.
    #[must_use]
    pub fn tile_has_actor(&self, tile: TilePos) -> bool {
        self.actors
            .iter()
            .any(|a| !a.dead && TilePos::containing(a.pos) == tile)
    }

    /// Add a cosmetic particle with the next local id.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownParticleClass`] for unknown classes.
    pub fn add_particle(&mut self, spawn: ParticleSpawn) -> Result<Uid> {
        self.data.particle(&spawn.class)?;
        let id = self.next_particle_id;
        self.particles.insert(Particle {
            id,
            class: spawn.class,
            pos: spawn.pos,
            z: spawn.z,
            dz: spawn.dz,
            angle: spawn.angle,
            text: spawn.text,
            draw_scale: spawn.draw_scale,
        })?;
        self.next_particle_id += 1;
        Ok(id)
    }

    /// Hash of the state every participant must agree on.
    ///
    /// Entities are hashed in UID order so the result does not depend on
    /// slot layout.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.map.hash(&mut hasher);

        self.actors.len().hash(&mut hasher);
        for actor in self.actors.iter_by_uid() {
            actor.hash(&mut hasher);
        }

        self.objects.len().hash(&mut hasher);
        for object in self.objects.iter_by_uid() {
            object.hash(&mut hasher);
        }

        self.pickups.len().hash(&mut hasher);
        for pickup in self.pickups.iter_by_uid() {
            pickup.hash(&mut hasher);
        }

        self.bullets.len().hash(&mut hasher);
        for bullet in self.bullets.iter_by_uid() {
            bullet.hash_replicated(&mut hasher);
        }

        self.players.len().hash(&mut hasher);
        for player in self.players.iter_by_uid() {
            player.uid.hash(&mut hasher);
            player.name.hash(&mut hasher);
            player.lives.hash(&mut hasher);
            player.score.hash(&mut hasher);
        }

        self.mission.hash(&mut hasher);
        self.config.hash(&mut hasher);
        self.mode.hash(&mut hasher);

        hasher.finish()
    }

    /// Serialize the world to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| SimError::InvalidState(format!("Failed to serialize world: {e}")))
    }

    /// Deserialize a world from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| SimError::InvalidState(format!("Failed to deserialize world: {e}")))
    }
}
