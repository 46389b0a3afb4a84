//! Game events: the only channel through which shared world state changes.
//!
//! Every mutation of the registries, the map or the mission is expressed as
//! an [`Event`], queued, and applied by the dispatcher a tick later on every
//! participant. Payloads reference entities by UID, never by slot.
//!
//! Events also have a compact wire form (bincode over serde) so the host
//! can ship them to replicas unchanged.

use serde::{Deserialize, Serialize};

use crate::components::{
    ActorAnimation, CharacterFlags, Direction, Faction, GunState, PickupKind,
};
use crate::data::SpecialDamage;
use crate::error::Result;
use crate::map::TilePos;
use crate::math::{fixed_serde, Fixed, Vec2Fixed};
use crate::registry::Uid;

/// Who an emitted event is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Applied locally and, on the host, published to every replica.
    Shared,
    /// Applied locally only. Every participant derives it for itself.
    Local,
}

/// What a projectile hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HitType {
    /// Nothing, or a hit that makes no sound.
    #[default]
    None,
    /// A wall tile.
    Wall,
    /// A map object.
    Object,
    /// An actor.
    Flesh,
}

/// Reference to something that can take damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThingRef {
    /// An actor.
    Actor(Uid),
    /// A map object.
    Object(Uid),
}

/// A horizontal run of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRun {
    /// First tile.
    pub start: TilePos,
    /// Number of further tiles after `start` (row-wrapping).
    pub run: u32,
}

/// Damage dealt to an actor or object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    /// Who is hurt.
    pub target: ThingRef,
    /// Actor credited with the damage.
    pub source: Option<Uid>,
    /// Health removed.
    pub power: i32,
    /// Knockback mass.
    #[serde(with = "fixed_serde")]
    pub mass: Fixed,
    /// Velocity of the hitting projectile.
    pub vel: Vec2Fixed,
    /// Status effect.
    pub special: SpecialDamage,
}

/// Everything needed to add an actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorSpawn {
    /// New UID.
    pub uid: Uid,
    /// Controlling player.
    pub player: Option<Uid>,
    /// Side.
    pub faction: Faction,
    /// Position.
    pub pos: Vec2Fixed,
    /// Starting health.
    pub health: i32,
    /// Health cap.
    pub max_health: i32,
    /// Weapon class names.
    pub guns: Vec<String>,
    /// Behaviour flags.
    pub flags: CharacterFlags,
}

/// Everything needed to add a bullet, with every random value already rolled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletSpawn {
    /// New UID.
    pub uid: Uid,
    /// Bullet class name.
    pub class: String,
    /// Firing actor.
    pub owner: Option<Uid>,
    /// Side of the firing actor.
    pub faction: Faction,
    /// Ignores friendly-fire rules.
    pub hurt_always: bool,
    /// Muzzle position.
    pub pos: Vec2Fixed,
    /// Muzzle height.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
    /// Rolled launch elevation.
    #[serde(with = "fixed_serde")]
    pub dz: Fixed,
    /// Unit aim direction after spread and recoil.
    pub direction: Vec2Fixed,
    /// Rolled launch speed.
    #[serde(with = "fixed_serde")]
    pub speed: Fixed,
    /// Rolled lifetime.
    pub range: i32,
}

/// Outcome of a projectile hit, replayed on every participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletBounce {
    /// Projectile.
    pub uid: Uid,
    /// What was hit.
    pub hit_type: HitType,
    /// Contact point (sparks and sounds).
    pub pos: Vec2Fixed,
    /// Where the projectile continues from.
    pub bounce_pos: Vec2Fixed,
    /// Velocity after the hit.
    pub vel: Vec2Fixed,
    /// Play the class's hit sound.
    pub hit_sound: bool,
    /// Spawn the class's spark particle.
    pub spark: bool,
    /// Spawn the class's wall mark particle.
    pub wall_mark: bool,
    /// Height of the wall mark.
    #[serde(with = "fixed_serde")]
    pub wall_mark_z: Fixed,
}

/// A particle to add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticleSpawn {
    /// Particle class name.
    pub class: String,
    /// Position.
    pub pos: Vec2Fixed,
    /// Height.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
    /// Vertical speed.
    #[serde(with = "fixed_serde")]
    pub dz: Fixed,
    /// Rotation, radians.
    #[serde(with = "fixed_serde")]
    pub angle: Fixed,
    /// Popup text.
    pub text: Option<String>,
    /// Draw stretch.
    pub draw_scale: Vec2Fixed,
}

impl ParticleSpawn {
    /// A plain particle at a point.
    #[must_use]
    pub fn at(class: impl Into<String>, pos: Vec2Fixed) -> Self {
        Self {
            class: class.into(),
            pos,
            z: Fixed::ZERO,
            dz: Fixed::ZERO,
            angle: Fixed::ZERO,
            text: None,
            draw_scale: Vec2Fixed::from_ints(1, 1),
        }
    }
}

/// Every kind of state change the simulation knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // === Players ===
    /// Add or update a player.
    PlayerData {
        /// Player UID.
        uid: Uid,
        /// Display name.
        name: String,
        /// Lives.
        lives: i32,
        /// Controlled on the receiving machine.
        local: bool,
    },
    /// Remove a player.
    PlayerRemove {
        /// Player UID.
        uid: Uid,
    },
    /// Add to a player's score.
    Score {
        /// Player UID.
        player: Uid,
        /// Points added.
        points: i32,
    },

    // === Map ===
    /// Set a run of tiles to a class.
    TileSet {
        /// First tile.
        pos: TilePos,
        /// Tile class name.
        class: String,
        /// Alternate class name.
        class_alt: Option<String>,
        /// Further tiles after `pos`, wrapping rows.
        run_length: u32,
    },
    /// Mark runs of tiles explored.
    ExploreTiles {
        /// Runs.
        runs: Vec<TileRun>,
    },

    // === Things ===
    /// Damage an actor or object.
    ThingDamage(Damage),
    /// Add a map object.
    MapObjectAdd {
        /// New UID.
        uid: Uid,
        /// Object class name.
        class: String,
        /// Position.
        pos: Vec2Fixed,
        /// Collision box.
        size: Vec2Fixed,
        /// Health.
        health: i32,
        /// Bullets collide with it.
        shootable: bool,
        /// Objective counted when destroyed.
        objective: Option<usize>,
    },
    /// Remove a map object.
    MapObjectRemove {
        /// Object UID.
        uid: Uid,
        /// Actor that destroyed it, `None` if removed for other reasons.
        destroyed_by: Option<Uid>,
    },

    // === Actors ===
    /// Add an actor.
    ActorAdd(ActorSpawn),
    /// Set an actor's position and velocity.
    ActorMove {
        /// Actor UID.
        uid: Uid,
        /// Position.
        pos: Vec2Fixed,
        /// Velocity.
        vel: Vec2Fixed,
    },
    /// Set an actor's animation state.
    ActorState {
        /// Actor UID.
        uid: Uid,
        /// State.
        state: ActorAnimation,
    },
    /// Set an actor's facing.
    ActorDir {
        /// Actor UID.
        uid: Uid,
        /// Facing.
        dir: Direction,
    },
    /// Start a slide.
    ActorSlide {
        /// Actor UID.
        uid: Uid,
        /// Slide velocity.
        vel: Vec2Fixed,
    },
    /// Push an actor.
    ActorImpulse {
        /// Actor UID.
        uid: Uid,
        /// Velocity added.
        vel: Vec2Fixed,
        /// Authoritative position to snap to.
        pos: Option<Vec2Fixed>,
    },
    /// Select a carried gun.
    ActorSwitchGun {
        /// Actor UID.
        uid: Uid,
        /// Gun index.
        gun_index: usize,
    },
    /// Toggle pick-up-everything.
    ActorPickupAll {
        /// Actor UID.
        uid: Uid,
        /// New value.
        pickup_all: bool,
    },
    /// Replace (or append) a carried gun.
    ActorReplaceGun {
        /// Actor UID.
        uid: Uid,
        /// Gun index; equal to the gun count to append.
        gun_index: usize,
        /// Weapon class name.
        gun: String,
    },
    /// Heal an actor.
    ActorHeal {
        /// Actor UID.
        uid: Uid,
        /// Health restored.
        amount: i32,
        /// Came from a random powerup spawner.
        random_spawned: bool,
    },
    /// Give ammo.
    ActorAddAmmo {
        /// Actor UID.
        uid: Uid,
        /// Ammo id.
        ammo_id: usize,
        /// Amount.
        amount: i32,
        /// Came from a random powerup spawner.
        random_spawned: bool,
    },
    /// Spend ammo.
    ActorUseAmmo {
        /// Actor UID.
        uid: Uid,
        /// Ammo id.
        ammo_id: usize,
        /// Amount.
        amount: i32,
    },
    /// Kill and remove an actor.
    ActorDie {
        /// Actor UID.
        uid: Uid,
    },
    /// Melee attack.
    ActorMelee {
        /// Attacker UID.
        attacker: Uid,
        /// Target.
        target: ThingRef,
        /// Damage.
        power: i32,
        /// Status effect.
        special: SpecialDamage,
        /// Sound to play.
        hit_type: HitType,
    },
    /// Free a prisoner.
    RescueCharacter {
        /// Actor UID.
        uid: Uid,
    },

    // === Pickups ===
    /// Add a pickup.
    AddPickup {
        /// New UID.
        uid: Uid,
        /// Contents.
        kind: PickupKind,
        /// Position.
        pos: Vec2Fixed,
        /// Came from a random powerup spawner.
        random_spawned: bool,
        /// Spawner object.
        spawner: Option<Uid>,
    },
    /// Remove a pickup.
    RemovePickup {
        /// Pickup UID.
        uid: Uid,
        /// Spawner object to restart.
        spawner: Option<Uid>,
    },

    // === Guns and bullets ===
    /// Cosmetic side of a gun firing (flash, sound, shake).
    GunFire {
        /// Firing actor.
        actor: Option<Uid>,
        /// Weapon class name.
        gun: String,
        /// Muzzle position.
        pos: Vec2Fixed,
        /// Muzzle height.
        #[serde(with = "fixed_serde")]
        z: Fixed,
        /// Aim direction.
        direction: Vec2Fixed,
        /// Play the firing sound.
        play_sound: bool,
    },
    /// Cosmetic side of a reload.
    GunReload {
        /// Reloading actor.
        actor: Option<Uid>,
        /// Weapon class name.
        gun: String,
        /// Position.
        pos: Vec2Fixed,
    },
    /// Set an actor's gun state.
    GunState {
        /// Actor UID.
        actor: Uid,
        /// State.
        state: GunState,
    },
    /// Add a bullet.
    AddBullet(BulletSpawn),
    /// Replay a projectile hit.
    BulletBounce(BulletBounce),
    /// Remove a bullet.
    RemoveBullet {
        /// Bullet UID.
        uid: Uid,
    },

    // === Particles ===
    /// Add a particle.
    AddParticle(ParticleSpawn),
    /// Remove a particle.
    RemoveParticle {
        /// Local particle id.
        id: Uid,
    },

    // === Presentation ===
    /// Play a sound at a position.
    SoundAt {
        /// Sound name.
        sound: String,
        /// Position.
        pos: Vec2Fixed,
        /// Bullet hit sound (suppressed by `Sound.Hits`).
        is_hit: bool,
    },
    /// Shake the screen.
    ScreenShake {
        /// Strength.
        amount: i32,
        /// Only shake for the camera following this actor.
        subject: Option<Uid>,
    },
    /// Show a centre-screen message.
    SetMessage {
        /// Text.
        message: String,
        /// Duration in ticks.
        ticks: i32,
    },

    // === Config ===
    /// Override a runtime config value.
    Config {
        /// Key.
        name: String,
        /// Value as text.
        value: String,
    },

    // === Mission ===
    /// Mission loaded.
    GameStart,
    /// Mission begins.
    GameBegin,
    /// Progress an objective.
    ObjectiveUpdate {
        /// Objective index.
        objective: usize,
        /// Amount added.
        count: i32,
    },
    /// Collect keys.
    AddKeys {
        /// Key flags.
        flags: u32,
        /// Where they were collected, for the popup.
        pos: Option<Vec2Fixed>,
    },
    /// All objectives done.
    MissionComplete {
        /// Show the completion message.
        show_message: bool,
        /// Exit area corners.
        exit: Option<(TilePos, TilePos)>,
    },
    /// Objectives no longer complete.
    MissionIncomplete,
    /// Start the pickup phase.
    MissionPickup,
    /// Mission over.
    MissionEnd {
        /// Players quit.
        quit: bool,
        /// Final message.
        message: String,
    },
}

impl Event {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PlayerData { .. } => "PlayerData",
            Self::PlayerRemove { .. } => "PlayerRemove",
            Self::Score { .. } => "Score",
            Self::TileSet { .. } => "TileSet",
            Self::ExploreTiles { .. } => "ExploreTiles",
            Self::ThingDamage(_) => "ThingDamage",
            Self::MapObjectAdd { .. } => "MapObjectAdd",
            Self::MapObjectRemove { .. } => "MapObjectRemove",
            Self::ActorAdd(_) => "ActorAdd",
            Self::ActorMove { .. } => "ActorMove",
            Self::ActorState { .. } => "ActorState",
            Self::ActorDir { .. } => "ActorDir",
            Self::ActorSlide { .. } => "ActorSlide",
            Self::ActorImpulse { .. } => "ActorImpulse",
            Self::ActorSwitchGun { .. } => "ActorSwitchGun",
            Self::ActorPickupAll { .. } => "ActorPickupAll",
            Self::ActorReplaceGun { .. } => "ActorReplaceGun",
            Self::ActorHeal { .. } => "ActorHeal",
            Self::ActorAddAmmo { .. } => "ActorAddAmmo",
            Self::ActorUseAmmo { .. } => "ActorUseAmmo",
            Self::ActorDie { .. } => "ActorDie",
            Self::ActorMelee { .. } => "ActorMelee",
            Self::RescueCharacter { .. } => "RescueCharacter",
            Self::AddPickup { .. } => "AddPickup",
            Self::RemovePickup { .. } => "RemovePickup",
            Self::GunFire { .. } => "GunFire",
            Self::GunReload { .. } => "GunReload",
            Self::GunState { .. } => "GunState",
            Self::AddBullet(_) => "AddBullet",
            Self::BulletBounce(_) => "BulletBounce",
            Self::RemoveBullet { .. } => "RemoveBullet",
            Self::AddParticle(_) => "AddParticle",
            Self::RemoveParticle { .. } => "RemoveParticle",
            Self::SoundAt { .. } => "SoundAt",
            Self::ScreenShake { .. } => "ScreenShake",
            Self::SetMessage { .. } => "SetMessage",
            Self::Config { .. } => "Config",
            Self::GameStart => "GameStart",
            Self::GameBegin => "GameBegin",
            Self::ObjectiveUpdate { .. } => "ObjectiveUpdate",
            Self::AddKeys { .. } => "AddKeys",
            Self::MissionComplete { .. } => "MissionComplete",
            Self::MissionIncomplete => "MissionIncomplete",
            Self::MissionPickup => "MissionPickup",
            Self::MissionEnd { .. } => "MissionEnd",
        }
    }

    /// Encode to the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Codec`](crate::error::SimError::Codec) if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from the wire form.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::Codec`](crate::error::SimError::Codec) for truncated or
    /// unknown payloads.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
