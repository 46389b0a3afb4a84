//! Entity records stored in the world registries.
//!
//! These are plain data. The dispatcher is the only code that changes
//! them, except for a bullet's own kinematic fields which the physics
//! step advances in place.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::data::SpecialDamage;
use crate::math::{Fixed, Vec2Fixed};
use crate::registry::{Tracked, Uid};

/// Side an actor fights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Faction {
    /// Controlled by a player.
    #[default]
    Player,
    /// Friendly non-player character.
    Ally,
    /// Hostile.
    Enemy,
}

impl Faction {
    /// Players and allies are on the same side.
    #[must_use]
    pub const fn is_good(self) -> bool {
        matches!(self, Self::Player | Self::Ally)
    }
}

/// Eight-way facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Up.
    #[default]
    Up,
    /// Up and right.
    UpRight,
    /// Right.
    Right,
    /// Down and right.
    DownRight,
    /// Down.
    Down,
    /// Down and left.
    DownLeft,
    /// Left.
    Left,
    /// Up and left.
    UpLeft,
}

/// Actor animation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActorAnimation {
    /// Standing still.
    #[default]
    Idle,
    /// Walking.
    Walking,
    /// Looking around.
    IdleLook,
    /// Dying.
    Dying,
}

/// Gun readiness shown by the HUD and sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GunState {
    /// Ready to fire.
    #[default]
    Ready,
    /// Firing.
    Firing,
    /// Cooling down.
    Recoil,
    /// Reloading.
    Reloading,
}

/// Character behaviour flags relevant to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CharacterFlags {
    /// Waiting to be rescued.
    pub prisoner: bool,
    /// Has been rescued.
    pub rescued: bool,
    /// Follows a player.
    pub follower: bool,
}

/// A character on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier.
    pub uid: Uid,
    /// Controlling player, if any.
    pub player: Option<Uid>,
    /// Side.
    pub faction: Faction,
    /// Centre position.
    pub pos: Vec2Fixed,
    /// Velocity.
    pub vel: Vec2Fixed,
    /// Collision box (width, height).
    pub size: Vec2Fixed,
    /// Current health.
    pub health: i32,
    /// Health cap.
    pub max_health: i32,
    /// Dead actors are ignored by collision and healing.
    pub dead: bool,
    /// Facing.
    pub direction: Direction,
    /// Animation state.
    pub state: ActorAnimation,
    /// Carried weapon class names.
    pub guns: Vec<String>,
    /// Selected gun.
    pub gun_index: usize,
    /// Gun readiness.
    pub gun_state: GunState,
    /// Ammo carried, by ammo id.
    pub ammo: BTreeMap<usize, i32>,
    /// Behaviour flags.
    pub flags: CharacterFlags,
    /// Picks up everything it walks over.
    pub pickup_all: bool,
    /// Last status effect inflicted.
    pub status: SpecialDamage,
}

impl Actor {
    /// A fresh actor with full health and no guns.
    #[must_use]
    pub fn new(uid: Uid, faction: Faction, pos: Vec2Fixed, health: i32) -> Self {
        Self {
            uid,
            player: None,
            faction,
            pos,
            vel: Vec2Fixed::ZERO,
            size: Vec2Fixed::from_ints(8, 8),
            health,
            max_health: health,
            dead: false,
            direction: Direction::default(),
            state: ActorAnimation::default(),
            guns: Vec::new(),
            gun_index: 0,
            gun_state: GunState::default(),
            ammo: BTreeMap::new(),
            flags: CharacterFlags::default(),
            pickup_all: false,
            status: SpecialDamage::None,
        }
    }

    /// Currently selected weapon class name.
    #[must_use]
    pub fn gun(&self) -> Option<&str> {
        self.guns.get(self.gun_index).map(String::as_str)
    }
}

impl Tracked for Actor {
    const KIND: &'static str = "actor";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// A static, possibly destructible, map object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapObject {
    /// Stable identifier.
    pub uid: Uid,
    /// Object class name.
    pub class: String,
    /// Centre position.
    pub pos: Vec2Fixed,
    /// Collision box (width, height).
    pub size: Vec2Fixed,
    /// Remaining health; objects at zero are destroyed.
    pub health: i32,
    /// Whether bullets collide with it.
    pub shootable: bool,
    /// Mission objective this object counts toward when destroyed.
    pub objective: Option<usize>,
    /// Respawn countdown for pickup spawners.
    pub counter: i32,
}

impl Tracked for MapObject {
    const KIND: &'static str = "map object";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// What a pickup gives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PickupKind {
    /// Restores health.
    Health(i32),
    /// Adds ammo.
    Ammo {
        /// Ammo id.
        id: usize,
        /// Amount.
        amount: i32,
    },
    /// Gives a weapon.
    Gun(String),
    /// Grants key flags.
    Keys(u32),
}

/// An item lying on the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pickup {
    /// Stable identifier.
    pub uid: Uid,
    /// Contents.
    pub kind: PickupKind,
    /// Position.
    pub pos: Vec2Fixed,
    /// Spawned by a random powerup spawner.
    pub random_spawned: bool,
    /// Spawner object that produced it.
    pub spawner: Option<Uid>,
}

impl Tracked for Pickup {
    const KIND: &'static str = "pickup";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// A cosmetic particle. Ids are assigned locally by each participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Particle {
    /// Local identifier.
    pub id: Uid,
    /// Particle class name.
    pub class: String,
    /// Position.
    pub pos: Vec2Fixed,
    /// Height.
    pub z: Fixed,
    /// Vertical speed.
    pub dz: Fixed,
    /// Rotation, radians.
    pub angle: Fixed,
    /// Text for popup particles.
    pub text: Option<String>,
    /// Stretch applied when drawing (trails).
    pub draw_scale: Vec2Fixed,
}

impl Tracked for Particle {
    const KIND: &'static str = "particle";

    fn uid(&self) -> Uid {
        self.id
    }
}

/// A participant's player slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Player {
    /// Stable identifier.
    pub uid: Uid,
    /// Display name.
    pub name: String,
    /// Remaining lives.
    pub lives: i32,
    /// Score.
    pub score: i32,
    /// Controlled on this machine.
    pub local: bool,
}

impl Tracked for Player {
    const KIND: &'static str = "player";

    fn uid(&self) -> Uid {
        self.uid
    }
}

/// A live projectile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bullet {
    /// Stable identifier.
    pub uid: Uid,
    /// Firing actor, if any.
    pub owner: Option<Uid>,
    /// Side of the firing actor, for friendly-fire checks.
    pub faction: Faction,
    /// Ignores friendly-fire rules.
    pub hurt_always: bool,
    /// Bullet class name.
    pub class: String,
    /// Position.
    pub pos: Vec2Fixed,
    /// Position at the start of the last step (trail origin).
    pub last_pos: Vec2Fixed,
    /// Velocity in map units per tick.
    pub vel: Vec2Fixed,
    /// Height above the ground.
    pub z: Fixed,
    /// Vertical speed.
    pub dz: Fixed,
    /// Ticks alive.
    pub count: i32,
    /// Rolled lifetime; negative means unlimited.
    pub range: i32,
    /// Ticks until another hit may apply its special effect.
    pub special_lock: i32,
    /// Ticks until another hit may play a sound.
    pub sound_lock: i32,
    /// Drop guns already fired.
    pub has_dropped: bool,
    /// Ticks until the next trail particle.
    pub trail_counter: i32,
}

impl Bullet {
    /// Hash the fields every participant agrees on.
    ///
    /// Hit cooldowns only advance on the side that resolves collisions,
    /// so they are left out.
    pub fn hash_replicated<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
        self.owner.hash(state);
        self.class.hash(state);
        self.pos.hash(state);
        self.vel.hash(state);
        self.z.hash(state);
        self.dz.hash(state);
        self.count.hash(state);
        self.range.hash(state);
    }
}

impl Tracked for Bullet {
    const KIND: &'static str = "bullet";

    fn uid(&self) -> Uid {
        self.uid
    }
}
