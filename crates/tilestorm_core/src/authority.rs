//! Session role: who decides what happened.
//!
//! Exactly one participant (the host) detects collisions, fires follow-up
//! guns, rolls random values and hands out UIDs. Everyone else replays the
//! host's events. The difference is captured by one [`Authority`] object
//! injected into the session, so simulation code asks it at each decision
//! point instead of branching on a role flag.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::Faction;
use crate::data::GameData;
use crate::error::Result;
use crate::events::{BulletSpawn, Event};
use crate::math::{Fixed, Vec2Fixed};
use crate::registry::Uid;

/// Wall mark height offsets are rolled in `-WALL_MARK_JITTER..=WALL_MARK_JITTER`.
pub const WALL_MARK_JITTER: i32 = 5;

/// Where and how a batch of guns is fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GunShot {
    /// Actor credited with the bullets.
    pub owner: Option<Uid>,
    /// Side for friendly-fire checks.
    pub faction: Faction,
    /// Bullets ignore friendly-fire rules.
    pub hurt_always: bool,
    /// Muzzle position.
    pub pos: Vec2Fixed,
    /// Launch height.
    pub z: Fixed,
    /// Aim; need not be normalised. Zero aims along +x.
    pub direction: Vec2Fixed,
}

/// Decisions only the simulation owner may take.
pub trait Authority: Send + fmt::Debug {
    /// Whether this participant resolves projectile collisions.
    fn resolves_hits(&self) -> bool;

    /// Whether this participant runs proximity detonation checks.
    fn detects_proximity(&self) -> bool;

    /// Turn gun names into `GunFire` and `AddBullet` events with every random
    /// value pre-rolled.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown weapon or bullet classes.
    fn fire_guns(&mut self, data: &GameData, guns: &[String], shot: &GunShot)
        -> Result<Vec<Event>>;

    /// Height offset for a wall mark.
    fn roll_wall_mark_z(&mut self) -> Fixed;

    /// Offer a shared event for publication.
    ///
    /// Returns whether the event should also be applied locally. A replica
    /// never originates shared events; it receives the host's copy instead.
    fn publish(&mut self, event: &Event) -> bool;

    /// Take everything published since the last call.
    fn take_outbox(&mut self) -> Vec<Event>;

    /// A fresh entity UID, `None` if this participant may not create entities.
    fn allocate_uid(&mut self) -> Option<Uid>;

    /// The UID [`allocate_uid`](Self::allocate_uid) hands out next, if any.
    fn uid_counter(&self) -> Option<Uid>;

    /// Continue allocating from `next`. Never moves the counter backwards.
    fn resume_uid_counter(&mut self, next: Uid);
}

/// The simulation owner.
#[derive(Debug, Clone)]
pub struct HostAuthority {
    rng: ChaCha8Rng,
    next_uid: Uid,
    outbox: Vec<Event>,
}

impl HostAuthority {
    /// Create a host whose rolls are seeded by `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_uid: 1,
            outbox: Vec::new(),
        }
    }

    fn next_uid(&mut self) -> Uid {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }

    fn roll_fixed(&mut self, low: Fixed, high: Fixed) -> Fixed {
        if low >= high {
            return low;
        }
        Fixed::from_bits(self.rng.gen_range(low.to_bits()..=high.to_bits()))
    }

    fn roll_range(&mut self, low: i32, high: i32) -> i32 {
        if low >= high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    fn fire_gun(
        &mut self,
        data: &GameData,
        name: &str,
        shot: &GunShot,
        out: &mut Vec<Event>,
    ) -> Result<()> {
        let weapon = data.weapons.get(name)?;
        let aim = if shot.direction.is_zero() {
            Vec2Fixed::from_ints(1, 0)
        } else {
            shot.direction.normalize()
        };

        out.push(Event::GunFire {
            actor: shot.owner,
            gun: name.to_string(),
            pos: shot.pos,
            z: shot.z,
            direction: aim,
            play_sound: true,
        });

        let Some(bullet) = &weapon.bullet else {
            return Ok(());
        };
        let class = data.bullets.get(bullet)?;
        let half_recoil = weapon.recoil / Fixed::from_num(2);

        let mut angle = weapon.spread_start();
        for _ in 0..weapon.spread.count.max(1) {
            let recoil = self.roll_fixed(-half_recoil, half_recoil);
            let speed = self.roll_fixed(class.speed_low, class.speed_high);
            let range = self.roll_range(class.range_low, class.range_high);
            let dz = self.roll_fixed(weapon.elevation_low, weapon.elevation_high);
            let uid = self.next_uid();

            out.push(Event::AddBullet(BulletSpawn {
                uid,
                class: bullet.clone(),
                owner: shot.owner,
                faction: shot.faction,
                hurt_always: shot.hurt_always,
                pos: shot.pos,
                z: shot.z + weapon.muzzle_height,
                dz,
                direction: aim.rotate(angle + recoil),
                speed,
                range,
            }));
            angle += weapon.spread.width;
        }
        Ok(())
    }
}

impl Authority for HostAuthority {
    fn resolves_hits(&self) -> bool {
        true
    }

    fn detects_proximity(&self) -> bool {
        true
    }

    fn fire_guns(
        &mut self,
        data: &GameData,
        guns: &[String],
        shot: &GunShot,
    ) -> Result<Vec<Event>> {
        let mut out = Vec::new();
        for gun in guns {
            self.fire_gun(data, gun, shot, &mut out)?;
        }
        Ok(out)
    }

    fn roll_wall_mark_z(&mut self) -> Fixed {
        Fixed::from_num(self.rng.gen_range(-WALL_MARK_JITTER..=WALL_MARK_JITTER))
    }

    fn publish(&mut self, event: &Event) -> bool {
        self.outbox.push(event.clone());
        true
    }

    fn take_outbox(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    fn allocate_uid(&mut self) -> Option<Uid> {
        Some(self.next_uid())
    }

    fn uid_counter(&self) -> Option<Uid> {
        Some(self.next_uid)
    }

    fn resume_uid_counter(&mut self, next: Uid) {
        self.next_uid = self.next_uid.max(next);
    }
}

/// A participant that only replays the host's events.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplicaAuthority;

impl Authority for ReplicaAuthority {
    fn resolves_hits(&self) -> bool {
        false
    }

    fn detects_proximity(&self) -> bool {
        false
    }

    fn fire_guns(&mut self, _: &GameData, _: &[String], _: &GunShot) -> Result<Vec<Event>> {
        Ok(Vec::new())
    }

    fn roll_wall_mark_z(&mut self) -> Fixed {
        Fixed::ZERO
    }

    fn publish(&mut self, event: &Event) -> bool {
        tracing::trace!(kind = event.kind(), "Replica dropped shared event");
        false
    }

    fn take_outbox(&mut self) -> Vec<Event> {
        Vec::new()
    }

    fn allocate_uid(&mut self) -> Option<Uid> {
        None
    }

    fn uid_counter(&self) -> Option<Uid> {
        None
    }

    fn resume_uid_counter(&mut self, _: Uid) {}
}
