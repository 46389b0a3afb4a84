//! Swept-box collision resolution for projectiles.
//!
//! A bullet's box is swept from its start-of-tick position to where its
//! velocity takes it. Every wall tile and thing the sweep touches is a
//! candidate; the resolver then decides which of them count:
//!
//! - A non-piercing bullet keeps only the candidate closest to its start.
//!   Damage is decided after every candidate is known.
//! - A piercing bullet damages every eligible thing it crosses and still
//!   stops at the closest wall.
//!
//! Candidates are enumerated walls first (row-major), then actors, then map
//! objects, each in slot order. At equal distance the first one found wins.
//!
//! Resolution is read-only. The physics step turns a [`Resolution`] into
//! events and updates the bullet's cooldowns.

use crate::components::{Actor, Bullet, MapObject};
use crate::config::FRIENDLY_FIRE;
use crate::data::{BulletClass, SpecialDamage};
use crate::events::{Damage, HitType, ThingRef};
use crate::map::TilePos;
use crate::math::{Fixed, Vec2Fixed};
use crate::world::World;

/// Ticks a bullet waits before another hit may apply its special effect.
pub const SPECIAL_LOCK: i32 = 12;

/// Ticks a bullet waits before another hit may make a sound.
pub const SOUND_LOCK: i32 = 6;

/// A box moving in a straight line over one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sweep {
    /// Centre at the start of the step.
    pub start: Vec2Fixed,
    /// Centre at the end of the step.
    pub end: Vec2Fixed,
    /// Half extents of the moving box.
    pub half_size: Vec2Fixed,
}

impl Sweep {
    /// Sweep a box of full `size` from `start` to `end`.
    #[must_use]
    pub fn new(start: Vec2Fixed, end: Vec2Fixed, size: Vec2Fixed) -> Self {
        let two = Fixed::from_num(2);
        Self {
            start,
            end,
            half_size: Vec2Fixed::new(size.x / two, size.y / two),
        }
    }

    /// Displacement over the step.
    #[must_use]
    pub fn delta(&self) -> Vec2Fixed {
        self.end - self.start
    }

    /// Smallest box containing the whole sweep.
    #[must_use]
    pub fn bounds(&self) -> (Vec2Fixed, Vec2Fixed) {
        let min = Vec2Fixed::new(self.start.x.min(self.end.x), self.start.y.min(self.end.y));
        let max = Vec2Fixed::new(self.start.x.max(self.end.x), self.start.y.max(self.end.y));
        (min - self.half_size, max + self.half_size)
    }

    /// Point reached at fraction `t` of the step.
    #[must_use]
    pub fn point_at(&self, t: Fixed) -> Vec2Fixed {
        self.start.lerp(self.end, t)
    }
}

/// Where a sweep first touches a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepHit {
    /// Fraction of the step at first contact, in `[0, 1]`.
    pub t: Fixed,
    /// Unit normal of the face that was hit. Zero if the sweep started
    /// inside the box without moving.
    pub normal: Vec2Fixed,
}

/// Entry and exit fractions along one axis.
fn slab(start: Fixed, delta: Fixed, min: Fixed, max: Fixed) -> Option<(Fixed, Fixed)> {
    if delta == Fixed::ZERO {
        // Parallel to the slab: either always inside or never.
        return (start > min && start < max).then_some((Fixed::MIN, Fixed::MAX));
    }
    let t1 = (min - start).saturating_div(delta);
    let t2 = (max - start).saturating_div(delta);
    Some((t1.min(t2), t1.max(t2)))
}

fn face_normal(delta: Fixed) -> Fixed {
    -delta.signum()
}

/// Swept test of a moving box against a static box given by its corners.
///
/// Uses the slab method on the static box grown by the sweep's half
/// extents. Touching without overlapping is not a hit.
#[must_use]
pub fn sweep_aabb(sweep: &Sweep, min: Vec2Fixed, max: Vec2Fixed) -> Option<SweepHit> {
    let min = min - sweep.half_size;
    let max = max + sweep.half_size;
    let delta = sweep.delta();

    let (entry_x, exit_x) = slab(sweep.start.x, delta.x, min.x, max.x)?;
    let (entry_y, exit_y) = slab(sweep.start.y, delta.y, min.y, max.y)?;

    let entry = entry_x.max(entry_y);
    let exit = exit_x.min(exit_y);
    if entry >= exit || exit <= Fixed::ZERO || entry > Fixed::from_num(1) {
        return None;
    }

    let normal = if entry_x > entry_y {
        Vec2Fixed::new(face_normal(delta.x), Fixed::ZERO)
    } else {
        Vec2Fixed::new(Fixed::ZERO, face_normal(delta.y))
    };

    Some(SweepHit {
        t: entry.max(Fixed::ZERO),
        normal,
    })
}

/// Something a sweep can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// A shootable tile, or a tile outside the map.
    Wall(TilePos),
    /// An actor or map object.
    Thing(ThingRef),
}

/// A candidate touched by a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    /// What was touched.
    pub candidate: Candidate,
    /// Fraction of the step at first contact.
    pub t: Fixed,
    /// Centre of the moving box at first contact.
    pub pos: Vec2Fixed,
    /// Face normal.
    pub normal: Vec2Fixed,
}

/// Which candidate kinds [`overlap`] enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapFilter {
    /// Shootable tiles.
    pub walls: bool,
    /// Live actors.
    pub actors: bool,
    /// Shootable map objects.
    pub objects: bool,
}

impl OverlapFilter {
    /// Every candidate kind.
    pub const ALL: Self = Self {
        walls: true,
        actors: true,
        objects: true,
    };
}

fn box_corners(pos: Vec2Fixed, size: Vec2Fixed) -> (Vec2Fixed, Vec2Fixed) {
    let two = Fixed::from_num(2);
    let half = Vec2Fixed::new(size.x / two, size.y / two);
    (pos - half, pos + half)
}

/// Call `visit` once for every candidate the sweep touches, walls first,
/// then actors, then objects.
pub fn overlap<F>(world: &World, sweep: &Sweep, filter: OverlapFilter, mut visit: F)
where
    F: FnMut(Contact),
{
    let mut report = |candidate, hit: SweepHit| {
        visit(Contact {
            candidate,
            t: hit.t,
            pos: sweep.point_at(hit.t),
            normal: hit.normal,
        });
    };

    if filter.walls {
        let (min, max) = sweep.bounds();
        for tile in world.map.tiles_overlapping(min, max) {
            if !world.map.is_shootable(tile) {
                continue;
            }
            let (tile_min, tile_max) = tile.bounds();
            if let Some(hit) = sweep_aabb(sweep, tile_min, tile_max) {
                report(Candidate::Wall(tile), hit);
            }
        }
    }

    if filter.actors {
        for actor in world.actors.iter().filter(|a| !a.dead) {
            let (min, max) = box_corners(actor.pos, actor.size);
            if let Some(hit) = sweep_aabb(sweep, min, max) {
                report(Candidate::Thing(ThingRef::Actor(actor.uid)), hit);
            }
        }
    }

    if filter.objects {
        for object in world.objects.iter().filter(|o| o.shootable) {
            let (min, max) = box_corners(object.pos, object.size);
            if let Some(hit) = sweep_aabb(sweep, min, max) {
                report(Candidate::Thing(ThingRef::Object(object.uid)), hit);
            }
        }
    }
}

/// Whether two actors fight on opposite sides in the current game mode.
#[must_use]
pub fn are_enemies(world: &World, a: &Actor, b: &Actor) -> bool {
    a.uid != b.uid && (world.mode.is_pvp() || a.faction.is_good() != b.faction.is_good())
}

fn can_hit_actor(world: &World, bullet: &Bullet, actor: &Actor) -> bool {
    if Some(actor.uid) == bullet.owner || actor.dead {
        return false;
    }
    world.mode.is_pvp()
        || bullet.hurt_always
        || world.config.get_bool(FRIENDLY_FIRE)
        || bullet.faction.is_good() != actor.faction.is_good()
}

fn can_hit_object(object: &MapObject) -> bool {
    object.shootable
}

/// Friendly-fire rules: may this bullet damage `target`?
///
/// Stale targets cannot be hit.
#[must_use]
pub fn can_hit(world: &World, bullet: &Bullet, target: ThingRef) -> bool {
    match target {
        ThingRef::Actor(uid) => world
            .actors
            .get(uid)
            .is_some_and(|actor| can_hit_actor(world, bullet, actor)),
        ThingRef::Object(uid) => world.objects.get(uid).is_some_and(can_hit_object),
    }
}

/// The hit a bullet reacts to this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    /// Kind of surface. [`HitType::None`] for a thing hit while the
    /// bullet's sound cooldown runs.
    pub hit_type: HitType,
    /// Centre of the bullet at contact.
    pub pos: Vec2Fixed,
    /// Face normal at contact.
    pub normal: Vec2Fixed,
    /// What was hit.
    pub target: Candidate,
    /// Fraction of the step at contact.
    pub t: Fixed,
}

/// Outcome of resolving one bullet's sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// The hit to react to, if any.
    pub hit: Option<Hit>,
    /// Damage to apply, in the order it was decided.
    pub damage: Vec<Damage>,
}

impl Resolution {
    /// Whether the bullet hit anything it reacts to.
    #[must_use]
    pub fn is_hit(&self) -> bool {
        self.hit.is_some_and(|h| h.hit_type != HitType::None)
    }
}

fn thing_hit_type(bullet: &Bullet, target: ThingRef) -> HitType {
    if bullet.sound_lock > 0 {
        return HitType::None;
    }
    match target {
        ThingRef::Actor(_) => HitType::Flesh,
        ThingRef::Object(_) => HitType::Object,
    }
}

struct Resolver<'a> {
    bullet: &'a Bullet,
    class: &'a BulletClass,
    special_ready: bool,
    damage: Vec<Damage>,
}

impl Resolver<'_> {
    fn damage(&mut self, target: ThingRef) {
        let special = if self.special_ready {
            self.class.special
        } else {
            SpecialDamage::None
        };
        self.special_ready = false;
        self.damage.push(Damage {
            target,
            source: self.bullet.owner,
            power: self.class.power,
            mass: self.class.mass,
            vel: self.bullet.vel,
            special,
        });
    }
}

fn closer(best: Option<&(Fixed, Hit)>, distance: Fixed) -> bool {
    best.map_or(true, |(d, _)| distance < *d)
}

/// Resolve what `bullet` hits while moving from `start` to `end`.
///
/// Only the session authority calls this. The bullet's cooldowns are read
/// as they stand at the start of the step.
#[must_use]
pub fn resolve(
    world: &World,
    bullet: &Bullet,
    class: &BulletClass,
    start: Vec2Fixed,
    end: Vec2Fixed,
) -> Resolution {
    let sweep = Sweep::new(start, end, class.size);
    let mut resolver = Resolver {
        bullet,
        class,
        special_ready: bullet.special_lock == 0,
        damage: Vec::new(),
    };

    let mut closest: Option<(Fixed, Hit)> = None;
    let mut first_pierced: Option<Hit> = None;

    overlap(world, &sweep, OverlapFilter::ALL, |contact| {
        let distance = contact.pos.distance_squared(start);
        match contact.candidate {
            Candidate::Wall(_) => {
                if closer(closest.as_ref(), distance) {
                    let hit = Hit {
                        hit_type: HitType::Wall,
                        pos: contact.pos,
                        normal: contact.normal,
                        target: contact.candidate,
                        t: contact.t,
                    };
                    closest = Some((distance, hit));
                }
            }
            Candidate::Thing(target) => {
                if !can_hit(world, bullet, target) {
                    return;
                }
                let hit = Hit {
                    hit_type: thing_hit_type(bullet, target),
                    pos: contact.pos,
                    normal: contact.normal,
                    target: contact.candidate,
                    t: contact.t,
                };
                if class.persists {
                    resolver.damage(target);
                    first_pierced.get_or_insert(hit);
                } else if closer(closest.as_ref(), distance) {
                    closest = Some((distance, hit));
                }
            }
        }
    });

    let hit = if class.persists {
        closest.map(|(_, hit)| hit).or(first_pierced)
    } else {
        let hit = closest.map(|(_, hit)| hit);
        if let Some(Hit {
            hit_type: HitType::Flesh | HitType::Object,
            target: Candidate::Thing(target),
            ..
        }) = hit
        {
            resolver.damage(target);
        }
        hit
    };

    Resolution {
        hit,
        damage: resolver.damage,
    }
}

/// Reflect a velocity off a surface and carry the rest of the step.
///
/// Returns the position at the end of the step and the new velocity. The
/// reflected velocity is scaled by `restitution`; `1` keeps the speed.
#[must_use]
pub fn bounce(
    contact: Vec2Fixed,
    vel: Vec2Fixed,
    normal: Vec2Fixed,
    t: Fixed,
    ticks: i32,
    restitution: Fixed,
) -> (Vec2Fixed, Vec2Fixed) {
    let reflected = vel.reflect(normal).scale(restitution);
    let remaining = (Fixed::from_num(1) - t) * Fixed::from_num(ticks);
    (contact + reflected.scale(remaining), reflected)
}
