//! Per-tick projectile motion.
//!
//! [`step_bullet`] advances one bullet by `ticks`: ageing, range, seeking,
//! collision, falling, friction, movement, jitter, proximity and trail, in
//! that order. It changes only the bullet's own kinematic record. Anything
//! that touches the rest of the world comes back as events.
//!
//! Kinematics never depend on the session role. A hit found by the
//! authority is reported as a `BulletBounce` event that every participant
//! applies on the next drain, so host and replicas integrate the same
//! positions in between.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::authority::{Authority, GunShot};
use crate::collision::{self, Hit, Resolution, SOUND_LOCK, SPECIAL_LOCK};
use crate::components::{Actor, Bullet};
use crate::config::RESTITUTION;
use crate::data::BulletClass;
use crate::error::Result;
use crate::events::{BulletBounce, Event, HitType, ParticleSpawn, Scope};
use crate::map::TilePos;
use crate::math::{Fixed, Vec2Fixed};
use crate::world::World;

/// Seeking is skipped when the target is further than this on either axis.
pub const SEEK_LIMIT: i32 = 40;

/// Proximity checks run on ticks divisible by this.
pub const PROXIMITY_INTERVAL: i32 = 4;

/// How a step's collision ended for the bullet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Contact {
    /// Nothing stopped it.
    Clear,
    /// It was absorbed and dies.
    Absorbed,
    /// It bounced off a wall. The `BulletBounce` event places it.
    Bounced,
}

/// What one step produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Whether the bullet lives on. Dead bullets are removed by a
    /// `RemoveBullet` event, never directly.
    pub alive: bool,
    /// Events requested by the step, in order.
    pub events: Vec<(Scope, Event)>,
}

/// Steer `vel` toward `target`, keeping at least `speed_min`.
///
/// Returns `vel` unchanged when the target is out of reach or exactly where
/// the bullet is about to be.
#[must_use]
pub fn seek_towards(
    pos: Vec2Fixed,
    vel: Vec2Fixed,
    speed_min: Fixed,
    target: Vec2Fixed,
    factor: Fixed,
) -> Vec2Fixed {
    let to_target = target - pos - vel;
    let limit = Fixed::from_num(SEEK_LIMIT);
    if to_target.is_zero() || to_target.x.abs() > limit || to_target.y.abs() > limit {
        return vel;
    }
    let speed = vel.length().max(speed_min);
    let blended = vel.normalize().scale(factor) + to_target.normalize();
    blended.scale(speed / (factor + Fixed::from_num(1)))
}

/// Slow one velocity component toward zero without crossing it.
fn apply_friction(component: Fixed, amount: Fixed) -> Fixed {
    if component > Fixed::ZERO {
        (component - amount).max(Fixed::ZERO)
    } else if component < Fixed::ZERO {
        (component + amount).min(Fixed::ZERO)
    } else {
        component
    }
}

/// Random stream for erratic jitter, identical on every participant.
fn jitter_rng(uid: u64, count: i32) -> ChaCha8Rng {
    let seed = uid.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ u64::from(count.unsigned_abs());
    ChaCha8Rng::seed_from_u64(seed)
}

fn nearest_enemy<'w>(world: &'w World, owner: &Actor, pos: Vec2Fixed) -> Option<&'w Actor> {
    let mut best: Option<(Fixed, &Actor)> = None;
    for actor in world.actors.iter() {
        if actor.dead || !collision::are_enemies(world, owner, actor) {
            continue;
        }
        let distance = actor.pos.distance_squared(pos);
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, actor));
        }
    }
    best.map(|(_, actor)| actor)
}

struct Step<'a> {
    world: &'a World,
    class: &'a BulletClass,
    authority: &'a mut dyn Authority,
    ticks: i32,
    events: Vec<(Scope, Event)>,
}

impl Step<'_> {
    fn shared(&mut self, event: Event) {
        self.events.push((Scope::Shared, event));
    }

    fn local(&mut self, event: Event) {
        self.events.push((Scope::Local, event));
    }

    fn fire(&mut self, bullet: &Bullet, guns: &[String]) -> Result<()> {
        if guns.is_empty() {
            return Ok(());
        }
        let shot = GunShot {
            owner: bullet.owner,
            faction: bullet.faction,
            hurt_always: bullet.hurt_always,
            pos: bullet.pos,
            z: bullet.z,
            direction: bullet.vel,
        };
        for event in self.authority.fire_guns(&self.world.data, guns, &shot)? {
            self.shared(event);
        }
        Ok(())
    }

    fn run(&mut self, bullet: &mut Bullet) -> Result<bool> {
        let class = self.class;
        let ticks = self.ticks;
        bullet.count += ticks;
        bullet.special_lock = (bullet.special_lock - ticks).max(0);
        bullet.sound_lock = (bullet.sound_lock - ticks).max(0);
        if bullet.count < class.delay {
            return Ok(true);
        }

        if bullet.range >= 0 && bullet.count > bullet.range {
            self.fire(bullet, &class.guns.out_of_range)?;
            if let Some(spark) = &class.out_of_range_spark {
                let mut spawn = ParticleSpawn::at(spark.clone(), bullet.pos);
                spawn.z = bullet.z;
                self.local(Event::AddParticle(spawn));
            }
            return Ok(false);
        }

        let start = bullet.pos;
        if class.seek_factor > Fixed::ZERO && !self.seek(bullet, start) {
            return Ok(false);
        }

        let end = start + bullet.vel.scale(Fixed::from_num(ticks));
        let resolution = if self.authority.resolves_hits() {
            collision::resolve(self.world, bullet, class, start, end)
        } else {
            Resolution::default()
        };
        let contact = self.react(bullet, &resolution, end)?;
        let absorbed = contact == Contact::Absorbed;

        if !self.fall(bullet, absorbed)? {
            return Ok(false);
        }
        self.friction(bullet);

        // Off the map the bullet holds its position on every participant.
        if !self.world.map.try_move(end) {
            return Ok(contact == Contact::Bounced);
        }
        bullet.last_pos = bullet.pos;
        bullet.pos = end;

        if class.erratic {
            let mut rng = jitter_rng(bullet.uid, bullet.count);
            let half = Fixed::from_num(0.5);
            for _ in 0..ticks {
                let rx: i32 = rng.gen_range(0..3);
                let ry: i32 = rng.gen_range(0..3);
                bullet.vel += Vec2Fixed::from_ints(rx - 1, ry - 1).scale(half);
            }
        }

        if absorbed {
            return Ok(false);
        }
        if self.proximity_triggered(bullet) {
            self.fire(bullet, &class.guns.proximity)?;
            return Ok(false);
        }

        self.trail(bullet);
        Ok(true)
    }

    /// Returns `false` if the owner is gone.
    fn seek(&self, bullet: &mut Bullet, start: Vec2Fixed) -> bool {
        let world = self.world;
        let Some(owner) = bullet.owner.and_then(|uid| world.actors.get(uid)) else {
            return false;
        };
        if let Some(target) = nearest_enemy(world, owner, start) {
            for _ in 0..self.ticks {
                bullet.vel = seek_towards(
                    start,
                    bullet.vel,
                    self.class.speed_low,
                    target.pos,
                    self.class.seek_factor,
                );
            }
        }
        true
    }

    /// Turn a resolution into events.
    fn react(
        &mut self,
        bullet: &mut Bullet,
        resolution: &Resolution,
        end: Vec2Fixed,
    ) -> Result<Contact> {
        let hit_sound = bullet.sound_lock == 0;

        if !resolution.damage.is_empty() && bullet.special_lock == 0 {
            bullet.special_lock = SPECIAL_LOCK;
        }
        for damage in &resolution.damage {
            self.shared(Event::ThingDamage(damage.clone()));
        }

        let Some(hit) = resolution.hit.filter(|h| h.hit_type != HitType::None) else {
            if !resolution.damage.is_empty() && bullet.sound_lock == 0 {
                bullet.sound_lock = SOUND_LOCK;
            }
            return Ok(Contact::Clear);
        };

        let class = self.class;
        let is_wall = hit.hit_type == HitType::Wall;
        let absorbs = (is_wall && !class.wall_bounces)
            || (matches!(hit.hit_type, HitType::Object | HitType::Flesh) && class.hits_objects);
        let mut dies = false;
        let mut wall_mark = false;
        if absorbs {
            self.fire(bullet, &class.guns.hit)?;
            dies = is_wall || !class.persists;
            wall_mark = is_wall && bullet.vel.y < Fixed::ZERO && self.faces_south(&hit);
        }
        let wall_mark_z = if wall_mark {
            self.authority.roll_wall_mark_z()
        } else {
            Fixed::ZERO
        };

        let (bounce_pos, vel) = if is_wall && !dies && !bullet.vel.is_zero() {
            let restitution = self.world.config.get_fixed(RESTITUTION);
            collision::bounce(hit.pos, bullet.vel, hit.normal, hit.t, self.ticks, restitution)
        } else if is_wall {
            (hit.pos, bullet.vel)
        } else {
            (end, bullet.vel)
        };

        self.shared(Event::BulletBounce(BulletBounce {
            uid: bullet.uid,
            hit_type: hit.hit_type,
            pos: hit.pos,
            bounce_pos,
            vel,
            hit_sound,
            spark: absorbs,
            wall_mark,
            wall_mark_z,
        }));
        if bullet.sound_lock == 0 {
            bullet.sound_lock += SOUND_LOCK;
        }
        Ok(if dies {
            Contact::Absorbed
        } else if is_wall {
            Contact::Bounced
        } else {
            Contact::Clear
        })
    }

    /// A wall mark only shows on a wall face with open floor below it.
    fn faces_south(&self, hit: &Hit) -> bool {
        let below = hit.pos + Vec2Fixed::from_ints(0, 1);
        !self.world.map.is_opaque(self.world.map.tile_of(below))
    }

    /// Returns `false` if the bullet is destroyed on touching the ground.
    fn fall(&mut self, bullet: &mut Bullet, absorbed: bool) -> Result<bool> {
        let class = self.class;
        let falling = &class.falling;
        if falling.gravity == Fixed::ZERO {
            return Ok(true);
        }
        bullet.has_dropped = bullet.z <= Fixed::ZERO;
        for _ in 0..self.ticks {
            bullet.z += bullet.dz;
            if bullet.z <= Fixed::ZERO {
                bullet.z = Fixed::ZERO;
                bullet.dz = if falling.bounces {
                    -bullet.dz / Fixed::from_num(2)
                } else {
                    Fixed::ZERO
                };
                let landed = !bullet.has_dropped;
                bullet.has_dropped = true;
                if landed && !absorbed {
                    self.fire(bullet, &falling.drop_guns)?;
                }
                if falling.destroy_on_drop {
                    return Ok(false);
                }
                if let (true, Some(sound)) = (landed, &class.hit_sounds.wall) {
                    self.local(Event::SoundAt {
                        sound: sound.clone(),
                        pos: bullet.pos,
                        is_hit: false,
                    });
                }
            } else {
                bullet.dz -= falling.gravity;
            }
            if !falling.falls_down {
                bullet.dz = bullet.dz.max(Fixed::ZERO);
            }
        }
        Ok(true)
    }

    fn friction(&self, bullet: &mut Bullet) {
        let friction = self.class.friction;
        if friction == Fixed::ZERO {
            return;
        }
        let amount = if bullet.vel.x != Fixed::ZERO && bullet.vel.y != Fixed::ZERO {
            friction * Fixed::FRAC_1_SQRT_2
        } else {
            friction
        };
        for _ in 0..self.ticks {
            bullet.vel.x = apply_friction(bullet.vel.x, amount);
            bullet.vel.y = apply_friction(bullet.vel.y, amount);
        }
    }

    fn proximity_triggered(&self, bullet: &Bullet) -> bool {
        if !self.class.has_proximity()
            || bullet.count % PROXIMITY_INTERVAL != 0
            || !self.authority.detects_proximity()
        {
            return false;
        }
        let center = self.world.map.tile_of(bullet.pos);
        (-1..=1).any(|dy| {
            (-1..=1).any(|dx| {
                let tile = TilePos::new(center.x + dx, center.y + dy);
                self.world.map.tile_at(tile).is_some() && self.world.tile_has_actor(tile)
            })
        })
    }

    fn trail(&mut self, bullet: &mut Bullet) {
        let class = self.class;
        let Some(particle) = &class.trail.particle else {
            return;
        };
        let every = class.trail.ticks_per_emit;
        if every > 1 {
            bullet.trail_counter -= self.ticks;
            if bullet.trail_counter > 0 {
                return;
            }
            bullet.trail_counter = every;
        }

        let mut spawn = ParticleSpawn::at(
            particle.clone(),
            bullet.last_pos.lerp(bullet.pos, Fixed::from_num(0.5)),
        );
        spawn.z = bullet.z;
        if class.trail.width > Fixed::ZERO {
            let length = (bullet.pos - bullet.last_pos).length();
            spawn.draw_scale = Vec2Fixed::new(class.trail.width, length);
        }
        self.local(Event::AddParticle(spawn));
    }
}

/// Advance one bullet by `ticks`.
///
/// The caller owns writing `bullet` back to the world and routing the
/// returned events by scope.
///
/// # Errors
///
/// Returns an error if the bullet's class or one of its follow-up guns is
/// unknown.
pub fn step_bullet(
    world: &World,
    bullet: &mut Bullet,
    ticks: i32,
    authority: &mut dyn Authority,
) -> Result<StepOutcome> {
    let class = world.bullet_class(&bullet.class)?;
    let mut step = Step {
        world,
        class,
        authority,
        ticks,
        events: Vec::new(),
    };
    let alive = step.run(bullet)?;
    Ok(StepOutcome {
        alive,
        events: step.events,
    })
}
