//! Event dispatcher: turns one due event into one state transition.
//!
//! The dispatcher runs identically on every participant. It never detects
//! collisions and never rolls dice; everything random or authoritative has
//! already been decided by whoever produced the event.
//!
//! # Failure semantics
//!
//! - An event naming an entity that no longer exists is a no-op (`Ok`).
//! - A payload that can never be applied (unknown class, bad index,
//!   duplicate UID) is an `Err`. Every handler validates before it
//!   mutates, so a rejected event leaves the world untouched.

use serde::{Deserialize, Serialize};

use crate::components::{
    Actor, ActorAnimation, Bullet, CharacterFlags, GunState, MapObject, Pickup, PickupKind,
    Player,
};
use crate::config::{GameMode, HIT_SOUNDS, SHAKE_MODE};
use crate::data::{HitSounds, SpecialDamage};
use crate::error::{Result, SimError};
use crate::events::{
    ActorSpawn, BulletBounce, BulletSpawn, Damage, Event, HitType, ParticleSpawn, ThingRef,
    TileRun,
};
use crate::map::{TilePos, TILE_HEIGHT, TILE_WIDTH};
use crate::math::{Fixed, Vec2Fixed};
use crate::mission::{MissionOutcome, MissionState};
use crate::queue::FollowUps;
use crate::registry::Uid;
use crate::world::World;

/// Knockback is `vel * mass / KNOCKBACK_DIVISOR`.
pub const KNOCKBACK_DIVISOR: i32 = 25;

/// Ticks before a spawner replaces a collected pickup.
pub const PICKUP_RESPAWN_TICKS: i32 = 140;

/// Presentation request for whatever sits outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cue {
    /// Play a sound, positioned if `pos` is set.
    Sound {
        /// Sound name.
        sound: String,
        /// Where it happens.
        pos: Option<Vec2Fixed>,
    },
    /// Shake the screen.
    Shake {
        /// Strength after the shake setting is applied.
        amount: i32,
        /// Only for the camera following this actor.
        subject: Option<Uid>,
    },
    /// Centre-screen message.
    Message {
        /// Text.
        text: String,
        /// Duration in ticks.
        ticks: i32,
    },
    /// HUD popup, e.g. score or objective progress.
    Popup {
        /// Player the popup belongs to.
        player: Option<Uid>,
        /// Text.
        text: String,
    },
}

/// Mutable state handed to [`apply`].
#[derive(Debug)]
pub struct DispatchContext<'a> {
    /// World being mutated.
    pub world: &'a mut World,
    /// Follow-up events for the next drain.
    pub follow_ups: &'a mut FollowUps,
    /// Presentation cues.
    pub cues: &'a mut Vec<Cue>,
}

impl DispatchContext<'_> {
    fn sound(&mut self, sound: impl Into<String>, pos: Option<Vec2Fixed>) {
        self.cues.push(Cue::Sound {
            sound: sound.into(),
            pos,
        });
    }

    /// Add a popup particle if the data defines its class.
    fn text_particle(&mut self, class: &str, text: String, pos: Vec2Fixed) -> Result<()> {
        if self.world.data.particle(class).is_err() {
            return Ok(());
        }
        let mut spawn = ParticleSpawn::at(class, pos);
        spawn.text = Some(text);
        self.world.add_particle(spawn)?;
        Ok(())
    }

    fn is_local_player(&self, player: Option<Uid>) -> bool {
        player
            .and_then(|uid| self.world.players.get(uid))
            .is_some_and(|p| p.local)
    }
}

fn stale(kind: &'static str, uid: Uid, event: &'static str) {
    tracing::trace!(kind, uid, event, "Stale reference ignored");
}

/// Apply one event.
///
/// # Errors
///
/// Returns an error for payloads that can never be applied; see the module
/// docs. Stale UIDs are not errors.
pub fn apply(event: Event, ctx: &mut DispatchContext<'_>) -> Result<()> {
    match event {
        Event::PlayerData {
            uid,
            name,
            lives,
            local,
        } => player_data(ctx, uid, name, lives, local),
        Event::PlayerRemove { uid } => {
            if ctx.world.players.remove(uid).is_none() {
                stale("player", uid, "PlayerRemove");
            }
            Ok(())
        }
        Event::Score { player, points } => score(ctx, player, points),

        Event::TileSet {
            pos,
            class,
            class_alt,
            run_length,
        } => tile_set(ctx, pos, &class, class_alt.as_deref(), run_length),
        Event::ExploreTiles { runs } => explore_tiles(ctx, &runs),

        Event::ThingDamage(damage) => thing_damage(ctx, &damage),
        Event::MapObjectAdd {
            uid,
            class,
            pos,
            size,
            health,
            shootable,
            objective,
        } => {
            check_objective(ctx.world, objective)?;
            ctx.world.objects.insert(MapObject {
                uid,
                class,
                pos,
                size,
                health,
                shootable,
                objective,
                counter: 0,
            })?;
            Ok(())
        }
        Event::MapObjectRemove { uid, destroyed_by } => {
            let Some(object) = ctx.world.objects.remove(uid) else {
                stale("map object", uid, "MapObjectRemove");
                return Ok(());
            };
            if let (Some(_), Some(objective)) = (destroyed_by, object.objective) {
                ctx.follow_ups.push(Event::ObjectiveUpdate {
                    objective,
                    count: 1,
                });
            }
            Ok(())
        }

        Event::ActorAdd(spawn) => actor_add(ctx, spawn),
        Event::ActorMove { uid, pos, vel } => with_actor(ctx, uid, "ActorMove", |actor| {
            actor.pos = pos;
            actor.vel = vel;
            Ok(())
        }),
        Event::ActorState { uid, state } => with_actor(ctx, uid, "ActorState", |actor| {
            actor.state = state;
            Ok(())
        }),
        Event::ActorDir { uid, dir } => with_actor(ctx, uid, "ActorDir", |actor| {
            actor.direction = dir;
            Ok(())
        }),
        Event::ActorSlide { uid, vel } => {
            let Some(actor) = ctx.world.actors.get_mut(uid) else {
                stale("actor", uid, "ActorSlide");
                return Ok(());
            };
            actor.vel = vel;
            let pos = actor.pos;
            ctx.sound("slide", Some(pos));
            Ok(())
        }
        Event::ActorImpulse { uid, vel, pos } => {
            with_actor(ctx, uid, "ActorImpulse", |actor| {
                actor.vel += vel;
                if let Some(pos) = pos {
                    actor.pos = pos;
                }
                Ok(())
            })
        }
        Event::ActorSwitchGun { uid, gun_index } => {
            let Some(actor) = ctx.world.actors.get_mut(uid) else {
                stale("actor", uid, "ActorSwitchGun");
                return Ok(());
            };
            if gun_index >= actor.guns.len() {
                return Err(SimError::IndexOutOfRange {
                    what: "gun",
                    index: gun_index,
                    len: actor.guns.len(),
                });
            }
            actor.gun_index = gun_index;
            let pos = actor.pos;
            ctx.sound("switch", Some(pos));
            Ok(())
        }
        Event::ActorPickupAll { uid, pickup_all } => {
            with_actor(ctx, uid, "ActorPickupAll", |actor| {
                actor.pickup_all = pickup_all;
                Ok(())
            })
        }
        Event::ActorReplaceGun {
            uid,
            gun_index,
            gun,
        } => {
            ctx.world.data.weapons.get(&gun)?;
            with_actor(ctx, uid, "ActorReplaceGun", |actor| {
                match gun_index.cmp(&actor.guns.len()) {
                    std::cmp::Ordering::Less => actor.guns[gun_index] = gun,
                    std::cmp::Ordering::Equal => actor.guns.push(gun),
                    std::cmp::Ordering::Greater => {
                        return Err(SimError::IndexOutOfRange {
                            what: "gun",
                            index: gun_index,
                            len: actor.guns.len(),
                        })
                    }
                }
                Ok(())
            })
        }
        Event::ActorHeal { uid, amount, .. } => actor_heal(ctx, uid, amount),
        Event::ActorAddAmmo {
            uid,
            ammo_id,
            amount,
            ..
        } => actor_add_ammo(ctx, uid, ammo_id, amount),
        Event::ActorUseAmmo {
            uid,
            ammo_id,
            amount,
        } => actor_use_ammo(ctx, uid, ammo_id, amount),
        Event::ActorDie { uid } => actor_die(ctx, uid),
        Event::ActorMelee {
            attacker,
            target,
            power,
            special,
            hit_type,
        } => {
            if !ctx.world.actors.contains(attacker) {
                stale("actor", attacker, "ActorMelee");
                return Ok(());
            }
            let pos = ctx.world.actors.get(attacker).map(|a| a.pos);
            let sound = match hit_type {
                HitType::None => None,
                HitType::Wall => Some("hits/knife_wall"),
                HitType::Object => Some("hits/knife_hard"),
                HitType::Flesh => Some("hits/knife_flesh"),
            };
            if let Some(sound) = sound {
                if ctx.world.config.get_bool(HIT_SOUNDS) {
                    ctx.sound(sound, pos);
                }
            }
            thing_damage(
                ctx,
                &Damage {
                    target,
                    source: Some(attacker),
                    power,
                    mass: Fixed::ZERO,
                    vel: Vec2Fixed::ZERO,
                    special,
                },
            )
        }
        Event::RescueCharacter { uid } => with_actor(ctx, uid, "RescueCharacter", |actor| {
            actor.flags = CharacterFlags {
                prisoner: false,
                rescued: true,
                follower: true,
            };
            Ok(())
        }),

        Event::AddPickup {
            uid,
            kind,
            pos,
            random_spawned,
            spawner,
        } => {
            match &kind {
                PickupKind::Gun(gun) => {
                    ctx.world.data.weapons.get(gun)?;
                }
                PickupKind::Ammo { id, .. } => {
                    ctx.world.data.ammo(*id)?;
                }
                PickupKind::Health(_) | PickupKind::Keys(_) => {}
            }
            ctx.world.pickups.insert(Pickup {
                uid,
                kind,
                pos,
                random_spawned,
                spawner,
            })?;
            ctx.sound("spawn_item", Some(pos));
            Ok(())
        }
        Event::RemovePickup { uid, spawner } => {
            if ctx.world.pickups.remove(uid).is_none() {
                stale("pickup", uid, "RemovePickup");
                return Ok(());
            }
            if let Some(object) = spawner.and_then(|s| ctx.world.objects.get_mut(s)) {
                object.counter = PICKUP_RESPAWN_TICKS;
            }
            Ok(())
        }

        Event::GunFire {
            actor,
            gun,
            pos,
            z,
            play_sound,
            ..
        } => gun_fire(ctx, actor, &gun, pos, z, play_sound),
        Event::GunReload { actor, gun, pos } => {
            let weapon = ctx.world.data.weapons.get(&gun)?;
            let sound = weapon.reload_sound.clone();
            if let Some(actor) = actor.and_then(|uid| ctx.world.actors.get_mut(uid)) {
                actor.gun_state = GunState::Reloading;
            }
            if let Some(sound) = sound {
                ctx.sound(sound, Some(pos));
            }
            Ok(())
        }
        Event::GunState { actor, state } => with_actor(ctx, actor, "GunState", |actor| {
            actor.gun_state = state;
            Ok(())
        }),
        Event::AddBullet(spawn) => add_bullet(ctx, spawn),
        Event::BulletBounce(bounce) => bullet_bounce(ctx, &bounce),
        Event::RemoveBullet { uid } => {
            if ctx.world.bullets.remove(uid).is_none() {
                stale("bullet", uid, "RemoveBullet");
            }
            Ok(())
        }

        Event::AddParticle(spawn) => {
            ctx.world.add_particle(spawn)?;
            Ok(())
        }
        Event::RemoveParticle { id } => {
            if ctx.world.particles.remove(id).is_none() {
                stale("particle", id, "RemoveParticle");
            }
            Ok(())
        }

        Event::SoundAt { sound, pos, is_hit } => {
            if !is_hit || ctx.world.config.get_bool(HIT_SOUNDS) {
                ctx.sound(sound, Some(pos));
            }
            Ok(())
        }
        Event::ScreenShake { amount, subject } => {
            let amount = match ctx.world.config.get_enum(SHAKE_MODE) {
                Some("off") => 0,
                Some("strong") => amount * 2,
                _ => amount,
            };
            if amount > 0 {
                ctx.cues.push(Cue::Shake { amount, subject });
            }
            Ok(())
        }
        Event::SetMessage { message, ticks } => {
            ctx.cues.push(Cue::Message {
                text: message,
                ticks,
            });
            Ok(())
        }

        Event::Config { name, value } => ctx.world.config.set_from_str(&name, &value),

        Event::GameStart => {
            ctx.world.mission.started = true;
            Ok(())
        }
        Event::GameBegin => {
            let mission = &mut ctx.world.mission;
            mission.begun = true;
            mission.state = MissionState::Play;
            Ok(())
        }
        Event::ObjectiveUpdate { objective, count } => objective_update(ctx, objective, count),
        Event::AddKeys { flags, pos } => {
            ctx.world.mission.key_flags |= flags;
            if let Some(pos) = pos {
                ctx.sound("key", Some(pos));
                ctx.text_particle("key_text", "+key".to_string(), pos)?;
            }
            Ok(())
        }
        Event::MissionComplete { show_message, exit } => {
            let mission = &mut ctx.world.mission;
            let announce = !mission.completion_announced;
            mission.completion_announced = true;
            if !ctx.world.mode.is_pvp() {
                ctx.world.mission.exit = exit;
            }
            if announce {
                ctx.sound("mission_complete", None);
            }
            if show_message {
                ctx.cues.push(Cue::Message {
                    text: "Mission complete".to_string(),
                    ticks: 140,
                });
            }
            Ok(())
        }
        Event::MissionIncomplete => {
            let mission = &mut ctx.world.mission;
            if mission.state == MissionState::Pickup {
                mission.state = MissionState::Play;
            }
            Ok(())
        }
        Event::MissionPickup => {
            let mission = &mut ctx.world.mission;
            mission.state = MissionState::Pickup;
            mission.pickup_time = mission.time;
            ctx.sound("whistle", None);
            Ok(())
        }
        Event::MissionEnd { quit, message } => {
            let mission = &mut ctx.world.mission;
            mission.state = MissionState::Done;
            mission.outcome = Some(MissionOutcome {
                quit,
                message: message.clone(),
            });
            ctx.cues.push(Cue::Message {
                text: message,
                ticks: -1,
            });
            Ok(())
        }
    }
}

fn with_actor<F>(ctx: &mut DispatchContext<'_>, uid: Uid, event: &'static str, f: F) -> Result<()>
where
    F: FnOnce(&mut Actor) -> Result<()>,
{
    let Some(actor) = ctx.world.actors.get_mut(uid) else {
        stale("actor", uid, event);
        return Ok(());
    };
    f(actor)
}

fn check_objective(world: &World, objective: Option<usize>) -> Result<()> {
    match objective {
        Some(index) if index >= world.mission.objectives.len() => Err(SimError::IndexOutOfRange {
            what: "objective",
            index,
            len: world.mission.objectives.len(),
        }),
        _ => Ok(()),
    }
}

fn player_data(
    ctx: &mut DispatchContext<'_>,
    uid: Uid,
    name: String,
    lives: i32,
    local: bool,
) -> Result<()> {
    if lives < 0 {
        return Err(SimError::InvalidState(format!(
            "player {uid} sent with {lives} lives"
        )));
    }
    if let Some(player) = ctx.world.players.get_mut(uid) {
        player.name = name;
        player.lives = lives;
        player.local = local;
        return Ok(());
    }
    ctx.world.players.insert(Player {
        uid,
        name,
        lives,
        score: 0,
        local,
    })?;
    Ok(())
}

fn score(ctx: &mut DispatchContext<'_>, player: Uid, points: i32) -> Result<()> {
    if ctx.world.mode == GameMode::Dogfight {
        return Ok(());
    }
    let Some(p) = ctx.world.players.get_mut(player) else {
        stale("player", player, "Score");
        return Ok(());
    };
    p.score += points;
    ctx.cues.push(Cue::Popup {
        player: Some(player),
        text: format!("{points:+}"),
    });
    Ok(())
}

/// Tiles covered by a run starting at `start`, wrapping to the next row.
fn run_tiles(world: &World, start: TilePos, run: u32) -> Result<impl Iterator<Item = TilePos>> {
    let size = world.map.size();
    if world.map.tile_at(start).is_none() {
        return Err(SimError::TileOutOfRange {
            x: start.x,
            y: start.y,
        });
    }
    let first = i64::from(start.y) * i64::from(size.x) + i64::from(start.x);
    let last = first + i64::from(run);
    let total = i64::from(size.x) * i64::from(size.y);
    if last >= total {
        let x = (last % i64::from(size.x.max(1))) as i32;
        let y = (last / i64::from(size.x.max(1))) as i32;
        return Err(SimError::TileOutOfRange { x, y });
    }
    let width = i64::from(size.x);
    Ok((first..=last).map(move |i| TilePos::new((i % width) as i32, (i / width) as i32)))
}

fn tile_set(
    ctx: &mut DispatchContext<'_>,
    pos: TilePos,
    class: &str,
    class_alt: Option<&str>,
    run_length: u32,
) -> Result<()> {
    let classes = ctx.world.map.classes();
    let class = classes.id(class)?;
    let class_alt = class_alt.map(|name| classes.id(name)).transpose()?;
    let tiles: Vec<_> = run_tiles(ctx.world, pos, run_length)?.collect();
    for tile in tiles {
        ctx.world.map.set_tile(tile, class, class_alt)?;
    }
    Ok(())
}

fn explore_tiles(ctx: &mut DispatchContext<'_>, runs: &[TileRun]) -> Result<()> {
    let mut tiles = Vec::new();
    for run in runs {
        tiles.extend(run_tiles(ctx.world, run.start, run.run)?);
    }
    for tile in tiles {
        ctx.world.map.set_explored(tile)?;
    }
    Ok(())
}

fn thing_damage(ctx: &mut DispatchContext<'_>, damage: &Damage) -> Result<()> {
    let knockback = if damage.mass == Fixed::ZERO {
        Vec2Fixed::ZERO
    } else {
        let divisor = Fixed::from_num(KNOCKBACK_DIVISOR);
        Vec2Fixed::new(
            damage.vel.x * damage.mass / divisor,
            damage.vel.y * damage.mass / divisor,
        )
    };
    let source = damage
        .source
        .and_then(|uid| ctx.world.actors.get(uid))
        .map(|a| (a.player, a.faction));

    match damage.target {
        ThingRef::Actor(uid) => {
            let mode = ctx.world.mode;
            let Some(actor) = ctx.world.actors.get_mut(uid) else {
                stale("actor", uid, "ThingDamage");
                return Ok(());
            };
            if actor.dead {
                return Ok(());
            }
            actor.health -= damage.power;
            actor.vel += knockback;
            if damage.special != SpecialDamage::None {
                actor.status = damage.special;
            }
            let killed = actor.health <= 0;
            if killed {
                actor.dead = true;
                actor.state = ActorAnimation::Dying;
            }
            let target_player = actor.player;
            let target_faction = actor.faction;

            if let Some((Some(player), faction)) = source {
                let points = if mode.is_pvp() {
                    i32::from(killed && target_player != Some(player))
                } else if faction.is_good() && !target_faction.is_good() {
                    damage.power
                } else {
                    0
                };
                if points != 0 {
                    ctx.follow_ups.push(Event::Score { player, points });
                }
            }
            if killed {
                ctx.follow_ups.push(Event::ActorDie { uid });
            }
        }
        ThingRef::Object(uid) => {
            let Some(object) = ctx.world.objects.get_mut(uid) else {
                stale("map object", uid, "ThingDamage");
                return Ok(());
            };
            if object.health <= 0 {
                return Ok(());
            }
            object.health -= damage.power;
            if object.health <= 0 {
                ctx.follow_ups.push(Event::MapObjectRemove {
                    uid,
                    destroyed_by: damage.source,
                });
            }
        }
    }
    Ok(())
}

fn actor_add(ctx: &mut DispatchContext<'_>, spawn: ActorSpawn) -> Result<()> {
    for gun in &spawn.guns {
        ctx.world.data.weapons.get(gun)?;
    }
    let mut actor = Actor::new(spawn.uid, spawn.faction, spawn.pos, spawn.health);
    actor.player = spawn.player;
    actor.max_health = spawn.max_health.max(spawn.health);
    actor.guns = spawn.guns;
    actor.flags = spawn.flags;
    ctx.world.actors.insert(actor)?;
    Ok(())
}

fn actor_heal(ctx: &mut DispatchContext<'_>, uid: Uid, amount: i32) -> Result<()> {
    let Some(actor) = ctx.world.actors.get_mut(uid) else {
        stale("actor", uid, "ActorHeal");
        return Ok(());
    };
    if actor.dead {
        return Ok(());
    }
    actor.health = (actor.health + amount).min(actor.max_health);
    let (pos, player) = (actor.pos, actor.player);
    ctx.sound("health", Some(pos));
    if player.is_some() {
        ctx.text_particle("heal_text", format!("+{amount}"), pos)?;
    }
    Ok(())
}

fn actor_add_ammo(ctx: &mut DispatchContext<'_>, uid: Uid, ammo_id: usize, amount: i32) -> Result<()> {
    let ammo = ctx.world.data.ammo(ammo_id)?;
    let (max, name) = (ammo.max, ammo.name.clone());
    let Some(actor) = ctx.world.actors.get_mut(uid) else {
        stale("actor", uid, "ActorAddAmmo");
        return Ok(());
    };
    let carried = actor.ammo.entry(ammo_id).or_insert(0);
    *carried = (*carried + amount).min(max);
    let (pos, player) = (actor.pos, actor.player);
    if player.is_some() {
        ctx.text_particle("ammo_text", format!("+{amount} {name}"), pos)?;
    }
    Ok(())
}

fn actor_use_ammo(ctx: &mut DispatchContext<'_>, uid: Uid, ammo_id: usize, amount: i32) -> Result<()> {
    let low = ctx.world.data.ammo(ammo_id)?.low;
    let Some(actor) = ctx.world.actors.get_mut(uid) else {
        stale("actor", uid, "ActorUseAmmo");
        return Ok(());
    };
    let carried = actor.ammo.entry(ammo_id).or_insert(0);
    *carried = (*carried - amount).max(0);
    let (left, pos, player) = (*carried, actor.pos, actor.player);

    if ctx.is_local_player(player) {
        if left == 0 {
            ctx.sound("ammo_none", Some(pos));
        } else if left <= low {
            ctx.sound("ammo_low", Some(pos));
        }
    }
    Ok(())
}

fn actor_die(ctx: &mut DispatchContext<'_>, uid: Uid) -> Result<()> {
    let Some(actor) = ctx.world.actors.get(uid) else {
        stale("actor", uid, "ActorDie");
        return Ok(());
    };
    let player = actor.player;
    if let Some(p) = player.and_then(|p| ctx.world.players.get(p)) {
        if p.lives <= 0 {
            return Err(SimError::InvalidState(format!(
                "player {} has no lives left to lose",
                p.uid
            )));
        }
    }

    ctx.world.actors.remove(uid);
    if let Some(p) = player.and_then(|p| ctx.world.players.get_mut(p)) {
        p.lives -= 1;
    }
    Ok(())
}

fn gun_fire(
    ctx: &mut DispatchContext<'_>,
    actor: Option<Uid>,
    gun: &str,
    pos: Vec2Fixed,
    z: Fixed,
    play_sound: bool,
) -> Result<()> {
    let weapon = ctx.world.data.weapons.get(gun)?;
    let flash = weapon.muzzle_flash.clone();
    let sound = weapon.sound.clone().filter(|_| play_sound);
    let shake = weapon.shake;
    if let Some(flash) = &flash {
        ctx.world.data.particle(flash)?;
    }

    if let Some(actor) = actor.and_then(|uid| ctx.world.actors.get_mut(uid)) {
        actor.gun_state = GunState::Firing;
    }
    if let Some(flash) = flash {
        let mut spawn = ParticleSpawn::at(flash, pos);
        spawn.z = z;
        ctx.world.add_particle(spawn)?;
    }
    if let Some(sound) = sound {
        ctx.sound(sound, Some(pos));
    }
    if shake > 0 {
        ctx.follow_ups.push(Event::ScreenShake {
            amount: shake,
            subject: actor,
        });
    }
    Ok(())
}

fn add_bullet(ctx: &mut DispatchContext<'_>, spawn: BulletSpawn) -> Result<()> {
    let class = ctx.world.bullet_class(&spawn.class)?;
    let mut vel = spawn.direction.scale(spawn.speed);
    if class.speed_scale {
        vel.y = vel.y * Fixed::from_num(TILE_HEIGHT) / Fixed::from_num(TILE_WIDTH);
    }
    let hurt_always = spawn.hurt_always || class.hurt_always;

    ctx.world.bullets.insert(Bullet {
        uid: spawn.uid,
        owner: spawn.owner,
        faction: spawn.faction,
        hurt_always,
        class: spawn.class,
        pos: spawn.pos,
        last_pos: spawn.pos,
        vel,
        z: spawn.z,
        dz: spawn.dz,
        count: 0,
        range: spawn.range,
        special_lock: 0,
        sound_lock: 0,
        has_dropped: spawn.z <= Fixed::ZERO,
        trail_counter: 0,
    })?;
    Ok(())
}

fn hit_sound(sounds: &HitSounds, hit_type: HitType) -> Option<&String> {
    match hit_type {
        HitType::None => None,
        HitType::Wall => sounds.wall.as_ref(),
        HitType::Object => sounds.object.as_ref(),
        HitType::Flesh => sounds.flesh.as_ref(),
    }
}

fn bullet_bounce(ctx: &mut DispatchContext<'_>, bounce: &BulletBounce) -> Result<()> {
    let Some(bullet) = ctx.world.bullets.get(bounce.uid) else {
        stale("bullet", bounce.uid, "BulletBounce");
        return Ok(());
    };
    let class = ctx.world.bullet_class(&bullet.class)?;
    let spark = class.spark.clone().filter(|_| bounce.spark);
    let wall_mark = class.wall_mark.clone().filter(|_| bounce.wall_mark);
    let sound = if bounce.hit_sound {
        hit_sound(&class.hit_sounds, bounce.hit_type).cloned()
    } else {
        None
    };
    for particle in spark.iter().chain(&wall_mark) {
        ctx.world.data.particle(particle)?;
    }

    if let Some(bullet) = ctx.world.bullets.get_mut(bounce.uid) {
        bullet.pos = bounce.bounce_pos;
        bullet.vel = bounce.vel;
    }
    if let Some(spark) = spark {
        ctx.world.add_particle(ParticleSpawn::at(spark, bounce.pos))?;
    }
    if let Some(mark) = wall_mark {
        let mut spawn = ParticleSpawn::at(mark, bounce.pos);
        spawn.z = bounce.wall_mark_z;
        ctx.world.add_particle(spawn)?;
    }
    if let Some(sound) = sound {
        if ctx.world.config.get_bool(HIT_SOUNDS) {
            ctx.sound(sound, Some(bounce.pos));
        }
    }
    Ok(())
}

fn objective_update(ctx: &mut DispatchContext<'_>, objective: usize, count: i32) -> Result<()> {
    check_objective(ctx.world, Some(objective))?;
    let mission = &mut ctx.world.mission;
    let was_complete = mission.all_objectives_complete();
    let entry = &mut mission.objectives[objective];
    entry.done += count;
    let text = format!("{}: {}/{}", entry.description, entry.done, entry.required);
    let now_complete = mission.all_objectives_complete();
    let exit = mission.exit;

    ctx.cues.push(Cue::Popup { player: None, text });
    if now_complete && !was_complete {
        ctx.follow_ups.push(Event::MissionComplete {
            show_message: true,
            exit,
        });
    } else if was_complete && !now_complete {
        ctx.follow_ups.push(Event::MissionIncomplete);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Faction;
    use crate::config::{ConfigValues, FRIENDLY_FIRE};
    use crate::data::GameData;
    use crate::map::TileMap;
    use crate::mission::Objective;

    const DATA: &str = r#"
        GameDataFile(
            bullets: BulletFile(
                version: 3,
                bullets: [
                    (name: Some("bullet"), spark: Some("spark"),
                     hit_sounds: Some((wall: Some("hits/wall")))),
                ],
            ),
            weapons: [
                (name: "pistol", bullet: Some("bullet"), muzzle_flash: Some("flash"),
                 sound: Some("pistol"), shake: 2),
            ],
            ammo: [(name: "Bullets", max: 50, low: 5)],
            particles: ["spark", "flash", "heal_text"],
        )
    "#;

    struct Harness {
        world: World,
        follow_ups: FollowUps,
        cues: Vec<Cue>,
    }

    impl Harness {
        fn new() -> Self {
            let data = GameData::from_ron_str(DATA).unwrap();
            let map = TileMap::from_ascii(&["....", "....", "...."]).unwrap();
            Self {
                world: World::new(data, map, GameMode::Campaign, ConfigValues::standard()),
                follow_ups: FollowUps::default(),
                cues: Vec::new(),
            }
        }

        fn apply(&mut self, event: Event) -> Result<()> {
            apply(
                event,
                &mut DispatchContext {
                    world: &mut self.world,
                    follow_ups: &mut self.follow_ups,
                    cues: &mut self.cues,
                },
            )
        }

        fn pending(&self) -> Vec<Event> {
            self.follow_ups.iter().cloned().collect()
        }

        fn spawn_actor(&mut self, uid: Uid, faction: Faction, health: i32) {
            self.apply(Event::ActorAdd(ActorSpawn {
                uid,
                player: None,
                faction,
                pos: Vec2Fixed::from_ints(20, 20),
                health,
                max_health: health,
                guns: vec!["pistol".to_string()],
                flags: CharacterFlags::default(),
            }))
            .unwrap();
        }
    }

    fn damage(uid: Uid, power: i32) -> Event {
        Event::ThingDamage(Damage {
            target: ThingRef::Actor(uid),
            source: None,
            power,
            mass: Fixed::from_num(5),
            vel: Vec2Fixed::from_ints(10, 0),
            special: SpecialDamage::None,
        })
    }

    #[test]
    fn test_damage_applies_knockback() {
        let mut h = Harness::new();
        h.spawn_actor(1, Faction::Enemy, 20);
        h.apply(damage(1, 5)).unwrap();

        let actor = h.world.actors.get(1).unwrap();
        assert_eq!(actor.health, 15);
        // 10 * 5 / 25
        assert_eq!(actor.vel, Vec2Fixed::from_ints(2, 0));
        assert!(h.pending().is_empty());
    }

    #[test]
    fn test_lethal_damage_enqueues_die_once() {
        let mut h = Harness::new();
        h.spawn_actor(1, Faction::Enemy, 5);
        h.apply(damage(1, 5)).unwrap();
        h.apply(damage(1, 5)).unwrap();

        assert!(h.world.actors.get(1).unwrap().dead);
        assert_eq!(h.pending(), vec![Event::ActorDie { uid: 1 }]);
    }

    #[test]
    fn test_stale_uid_is_noop() {
        let mut h = Harness::new();
        let before = h.world.state_hash();
        assert!(h.apply(damage(42, 5)).is_ok());
        assert!(h.apply(Event::RemoveBullet { uid: 42 }).is_ok());
        assert!(h.apply(Event::ActorMove {
            uid: 42,
            pos: Vec2Fixed::ZERO,
            vel: Vec2Fixed::ZERO
        })
        .is_ok());
        assert_eq!(h.world.state_hash(), before);
    }

    #[test]
    fn test_malformed_leaves_world_untouched() {
        let mut h = Harness::new();
        h.spawn_actor(1, Faction::Player, 10);
        let before = h.world.state_hash();

        let err = h
            .apply(Event::ActorSwitchGun {
                uid: 1,
                gun_index: 3,
            })
            .unwrap_err();
        assert!(matches!(err, SimError::IndexOutOfRange { what: "gun", .. }));

        let err = h
            .apply(Event::ActorReplaceGun {
                uid: 1,
                gun_index: 0,
                gun: "railgun".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SimError::UnknownWeaponClass(_)));

        assert!(h
            .apply(Event::TileSet {
                pos: TilePos::new(2, 2),
                class: "wall".to_string(),
                class_alt: None,
                run_length: 5,
            })
            .is_err());
        assert_eq!(h.world.state_hash(), before);
    }

    #[test]
    fn test_duplicate_actor_rejected() {
        let mut h = Harness::new();
        h.spawn_actor(1, Faction::Enemy, 10);
        let err = h
            .apply(Event::ActorAdd(ActorSpawn {
                uid: 1,
                player: None,
                faction: Faction::Enemy,
                pos: Vec2Fixed::ZERO,
                health: 1,
                max_health: 1,
                guns: Vec::new(),
                flags: CharacterFlags::default(),
            }))
            .unwrap_err();
        assert!(matches!(err, SimError::DuplicateUid { kind: "actor", uid: 1 }));
        assert_eq!(h.world.actors.get(1).unwrap().health, 10);
    }

    #[test]
    fn test_tile_run_wraps_rows() {
        let mut h = Harness::new();
        h.apply(Event::TileSet {
            pos: TilePos::new(3, 0),
            class: "wall".to_string(),
            class_alt: None,
            run_length: 2,
        })
        .unwrap();
        assert!(h.world.map.is_shootable(TilePos::new(3, 0)));
        assert!(h.world.map.is_shootable(TilePos::new(0, 1)));
        assert!(h.world.map.is_shootable(TilePos::new(1, 1)));
        assert!(!h.world.map.is_shootable(TilePos::new(2, 1)));
    }

    #[test]
    fn test_actor_die_costs_a_life() {
        let mut h = Harness::new();
        h.apply(Event::PlayerData {
            uid: 100,
            name: "p1".to_string(),
            lives: 1,
            local: true,
        })
        .unwrap();
        h.spawn_actor(1, Faction::Player, 5);
        h.world.actors.get_mut(1).unwrap().player = Some(100);

        h.apply(Event::ActorDie { uid: 1 }).unwrap();
        assert!(!h.world.actors.contains(1));
        assert_eq!(h.world.players.get(100).unwrap().lives, 0);

        h.spawn_actor(2, Faction::Player, 5);
        h.world.actors.get_mut(2).unwrap().player = Some(100);
        assert!(h.apply(Event::ActorDie { uid: 2 }).is_err());
        assert!(h.world.actors.contains(2));
    }

    #[test]
    fn test_heal_clamps_to_max() {
        let mut h = Harness::new();
        h.spawn_actor(1, Faction::Ally, 20);
        h.world.actors.get_mut(1).unwrap().health = 15;
        h.apply(Event::ActorHeal {
            uid: 1,
            amount: 50,
            random_spawned: false,
        })
        .unwrap();
        assert_eq!(h.world.actors.get(1).unwrap().health, 20);
        assert!(h.cues.contains(&Cue::Sound {
            sound: "health".to_string(),
            pos: Some(Vec2Fixed::from_ints(20, 20)),
        }));
    }

    #[test]
    fn test_gun_fire_cosmetics() {
        let mut h = Harness::new();
        h.apply(Event::GunFire {
            actor: None,
            gun: "pistol".to_string(),
            pos: Vec2Fixed::from_ints(5, 5),
            z: Fixed::ZERO,
            direction: Vec2Fixed::from_ints(1, 0),
            play_sound: true,
        })
        .unwrap();
        assert_eq!(h.world.particles.len(), 1);
        assert!(matches!(&h.cues[0], Cue::Sound { sound, .. } if sound == "pistol"));
        assert_eq!(
            h.pending(),
            vec![Event::ScreenShake {
                amount: 2,
                subject: None
            }]
        );
    }

    #[test]
    fn test_hit_sounds_respect_config() {
        let mut h = Harness::new();
        h.apply(Event::Config {
            name: HIT_SOUNDS.to_string(),
            value: "false".to_string(),
        })
        .unwrap();
        h.apply(Event::SoundAt {
            sound: "hits/wall".to_string(),
            pos: Vec2Fixed::ZERO,
            is_hit: true,
        })
        .unwrap();
        assert!(h.cues.is_empty());
    }

    #[test]
    fn test_config_event() {
        let mut h = Harness::new();
        h.apply(Event::Config {
            name: FRIENDLY_FIRE.to_string(),
            value: "true".to_string(),
        })
        .unwrap();
        assert!(h.world.config.get_bool(FRIENDLY_FIRE));
        assert!(h
            .apply(Event::Config {
                name: "Game.Name".to_string(),
                value: "x".to_string(),
            })
            .is_err());
    }

    #[test]
    fn test_objective_completion_follow_up() {
        let mut h = Harness::new();
        h.world.mission.objectives = vec![Objective::new("Destroy", 1)];
        h.apply(Event::MapObjectAdd {
            uid: 5,
            class: "crate".to_string(),
            pos: Vec2Fixed::ZERO,
            size: Vec2Fixed::from_ints(8, 8),
            health: 3,
            shootable: true,
            objective: Some(0),
        })
        .unwrap();

        h.apply(Event::ThingDamage(Damage {
            target: ThingRef::Object(5),
            source: Some(1),
            power: 3,
            mass: Fixed::ZERO,
            vel: Vec2Fixed::ZERO,
            special: SpecialDamage::None,
        }))
        .unwrap();
        assert_eq!(
            h.pending(),
            vec![Event::MapObjectRemove {
                uid: 5,
                destroyed_by: Some(1)
            }]
        );

        h.apply(Event::MapObjectRemove {
            uid: 5,
            destroyed_by: Some(1),
        })
        .unwrap();
        h.apply(Event::ObjectiveUpdate {
            objective: 0,
            count: 1,
        })
        .unwrap();
        assert!(h.world.mission.all_objectives_complete());
        assert!(h.pending().contains(&Event::MissionComplete {
            show_message: true,
            exit: None
        }));
    }

    #[test]
    fn test_bullet_bounce_moves_bullet() {
        let mut h = Harness::new();
        h.apply(Event::AddBullet(BulletSpawn {
            uid: 9,
            class: "bullet".to_string(),
            owner: None,
            faction: Faction::Enemy,
            hurt_always: false,
            pos: Vec2Fixed::from_ints(10, 10),
            z: Fixed::ZERO,
            dz: Fixed::ZERO,
            direction: Vec2Fixed::from_ints(1, 0),
            speed: Fixed::from_num(3),
            range: 20,
        }))
        .unwrap();
        assert_eq!(h.world.bullets.get(9).unwrap().vel, Vec2Fixed::from_ints(3, 0));

        h.apply(Event::BulletBounce(BulletBounce {
            uid: 9,
            hit_type: HitType::Wall,
            pos: Vec2Fixed::from_ints(12, 10),
            bounce_pos: Vec2Fixed::from_ints(11, 10),
            vel: Vec2Fixed::from_ints(-3, 0),
            hit_sound: true,
            spark: true,
            wall_mark: false,
            wall_mark_z: Fixed::ZERO,
        }))
        .unwrap();
        let bullet = h.world.bullets.get(9).unwrap();
        assert_eq!(bullet.pos, Vec2Fixed::from_ints(11, 10));
        assert_eq!(bullet.vel, Vec2Fixed::from_ints(-3, 0));
        assert_eq!(h.world.particles.len(), 1);
        assert!(matches!(&h.cues[0], Cue::Sound { sound, .. } if sound == "hits/wall"));
    }
}
