//! A participant's running game: world, event queue and authority.
//!
//! Each tick drains the queue through the dispatcher and then steps every
//! bullet. Events a step or the host produces are routed by [`Scope`]:
//!
//! - `Shared` events are offered to the [`Authority`]. The host publishes
//!   them and applies its own copy; a replica drops them and waits for the
//!   host's copy to arrive through [`Session::receive`].
//! - `Local` events are applied locally only.
//!
//! # Keeping participants in step
//!
//! Deliver the host's outbox to every replica before the replicas run
//! their next tick:
//!
//! ```
//! use tilestorm_core::prelude::*;
//!
//! let data = GameData::from_ron_str("GameDataFile(bullets: BulletFile(version: 3))").unwrap();
//! let map = TileMap::from_ascii(&["...."]).unwrap();
//! let world = World::new(data, map, GameMode::Campaign, ConfigValues::standard());
//!
//! let mut host = Session::host(world.clone(), 7);
//! let mut replica = Session::replica(world);
//! host.publish(Event::GameStart);
//!
//! for _ in 0..3 {
//!     replica.receive(host.take_outbox());
//!     host.tick();
//!     replica.tick();
//!     assert_eq!(host.state_hash(), replica.state_hash());
//! }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::authority::{Authority, GunShot, HostAuthority, ReplicaAuthority};
use crate::dispatch::{self, Cue, DispatchContext};
use crate::error::{Result, SimError};
use crate::events::{Event, Scope};
use crate::math::{Fixed, Vec2Fixed};
use crate::physics;
use crate::queue::EventQueue;
use crate::registry::Uid;
use crate::world::World;

/// Message shown when the pickup phase runs out.
pub const MISSION_END_MESSAGE: &str = "Mission complete";

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number after the tick ran.
    pub tick: u64,
    /// Events dispatched from the queue.
    pub dispatched: usize,
    /// Events and bullets skipped because they could not be applied.
    pub rejected: usize,
    /// Bullets stepped.
    pub bullets: usize,
    /// Presentation cues for whatever sits outside the core.
    pub cues: Vec<Cue>,
}

/// Malformed input never aborts a tick unless `debug-validation` asks for it.
fn reject(what: &'static str, error: &SimError) {
    if cfg!(feature = "debug-validation") {
        panic!("Malformed {what}: {error}");
    }
    tracing::warn!(what, %error, "Skipping malformed input");
}

#[derive(Serialize, Deserialize)]
struct SessionState {
    tick: u64,
    world: World,
    queue: EventQueue,
    uid_counter: Option<Uid>,
}

/// One participant's simulation.
#[derive(Debug)]
pub struct Session {
    tick: u64,
    world: World,
    queue: EventQueue,
    authority: Box<dyn Authority>,
}

impl Session {
    /// Create a session at tick 0 with the given role.
    #[must_use]
    pub fn new(world: World, authority: Box<dyn Authority>) -> Self {
        Self {
            tick: 0,
            world,
            queue: EventQueue::new(),
            authority,
        }
    }

    /// The simulation owner, rolling dice from `seed`.
    #[must_use]
    pub fn host(world: World, seed: u64) -> Self {
        Self::new(world, Box::new(HostAuthority::new(seed)))
    }

    /// A participant that replays the host's events.
    #[must_use]
    pub fn replica(world: World) -> Self {
        Self::new(world, Box::new(ReplicaAuthority))
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access for setting up a scenario before the first tick.
    ///
    /// Changes made here are not replicated; make the same change on every
    /// participant or use events.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Events waiting in the queue.
    #[must_use]
    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    /// Whether this participant resolves collisions.
    #[must_use]
    pub fn is_authority(&self) -> bool {
        self.authority.resolves_hits()
    }

    /// Route an event by scope.
    pub fn enqueue(&mut self, scope: Scope, event: Event) {
        match scope {
            Scope::Shared => self.publish(event),
            Scope::Local => self.queue.enqueue(event),
        }
    }

    /// Offer a shared event. Applied locally only if the authority publishes it.
    pub fn publish(&mut self, event: Event) {
        if self.authority.publish(&event) {
            self.queue.enqueue(event);
        }
    }

    /// Accept events published by the host. They are never republished.
    pub fn receive<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = Event>,
    {
        for event in events {
            self.queue.enqueue(event);
        }
    }

    /// Take everything this participant published since the last call.
    pub fn take_outbox(&mut self) -> Vec<Event> {
        self.authority.take_outbox()
    }

    /// A fresh entity UID if this participant may create entities.
    pub fn allocate_uid(&mut self) -> Option<Uid> {
        self.authority.allocate_uid()
    }

    /// Fire an actor's selected gun toward `direction`.
    ///
    /// Only the host produces anything; on a replica this is a no-op.
    /// Returns `false` if the actor is gone or unarmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the gun or its bullet class is unknown.
    pub fn fire(&mut self, actor: Uid, direction: Vec2Fixed) -> Result<bool> {
        let Some(shooter) = self.world.actors.get(actor) else {
            return Ok(false);
        };
        let Some(gun) = shooter.gun() else {
            return Ok(false);
        };
        let shot = GunShot {
            owner: Some(actor),
            faction: shooter.faction,
            hurt_always: false,
            pos: shooter.pos,
            z: Fixed::ZERO,
            direction,
        };
        let guns = [gun.to_string()];
        let events = self.authority.fire_guns(&self.world.data, &guns, &shot)?;
        for event in events {
            self.publish(event);
        }
        Ok(true)
    }

    /// Run one tick: drain the queue, then step every bullet.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        let Self { world, queue, .. } = self;
        let mut rejected = 0;
        let dispatched = queue.drain(|event, follow_ups| {
            let kind = event.kind();
            let mut ctx = DispatchContext {
                world: &mut *world,
                follow_ups,
                cues: &mut report.cues,
            };
            if let Err(error) = dispatch::apply(event, &mut ctx) {
                reject(kind, &error);
                rejected += 1;
            }
        });
        report.dispatched = dispatched;
        report.rejected = rejected;

        self.step_bullets(&mut report);

        self.world.mission.advance(1);
        if self.world.mission.pickup_expired() && self.world.mission.outcome.is_none() {
            self.publish(Event::MissionEnd {
                quit: false,
                message: MISSION_END_MESSAGE.to_string(),
            });
        }

        self.tick += 1;
        report.tick = self.tick;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Session state hash");
        }

        report
    }

    fn step_bullets(&mut self, report: &mut TickReport) {
        let uids: Vec<Uid> = self.world.bullets.iter_by_uid().map(|b| b.uid).collect();
        for uid in uids {
            let Some(mut bullet) = self.world.bullets.get(uid).cloned() else {
                continue;
            };
            let outcome =
                match physics::step_bullet(&self.world, &mut bullet, 1, self.authority.as_mut()) {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        reject("bullet", &error);
                        report.rejected += 1;
                        continue;
                    }
                };
            report.bullets += 1;

            if let Some(slot) = self.world.bullets.get_mut(uid) {
                *slot = bullet;
            }
            for (scope, event) in outcome.events {
                self.enqueue(scope, event);
            }
            if !outcome.alive {
                self.publish(Event::RemoveBullet { uid });
            }
        }
    }

    /// Run `ticks` ticks.
    pub fn advance(&mut self, ticks: u64) -> Vec<TickReport> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Hash of the tick and the replicated world state.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.tick.hash(&mut hasher);
        self.world.state_hash().hash(&mut hasher);
        hasher.finish()
    }

    /// Serialize the tick, world, pending queue and the host's UID counter.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        let state = SessionStateRef {
            tick: self.tick,
            world: &self.world,
            queue: &self.queue,
            uid_counter: self.authority.uid_counter(),
        };
        bincode::serialize(&state)
            .map_err(|e| SimError::InvalidState(format!("Failed to serialize session: {e}")))
    }

    /// Rebuild a session from [`snapshot`](Self::snapshot) bytes.
    ///
    /// A host authority carries on from the snapshot's UID counter. Its
    /// random rolls start over from its own seed.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn restore(data: &[u8], mut authority: Box<dyn Authority>) -> Result<Self> {
        let state: SessionState = bincode::deserialize(data)
            .map_err(|e| SimError::InvalidState(format!("Failed to deserialize session: {e}")))?;
        if let Some(next) = state.uid_counter {
            authority.resume_uid_counter(next);
        }
        Ok(Self {
            tick: state.tick,
            world: state.world,
            queue: state.queue,
            authority,
        })
    }
}

#[derive(Serialize)]
struct SessionStateRef<'a> {
    tick: u64,
    world: &'a World,
    queue: &'a EventQueue,
    uid_counter: Option<Uid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Faction;
    use crate::config::{ConfigValues, GameMode};
    use crate::data::GameData;
    use crate::events::{ActorSpawn, BulletSpawn};
    use crate::map::TileMap;

    const DATA: &str = r#"
        GameDataFile(
            particles: ["spark"],
            bullets: BulletFile(
                version: 3,
                bullets: [
                    (name: Some("slug"), size: Some((2.0, 2.0)), speed: Some(4.0), range: Some(30),
                     power: Some(5), spark: Some("spark")),
                ],
            ),
            weapons: [(name: "rifle", bullet: Some("slug"))],
        )
    "#;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn world() -> World {
        let data = GameData::from_ron_str(DATA).unwrap();
        let map = TileMap::from_ascii(&["..........", "..........", ".........."]).unwrap();
        World::new(data, map, GameMode::Campaign, ConfigValues::standard())
    }

    fn spawn(uid: Uid, faction: Faction, pos: Vec2Fixed) -> Event {
        Event::ActorAdd(ActorSpawn {
            uid,
            player: None,
            faction,
            pos,
            health: 20,
            max_health: 20,
            guns: vec!["rifle".to_string()],
            flags: Default::default(),
        })
    }

    fn bullet(uid: Uid, pos: Vec2Fixed, range: i32) -> Event {
        Event::AddBullet(BulletSpawn {
            uid,
            class: "slug".to_string(),
            owner: None,
            faction: Faction::Player,
            hurt_always: false,
            pos,
            z: Fixed::ZERO,
            dz: Fixed::ZERO,
            direction: v(1, 0),
            speed: Fixed::from_num(1),
            range,
        })
    }

    fn lockstep(host: &mut Session, replica: &mut Session, ticks: usize) {
        for _ in 0..ticks {
            replica.receive(host.take_outbox());
            host.tick();
            replica.tick();
            assert_eq!(host.state_hash(), replica.state_hash(), "tick {}", host.get_tick());
        }
    }

    #[test]
    fn test_tick_counts() {
        let mut session = Session::host(world(), 0);
        let reports = session.advance(3);
        assert_eq!(session.get_tick(), 3);
        assert_eq!(reports.last().map(|r| r.tick), Some(3));
    }

    #[test]
    fn test_host_applies_what_it_publishes() {
        let mut session = Session::host(world(), 0);
        session.publish(spawn(1, Faction::Enemy, v(40, 18)));
        assert_eq!(session.take_outbox().len(), 1);
        assert!(session.world().actors.is_empty());
        session.tick();
        assert!(session.world().actors.contains(1));
    }

    #[test]
    fn test_replica_drops_shared_events() {
        let mut session = Session::replica(world());
        session.publish(spawn(1, Faction::Enemy, v(40, 18)));
        session.tick();
        assert!(session.world().actors.is_empty());

        session.receive([spawn(1, Faction::Enemy, v(40, 18))]);
        session.tick();
        assert!(session.world().actors.contains(1));
    }

    #[test]
    fn test_bullet_dies_after_range() {
        let mut session = Session::host(world(), 0);
        session.publish(bullet(5, v(8, 18), 10));
        let mut died_at = None;
        for _ in 0..20 {
            session.tick();
            if died_at.is_none() && !session.world().bullets.contains(5) && session.get_tick() > 1 {
                died_at = Some(session.get_tick());
            }
        }
        // Spawned on tick 1, out of range eleven steps later, removed on the next drain.
        let died_at = died_at.unwrap();
        assert!((12..=14).contains(&died_at), "removed at tick {died_at}");
    }

    #[test]
    fn test_host_and_replica_converge() {
        let mut host = Session::host(world(), 42);
        let mut replica = Session::replica(world());

        host.publish(spawn(1, Faction::Player, v(8, 18)));
        host.publish(spawn(2, Faction::Enemy, v(120, 18)));
        lockstep(&mut host, &mut replica, 2);

        for _ in 0..3 {
            assert!(host.fire(1, v(1, 0)).unwrap());
            replica.fire(1, v(1, 0)).unwrap();
            assert!(replica.take_outbox().is_empty());
            lockstep(&mut host, &mut replica, 10);
        }
        lockstep(&mut host, &mut replica, 40);

        let enemy = host.world().actors.get(2).map(|a| a.health);
        assert_eq!(enemy, replica.world().actors.get(2).map(|a| a.health));
        assert!(enemy.unwrap_or(0) < 20, "enemy was never hit");
        assert!(host.world().bullets.is_empty());
    }

    #[test]
    fn test_malformed_event_is_skipped() {
        let mut session = Session::host(world(), 0);
        session.receive([Event::AddBullet(BulletSpawn {
            class: "laser".to_string(),
            ..match bullet(9, v(8, 18), 10) {
                Event::AddBullet(spawn) => spawn,
                _ => unreachable!(),
            }
        })]);
        if cfg!(feature = "debug-validation") {
            return;
        }
        let report = session.tick();
        assert_eq!(report.rejected, 1);
        assert!(session.world().bullets.is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let mut session = Session::host(world(), 0);
        session.publish(spawn(1, Faction::Enemy, v(40, 18)));
        session.publish(bullet(5, v(8, 30), 50));
        session.advance(4);

        let bytes = session.snapshot().unwrap();
        let mut restored = Session::restore(&bytes, Box::new(ReplicaAuthority)).unwrap();
        assert_eq!(restored.state_hash(), session.state_hash());

        session.tick();
        restored.tick();
        assert_eq!(restored.state_hash(), session.state_hash());
    }

    #[test]
    fn test_restored_host_keeps_uid_counter() {
        let mut session = Session::host(world(), 0);
        session.publish(spawn(1, Faction::Player, v(40, 18)));
        session.tick();
        session.fire(1, v(1, 0)).unwrap();
        session.fire(1, v(1, 0)).unwrap();
        session.tick();
        let live: Vec<Uid> = session.world().bullets.iter_by_uid().map(|b| b.uid).collect();
        assert_eq!(live.len(), 2);

        let bytes = session.snapshot().unwrap();
        let mut restored = Session::restore(&bytes, Box::new(HostAuthority::new(0))).unwrap();
        let next = restored.allocate_uid().unwrap();
        assert!(live.iter().all(|&uid| uid < next), "{next} reuses {live:?}");
        assert_eq!(Some(next), session.allocate_uid());

        // Replica snapshots carry no counter.
        let mut replica = Session::replica(world());
        let bytes = replica.snapshot().unwrap();
        let mut host = Session::restore(&bytes, Box::new(HostAuthority::new(0))).unwrap();
        assert_eq!(host.allocate_uid(), Some(1));
        assert_eq!(replica.allocate_uid(), None);
    }

    #[cfg(feature = "debug-validation")]
    #[test]
    #[should_panic(expected = "Malformed")]
    fn test_malformed_event_fails_fast_when_validating() {
        let mut session = Session::host(world(), 0);
        session.receive([Event::AddBullet(BulletSpawn {
            class: "laser".to_string(),
            ..match bullet(9, v(8, 18), 10) {
                Event::AddBullet(spawn) => spawn,
                _ => unreachable!(),
            }
        })]);
        session.tick();
    }
}
