//! Test fixtures and helpers.
//!
//! Pre-built game data, maps and spawn events for consistent testing.
//! Fixtures panic on bad input; they are only ever fed the constants below.

use fixed::types::I32F32;

use tilestorm_core::components::{CharacterFlags, Faction};
use tilestorm_core::config::{ConfigValues, GameMode};
use tilestorm_core::data::{GameData, GameDataFile};
use tilestorm_core::events::{ActorSpawn, BulletSpawn, Event};
use tilestorm_core::map::TileMap;
use tilestorm_core::math::Vec2Fixed;
use tilestorm_core::registry::Uid;
use tilestorm_core::session::Session;
use tilestorm_core::world::World;

/// Bullet and weapon presets used across tests.
///
/// | bullet | behaviour |
/// |---|---|
/// | `slug` | plain, absorbed by anything |
/// | `pellet` | weak, rolled speed and range |
/// | `lance` | piercing |
/// | `rubber` | bounces off walls |
/// | `grenade` | lobbed, bursts into `pellet`s on landing |
/// | `seeker` | homes in on enemies |
/// | `mine` | never moves, bursts when an enemy comes close |
pub const ARENA_DATA: &str = r#"
GameDataFile(
    particles: ["spark", "smoke", "mark", "fizzle"],
    bullets: BulletFile(
        version: 3,
        default: (size: Some((2.0, 2.0)), spark: Some("spark")),
        bullets: [
            (name: Some("slug"), speed: Some(4.0), range: Some(60), power: Some(10)),
            (name: Some("pellet"), speed_low: Some(3.0), speed_high: Some(5.0),
             range_low: Some(12), range_high: Some(20), power: Some(2)),
            (name: Some("lance"), speed: Some(6.0), range: Some(40), power: Some(5),
             persists: Some(true)),
            (name: Some("rubber"), speed: Some(5.0), range: Some(80), power: Some(3),
             wall_bounces: Some(true)),
            (name: Some("grenade"), speed: Some(3.0), range: Some(-1), power: Some(0),
             hits_objects: Some(false),
             falling: Some((gravity: 1.0, falls_down: true, destroy_on_drop: true,
                            drop_guns: ["burst"]))),
            (name: Some("seeker"), speed: Some(3.0), range: Some(90), power: Some(6),
             seek_factor: Some(4.0), trail: Some((particle: Some("smoke"), width: 1.0,
                                                 ticks_per_emit: 3))),
            (name: Some("mine"), speed: Some(0.0), range: Some(200), power: Some(0),
             hits_objects: Some(false), proximity_guns: ["burst"]),
        ],
    ),
    weapons: [
        (name: "rifle", bullet: Some("slug")),
        (name: "shotgun", bullet: Some("pellet"), spread: (count: 5, width: 0.15),
         recoil: 0.1),
        (name: "lancer", bullet: Some("lance")),
        (name: "bouncer", bullet: Some("rubber")),
        (name: "launcher", bullet: Some("grenade"), elevation_low: 3.0, elevation_high: 4.0),
        (name: "homer", bullet: Some("seeker")),
        (name: "layer", bullet: Some("mine")),
        (name: "burst", bullet: Some("pellet"), spread: (count: 6, width: 1.0)),
    ],
)
"#;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Shorthand for an integer vector.
#[must_use]
pub fn v(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// The preset data file, unlinked, for tests that add their own classes.
///
/// # Panics
///
/// Panics if [`ARENA_DATA`] stops parsing.
#[must_use]
pub fn arena_data_file() -> GameDataFile {
    ron::from_str(ARENA_DATA).expect("arena data parses")
}

/// The linked preset data.
///
/// # Panics
///
/// Panics if [`ARENA_DATA`] stops linking.
#[must_use]
pub fn arena_data() -> GameData {
    GameData::from_file(arena_data_file()).expect("arena data links")
}

/// An open floor of `width` by `height` tiles ringed by walls.
///
/// # Panics
///
/// Panics if either side is smaller than 3.
#[must_use]
pub fn walled_arena(width: usize, height: usize) -> TileMap {
    assert!(width >= 3 && height >= 3, "arena too small");
    let wall = "#".repeat(width);
    let floor = format!("#{}#", ".".repeat(width - 2));
    let rows: Vec<String> = (0..height)
        .map(|y| if y == 0 || y == height - 1 { wall.clone() } else { floor.clone() })
        .collect();
    map(&rows)
}

/// Parse ASCII rows into a map.
///
/// # Panics
///
/// Panics for ragged rows.
#[must_use]
pub fn map<S: AsRef<str>>(rows: &[S]) -> TileMap {
    TileMap::from_ascii(rows).expect("valid ascii map")
}

/// A campaign world with the preset data on `map`.
#[must_use]
pub fn world_on(map: TileMap) -> World {
    World::new(arena_data(), map, GameMode::Campaign, ConfigValues::standard())
}

/// A campaign world on a 20 by 12 walled arena.
#[must_use]
pub fn arena_world() -> World {
    world_on(walled_arena(20, 12))
}

/// An `ActorAdd` event for an armed actor with 50 health.
#[must_use]
pub fn actor(uid: Uid, faction: Faction, pos: Vec2Fixed, gun: &str) -> Event {
    Event::ActorAdd(ActorSpawn {
        uid,
        player: None,
        faction,
        pos,
        health: 50,
        max_health: 50,
        guns: vec![gun.to_string()],
        flags: CharacterFlags::default(),
    })
}

/// A player-side bullet with no owner.
#[must_use]
pub fn bullet(
    uid: Uid,
    class: &str,
    pos: Vec2Fixed,
    direction: Vec2Fixed,
    speed: I32F32,
    range: i32,
) -> BulletSpawn {
    BulletSpawn {
        uid,
        class: class.to_string(),
        owner: None,
        faction: Faction::Player,
        hurt_always: false,
        pos,
        z: I32F32::ZERO,
        dz: I32F32::ZERO,
        direction,
        speed,
        range,
    }
}

/// Host and replica sessions on the same world.
#[must_use]
pub fn host_and_replica(world: World, seed: u64) -> (Session, Session) {
    (Session::host(world.clone(), seed), Session::replica(world))
}

/// Uids the duel scenario uses for its two actors.
pub const DUEL_PLAYER: Uid = 1_000;
/// See [`DUEL_PLAYER`].
pub const DUEL_ENEMY: Uid = 1_001;

/// A host with one player and one enemy facing each other across the
/// arena, both published but not yet applied.
#[must_use]
pub fn duel_host(seed: u64) -> Session {
    let mut host = Session::host(arena_world(), seed);
    host.publish(actor(DUEL_PLAYER, Faction::Player, v(40, 96), "shotgun"));
    host.publish(actor(DUEL_ENEMY, Faction::Enemy, v(260, 96), "rifle"));
    host
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_data_links() {
        let data = arena_data();
        for name in ["slug", "pellet", "lance", "rubber", "grenade", "seeker", "mine"] {
            assert!(data.bullets.get(name).is_ok(), "{name}");
        }
        let grenade = data.bullets.get("grenade").unwrap();
        assert_eq!(grenade.guns.drop, vec!["burst".to_string()]);
        assert!(data.bullets.get("mine").unwrap().has_proximity());
    }

    #[test]
    fn test_walled_arena_shape() {
        use tilestorm_core::map::TilePos;
        let arena = walled_arena(5, 4);
        assert!(arena.is_shootable(TilePos::new(0, 0)));
        assert!(arena.is_shootable(TilePos::new(4, 2)));
        assert!(!arena.is_shootable(TilePos::new(2, 2)));
        assert!(arena.is_shootable(TilePos::new(2, 3)));
    }

    #[test]
    fn test_duel_host_publishes_both_actors() {
        let mut host = duel_host(0);
        assert_eq!(host.take_outbox().len(), 2);
        host.tick();
        assert!(host.world().actors.contains(DUEL_PLAYER));
        assert!(host.world().actors.contains(DUEL_ENEMY));
    }
}
