//! End-to-end tests of the tick loop: queue, dispatcher, physics and
//! collision working together through [`Session`].

use tilestorm_core::authority::HostAuthority;
use tilestorm_core::collision;
use tilestorm_core::data::{BulletClassDef, GameData};
use tilestorm_core::events::{BulletBounce, Damage};
use tilestorm_core::physics;
use tilestorm_core::prelude::*;
use tilestorm_test_utils::determinism::run_lockstep;
use tilestorm_test_utils::fixtures::{
    actor, arena_data_file, arena_world, bullet, duel_host, fixed, map, v, world_on, DUEL_ENEMY,
    DUEL_PLAYER,
};

// =============================================================================
// Helpers
// =============================================================================

fn flying(uid: Uid, class: &str, pos: Vec2Fixed, vel: Vec2Fixed, range: i32) -> Bullet {
    Bullet {
        uid,
        owner: None,
        faction: Faction::Player,
        hurt_always: false,
        class: class.to_string(),
        pos,
        last_pos: pos,
        vel,
        z: Fixed::ZERO,
        dz: Fixed::ZERO,
        count: 0,
        range,
        special_lock: 0,
        sound_lock: 0,
        has_dropped: false,
        trail_counter: 0,
    }
}

fn insert_enemy(world: &mut World, uid: Uid, pos: Vec2Fixed) {
    world
        .actors
        .insert(Actor::new(uid, Faction::Enemy, pos, 40))
        .unwrap();
}

fn bounces(events: &[Event]) -> Vec<&BulletBounce> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::BulletBounce(b) => Some(b),
            _ => None,
        })
        .collect()
}

fn damage_targets(damage: &[Damage]) -> Vec<ThingRef> {
    damage.iter().map(|d| d.target).collect()
}

// =============================================================================
// Determinism and convergence
// =============================================================================

#[test]
fn test_same_event_stream_same_world() {
    let mut host = duel_host(77);
    let mut a = Session::replica(arena_world());
    let mut b = Session::replica(arena_world());

    for tick in 0..200u64 {
        if tick % 12 == 2 {
            host.fire(DUEL_PLAYER, v(1, 0)).unwrap();
            host.fire(DUEL_ENEMY, v(-1, 0)).unwrap();
        }
        let outbox = host.take_outbox();
        a.receive(outbox.clone());
        b.receive(outbox);
        host.tick();
        a.tick();
        b.tick();
        assert_eq!(a.state_hash(), b.state_hash(), "tick {tick}");
    }
}

/// Rifle duel at close range, both actors published but not applied.
fn close_duel(seed: u64) -> Session {
    let mut host = Session::host(arena_world(), seed);
    host.publish(actor(DUEL_PLAYER, Faction::Player, v(40, 96), "rifle"));
    host.publish(actor(DUEL_ENEMY, Faction::Enemy, v(120, 96), "rifle"));
    host
}

#[test]
fn test_only_the_host_decides_hits() {
    let mut host = close_duel(4);
    let mut replicas = [Session::replica(arena_world())];
    run_lockstep(&mut host, &mut replicas, 3, |_| {}).unwrap();

    run_lockstep(&mut host, &mut replicas, 120, |host| {
        if host.get_tick() % 20 == 5 {
            host.fire(DUEL_PLAYER, v(1, 0)).unwrap();
        }
    })
    .unwrap();

    let enemy = |s: &Session| s.world().actors.get(DUEL_ENEMY).map(|a| a.health);
    assert!(enemy(&host).unwrap() < 50, "rifle never landed");
    assert_eq!(enemy(&host), enemy(&replicas[0]));

    // A replica left alone never detects anything.
    let mut lonely = Session::replica(arena_world());
    lonely.receive(close_duel(4).take_outbox());
    lonely.advance(3);
    lonely.receive([Event::AddBullet(bullet(
        500,
        "slug",
        v(60, 96),
        v(1, 0),
        fixed(4),
        60,
    ))]);
    lonely.advance(30);
    assert_eq!(
        lonely.world().actors.get(DUEL_ENEMY).map(|a| a.health),
        Some(50)
    );
    assert!(lonely.take_outbox().is_empty());
}

#[test]
fn test_mixed_arsenal_converges() {
    let mut host = Session::host(arena_world(), 31);
    let mut replicas = [Session::replica(arena_world())];
    let mut shooter = actor(1, Faction::Player, v(60, 60), "rifle");
    if let Event::ActorAdd(spawn) = &mut shooter {
        spawn.guns = ["launcher", "homer", "layer", "bouncer", "lancer", "shotgun"]
            .into_iter()
            .map(String::from)
            .collect();
    }
    host.publish(shooter);
    host.publish(actor(2, Faction::Enemy, v(200, 80), "rifle"));
    host.publish(actor(3, Faction::Enemy, v(120, 100), "rifle"));

    let aims = [v(1, 0), v(1, 1), v(0, 1), v(2, -1)];
    run_lockstep(&mut host, &mut replicas, 300, |host| {
        let tick = host.get_tick();
        if tick % 9 == 1 {
            let gun = (tick / 9 % 6) as usize;
            host.publish(Event::ActorSwitchGun { uid: 1, gun_index: gun });
        }
        if tick % 9 == 3 {
            let aim = aims[(tick / 9 % 4) as usize];
            host.fire(1, aim).unwrap();
        }
    })
    .unwrap();
}

// =============================================================================
// Collision resolution
// =============================================================================

#[test]
fn test_closest_target_beats_wall() {
    let mut world = world_on(map(&[".#......", ".#......", ".#......"]));
    // Actor's near face is 3 units ahead of the bullet, the wall's 5.
    insert_enemy(&mut world, 9, v(18, 18));
    let slug = flying(1, "slug", v(10, 18), v(20, 0), 60);
    let class = world.bullet_class("slug").unwrap().clone();

    let resolution = collision::resolve(&world, &slug, &class, slug.pos, v(30, 18));
    let hit = resolution.hit.unwrap();
    assert_eq!(hit.hit_type, HitType::Flesh);
    assert_eq!(hit.target, collision::Candidate::Thing(ThingRef::Actor(9)));
    assert_eq!(damage_targets(&resolution.damage), vec![ThingRef::Actor(9)]);
}

#[test]
fn test_wall_beats_farther_target() {
    let mut world = world_on(map(&["...#....", "...#....", "...#...."]));
    insert_enemy(&mut world, 9, v(72, 18));
    let slug = flying(1, "slug", v(8, 18), v(80, 0), 60);
    let class = world.bullet_class("slug").unwrap().clone();

    let resolution = collision::resolve(&world, &slug, &class, slug.pos, v(88, 18));
    assert_eq!(resolution.hit.map(|h| h.hit_type), Some(HitType::Wall));
    assert!(resolution.damage.is_empty());
}

#[test]
fn test_piercing_versus_absorbing() {
    let mut world = world_on(map(&["..........", "..........", ".........."]));
    for (uid, x) in [(1, 40), (2, 60), (3, 80)] {
        insert_enemy(&mut world, uid, v(x, 18));
    }

    let lance_class = world.bullet_class("lance").unwrap().clone();
    let lance = flying(10, "lance", v(10, 18), v(100, 0), 40);
    let pierced = collision::resolve(&world, &lance, &lance_class, lance.pos, v(110, 18));
    assert_eq!(pierced.damage.len(), 3);
    assert!(pierced.hit.is_some());

    let slug_class = world.bullet_class("slug").unwrap().clone();
    let slug = flying(11, "slug", v(10, 18), v(100, 0), 40);
    let absorbed = collision::resolve(&world, &slug, &slug_class, slug.pos, v(110, 18));
    assert_eq!(damage_targets(&absorbed.damage), vec![ThingRef::Actor(1)]);
}

#[test]
fn test_piercing_bullet_survives_actor_but_not_wall() {
    let mut world = world_on(map(&["........#.", "........#.", "........#."]));
    insert_enemy(&mut world, 1, v(40, 18));
    let mut lance = flying(10, "lance", v(10, 18), v(20, 0), 40);
    let mut host = HostAuthority::new(0);

    let through_actor = physics::step_bullet(&world, &mut lance, 1, &mut host).unwrap();
    assert!(through_actor.alive);
    let through_actor = physics::step_bullet(&world, &mut lance, 1, &mut host).unwrap();
    assert!(through_actor.alive);

    let mut outcome = through_actor;
    for _ in 0..10 {
        if !outcome.alive {
            break;
        }
        outcome = physics::step_bullet(&world, &mut lance, 1, &mut host).unwrap();
    }
    assert!(!outcome.alive);
    let events: Vec<Event> = outcome.events.into_iter().map(|(_, e)| e).collect();
    assert_eq!(bounces(&events)[0].hit_type, HitType::Wall);
}

// =============================================================================
// Physics
// =============================================================================

#[test]
fn test_range_exhaustion() {
    let world = arena_world();
    let mut slug = flying(1, "slug", v(40, 60), v(1, 0), 10);
    let mut host = HostAuthority::new(0);

    let mut died_at = None;
    for step in 1..=20 {
        let outcome = physics::step_bullet(&world, &mut slug, 1, &mut host).unwrap();
        if !outcome.alive {
            died_at = Some(step);
            break;
        }
    }
    let died_at = died_at.unwrap();
    assert!((9..=11).contains(&died_at), "died at step {died_at}");
}

#[test]
fn test_out_of_range_bullet_is_removed_everywhere() {
    let mut host = Session::host(arena_world(), 0);
    let mut replicas = [Session::replica(arena_world())];
    host.publish(Event::AddBullet(bullet(
        7,
        "slug",
        v(40, 60),
        v(1, 0),
        fixed(1),
        10,
    )));
    run_lockstep(&mut host, &mut replicas, 15, |_| {}).unwrap();
    assert!(host.world().bullets.is_empty());
    assert!(replicas[0].world().bullets.is_empty());
}

#[test]
fn test_stale_damage_is_a_no_op() {
    let mut session = duel_host(0);
    session.tick();
    let before = session.world().state_hash();

    let ghost = Damage {
        target: ThingRef::Actor(4_242),
        source: Some(DUEL_PLAYER),
        power: 10,
        mass: fixed(1),
        vel: v(3, 0),
        special: Default::default(),
    };
    session.receive([
        Event::ThingDamage(ghost.clone()),
        Event::ThingDamage(ghost),
        Event::RemoveBullet { uid: 4_242 },
    ]);
    let report = session.tick();

    assert_eq!(report.dispatched, 3);
    assert_eq!(report.rejected, 0);
    assert_eq!(session.world().state_hash(), before);
}

fn data_with_drag() -> GameData {
    let mut file = arena_data_file();
    file.bullets.bullets.push(BulletClassDef {
        name: Some("drag".to_string()),
        speed: Some(fixed(6)),
        range: Some(100),
        friction: Some(Fixed::from_num(0.25)),
        ..Default::default()
    });
    GameData::from_file(file).unwrap()
}

#[test]
fn test_friction_never_speeds_up_or_reverses() {
    let world = World::new(
        data_with_drag(),
        map(&["....................", "....................", "...................."]),
        GameMode::Campaign,
        ConfigValues::standard(),
    );
    let mut drag = flying(1, "drag", v(20, 18), Vec2Fixed::new(fixed(3), -fixed(1)), 100);
    let mut host = HostAuthority::new(0);

    let mut last = drag.vel;
    for _ in 0..40 {
        let outcome = physics::step_bullet(&world, &mut drag, 1, &mut host).unwrap();
        assert!(drag.vel.x.abs() <= last.x.abs());
        assert!(drag.vel.y.abs() <= last.y.abs());
        assert!(drag.vel.x >= Fixed::ZERO && drag.vel.y <= Fixed::ZERO);
        last = drag.vel;
        if !outcome.alive {
            break;
        }
    }
    assert!(drag.vel.is_zero());
}

#[test]
fn test_elastic_wall_bounce_end_to_end() {
    // Column 10 is wall: x in [160, 176).
    let rows = ["..........#.....", "..........#.....", "..........#....."];
    let world = world_on(map(&rows));
    let mut host = Session::host(world.clone(), 0);
    let mut replicas = [Session::replica(world)];
    host.publish(Event::AddBullet(bullet(
        3,
        "rubber",
        v(145, 18),
        v(1, 0),
        fixed(5),
        20,
    )));

    let mut published = Vec::new();
    let mut velocities = Vec::new();
    for _ in 0..25 {
        let outbox = host.take_outbox();
        published.extend(outbox.iter().cloned());
        replicas[0].receive(outbox);
        host.tick();
        replicas[0].tick();
        assert_eq!(host.state_hash(), replicas[0].state_hash());
        if let Some(b) = host.world().bullets.get(3) {
            velocities.push(b.vel);
        }
    }

    let walls = bounces(&published);
    assert_eq!(walls.len(), 1, "{walls:?}");
    assert_eq!(walls[0].hit_type, HitType::Wall);
    assert_eq!(walls[0].vel, v(-5, 0));
    assert!(walls[0].bounce_pos.x < fixed(160));

    assert_eq!(velocities.first(), Some(&v(5, 0)));
    assert_eq!(velocities.last(), Some(&v(-5, 0)));
    assert!(host.world().bullets.is_empty());
}

#[test]
fn test_bounce_off_map_edge_keeps_flying() {
    let world = world_on(map(&[".........."; 3]));
    let mut host = Session::host(world.clone(), 0);
    let mut replicas = [Session::replica(world)];
    host.publish(Event::AddBullet(bullet(
        3,
        "rubber",
        v(135, 18),
        v(1, 0),
        fixed(5),
        40,
    )));

    let mut published = Vec::new();
    for tick in 0..20 {
        let outbox = host.take_outbox();
        published.extend(outbox.iter().cloned());
        replicas[0].receive(outbox);
        host.tick();
        replicas[0].tick();
        assert_eq!(host.state_hash(), replicas[0].state_hash(), "tick {tick}");
    }

    assert_eq!(bounces(&published).len(), 1);
    assert!(!published
        .iter()
        .any(|e| matches!(e, Event::RemoveBullet { uid: 3 })));
    let rubber = host.world().bullets.get(3).expect("bounced bullet died");
    assert_eq!(rubber.vel, v(-5, 0));
    assert!(rubber.pos.x < fixed(135));
}

#[test]
fn test_grenade_bursts_on_landing() {
    let mut host = Session::host(arena_world(), 6);
    let mut replicas = [Session::replica(arena_world())];
    host.publish(actor(1, Faction::Player, v(60, 60), "launcher"));
    run_lockstep(&mut host, &mut replicas, 2, |_| {}).unwrap();

    host.fire(1, v(1, 0)).unwrap();
    let mut pellets = 0;
    run_lockstep(&mut host, &mut replicas, 20, |host| {
        pellets = pellets.max(
            host.world()
                .bullets
                .iter()
                .filter(|b| b.class == "pellet")
                .count(),
        );
    })
    .unwrap();
    assert_eq!(pellets, 6);
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn test_recorded_duel_replays() {
    let mut host = Session::host(arena_world(), 19);
    let mut replica = Session::replica(arena_world());
    let mut recorder = ReplayRecorder::new(19, &host).unwrap();
    host.publish(actor(DUEL_PLAYER, Faction::Player, v(40, 96), "shotgun"));
    host.publish(actor(DUEL_ENEMY, Faction::Enemy, v(260, 96), "rifle"));

    for _ in 0..90 {
        if host.get_tick() % 10 == 4 {
            host.fire(DUEL_PLAYER, v(1, 0)).unwrap();
            host.fire(DUEL_ENEMY, v(-1, 0)).unwrap();
        }
        let events = recorder.record(host.get_tick(), host.take_outbox());
        replica.receive(events);
        host.tick();
        replica.tick();
    }
    assert_eq!(host.state_hash(), replica.state_hash());

    let replay = recorder.finish(&host);
    let mut player = ReplayPlayer::new(replay).unwrap();
    assert!(player.verify().unwrap());
    assert_eq!(player.session().state_hash(), replica.state_hash());
}

// =============================================================================
// Property tests
// =============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;
    use tilestorm_test_utils::determinism::strategies::{
        arb_arena_pos, arb_direction, arb_range, arb_speed,
    };

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_bullet_swarms_converge(
            spawns in proptest::collection::vec(
                (arb_arena_pos(), arb_direction(), arb_speed(), arb_range(), 0usize..4),
                1..12,
            ),
            enemy in arb_arena_pos(),
            seed in any::<u64>(),
        ) {
            let classes = ["slug", "rubber", "lance", "seeker"];
            let mut host = Session::host(arena_world(), seed);
            let mut replicas = [Session::replica(arena_world())];
            host.publish(actor(1, Faction::Player, v(30, 30), "rifle"));
            host.publish(actor(2, Faction::Enemy, enemy, "rifle"));
            for (i, (pos, direction, speed, range, class)) in spawns.into_iter().enumerate() {
                let mut spawn = bullet(
                    100 + i as u64,
                    classes[class],
                    pos,
                    direction.normalize(),
                    speed,
                    range,
                );
                spawn.owner = Some(1);
                host.publish(Event::AddBullet(spawn));
            }
            let result = run_lockstep(&mut host, &mut replicas, 90, |_| {});
            prop_assert!(result.is_ok(), "{result:?}");
            prop_assert!(host.world().bullets.is_empty());
        }

        #[test]
        fn prop_step_never_leaves_the_map(
            pos in arb_arena_pos(),
            direction in arb_direction(),
            speed in arb_speed(),
        ) {
            let world = arena_world();
            let mut rubber = flying(1, "rubber", pos, direction.normalize().scale(speed), 80);
            let mut host = HostAuthority::new(1);
            for _ in 0..80 {
                let outcome = physics::step_bullet(&world, &mut rubber, 1, &mut host).unwrap();
                prop_assert!(world.map.contains_point(rubber.pos));
                if !outcome.alive {
                    break;
                }
                for event in outcome.events.into_iter().map(|(_, e)| e) {
                    if let Event::BulletBounce(b) = event {
                        rubber.pos = b.bounce_pos;
                        rubber.vel = b.vel;
                    }
                }
            }
        }
    }
}
