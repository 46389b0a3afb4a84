//! Determinism testing utilities.
//!
//! Provides a harness for verifying that sessions produce identical
//! results given identical inputs, and that replicas fed the host's
//! events stay in step with the host.
//!
//! # Testing Strategy
//!
//! Every participant must reach the same state from the same event
//! stream. Sources of non-determinism include:
//!
//! - **Floating-point math**: Different CPUs can produce different results.
//!   We use fixed-point arithmetic via [`tilestorm_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   Registries and bullet stepping iterate in UID order.
//!
//! - **System randomness**: Only the host rolls dice, from a seeded
//!   generator, and the results travel inside events.
//!
//! - **Role leaks**: Anything only the host computes (hit detection,
//!   follow-up guns) must reach replicas as events, never as direct
//!   world mutation.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual module determinism (queue, physics, etc.)
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Full host/replica scenarios stay in step
//! 4. **Parallel tests**: Running N sessions in parallel all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use tilestorm_core::authority::ReplicaAuthority;
use tilestorm_core::error::{Result, SimError};
use tilestorm_core::session::Session;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Result of parallel session runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each session.
    pub hashes: Vec<u64>,
    /// Number of ticks each session ran.
    pub ticks: u64,
    /// Number of sessions run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all sessions produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all sessions matched.
    ///
    /// # Panics
    ///
    /// Panics if sessions produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel sessions diverged!\n\
                 Sessions: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```
/// use tilestorm_test_utils::determinism::verify_determinism;
/// use tilestorm_test_utils::fixtures::duel_host;
///
/// let result = verify_determinism(
///     3,
///     50,
///     || duel_host(9),
///     |session| {
///         session.tick();
///     },
///     |session| session.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`Session`].
///
/// Runs the session twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_session_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |session| {
            session.tick();
        },
        |session| session.state_hash(),
    );
    result.is_deterministic
}

/// Run N sessions in parallel using scoped threads and collect final hashes.
///
/// This is useful for catching non-determinism that only manifests
/// under thread scheduling variations, memory layout differences, etc.
///
/// # Panics
///
/// Panics if a session thread panics.
pub fn run_parallel_sessions<F>(setup_fn: F, num_sims: usize, num_ticks: u64) -> ParallelSimResult
where
    F: Fn() -> Session + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut session = setup_fn();
                    session.advance(num_ticks);
                    session.state_hash()
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    ParallelSimResult {
        hashes,
        ticks: num_ticks,
        num_sims,
    }
}

/// Compare two runs tick-by-tick, finding first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// sessions start to differ.
///
/// # Returns
///
/// `None` if sessions are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Session,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if first.state_hash() != second.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        first.tick();
        second.tick();

        if first.state_hash() != second.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Drive a host and its replicas in step for `ticks` ticks.
///
/// Each tick the host's outbox is delivered to every replica, then all
/// participants tick and their hashes are compared. `before_tick` runs
/// on the host first, which is where tests fire guns.
///
/// # Errors
///
/// Returns [`SimError::DesyncDetected`] for the first replica whose hash
/// differs from the host's.
pub fn run_lockstep<F>(
    host: &mut Session,
    replicas: &mut [Session],
    ticks: u64,
    mut before_tick: F,
) -> Result<()>
where
    F: FnMut(&mut Session),
{
    for _ in 0..ticks {
        before_tick(host);
        let outbox = host.take_outbox();
        for replica in replicas.iter_mut() {
            replica.receive(outbox.iter().cloned());
        }

        host.tick();
        let expected = host.state_hash();
        for replica in replicas.iter_mut() {
            replica.tick();
            let actual = replica.state_hash();
            if actual != expected {
                tracing::debug!(tick = host.get_tick(), expected, actual, "Replica diverged");
                return Err(SimError::DesyncDetected {
                    tick: host.get_tick(),
                    local_hash: expected,
                    remote_hash: actual,
                });
            }
        }
    }
    Ok(())
}

/// Verify that a snapshot round-trip preserves session state exactly.
///
/// This is critical for late joiners and replays.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Session,
{
    let mut session = setup_fn();
    session.advance(num_ticks);

    let hash_before = session.state_hash();

    let Ok(bytes) = session.snapshot() else {
        return false;
    };
    let Ok(restored) = Session::restore(&bytes, Box::new(ReplicaAuthority)) else {
        return false;
    };

    hash_before == restored.state_hash()
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for determinism testing.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing of simulation determinism.
pub mod strategies {
    use proptest::prelude::*;
    use tilestorm_core::components::Faction;
    use tilestorm_core::math::{Fixed, Vec2Fixed};

    /// Generate a fixed-point coordinate inside the 20 by 12 arena floor.
    pub fn arb_arena_x() -> impl Strategy<Value = Fixed> {
        (20i32..300i32).prop_map(Fixed::from_num)
    }

    /// See [`arb_arena_x`].
    pub fn arb_arena_y() -> impl Strategy<Value = Fixed> {
        (16i32..128i32).prop_map(Fixed::from_num)
    }

    /// Generate a point on the arena floor.
    pub fn arb_arena_pos() -> impl Strategy<Value = Vec2Fixed> {
        (arb_arena_x(), arb_arena_y()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a non-zero aim direction.
    pub fn arb_direction() -> impl Strategy<Value = Vec2Fixed> {
        (-8i32..=8, -8i32..=8)
            .prop_filter("non-zero aim", |(x, y)| *x != 0 || *y != 0)
            .prop_map(|(x, y)| Vec2Fixed::from_ints(x, y))
    }

    /// Generate a launch speed between 1 and 12 units per tick.
    pub fn arb_speed() -> impl Strategy<Value = Fixed> {
        (4i32..48i32).prop_map(|quarters| Fixed::from_num(quarters) / Fixed::from_num(4))
    }

    /// Generate a bullet lifetime.
    pub fn arb_range() -> impl Strategy<Value = i32> {
        1i32..80i32
    }

    /// Generate any faction.
    pub fn arb_faction() -> impl Strategy<Value = Faction> {
        prop_oneof![Just(Faction::Player), Just(Faction::Ally), Just(Faction::Enemy)]
    }

    /// Gun names from the arena presets.
    pub fn arb_gun() -> impl Strategy<Value = &'static str> {
        prop_oneof![
            Just("rifle"),
            Just("shotgun"),
            Just("lancer"),
            Just("bouncer"),
            Just("launcher"),
            Just("homer"),
            Just("layer"),
        ]
    }

    /// One scripted shot: which tick, which gun, which way.
    #[derive(Debug, Clone)]
    pub struct TestShot {
        /// Tick the shot is fired before.
        pub tick: u64,
        /// Arena preset gun.
        pub gun: &'static str,
        /// Aim.
        pub direction: Vec2Fixed,
    }

    /// Generate a shot within the first `max_tick` ticks.
    pub fn arb_shot(max_tick: u64) -> impl Strategy<Value = TestShot> {
        (0..max_tick, arb_gun(), arb_direction())
            .prop_map(|(tick, gun, direction)| TestShot { tick, gun, direction })
    }

    /// Generate a volley script.
    pub fn arb_shots(max_shots: usize, max_tick: u64) -> impl Strategy<Value = Vec<TestShot>> {
        proptest::collection::vec(arb_shot(max_tick), 0..max_shots)
    }
}
