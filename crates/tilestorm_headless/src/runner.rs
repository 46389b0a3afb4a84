//! Runs a scenario on a host session, optionally mirrored by a replica.
//!
//! Every tick the host takes the scripted actions for that tick, its outbox
//! is recorded and delivered to the replica, and then both sessions tick.
//! The replica's state hash is compared after every tick.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tilestorm_core::data::GameData;
use tilestorm_core::error::SimError;
use tilestorm_core::events::Event;
use tilestorm_core::math::Vec2Fixed;
use tilestorm_core::replay::{Replay, ReplayRecorder};
use tilestorm_core::session::Session;

use crate::scenario::{Action, Scenario, ScenarioError};

/// How to run a scenario.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the scenario's tick count.
    pub ticks: Option<u64>,
    /// Mirror the host on a replica and check convergence every tick.
    pub replica: bool,
    /// Save a replay here when the run ends.
    pub record: Option<PathBuf>,
}

/// Where a replica first disagreed with the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// Tick after which the hashes differed.
    pub tick: u64,
    /// Host hash.
    pub host_hash: u64,
    /// Replica hash.
    pub replica_hash: u64,
}

/// Everything a run produced, printed as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Host seed.
    pub seed: u64,
    /// Ticks run.
    pub ticks: u64,
    /// Host state hash after the last tick.
    pub final_hash: u64,
    /// Scripted actions the host could not take.
    pub skipped_actions: usize,
    /// `GunFire` events published.
    pub shots: usize,
    /// `AddBullet` events published.
    pub bullets_spawned: usize,
    /// `ThingDamage` events published.
    pub hits: usize,
    /// `BulletBounce` events published.
    pub bounces: usize,
    /// Events the host dispatched.
    pub dispatched: usize,
    /// Events and bullets the host skipped as malformed.
    pub rejected: usize,
    /// Bullets still flying at the end.
    pub bullets_alive: usize,
    /// Actors still standing at the end.
    pub actors_alive: usize,
    /// Whether a replica ran alongside.
    pub replica: bool,
    /// First replica divergence, if any.
    pub divergence: Option<Divergence>,
    /// Saved replay path.
    pub replay: Option<String>,
}

impl RunSummary {
    fn count_published(&mut self, events: &[Event]) {
        for event in events {
            match event {
                Event::GunFire { .. } => self.shots += 1,
                Event::AddBullet(_) => self.bullets_spawned += 1,
                Event::ThingDamage(_) => self.hits += 1,
                Event::BulletBounce(_) => self.bounces += 1,
                _ => {}
            }
        }
    }

    /// Whether the replica (if any) stayed in step to the end.
    #[must_use]
    pub const fn converged(&self) -> bool {
        self.divergence.is_none()
    }
}

/// Runs one scenario.
pub struct ScenarioRunner<'a> {
    scenario: &'a Scenario,
    host: Session,
    replica: Option<Session>,
    recorder: Option<ReplayRecorder>,
    summary: RunSummary,
}

impl<'a> ScenarioRunner<'a> {
    /// Validate the scenario, build its world and publish the setup events.
    ///
    /// # Errors
    ///
    /// Returns an error if the scenario does not fit `data`.
    pub fn new(
        scenario: &'a Scenario,
        data: GameData,
        options: &RunOptions,
    ) -> Result<Self, ScenarioError> {
        scenario.validate(&data)?;
        let world = scenario.build_world(data)?;
        let seed = scenario.session.seed;

        let replica = options.replica.then(|| Session::replica(world.clone()));
        let mut host = Session::host(world, seed);
        let recorder = if options.record.is_some() {
            Some(ReplayRecorder::new(seed, &host)?)
        } else {
            None
        };
        for event in scenario.setup_events() {
            host.publish(event);
        }

        Ok(Self {
            scenario,
            host,
            replica,
            recorder,
            summary: RunSummary {
                scenario: scenario.name.clone(),
                seed,
                replica: options.replica,
                ..RunSummary::default()
            },
        })
    }

    /// The host session.
    #[must_use]
    pub const fn host(&self) -> &Session {
        &self.host
    }

    /// The replica session, if one runs.
    #[must_use]
    pub const fn replica(&self) -> Option<&Session> {
        self.replica.as_ref()
    }

    fn take_actions(&mut self) -> Result<(), SimError> {
        let scenario = self.scenario;
        let tick = self.host.get_tick();
        for action in scenario.actions_at(tick) {
            match *action {
                Action::Fire { actor, aim } => {
                    let direction = Vec2Fixed::from_ints(aim.0, aim.1);
                    if !self.host.fire(actor, direction)? {
                        tracing::debug!(tick, actor, "Scripted shot skipped");
                        self.summary.skipped_actions += 1;
                    }
                }
                Action::SwitchGun { actor, gun } => {
                    self.host.publish(Event::ActorSwitchGun {
                        uid: actor,
                        gun_index: gun,
                    });
                }
            }
        }
        Ok(())
    }

    /// Run one tick on every session.
    ///
    /// # Errors
    ///
    /// Returns an error if a scripted shot names an unknown gun.
    pub fn tick(&mut self) -> Result<(), ScenarioError> {
        self.take_actions()?;

        let tick = self.host.get_tick();
        let mut outbox = self.host.take_outbox();
        if let Some(recorder) = self.recorder.as_mut() {
            outbox = recorder.record(tick, outbox);
        }
        self.summary.count_published(&outbox);

        let report = self.host.tick();
        self.summary.dispatched += report.dispatched;
        self.summary.rejected += report.rejected;
        self.summary.ticks += 1;

        if let Some(replica) = self.replica.as_mut() {
            replica.receive(outbox);
            replica.tick();
            let host_hash = self.host.state_hash();
            let replica_hash = replica.state_hash();
            if self.summary.divergence.is_none() && host_hash != replica_hash {
                tracing::warn!(
                    tick = self.host.get_tick(),
                    host_hash,
                    replica_hash,
                    "Replica diverged"
                );
                self.summary.divergence = Some(Divergence {
                    tick: self.host.get_tick(),
                    host_hash,
                    replica_hash,
                });
            }
        }
        Ok(())
    }

    /// Finish the run and save the replay if one was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the replay cannot be written.
    pub fn finish(
        mut self,
        record: Option<&Path>,
    ) -> Result<(RunSummary, Option<Replay>), ScenarioError> {
        let world = self.host.world();
        self.summary.final_hash = self.host.state_hash();
        self.summary.bullets_alive = world.bullets.len();
        self.summary.actors_alive = world.actors.iter().filter(|a| !a.dead).count();

        let replay = self.recorder.take().map(|r| r.finish(&self.host));
        if let (Some(replay), Some(path)) = (replay.as_ref(), record) {
            replay.save(path)?;
            tracing::info!(path = %path.display(), "Replay saved");
            self.summary.replay = Some(path.display().to_string());
        }
        Ok((self.summary, replay))
    }
}

/// Run a scenario to completion.
///
/// # Errors
///
/// Returns an error if the scenario is invalid or the replay cannot be saved.
/// A replica divergence is reported in the summary, not as an error.
pub fn run_scenario(
    scenario: &Scenario,
    data: GameData,
    options: &RunOptions,
) -> Result<RunSummary, ScenarioError> {
    let ticks = options.ticks.unwrap_or(scenario.ticks);
    tracing::info!(
        scenario = %scenario.name,
        ticks,
        replica = options.replica,
        "Running scenario"
    );

    let mut runner = ScenarioRunner::new(scenario, data, options)?;
    for _ in 0..ticks {
        runner.tick()?;
    }
    let (summary, _) = runner.finish(options.record.as_deref())?;

    tracing::info!(
        final_hash = summary.final_hash,
        hits = summary.hits,
        converged = summary.converged(),
        "Scenario finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestorm_core::replay::ReplayPlayer;
    use tilestorm_test_utils::fixtures::arena_data;

    #[test]
    fn test_duel_converges_with_replica() {
        let duel = Scenario::duel();
        let options = RunOptions {
            replica: true,
            ..RunOptions::default()
        };
        let summary = run_scenario(&duel, arena_data(), &options).unwrap();

        assert_eq!(summary.ticks, 120);
        assert!(summary.converged());
        assert_eq!(summary.shots, 10);
        assert_eq!(summary.bullets_spawned, 10);
        assert!(summary.hits > 0);
        assert_eq!(summary.skipped_actions, 0);
        assert_eq!(summary.bullets_alive, 0);
        assert_eq!(summary.rejected, 0);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let duel = Scenario::duel();
        let options = RunOptions::default();
        let a = run_scenario(&duel, arena_data(), &options).unwrap();
        let b = run_scenario(&duel, arena_data(), &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tick_override() {
        let duel = Scenario::duel();
        let options = RunOptions {
            ticks: Some(3),
            ..RunOptions::default()
        };
        let summary = run_scenario(&duel, arena_data(), &options).unwrap();
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.shots, 1);
    }

    #[test]
    fn test_shot_before_spawn_is_skipped() {
        let mut duel = Scenario::duel();
        duel.script[0].tick = 0;
        let options = RunOptions {
            ticks: Some(10),
            ..RunOptions::default()
        };
        let summary = run_scenario(&duel, arena_data(), &options).unwrap();
        assert_eq!(summary.skipped_actions, 1);
    }

    #[test]
    fn test_recorded_run_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duel.replay");
        let options = RunOptions {
            ticks: Some(60),
            replica: false,
            record: Some(path.clone()),
        };
        let summary = run_scenario(&Scenario::duel(), arena_data(), &options).unwrap();
        assert_eq!(summary.replay.as_deref(), Some(path.display().to_string().as_str()));

        let replay = Replay::load(&path).unwrap();
        assert_eq!(replay.final_tick, 60);
        assert_eq!(replay.final_hash, summary.final_hash);
        assert!(ReplayPlayer::new(replay).unwrap().verify().unwrap());
    }

    #[test]
    fn test_invalid_scenario_fails_early() {
        let mut duel = Scenario::duel();
        duel.actors[1].guns = vec!["nope".to_string()];
        assert!(run_scenario(&duel, arena_data(), &RunOptions::default()).is_err());
    }
}
