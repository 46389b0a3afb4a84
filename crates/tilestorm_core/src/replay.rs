//! Replay recording and playback.
//!
//! A replay stores the host's session as it was before the first recorded
//! tick plus every batch of events the host published, tagged with the tick
//! they were delivered before. Playing it back on a replica session
//! reproduces the game exactly, which makes replays double as desync
//! reports.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::authority::ReplicaAuthority;
use crate::error::{Result, SimError};
use crate::events::Event;
use crate::session::Session;

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Events delivered to replicas right before a tick ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayFrame {
    /// Session tick the events were delivered before.
    pub tick: u64,
    /// Published events in publication order.
    pub events: Vec<Event>,
}

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Seed of the host that produced the replay.
    pub seed: u64,
    /// [`Session::snapshot`] bytes of the starting state.
    pub initial_state: Vec<u8>,
    /// Published events in tick order. Ticks without events have no frame.
    pub frames: Vec<ReplayFrame>,
    /// Tick the recording stopped at.
    pub final_tick: u64,
    /// Host state hash at `final_tick`.
    pub final_hash: u64,
}

impl Replay {
    /// Start a replay from a session's current state.
    ///
    /// # Errors
    /// Returns an error if the session cannot be serialized.
    pub fn new(seed: u64, initial_state: &Session) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            seed,
            initial_state: initial_state.snapshot()?,
            frames: Vec::new(),
            final_tick: initial_state.get_tick(),
            final_hash: 0,
        })
    }

    /// Record events delivered before `tick`. Empty batches are not stored.
    pub fn record_frame(&mut self, tick: u64, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        match self.frames.last_mut() {
            Some(last) if last.tick == tick => last.events.extend(events),
            _ => self.frames.push(ReplayFrame { tick, events }),
        }
    }

    /// Finalize the replay with end-game state.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Save the replay to a file.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| SimError::InvalidState(format!("Failed to serialize replay: {e}")))?;
        std::fs::write(path.as_ref(), bytes)
            .map_err(|e| SimError::InvalidState(format!("Failed to write replay file: {e}")))?;
        Ok(())
    }

    /// Load a replay from a file.
    ///
    /// # Errors
    /// Returns an error if file reading or deserialization fails, or the
    /// replay was written by another format version.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())
            .map_err(|e| SimError::InvalidState(format!("Failed to read replay file: {e}")))?;
        let replay: Self = bincode::deserialize(&bytes)
            .map_err(|e| SimError::InvalidState(format!("Failed to deserialize replay: {e}")))?;

        if replay.version != REPLAY_VERSION {
            return Err(SimError::UnsupportedVersion {
                what: "replay",
                version: replay.version,
                max: REPLAY_VERSION,
            });
        }

        Ok(replay)
    }

    /// A replica session in the starting state.
    ///
    /// # Errors
    /// Returns an error if state deserialization fails.
    pub fn restore_initial_state(&self) -> Result<Session> {
        Session::restore(&self.initial_state, Box::new(ReplicaAuthority))
    }

    /// Events delivered before `tick`, if any.
    #[must_use]
    pub fn frame_at(&self, tick: u64) -> Option<&ReplayFrame> {
        self.frames.iter().find(|frame| frame.tick == tick)
    }

    /// Number of recorded events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.frames.iter().map(|frame| frame.events.len()).sum()
    }
}

/// Records a host session while it runs.
///
/// Create the recorder before the host publishes anything: events already
/// published sit in the host's queue and would be delivered twice.
///
/// ```
/// use tilestorm_core::prelude::*;
/// use tilestorm_core::replay::{ReplayPlayer, ReplayRecorder};
///
/// let data = GameData::from_ron_str("GameDataFile(bullets: BulletFile(version: 3))").unwrap();
/// let map = TileMap::from_ascii(&["...."]).unwrap();
/// let world = World::new(data, map, GameMode::Campaign, ConfigValues::standard());
///
/// let mut host = Session::host(world, 3);
/// let mut recorder = ReplayRecorder::new(3, &host).unwrap();
/// host.publish(Event::GameStart);
/// for _ in 0..5 {
///     recorder.record(host.get_tick(), host.take_outbox());
///     host.tick();
/// }
///
/// let replay = recorder.finish(&host);
/// assert!(ReplayPlayer::new(replay).unwrap().verify().unwrap());
/// ```
#[derive(Debug)]
pub struct ReplayRecorder {
    replay: Replay,
}

impl ReplayRecorder {
    /// Snapshot `host` as the starting state.
    ///
    /// # Errors
    /// Returns an error if the session cannot be serialized.
    pub fn new(seed: u64, host: &Session) -> Result<Self> {
        Ok(Self {
            replay: Replay::new(seed, host)?,
        })
    }

    /// Record a batch taken from the host's outbox before `tick` and hand
    /// it back for delivery to live replicas.
    pub fn record(&mut self, tick: u64, events: Vec<Event>) -> Vec<Event> {
        self.replay.record_frame(tick, events.clone());
        events
    }

    /// The replay so far.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Close the replay at the host's current tick and hash.
    #[must_use]
    pub fn finish(mut self, host: &Session) -> Replay {
        self.replay.finalize(host.get_tick(), host.state_hash());
        tracing::debug!(
            final_tick = self.replay.final_tick,
            frames = self.replay.frames.len(),
            events = self.replay.event_count(),
            "Replay recorded"
        );
        self.replay
    }
}

/// Replay playback controller.
#[derive(Debug)]
pub struct ReplayPlayer {
    /// The replay being played.
    replay: Replay,
    /// Replica session being driven.
    session: Session,
    /// Index of the next frame to deliver.
    frame_index: usize,
    /// Whether playback is paused.
    pub paused: bool,
}

impl ReplayPlayer {
    /// Create a new replay player from a replay.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay) -> Result<Self> {
        let session = replay.restore_initial_state()?;
        Ok(Self {
            replay,
            session,
            frame_index: 0,
            paused: false,
        })
    }

    fn step(&mut self) {
        let tick = self.session.get_tick();
        while let Some(frame) = self.replay.frames.get(self.frame_index) {
            if frame.tick > tick {
                break;
            }
            self.session.receive(frame.events.iter().cloned());
            self.frame_index += 1;
        }
        self.session.tick();
    }

    /// Advance the replay by one tick.
    ///
    /// Returns true if there are more ticks to play.
    pub fn advance(&mut self) -> bool {
        if !self.paused && !self.is_finished() {
            self.step();
        }
        !self.is_finished()
    }

    /// Seek to a specific tick, replaying from the start when going back.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn seek(&mut self, target_tick: u64) -> Result<()> {
        if target_tick < self.session.get_tick() {
            self.session = self.replay.restore_initial_state()?;
            self.frame_index = 0;
        }
        let target = target_tick.min(self.replay.final_tick);
        while self.session.get_tick() < target {
            self.step();
        }
        Ok(())
    }

    /// Current session tick.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.session.get_tick()
    }

    /// The replica session being driven.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Get the replay being played.
    #[must_use]
    pub const fn replay(&self) -> &Replay {
        &self.replay
    }

    /// Check if the replay has finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.session.get_tick() >= self.replay.final_tick
    }

    /// Play to the end and compare against the recorded hash.
    ///
    /// # Errors
    /// Returns an error if state restoration fails.
    pub fn verify(&mut self) -> Result<bool> {
        self.seek(self.replay.final_tick)?;
        let actual = self.session.state_hash();
        if actual != self.replay.final_hash {
            tracing::warn!(
                tick = self.replay.final_tick,
                expected = self.replay.final_hash,
                actual,
                "Replay diverged"
            );
        }
        Ok(actual == self.replay.final_hash)
    }

    /// Toggle pause state.
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Faction;
    use crate::config::{ConfigValues, GameMode};
    use crate::data::GameData;
    use crate::events::ActorSpawn;
    use crate::map::TileMap;
    use crate::math::Vec2Fixed;
    use crate::world::World;

    const DATA: &str = r#"
        GameDataFile(
            bullets: BulletFile(
                version: 3,
                bullets: [
                    (name: Some("pellet"), size: Some((2.0, 2.0)), speed_low: Some(3.0),
                     speed_high: Some(5.0), range: Some(30), power: Some(4)),
                ],
            ),
            weapons: [
                (name: "scatter", bullet: Some("pellet"), spread: (count: 3, width: 0.2),
                 recoil: 0.1),
            ],
        )
    "#;

    fn host() -> Session {
        let data = GameData::from_ron_str(DATA).unwrap();
        let map = TileMap::from_ascii(&[
            "............",
            "............",
            "......#.....",
            "............",
        ])
        .unwrap();
        Session::host(
            World::new(data, map, GameMode::Campaign, ConfigValues::standard()),
            11,
        )
    }

    fn spawn(uid: u64, faction: Faction, x: i32) -> Event {
        Event::ActorAdd(ActorSpawn {
            uid,
            player: None,
            faction,
            pos: Vec2Fixed::from_ints(x, 24),
            health: 30,
            max_health: 30,
            guns: vec!["scatter".to_string()],
            flags: Default::default(),
        })
    }

    fn record_game(ticks: u64) -> Replay {
        let mut host = host();
        let mut recorder = ReplayRecorder::new(11, &host).unwrap();
        host.publish(spawn(1, Faction::Player, 8));
        host.publish(spawn(2, Faction::Enemy, 150));
        for _ in 0..ticks {
            if host.get_tick() % 10 == 2 {
                host.fire(1, Vec2Fixed::from_ints(1, 0)).unwrap();
            }
            recorder.record(host.get_tick(), host.take_outbox());
            host.tick();
        }
        recorder.finish(&host)
    }

    #[test]
    fn test_replay_records_frames() {
        let replay = record_game(30);
        assert_eq!(replay.version, REPLAY_VERSION);
        assert_eq!(replay.seed, 11);
        assert_eq!(replay.final_tick, 30);
        assert!(replay.frame_at(0).is_some());
        assert!(replay.frame_at(1).is_none());
        // Two spawns, then three volleys of one GunFire and three pellets.
        assert!(replay.event_count() >= 2 + 3 * 4);
        assert!(replay.frames.windows(2).all(|w| w[0].tick < w[1].tick));
    }

    #[test]
    fn test_record_frame_merges_same_tick() {
        let mut replay = Replay::new(0, &host()).unwrap();
        replay.record_frame(4, vec![Event::GameStart]);
        replay.record_frame(4, vec![Event::GameBegin]);
        replay.record_frame(5, Vec::new());
        assert_eq!(replay.frames.len(), 1);
        assert_eq!(replay.event_count(), 2);
    }

    #[test]
    fn test_replay_verifies() {
        let replay = record_game(60);
        let mut player = ReplayPlayer::new(replay).unwrap();
        assert!(player.verify().unwrap());
        assert!(player.is_finished());
    }

    #[test]
    fn test_tampered_replay_fails_verification() {
        let mut replay = record_game(40);
        replay.final_hash ^= 1;
        assert!(!ReplayPlayer::new(replay).unwrap().verify().unwrap());
    }

    #[test]
    fn test_dropped_frame_diverges() {
        let mut replay = record_game(40);
        let last = replay.frames.len() - 1;
        replay.frames.remove(last);
        assert!(!ReplayPlayer::new(replay).unwrap().verify().unwrap());
    }

    #[test]
    fn test_replay_save_load() {
        let replay = record_game(25);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.replay");
        replay.save(&path).unwrap();

        let loaded = Replay::load(&path).unwrap();
        assert_eq!(loaded.frames, replay.frames);
        assert_eq!(loaded.final_hash, replay.final_hash);
        assert!(ReplayPlayer::new(loaded).unwrap().verify().unwrap());
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut replay = record_game(1);
        replay.version = REPLAY_VERSION + 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.replay");
        replay.save(&path).unwrap();
        assert!(matches!(
            Replay::load(&path),
            Err(SimError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_player_advance_and_seek() {
        let replay = record_game(20);
        let mut player = ReplayPlayer::new(replay).unwrap();

        for _ in 0..5 {
            assert!(player.advance());
        }
        assert_eq!(player.current_tick(), 5);
        let hash_at_5 = player.session().state_hash();

        player.seek(15).unwrap();
        assert_eq!(player.current_tick(), 15);

        player.seek(5).unwrap();
        assert_eq!(player.current_tick(), 5);
        assert_eq!(player.session().state_hash(), hash_at_5);

        while player.advance() {}
        assert_eq!(player.current_tick(), 20);
    }

    #[test]
    fn test_player_pause() {
        let replay = record_game(10);
        let mut player = ReplayPlayer::new(replay).unwrap();
        player.paused = true;
        player.advance();
        assert_eq!(player.current_tick(), 0);

        player.toggle_pause();
        player.advance();
        assert_eq!(player.current_tick(), 1);
    }
}
