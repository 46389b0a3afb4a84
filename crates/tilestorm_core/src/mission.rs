//! Mission progress: objectives, keys, exit and completion state.

use serde::{Deserialize, Serialize};

use crate::map::TilePos;

/// Ticks a mission spends in the pickup phase before it ends.
pub const PICKUP_LIMIT: i32 = 700;

/// Overall mission phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MissionState {
    /// Loaded but not begun.
    #[default]
    Waiting,
    /// In progress.
    Play,
    /// Objectives complete, players are being picked up at the exit.
    Pickup,
    /// Finished.
    Done,
}

/// One mission objective.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Objective {
    /// Description shown to players.
    pub description: String,
    /// Amount needed for completion.
    pub required: i32,
    /// Amount done so far.
    pub done: i32,
}

impl Objective {
    /// Create an objective with nothing done.
    #[must_use]
    pub fn new(description: impl Into<String>, required: i32) -> Self {
        Self {
            description: description.into(),
            required,
            done: 0,
        }
    }

    /// Whether enough has been done.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.done >= self.required
    }
}

/// How the mission ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionOutcome {
    /// Players quit rather than finished.
    pub quit: bool,
    /// Final message.
    pub message: String,
}

/// Mission progress shared by every participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Mission {
    /// `GameStart` seen.
    pub started: bool,
    /// `GameBegin` seen.
    pub begun: bool,
    /// Phase.
    pub state: MissionState,
    /// Ticks since the mission began.
    pub time: i32,
    /// Mission time when the pickup phase started.
    pub pickup_time: i32,
    /// Objectives in mission order.
    pub objectives: Vec<Objective>,
    /// Collected key flags.
    pub key_flags: u32,
    /// Exit area corners, once revealed.
    pub exit: Option<(TilePos, TilePos)>,
    /// The completion fanfare has played.
    pub completion_announced: bool,
    /// Set by `MissionEnd`.
    pub outcome: Option<MissionOutcome>,
}

impl Mission {
    /// A mission with the given objectives, waiting to start.
    #[must_use]
    pub fn new(objectives: Vec<Objective>) -> Self {
        Self {
            objectives,
            ..Self::default()
        }
    }

    /// Whether every objective is complete.
    #[must_use]
    pub fn all_objectives_complete(&self) -> bool {
        self.objectives.iter().all(Objective::is_complete)
    }

    /// Advance mission time while the mission is running.
    pub fn advance(&mut self, ticks: i32) {
        if matches!(self.state, MissionState::Play | MissionState::Pickup) {
            self.time += ticks;
        }
    }

    /// Whether the pickup phase has run out.
    #[must_use]
    pub const fn pickup_expired(&self) -> bool {
        matches!(self.state, MissionState::Pickup) && self.time - self.pickup_time >= PICKUP_LIMIT
    }
}
