//! Scenario loading and configuration.
//!
//! A scenario is a small scripted game: an ASCII map, the actors standing on
//! it and a list of timed actions the host performs while the game runs.
//!
//! ```ron
//! Scenario(
//!     name: "Duel",
//!     map: [
//!         "##########",
//!         "#........#",
//!         "##########",
//!     ],
//!     session: (mode: Dogfight, seed: 7),
//!     actors: [
//!         (uid: 1000, faction: Player, pos: (24, 18), guns: ["rifle"]),
//!     ],
//!     script: [
//!         (tick: 2, action: Fire(actor: 1000, aim: (1, 0))),
//!     ],
//!     ticks: 120,
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tilestorm_core::components::{CharacterFlags, Faction};
use tilestorm_core::config::SessionConfig;
use tilestorm_core::data::GameData;
use tilestorm_core::error::SimError;
use tilestorm_core::events::{ActorSpawn, Event};
use tilestorm_core::map::TileMap;
use tilestorm_core::math::Vec2Fixed;
use tilestorm_core::registry::Uid;
use tilestorm_core::world::World;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The scenario refers to something that does not exist.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The simulation rejected the scenario or failed while running it.
    #[error(transparent)]
    Sim(#[from] SimError),
    /// Failed to write the run summary.
    #[error("Failed to encode summary: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_ticks() -> u64 {
    600
}

fn default_health() -> i32 {
    50
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// ASCII rows: `#` wall, `+` door, space for nothing, anything else floor.
    pub map: Vec<String>,
    /// Mode, host seed and config overrides.
    #[serde(default)]
    pub session: SessionConfig,
    /// Actors present when the game starts.
    #[serde(default)]
    pub actors: Vec<ActorPlacement>,
    /// Timed host actions.
    #[serde(default)]
    pub script: Vec<ScriptedAction>,
    /// Ticks to run unless overridden on the command line.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
}

/// An actor placed at the start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorPlacement {
    /// UID; must not collide with UIDs the host hands out.
    pub uid: Uid,
    /// Side.
    #[serde(default)]
    pub faction: Faction,
    /// Centre position in pixels.
    pub pos: (i32, i32),
    /// Starting and maximum health.
    #[serde(default = "default_health")]
    pub health: i32,
    /// Carried weapon class names; the first is selected.
    #[serde(default)]
    pub guns: Vec<String>,
}

impl ActorPlacement {
    /// The spawn event for this actor.
    #[must_use]
    pub fn spawn_event(&self) -> Event {
        Event::ActorAdd(ActorSpawn {
            uid: self.uid,
            player: None,
            faction: self.faction,
            pos: Vec2Fixed::from_ints(self.pos.0, self.pos.1),
            health: self.health,
            max_health: self.health,
            guns: self.guns.clone(),
            flags: CharacterFlags::default(),
        })
    }
}

/// Something the host does before a given tick runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedAction {
    /// Host tick the action is taken before.
    pub tick: u64,
    /// The action.
    pub action: Action,
}

/// Host actions a script can take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Fire the actor's selected gun along `aim`.
    Fire {
        /// Shooter.
        actor: Uid,
        /// Aim direction, need not be normalised.
        aim: (i32, i32),
    },
    /// Select a carried gun. Takes effect when the next tick drains.
    SwitchGun {
        /// Actor.
        actor: Uid,
        /// Index into the actor's guns.
        gun: usize,
    },
}

impl Action {
    /// The actor the action is about.
    #[must_use]
    pub const fn actor(&self) -> Uid {
        match self {
            Self::Fire { actor, .. } | Self::SwitchGun { actor, .. } => *actor,
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Check every name and UID the scenario uses against `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Invalid`] for duplicate or unknown actors,
    /// unknown guns and out-of-range gun switches, and a core error for a
    /// malformed map.
    pub fn validate(&self, data: &GameData) -> Result<(), ScenarioError> {
        TileMap::from_ascii(&self.map)?;

        let mut seen = std::collections::BTreeSet::new();
        for actor in &self.actors {
            if !seen.insert(actor.uid) {
                return Err(ScenarioError::Invalid(format!(
                    "actor {} placed twice",
                    actor.uid
                )));
            }
            for gun in &actor.guns {
                data.weapons.get(gun).map_err(|_| {
                    ScenarioError::Invalid(format!("actor {} carries unknown gun '{gun}'", actor.uid))
                })?;
            }
        }

        for step in &self.script {
            let uid = step.action.actor();
            let Some(actor) = self.actors.iter().find(|a| a.uid == uid) else {
                return Err(ScenarioError::Invalid(format!(
                    "tick {}: unknown actor {uid}",
                    step.tick
                )));
            };
            if let Action::SwitchGun { gun, .. } = step.action {
                if gun >= actor.guns.len() {
                    return Err(ScenarioError::Invalid(format!(
                        "tick {}: actor {uid} has no gun {gun}",
                        step.tick
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the starting world on the scenario map.
    ///
    /// # Errors
    ///
    /// Returns a core error for a malformed map or bad config overrides.
    pub fn build_world(&self, data: GameData) -> Result<World, ScenarioError> {
        let map = TileMap::from_ascii(&self.map)?;
        Ok(World::with_session(data, map, &self.session)?)
    }

    /// Events that set the scenario up, in publication order.
    #[must_use]
    pub fn setup_events(&self) -> Vec<Event> {
        let mut events = vec![Event::GameStart];
        events.extend(self.actors.iter().map(ActorPlacement::spawn_event));
        events.push(Event::GameBegin);
        events
    }

    /// Actions scheduled before `tick`, in script order.
    pub fn actions_at(&self, tick: u64) -> impl Iterator<Item = &Action> {
        self.script
            .iter()
            .filter(move |step| step.tick == tick)
            .map(|step| &step.action)
    }

    /// A two-actor duel on a 20 by 12 walled arena.
    #[must_use]
    pub fn duel() -> Self {
        let wall = "#".repeat(20);
        let floor = format!("#{}#", ".".repeat(18));
        let map = (0..12)
            .map(|y| if y == 0 || y == 11 { wall.clone() } else { floor.clone() })
            .collect();
        Self {
            name: "Duel".to_string(),
            description: "Two riflemen trading shots across an empty room".to_string(),
            map,
            session: SessionConfig::default(),
            actors: vec![
                ActorPlacement {
                    uid: 1_000,
                    faction: Faction::Player,
                    pos: (40, 96),
                    health: 50,
                    guns: vec!["rifle".to_string()],
                },
                ActorPlacement {
                    uid: 1_001,
                    faction: Faction::Enemy,
                    pos: (120, 96),
                    health: 50,
                    guns: vec!["rifle".to_string()],
                },
            ],
            script: (0..5)
                .flat_map(|i| {
                    [
                        ScriptedAction {
                            tick: 2 + i * 6,
                            action: Action::Fire {
                                actor: 1_000,
                                aim: (1, 0),
                            },
                        },
                        ScriptedAction {
                            tick: 5 + i * 6,
                            action: Action::Fire {
                                actor: 1_001,
                                aim: (-1, 0),
                            },
                        },
                    ]
                })
                .collect(),
            ticks: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilestorm_test_utils::fixtures::arena_data;

    #[test]
    fn test_duel_is_valid() {
        let duel = Scenario::duel();
        duel.validate(&arena_data()).unwrap();
        assert_eq!(duel.map.len(), 12);
        assert_eq!(duel.setup_events().len(), 4);
        assert_eq!(duel.actions_at(2).count(), 1);
        assert_eq!(duel.actions_at(3).count(), 0);
    }

    #[test]
    fn test_parse_ron() {
        let scenario = Scenario::from_ron_str(
            r######"Scenario(
                name: "Tiny",
                map: ["#####", "#...#", "#####"],
                actors: [(uid: 7, pos: (40, 18), guns: ["rifle"])],
                script: [(tick: 1, action: Fire(actor: 7, aim: (1, 0)))],
            )"######,
        )
        .unwrap();
        assert_eq!(scenario.ticks, 600);
        assert_eq!(scenario.actors[0].health, 50);
        assert_eq!(scenario.actors[0].faction, Faction::Player);
        assert_eq!(scenario.session.seed, 0);
        scenario.validate(&arena_data()).unwrap();
    }

    #[test]
    fn test_unknown_gun_is_invalid() {
        let mut duel = Scenario::duel();
        duel.actors[0].guns = vec!["trebuchet".to_string()];
        let err = duel.validate(&arena_data()).unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid(_)));
    }

    #[test]
    fn test_script_for_missing_actor_is_invalid() {
        let mut duel = Scenario::duel();
        duel.script.push(ScriptedAction {
            tick: 1,
            action: Action::SwitchGun { actor: 42, gun: 0 },
        });
        assert!(duel.validate(&arena_data()).is_err());

        let mut duel = Scenario::duel();
        duel.script.push(ScriptedAction {
            tick: 1,
            action: Action::SwitchGun {
                actor: 1_000,
                gun: 1,
            },
        });
        assert!(duel.validate(&arena_data()).is_err());
    }

    #[test]
    fn test_ragged_map_is_rejected() {
        let mut duel = Scenario::duel();
        duel.map[3].push('.');
        assert!(matches!(
            duel.validate(&arena_data()),
            Err(ScenarioError::Sim(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = Scenario::load("does/not/exist.ron").unwrap_err();
        assert!(matches!(err, ScenarioError::FileNotFound(_)));
    }
}
