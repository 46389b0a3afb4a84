//! Session configuration and runtime-overridable config values.
//!
//! [`SessionConfig`] is read once from RON when a session is created.
//! [`ConfigValues`] holds the named settings that the host may change
//! mid-game by broadcasting `Config` events; every participant applies the
//! same override at the same tick.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math::Fixed;

/// Friendly fire between players and allies.
pub const FRIENDLY_FIRE: &str = "Game.FriendlyFire";
/// Whether bullet hit sounds play.
pub const HIT_SOUNDS: &str = "Sound.Hits";
/// Fraction of speed kept after a wall bounce.
pub const RESTITUTION: &str = "Physics.Restitution";
/// Lives each player starts with.
pub const LIVES: &str = "Game.Lives";
/// How screen shake is applied.
pub const SHAKE_MODE: &str = "Graphics.Shake";

/// Game mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    /// Cooperative missions against enemies.
    #[default]
    Campaign,
    /// Player versus player, no scoring.
    Dogfight,
    /// Player versus player with scoring.
    Deathmatch,
}

impl GameMode {
    /// Whether players can hurt each other regardless of friendly fire.
    #[must_use]
    pub const fn is_pvp(self) -> bool {
        matches!(self, Self::Dogfight | Self::Deathmatch)
    }
}

/// A typed config value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Integer.
    Int(i64),
    /// Fixed-point decimal.
    Fixed(#[serde(with = "crate::math::fixed_serde")] Fixed),
    /// Boolean.
    Bool(bool),
    /// One of a fixed set of names.
    Enum {
        /// Current value.
        value: String,
        /// Allowed values.
        options: Vec<String>,
    },
    /// Free text; not overridable by events.
    Text(String),
    /// Container of other keys; not overridable by events.
    Group,
}

/// Named config values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigValues {
    values: BTreeMap<String, ConfigValue>,
}

impl Default for ConfigValues {
    fn default() -> Self {
        Self::standard()
    }
}

impl ConfigValues {
    /// The built-in keys with their defaults.
    #[must_use]
    pub fn standard() -> Self {
        let mut values = BTreeMap::new();
        values.insert(FRIENDLY_FIRE.to_string(), ConfigValue::Bool(false));
        values.insert(HIT_SOUNDS.to_string(), ConfigValue::Bool(true));
        values.insert(RESTITUTION.to_string(), ConfigValue::Fixed(Fixed::from_num(1)));
        values.insert(LIVES.to_string(), ConfigValue::Int(2));
        values.insert(
            SHAKE_MODE.to_string(),
            ConfigValue::Enum {
                value: "normal".to_string(),
                options: vec!["off".to_string(), "normal".to_string(), "strong".to_string()],
            },
        );
        values.insert("Game".to_string(), ConfigValue::Group);
        values.insert("Game.Name".to_string(), ConfigValue::Text("tilestorm".to_string()));
        Self { values }
    }

    /// Look up a raw value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }

    /// Boolean value, `false` if missing or not a boolean.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(ConfigValue::Bool(true)))
    }

    /// Integer value, `0` if missing or not an integer.
    #[must_use]
    pub fn get_int(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(ConfigValue::Int(v)) => *v,
            _ => 0,
        }
    }

    /// Fixed value, `0` if missing or not a fixed value.
    #[must_use]
    pub fn get_fixed(&self, name: &str) -> Fixed {
        match self.values.get(name) {
            Some(ConfigValue::Fixed(v)) => *v,
            _ => Fixed::ZERO,
        }
    }

    /// Enum value, `None` if missing or not an enum.
    #[must_use]
    pub fn get_enum(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ConfigValue::Enum { value, .. }) => Some(value),
            _ => None,
        }
    }

    /// Parse `value` according to the key's type and store it.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownConfig`] for unknown keys and
    /// [`SimError::InvalidConfigValue`] for unparsable values, enum values
    /// outside the allowed set, and text or group keys.
    pub fn set_from_str(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || SimError::InvalidConfigValue {
            name: name.to_string(),
            value: value.to_string(),
        };
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| SimError::UnknownConfig(name.to_string()))?;

        match slot {
            ConfigValue::Int(v) => *v = value.parse().map_err(|_| invalid())?,
            ConfigValue::Fixed(v) => {
                *v = value
                    .parse::<f64>()
                    .ok()
                    .and_then(Fixed::checked_from_num)
                    .ok_or_else(invalid)?;
            }
            ConfigValue::Bool(v) => *v = value.parse().map_err(|_| invalid())?,
            ConfigValue::Enum { value: current, options } => {
                if !options.iter().any(|o| o == value) {
                    return Err(invalid());
                }
                *current = value.to_string();
            }
            ConfigValue::Text(_) | ConfigValue::Group => return Err(invalid()),
        }
        Ok(())
    }
}

/// Per-session settings loaded once at start.
///
/// # Example RON
///
/// ```ron
/// SessionConfig(
///     mode: Deathmatch,
///     seed: 42,
///     overrides: { "Game.FriendlyFire": "true" },
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Game mode.
    #[serde(default)]
    pub mode: GameMode,
    /// Seed for the host's random rolls.
    #[serde(default)]
    pub seed: u64,
    /// Config values applied on top of the standard defaults.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl SessionConfig {
    /// Parse from RON.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DataParseError`] on malformed RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| SimError::DataParseError {
            path: "<memory>".to_string(),
            message: e.to_string(),
        })
    }

    /// Load from a RON file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DataParseError`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| SimError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        ron::from_str(&source).map_err(|e| SimError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Standard config values with this session's overrides applied.
    ///
    /// # Errors
    ///
    /// Returns the first override that fails to apply.
    pub fn values(&self) -> Result<ConfigValues> {
        let mut values = ConfigValues::standard();
        for (name, value) in &self.overrides {
            values.set_from_str(name, value)?;
        }
        Ok(values)
    }
}
