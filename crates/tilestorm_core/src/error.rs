//! Error types for the simulation core.

use thiserror::Error;

use crate::registry::Uid;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Top-level error type for all simulation errors.
///
/// A reference to an entity that no longer exists is *not* an error: the
/// dispatcher treats stale UIDs as no-ops. These variants describe payloads
/// that can never be applied.
#[derive(Debug, Error)]
pub enum SimError {
    /// Bullet class name not present in the loaded data.
    #[error("Unknown bullet class: {0}")]
    UnknownBulletClass(String),

    /// Weapon class name not present in the loaded data.
    #[error("Unknown weapon class: {0}")]
    UnknownWeaponClass(String),

    /// Tile class name not present in the loaded data.
    #[error("Unknown tile class: {0}")]
    UnknownTileClass(String),

    /// Particle class name not present in the loaded data.
    #[error("Unknown particle class: {0}")]
    UnknownParticleClass(String),

    /// Ammo identifier not present in the loaded data.
    #[error("Unknown ammo id: {0}")]
    UnknownAmmo(usize),

    /// Runtime config key that does not exist.
    #[error("Unknown config key: {0}")]
    UnknownConfig(String),

    /// Runtime config value that cannot be parsed for its key's type.
    #[error("Invalid value '{value}' for config key {name}")]
    InvalidConfigValue {
        /// Config key.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// An index carried by an event is outside the valid range.
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        /// What the index refers to.
        what: &'static str,
        /// Index carried by the event.
        index: usize,
        /// Number of valid entries.
        len: usize,
    },

    /// Tile coordinate outside the map.
    #[error("Tile ({x}, {y}) is outside the map")]
    TileOutOfRange {
        /// Tile column.
        x: i32,
        /// Tile row.
        y: i32,
    },

    /// An entity was added with a UID that is already live.
    #[error("Duplicate {kind} UID: {uid}")]
    DuplicateUid {
        /// Registry name.
        kind: &'static str,
        /// Offending UID.
        uid: Uid,
    },

    /// Data file parsing error.
    #[error("Failed to parse data file '{path}': {message}")]
    DataParseError {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Data file written for an unsupported format version.
    #[error("Unsupported {what} version {version} (supported 1..={max})")]
    UnsupportedVersion {
        /// Which file format.
        what: &'static str,
        /// Version found in the file.
        version: u32,
        /// Newest supported version.
        max: u32,
    },

    /// Wire or snapshot encoding failed.
    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// Invalid simulation state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Desync detected between two participants.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
