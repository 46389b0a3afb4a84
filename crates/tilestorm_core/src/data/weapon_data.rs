//! Weapon and ammo definitions.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math::{fixed_decimal, Fixed};

/// Pellet fan fired by one trigger pull.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spread {
    /// Number of bullets per shot.
    #[serde(default = "default_spread_count")]
    pub count: u32,
    /// Angle between neighbouring bullets, radians.
    #[serde(default, with = "fixed_decimal")]
    pub width: Fixed,
}

const fn default_spread_count() -> u32 {
    1
}

impl Default for Spread {
    fn default() -> Self {
        Self {
            count: 1,
            width: Fixed::ZERO,
        }
    }
}

/// Data-driven weapon definition.
///
/// # Example RON
///
/// ```ron
/// (
///     name: "shotgun",
///     bullet: Some("pellet"),
///     spread: (count: 5, width: 0.1),
///     recoil: 0.05,
///     sound: Some("shotgun"),
///     shake: 2,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponClass {
    /// Unique name.
    pub name: String,
    /// Bullet class fired, `None` for melee-only or cosmetic guns.
    #[serde(default)]
    pub bullet: Option<String>,
    /// Pellet fan.
    #[serde(default)]
    pub spread: Spread,
    /// Rotation applied to the whole fan, radians.
    #[serde(default, with = "fixed_decimal")]
    pub angle_offset: Fixed,
    /// Maximum random deviation per bullet, radians (rolled in `±recoil/2`).
    #[serde(default, with = "fixed_decimal")]
    pub recoil: Fixed,
    /// Lowest rolled launch `dz`.
    #[serde(default, with = "fixed_decimal")]
    pub elevation_low: Fixed,
    /// Highest rolled launch `dz`.
    #[serde(default, with = "fixed_decimal")]
    pub elevation_high: Fixed,
    /// Launch height `z`.
    #[serde(default, with = "fixed_decimal")]
    pub muzzle_height: Fixed,
    /// Particle spawned at the muzzle.
    #[serde(default)]
    pub muzzle_flash: Option<String>,
    /// Firing sound.
    #[serde(default)]
    pub sound: Option<String>,
    /// Reload sound.
    #[serde(default)]
    pub reload_sound: Option<String>,
    /// Screen shake strength; zero for none.
    #[serde(default)]
    pub shake: i32,
    /// Ammo type consumed, if any.
    #[serde(default)]
    pub ammo: Option<usize>,
}

impl WeaponClass {
    /// A one-bullet gun with no cosmetics.
    #[must_use]
    pub fn single_shot(name: impl Into<String>, bullet: Option<&str>) -> Self {
        Self {
            name: name.into(),
            bullet: bullet.map(str::to_string),
            spread: Spread::default(),
            angle_offset: Fixed::ZERO,
            recoil: Fixed::ZERO,
            elevation_low: Fixed::ZERO,
            elevation_high: Fixed::ZERO,
            muzzle_height: Fixed::ZERO,
            muzzle_flash: None,
            sound: None,
            reload_sound: None,
            shake: 0,
            ammo: None,
        }
    }

    /// Angle of the first bullet in the fan relative to the aim direction.
    #[must_use]
    pub fn spread_start(&self) -> Fixed {
        let count = Fixed::from_num(self.spread.count.max(1) - 1);
        self.angle_offset - count * self.spread.width / Fixed::from_num(2)
    }
}

/// All weapon classes, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponClasses {
    classes: Vec<WeaponClass>,
}

impl WeaponClasses {
    /// Build a table from a list of classes.
    #[must_use]
    pub fn new(classes: Vec<WeaponClass>) -> Self {
        Self { classes }
    }

    /// Look up a weapon by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownWeaponClass`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&WeaponClass> {
        self.classes
            .iter()
            .find(|w| w.name == name)
            .ok_or_else(|| SimError::UnknownWeaponClass(name.to_string()))
    }

    /// Iterate all weapons.
    pub fn iter(&self) -> impl Iterator<Item = &WeaponClass> {
        self.classes.iter()
    }

    /// Number of weapons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no weapons are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Ammo type. Its index in the ammo table is its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmmoClass {
    /// Display name used in pickup popups.
    pub name: String,
    /// Carry limit.
    pub max: i32,
    /// Amount at or below which the low-ammo cue plays.
    #[serde(default)]
    pub low: i32,
}
