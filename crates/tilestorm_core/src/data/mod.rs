//! Data-driven class definitions.
//!
//! Bullets, weapons, ammo, particles and tiles are all described in one RON
//! game data file. Loading happens in two steps: every table is parsed,
//! then bullet follow-up guns are linked against the weapon table. The
//! result is an immutable [`GameData`] shared by every session.

mod bullet_data;
mod weapon_data;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use bullet_data::{
    BulletClass, BulletClassBuilder, BulletClassDef, BulletClasses, BulletFile, Falling,
    FollowUpGuns, HitSounds, SpecialDamage, Trail, BULLET_FILE_VERSION,
};
pub use weapon_data::{AmmoClass, Spread, WeaponClass, WeaponClasses};

use crate::error::{Result, SimError};
use crate::map::{TileClass, TileClasses};

/// Game data file as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameDataFile {
    /// Tile classes; the standard table is used when empty.
    #[serde(default)]
    pub tiles: Vec<TileClass>,
    /// Bullet file.
    pub bullets: BulletFile,
    /// Weapon classes.
    #[serde(default)]
    pub weapons: Vec<WeaponClass>,
    /// Ammo classes; index is the ammo id.
    #[serde(default)]
    pub ammo: Vec<AmmoClass>,
    /// Known particle class names.
    #[serde(default)]
    pub particles: Vec<String>,
}

/// Immutable, linked game data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameData {
    /// Tile classes.
    pub tiles: TileClasses,
    /// Bullet classes with follow-up guns attached.
    pub bullets: BulletClasses,
    /// Weapon classes.
    pub weapons: WeaponClasses,
    /// Ammo classes.
    pub ammo: Vec<AmmoClass>,
    /// Known particle classes.
    pub particles: BTreeSet<String>,
}

impl GameData {
    /// Build and link game data from a parsed file.
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported bullet file versions, unknown
    /// follow-up guns or weapons that fire unknown bullets.
    pub fn from_file(file: GameDataFile) -> Result<Self> {
        let tiles = if file.tiles.is_empty() {
            TileClasses::standard()
        } else {
            TileClasses::new(file.tiles)
        };

        let weapons = WeaponClasses::new(file.weapons);
        let mut bullets = BulletClasses::from_file(file.bullets)?;
        bullets.link_guns(&weapons)?;

        for weapon in weapons.iter() {
            if let Some(bullet) = &weapon.bullet {
                bullets.get(bullet)?;
            }
        }

        tracing::debug!(
            bullets = bullets.len(),
            weapons = weapons.len(),
            ammo = file.ammo.len(),
            particles = file.particles.len(),
            "Game data linked"
        );

        Ok(Self {
            tiles,
            bullets,
            weapons,
            ammo: file.ammo,
            particles: file.particles.into_iter().collect(),
        })
    }

    /// Parse and link game data from RON.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DataParseError`] on malformed RON, or any error
    /// from [`from_file`](Self::from_file).
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let file: GameDataFile = ron::from_str(source).map_err(|e| SimError::DataParseError {
            path: "<memory>".to_string(),
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Load and link a RON game data file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DataParseError`] if the file cannot be read or
    /// parsed, or any error from [`from_file`](Self::from_file).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| SimError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let file: GameDataFile = ron::from_str(&source).map_err(|e| SimError::DataParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Ammo class by id.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownAmmo`] for unknown ids.
    pub fn ammo(&self, id: usize) -> Result<&AmmoClass> {
        self.ammo.get(id).ok_or(SimError::UnknownAmmo(id))
    }

    /// Check that a particle class exists.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownParticleClass`] for unknown names.
    pub fn particle(&self, name: &str) -> Result<()> {
        if self.particles.contains(name) {
            Ok(())
        } else {
            Err(SimError::UnknownParticleClass(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"
        GameDataFile(
            bullets: BulletFile(
                version: 3,
                bullets: [
                    (name: Some("bullet")),
                    (name: Some("rocket"), hit_guns: ["explosion"]),
                    (name: Some("shrapnel"), range: Some(8)),
                ],
            ),
            weapons: [
                (name: "pistol", bullet: Some("bullet")),
                (name: "explosion", bullet: Some("shrapnel"), spread: (count: 8, width: 0.785)),
            ],
            ammo: [(name: "Shells", max: 50, low: 5)],
            particles: ["spark", "heal_text"],
        )
    "#;

    #[test]
    fn test_load_links_guns() {
        let data = GameData::from_ron_str(DATA).unwrap();
        assert_eq!(data.bullets.get("rocket").unwrap().guns.hit, vec!["explosion".to_string()]);
        assert_eq!(data.weapons.len(), 2);
        assert_eq!(data.tiles, TileClasses::standard());
    }

    #[test]
    fn test_weapon_with_unknown_bullet() {
        let bad = DATA.replace(r#"bullet: Some("bullet")"#, r#"bullet: Some("laser")"#);
        assert!(matches!(
            GameData::from_ron_str(&bad),
            Err(SimError::UnknownBulletClass(name)) if name == "laser"
        ));
    }

    #[test]
    fn test_lookups() {
        let data = GameData::from_ron_str(DATA).unwrap();
        assert_eq!(data.ammo(0).unwrap().name, "Shells");
        assert!(matches!(data.ammo(3), Err(SimError::UnknownAmmo(3))));
        assert!(data.particle("spark").is_ok());
        assert!(data.particle("smoke").is_err());
    }

    #[test]
    fn test_malformed_ron() {
        assert!(matches!(
            GameData::from_ron_str("GameDataFile(bullets: )"),
            Err(SimError::DataParseError { .. })
        ));
    }
}
