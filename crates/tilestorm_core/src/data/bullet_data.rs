//! Bullet class definitions and the bullet data file format.
//!
//! A bullet file holds one `default` template and a list of partial
//! definitions. Every class is produced by explicit composition:
//!
//! ```
//! use tilestorm_core::data::{BulletClass, BulletClassBuilder, BulletClassDef};
//!
//! let base = BulletClass::fallback();
//! let def = BulletClassDef {
//!     name: Some("pellet".into()),
//!     power: Some(4),
//!     ..Default::default()
//! };
//! let pellet = BulletClassBuilder::new(&base).apply(&def).build();
//! assert_eq!(pellet.power, 4);
//! assert_eq!(pellet.size, base.size);
//! ```
//!
//! Follow-up gun lists are never inherited from the template; they are
//! attached in a separate link step once weapon classes are known
//! (see [`BulletClasses::link_guns`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::WeaponClasses;
use crate::error::{Result, SimError};
use crate::math::{fixed_decimal, option_fixed_decimal, Fixed, Vec2Fixed};

/// Newest bullet file version understood by the loader.
pub const BULLET_FILE_VERSION: u32 = 3;

/// Status effect applied on hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SpecialDamage {
    /// Plain damage.
    #[default]
    None,
    /// Sets the target on fire.
    Flame,
    /// Poisons the target.
    Poison,
    /// Turns the target to stone.
    Petrify,
    /// Confuses the target's controls.
    Confuse,
}

/// Sound names played when a bullet hits something.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HitSounds {
    /// Hit on a map object.
    #[serde(default)]
    pub object: Option<String>,
    /// Hit on an actor.
    #[serde(default)]
    pub flesh: Option<String>,
    /// Hit on a wall.
    #[serde(default)]
    pub wall: Option<String>,
}

/// Lobbed-projectile behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Falling {
    /// Vertical acceleration per tick. Zero disables falling entirely.
    #[serde(default, with = "fixed_decimal")]
    pub gravity: Fixed,
    /// Keeps accelerating downward instead of flattening out at `dz = 0`.
    #[serde(default)]
    pub falls_down: bool,
    /// Dies when it touches the ground.
    #[serde(default)]
    pub destroy_on_drop: bool,
    /// Bounces with half its vertical speed when it touches the ground.
    #[serde(default)]
    pub bounces: bool,
    /// Guns fired when it first touches the ground.
    #[serde(default)]
    pub drop_guns: Vec<String>,
}

/// Trail particle emitted behind a bullet.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Trail {
    /// Particle class, `None` for no trail.
    #[serde(default)]
    pub particle: Option<String>,
    /// Drawn width of the trail segment.
    #[serde(default, with = "fixed_decimal")]
    pub width: Fixed,
    /// Emit every N ticks; zero or one emits every tick.
    #[serde(default)]
    pub ticks_per_emit: i32,
}

/// Follow-up gun lists fired by a bullet's own events.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FollowUpGuns {
    /// Fired when the bullet exhausts its range.
    #[serde(default)]
    pub out_of_range: Vec<String>,
    /// Fired when the bullet is absorbed by a hit.
    #[serde(default)]
    pub hit: Vec<String>,
    /// Fired when a proximity check finds an actor.
    #[serde(default)]
    pub proximity: Vec<String>,
    /// Fired when a falling bullet first touches the ground.
    #[serde(default)]
    pub drop: Vec<String>,
}

impl FollowUpGuns {
    fn names(&self) -> impl Iterator<Item = &String> {
        self.out_of_range
            .iter()
            .chain(&self.hit)
            .chain(&self.proximity)
            .chain(&self.drop)
    }

    fn is_empty(&self) -> bool {
        self.names().next().is_none()
    }
}

/// Immutable, fully resolved bullet class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletClass {
    /// Unique name.
    pub name: String,
    /// Collision box (width, height).
    pub size: Vec2Fixed,
    /// Ticks after spawning before the bullet starts moving.
    pub delay: i32,
    /// Slowest rolled launch speed.
    pub speed_low: Fixed,
    /// Fastest rolled launch speed.
    pub speed_high: Fixed,
    /// Scale vertical speed by the tile aspect ratio.
    pub speed_scale: bool,
    /// Per-axis speed loss per tick.
    pub friction: Fixed,
    /// Shortest rolled lifetime in ticks.
    pub range_low: i32,
    /// Longest rolled lifetime in ticks; negative means unlimited.
    pub range_high: i32,
    /// Damage dealt on hit.
    pub power: i32,
    /// Knockback mass.
    pub mass: Fixed,
    /// Status effect applied on hit.
    pub special: SpecialDamage,
    /// Ignores friendly-fire rules.
    pub hurt_always: bool,
    /// Keeps going after hitting an actor or object (piercing).
    pub persists: bool,
    /// Particle spawned when absorbed.
    pub spark: Option<String>,
    /// Particle spawned when range runs out.
    pub out_of_range_spark: Option<String>,
    /// Particle left on south-facing walls.
    pub wall_mark: Option<String>,
    /// Hit sounds.
    pub hit_sounds: HitSounds,
    /// Reflects off walls instead of being absorbed.
    pub wall_bounces: bool,
    /// Absorbed by actors and objects.
    pub hits_objects: bool,
    /// Lobbed-projectile behaviour.
    pub falling: Falling,
    /// Homing strength; zero or negative disables seeking.
    pub seek_factor: Fixed,
    /// Adds per-tick random jitter to the velocity.
    pub erratic: bool,
    /// Trail particle.
    pub trail: Trail,
    /// Follow-up guns, attached by [`BulletClasses::link_guns`].
    pub guns: FollowUpGuns,
}

impl BulletClass {
    /// Built-in baseline that a file's `default` template is applied onto.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            name: String::new(),
            size: Vec2Fixed::from_ints(2, 2),
            delay: 0,
            speed_low: Fixed::from_num(4),
            speed_high: Fixed::from_num(4),
            speed_scale: false,
            friction: Fixed::ZERO,
            range_low: 60,
            range_high: 60,
            power: 1,
            mass: Fixed::from_num(1),
            special: SpecialDamage::None,
            hurt_always: false,
            persists: false,
            spark: None,
            out_of_range_spark: None,
            wall_mark: None,
            hit_sounds: HitSounds::default(),
            wall_bounces: false,
            hits_objects: true,
            falling: Falling::default(),
            seek_factor: Fixed::from_num(-1),
            erratic: false,
            trail: Trail::default(),
            guns: FollowUpGuns::default(),
        }
    }

    /// Whether the bullet runs the proximity check.
    #[must_use]
    pub fn has_proximity(&self) -> bool {
        !self.guns.proximity.is_empty()
    }
}

/// Partial bullet definition as written in a data file.
///
/// Every field is optional; absent fields keep the template's value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BulletClassDef {
    /// Unique name.
    pub name: Option<String>,
    /// Collision box (width, height).
    #[serde(with = "option_vec2_decimal")]
    pub size: Option<Vec2Fixed>,
    /// Activation delay in ticks.
    pub delay: Option<i32>,
    /// Sets both `speed_low` and `speed_high`.
    #[serde(with = "option_fixed_decimal")]
    pub speed: Option<Fixed>,
    /// Slowest launch speed.
    #[serde(with = "option_fixed_decimal")]
    pub speed_low: Option<Fixed>,
    /// Fastest launch speed.
    #[serde(with = "option_fixed_decimal")]
    pub speed_high: Option<Fixed>,
    /// Scale vertical speed by the tile aspect ratio.
    pub speed_scale: Option<bool>,
    /// Per-axis speed loss per tick.
    #[serde(with = "option_fixed_decimal")]
    pub friction: Option<Fixed>,
    /// Sets both `range_low` and `range_high`.
    pub range: Option<i32>,
    /// Shortest lifetime.
    pub range_low: Option<i32>,
    /// Longest lifetime.
    pub range_high: Option<i32>,
    /// Damage.
    pub power: Option<i32>,
    /// Knockback mass.
    #[serde(with = "option_fixed_decimal")]
    pub mass: Option<Fixed>,
    /// Status effect.
    pub special: Option<SpecialDamage>,
    /// Ignores friendly-fire rules.
    pub hurt_always: Option<bool>,
    /// Piercing.
    pub persists: Option<bool>,
    /// Absorb particle.
    pub spark: Option<String>,
    /// Out-of-range particle.
    pub out_of_range_spark: Option<String>,
    /// Wall mark particle.
    pub wall_mark: Option<String>,
    /// Hit sounds.
    pub hit_sounds: Option<HitSounds>,
    /// Reflects off walls.
    pub wall_bounces: Option<bool>,
    /// Absorbed by actors and objects.
    pub hits_objects: Option<bool>,
    /// Lobbed behaviour.
    pub falling: Option<Falling>,
    /// Homing strength.
    #[serde(with = "option_fixed_decimal")]
    pub seek_factor: Option<Fixed>,
    /// Random jitter.
    pub erratic: Option<bool>,
    /// Trail particle.
    pub trail: Option<Trail>,
    /// Follow-up guns fired when range runs out.
    pub out_of_range_guns: Vec<String>,
    /// Follow-up guns fired on absorb.
    pub hit_guns: Vec<String>,
    /// Follow-up guns fired on proximity.
    pub proximity_guns: Vec<String>,
}

impl BulletClassDef {
    fn follow_up_guns(&self) -> FollowUpGuns {
        FollowUpGuns {
            out_of_range: self.out_of_range_guns.clone(),
            hit: self.hit_guns.clone(),
            proximity: self.proximity_guns.clone(),
            drop: self
                .falling
                .as_ref()
                .map(|f| f.drop_guns.clone())
                .unwrap_or_default(),
        }
    }

    /// Rewrite pre-version-3 hit sound names into the `hits/` folder.
    fn migrate_hit_sounds(&mut self) {
        fn rename(sound: &mut Option<String>) {
            if let Some(name) = sound.as_mut() {
                if let Some(rest) = name.strip_prefix("hit_") {
                    *name = format!("hits/{rest}");
                } else if name.starts_with("knife_") {
                    *name = format!("hits/{name}");
                }
            }
        }
        if let Some(sounds) = self.hit_sounds.as_mut() {
            rename(&mut sounds.object);
            rename(&mut sounds.flesh);
            rename(&mut sounds.wall);
        }
    }
}

/// Serde helper for optional `(w, h)` decimal pairs.
mod option_vec2_decimal {
    use super::{Fixed, Vec2Fixed};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Vec2Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value
            .map(|v| (v.x.to_num::<f64>(), v.y.to_num::<f64>()))
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec2Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some((x, y)) = Option::<(f64, f64)>::deserialize(deserializer)? else {
            return Ok(None);
        };
        match (Fixed::checked_from_num(x), Fixed::checked_from_num(y)) {
            (Some(x), Some(y)) => Ok(Some(Vec2Fixed::new(x, y))),
            _ => Err(D::Error::custom(format!("({x}, {y}) does not fit a fixed-point vector"))),
        }
    }
}

/// Composes a [`BulletClass`] from a template and overrides.
#[derive(Debug, Clone)]
pub struct BulletClassBuilder {
    class: BulletClass,
}

impl BulletClassBuilder {
    /// Start from a template. The template's follow-up guns are dropped.
    #[must_use]
    pub fn new(template: &BulletClass) -> Self {
        let mut class = template.clone();
        class.guns = FollowUpGuns::default();
        Self { class }
    }

    /// Apply every field present in `def`.
    #[must_use]
    pub fn apply(mut self, def: &BulletClassDef) -> Self {
        let c = &mut self.class;
        if let Some(name) = &def.name {
            c.name.clone_from(name);
        }
        if let Some(size) = def.size {
            c.size = size;
        }
        if let Some(delay) = def.delay {
            c.delay = delay;
        }
        if let Some(speed) = def.speed {
            c.speed_low = speed;
            c.speed_high = speed;
        }
        if let Some(low) = def.speed_low {
            c.speed_low = low;
        }
        if let Some(high) = def.speed_high {
            c.speed_high = high;
        }
        if let Some(scale) = def.speed_scale {
            c.speed_scale = scale;
        }
        if let Some(friction) = def.friction {
            c.friction = friction;
        }
        if let Some(range) = def.range {
            c.range_low = range;
            c.range_high = range;
        }
        if let Some(low) = def.range_low {
            c.range_low = low;
        }
        if let Some(high) = def.range_high {
            c.range_high = high;
        }
        if let Some(power) = def.power {
            c.power = power;
        }
        if let Some(mass) = def.mass {
            c.mass = mass;
        }
        if let Some(special) = def.special {
            c.special = special;
        }
        if let Some(v) = def.hurt_always {
            c.hurt_always = v;
        }
        if let Some(v) = def.persists {
            c.persists = v;
        }
        if def.spark.is_some() {
            c.spark.clone_from(&def.spark);
        }
        if def.out_of_range_spark.is_some() {
            c.out_of_range_spark.clone_from(&def.out_of_range_spark);
        }
        if def.wall_mark.is_some() {
            c.wall_mark.clone_from(&def.wall_mark);
        }
        if let Some(sounds) = &def.hit_sounds {
            c.hit_sounds = sounds.clone();
        }
        if let Some(v) = def.wall_bounces {
            c.wall_bounces = v;
        }
        if let Some(v) = def.hits_objects {
            c.hits_objects = v;
        }
        if let Some(falling) = &def.falling {
            c.falling = falling.clone();
            c.falling.drop_guns.clear();
        }
        if let Some(seek) = def.seek_factor {
            c.seek_factor = seek;
        }
        if let Some(v) = def.erratic {
            c.erratic = v;
        }
        if let Some(trail) = &def.trail {
            c.trail = trail.clone();
        }
        self
    }

    /// Force knockback mass to equal power (version 1 files).
    #[must_use]
    pub fn mass_from_power(mut self) -> Self {
        self.class.mass = Fixed::from_num(self.class.power);
        self
    }

    /// Attach resolved follow-up guns.
    #[must_use]
    pub fn with_guns(mut self, guns: FollowUpGuns) -> Self {
        self.class.falling.drop_guns.clone_from(&guns.drop);
        self.class.guns = guns;
        self
    }

    /// Finish, normalising low/high pairs so that `low <= high`.
    #[must_use]
    pub fn build(mut self) -> BulletClass {
        let c = &mut self.class;
        if c.speed_low > c.speed_high {
            std::mem::swap(&mut c.speed_low, &mut c.speed_high);
        }
        if c.range_low > c.range_high {
            std::mem::swap(&mut c.range_low, &mut c.range_high);
        }
        self.class
    }
}

/// On-disk bullet file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulletFile {
    /// Format version, `1..=BULLET_FILE_VERSION`.
    pub version: u32,
    /// Template every entry starts from.
    #[serde(default)]
    pub default: BulletClassDef,
    /// Bullet entries.
    #[serde(default)]
    pub bullets: Vec<BulletClassDef>,
}

/// All loaded bullet classes, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletClasses {
    classes: BTreeMap<String, BulletClass>,
    /// Gun names waiting for [`BulletClasses::link_guns`].
    pending_guns: BTreeMap<String, FollowUpGuns>,
}

impl BulletClasses {
    /// Build classes from a parsed bullet file.
    ///
    /// Guns are held back until [`link_guns`](Self::link_guns) runs.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnsupportedVersion`] for unknown versions and
    /// [`SimError::DataParseError`] for unnamed or duplicate entries.
    pub fn from_file(file: BulletFile) -> Result<Self> {
        if file.version == 0 || file.version > BULLET_FILE_VERSION {
            return Err(SimError::UnsupportedVersion {
                what: "bullet file",
                version: file.version,
                max: BULLET_FILE_VERSION,
            });
        }

        let mut template_def = file.default;
        if file.version < 3 {
            template_def.migrate_hit_sounds();
        }
        let template = BulletClassBuilder::new(&BulletClass::fallback())
            .apply(&template_def)
            .build();

        let mut out = Self::default();
        for mut def in file.bullets {
            if file.version < 3 {
                def.migrate_hit_sounds();
            }
            let Some(name) = def.name.clone() else {
                return Err(SimError::DataParseError {
                    path: "bullets".to_string(),
                    message: "bullet entry without a name".to_string(),
                });
            };

            let mut builder = BulletClassBuilder::new(&template).apply(&def);
            if file.version < 2 {
                builder = builder.mass_from_power();
            }

            let guns = def.follow_up_guns();
            if !guns.is_empty() {
                out.pending_guns.insert(name.clone(), guns);
            }
            if out.classes.insert(name.clone(), builder.build()).is_some() {
                return Err(SimError::DataParseError {
                    path: "bullets".to_string(),
                    message: format!("duplicate bullet class '{name}'"),
                });
            }
        }

        tracing::debug!(count = out.classes.len(), version = file.version, "Loaded bullet classes");
        Ok(out)
    }

    /// Parse a RON bullet file.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DataParseError`] on malformed RON.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let file: BulletFile = ron::from_str(source).map_err(|e| SimError::DataParseError {
            path: "bullets".to_string(),
            message: e.to_string(),
        })?;
        Self::from_file(file)
    }

    /// Insert a fully built class directly.
    pub fn insert(&mut self, class: BulletClass) {
        self.classes.insert(class.name.clone(), class);
    }

    /// Attach follow-up guns now that weapon classes exist.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownWeaponClass`] if any referenced gun is
    /// missing; no class is modified in that case.
    pub fn link_guns(&mut self, weapons: &WeaponClasses) -> Result<()> {
        for guns in self.pending_guns.values() {
            for name in guns.names() {
                weapons.get(name)?;
            }
        }

        for (name, guns) in std::mem::take(&mut self.pending_guns) {
            let Some(class) = self.classes.get(&name) else {
                continue;
            };
            let linked = BulletClassBuilder::new(class).with_guns(guns).build();
            self.classes.insert(name, linked);
        }
        Ok(())
    }

    /// Whether guns are still waiting to be linked.
    #[must_use]
    pub fn has_pending_guns(&self) -> bool {
        !self.pending_guns.is_empty()
    }

    /// Look up a class by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownBulletClass`] for unknown names.
    pub fn get(&self, name: &str) -> Result<&BulletClass> {
        self.classes
            .get(name)
            .ok_or_else(|| SimError::UnknownBulletClass(name.to_string()))
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no classes are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::WeaponClass;

    const FILE: &str = r#"
        BulletFile(
            version: 3,
            default: (
                size: Some((2.0, 2.0)),
                speed: Some(5.0),
                range: Some(30),
                power: Some(2),
                hit_guns: ["never_inherited"],
            ),
            bullets: [
                (name: Some("pistol")),
                (
                    name: Some("grenade"),
                    speed_low: Some(6.0),
                    speed_high: Some(3.0),
                    range: Some(40),
                    falling: Some((gravity: 0.5, bounces: true, drop_guns: ["frag"])),
                    hit_guns: ["frag"],
                ),
            ],
        )
    "#;

    fn frag_weapons() -> WeaponClasses {
        WeaponClasses::new(vec![WeaponClass::single_shot("frag", Some("pistol"))])
    }

    #[test]
    fn test_template_applied() {
        let classes = BulletClasses::from_ron_str(FILE).unwrap();
        let pistol = classes.get("pistol").unwrap();
        assert_eq!(pistol.speed_low, Fixed::from_num(5));
        assert_eq!(pistol.speed_high, Fixed::from_num(5));
        assert_eq!(pistol.range_high, 30);
        assert_eq!(pistol.power, 2);
        assert!(pistol.guns.hit.is_empty());
    }

    #[test]
    fn test_low_high_normalised() {
        let classes = BulletClasses::from_ron_str(FILE).unwrap();
        let grenade = classes.get("grenade").unwrap();
        assert_eq!(grenade.speed_low, Fixed::from_num(3));
        assert_eq!(grenade.speed_high, Fixed::from_num(6));
    }

    #[test]
    fn test_guns_attached_only_after_link() {
        let mut classes = BulletClasses::from_ron_str(FILE).unwrap();
        assert!(classes.has_pending_guns());
        assert!(classes.get("grenade").unwrap().guns.hit.is_empty());

        classes.link_guns(&frag_weapons()).unwrap();
        let grenade = classes.get("grenade").unwrap();
        assert_eq!(grenade.guns.hit, vec!["frag".to_string()]);
        assert_eq!(grenade.falling.drop_guns, vec!["frag".to_string()]);
        assert!(!classes.has_pending_guns());
    }

    #[test]
    fn test_link_rejects_unknown_gun() {
        let mut classes = BulletClasses::from_ron_str(FILE).unwrap();
        let err = classes.link_guns(&WeaponClasses::default()).unwrap_err();
        assert!(matches!(err, SimError::UnknownWeaponClass(name) if name == "frag"));
        assert!(classes.has_pending_guns());
    }

    #[test]
    fn test_version_rules() {
        let v1 = r#"BulletFile(version: 1, bullets: [(name: Some("old"), power: Some(9), mass: Some(2.0))])"#;
        let classes = BulletClasses::from_ron_str(v1).unwrap();
        assert_eq!(classes.get("old").unwrap().mass, Fixed::from_num(9));

        let v2 = r#"BulletFile(version: 2, bullets: [(name: Some("old"), hit_sounds: Some((flesh: Some("hit_flesh"), wall: Some("knife_hard"))))])"#;
        let classes = BulletClasses::from_ron_str(v2).unwrap();
        let sounds = &classes.get("old").unwrap().hit_sounds;
        assert_eq!(sounds.flesh.as_deref(), Some("hits/flesh"));
        assert_eq!(sounds.wall.as_deref(), Some("hits/knife_hard"));

        let v9 = "BulletFile(version: 9)";
        assert!(matches!(
            BulletClasses::from_ron_str(v9),
            Err(SimError::UnsupportedVersion { version: 9, .. })
        ));
    }

    #[test]
    fn test_unknown_class_lookup() {
        let classes = BulletClasses::from_ron_str(FILE).unwrap();
        assert!(matches!(
            classes.get("laser"),
            Err(SimError::UnknownBulletClass(_))
        ));
    }
}
