//! Tile map: the spatial query surface the simulation runs against.
//!
//! The map is a dense grid of tiles, each pointing at a shared
//! [`TileClass`]. Projectile code only asks three questions of it: which
//! tile is under a point, is that tile shootable (or opaque), and can a
//! thing be moved to a point. Map generation lives elsewhere; this module
//! only stores and answers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::math::{Fixed, Vec2Fixed};

/// Width of one tile in map units.
pub const TILE_WIDTH: i32 = 16;

/// Height of one tile in map units.
pub const TILE_HEIGHT: i32 = 12;

/// Integer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TilePos {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl TilePos {
    /// Create a tile coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing a map-space point.
    #[must_use]
    pub fn containing(pos: Vec2Fixed) -> Self {
        Self {
            x: (pos.x / Fixed::from_num(TILE_WIDTH)).floor().to_num::<i32>(),
            y: (pos.y / Fixed::from_num(TILE_HEIGHT)).floor().to_num::<i32>(),
        }
    }

    /// Top-left and bottom-right corners of this tile in map units.
    #[must_use]
    pub fn bounds(self) -> (Vec2Fixed, Vec2Fixed) {
        let min = Vec2Fixed::from_ints(self.x * TILE_WIDTH, self.y * TILE_HEIGHT);
        let max = Vec2Fixed::from_ints((self.x + 1) * TILE_WIDTH, (self.y + 1) * TILE_HEIGHT);
        (min, max)
    }

    /// Centre of this tile in map units.
    #[must_use]
    pub fn center(self) -> Vec2Fixed {
        let (min, max) = self.bounds();
        min.lerp(max, Fixed::from_num(0.5))
    }
}

/// Broad category of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileType {
    /// Open ground.
    #[default]
    Floor,
    /// Solid wall.
    Wall,
    /// Door tile.
    Door,
    /// Outside the playable area.
    Nothing,
}

/// Shared properties of a tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileClass {
    /// Unique name.
    pub name: String,
    /// Category.
    #[serde(default)]
    pub kind: TileType,
    /// Actors may walk here.
    #[serde(default = "default_true")]
    pub walkable: bool,
    /// Blocks line of sight.
    #[serde(default)]
    pub opaque: bool,
    /// Stops (or bounces) projectiles.
    #[serde(default)]
    pub shootable: bool,
    /// Part of a room interior.
    #[serde(default)]
    pub is_room: bool,
}

const fn default_true() -> bool {
    true
}

impl TileClass {
    /// Plain walkable floor.
    #[must_use]
    pub fn floor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TileType::Floor,
            walkable: true,
            opaque: false,
            shootable: false,
            is_room: false,
        }
    }

    /// Solid, opaque, shootable wall.
    #[must_use]
    pub fn wall(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TileType::Wall,
            walkable: false,
            opaque: true,
            shootable: true,
            is_room: false,
        }
    }
}

/// Index into a [`TileClasses`] table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileClassId(pub u16);

/// Table of tile classes, looked up by name at load time and by id at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileClasses {
    classes: Vec<TileClass>,
}

impl TileClasses {
    /// Build a table from a list of classes.
    #[must_use]
    pub fn new(classes: Vec<TileClass>) -> Self {
        Self { classes }
    }

    /// The default `floor` / `wall` / `door` / `nothing` table.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            TileClass::floor("floor"),
            TileClass::wall("wall"),
            TileClass {
                name: "door".to_string(),
                kind: TileType::Door,
                walkable: true,
                opaque: true,
                shootable: false,
                is_room: false,
            },
            TileClass {
                name: "nothing".to_string(),
                kind: TileType::Nothing,
                walkable: false,
                opaque: false,
                shootable: false,
                is_room: false,
            },
        ])
    }

    /// Find a class id by name.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownTileClass`] for unknown names.
    pub fn id(&self, name: &str) -> Result<TileClassId> {
        self.classes
            .iter()
            .position(|c| c.name == name)
            .map(|i| TileClassId(i as u16))
            .ok_or_else(|| SimError::UnknownTileClass(name.to_string()))
    }

    /// Class by id.
    #[must_use]
    pub fn get(&self, id: TileClassId) -> Option<&TileClass> {
        self.classes.get(usize::from(id.0))
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Primary class.
    pub class: TileClassId,
    /// Alternate (decoration) class, if any.
    pub class_alt: Option<TileClassId>,
    /// Seen by a player.
    pub explored: bool,
}

/// Dense tile grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    classes: TileClasses,
}

impl TileMap {
    /// Create a map filled with one class.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownTileClass`] if `fill` is not in `classes`.
    pub fn new(width: i32, height: i32, classes: TileClasses, fill: &str) -> Result<Self> {
        let fill = classes.id(fill)?;
        let count = (width.max(0) * height.max(0)) as usize;
        Ok(Self {
            width: width.max(0),
            height: height.max(0),
            tiles: vec![
                Tile {
                    class: fill,
                    class_alt: None,
                    explored: false,
                };
                count
            ],
            classes,
        })
    }

    /// Build a map from ASCII rows using the standard classes.
    ///
    /// `#` is wall, `+` is door, a space is nothing, anything else is floor.
    ///
    /// # Example
    ///
    /// ```
    /// use tilestorm_core::map::{TileMap, TilePos};
    ///
    /// let map = TileMap::from_ascii(&["###", "#.#", "###"]).unwrap();
    /// assert!(map.is_shootable(TilePos::new(0, 0)));
    /// assert!(!map.is_shootable(TilePos::new(1, 1)));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidState`] for ragged rows.
    pub fn from_ascii<S: AsRef<str>>(rows: &[S]) -> Result<Self> {
        let height = rows.len() as i32;
        let width = rows.first().map_or(0, |r| r.as_ref().chars().count()) as i32;
        let mut map = Self::new(width, height, TileClasses::standard(), "floor")?;

        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.chars().count() as i32 != width {
                return Err(SimError::InvalidState(format!(
                    "map row {y} has {} columns, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, ch) in row.chars().enumerate() {
                let name = match ch {
                    '#' => "wall",
                    '+' => "door",
                    ' ' => "nothing",
                    _ => "floor",
                };
                let class = map.classes.id(name)?;
                map.set_tile(TilePos::new(x as i32, y as i32), class, None)?;
            }
        }

        Ok(map)
    }

    /// Size in tiles.
    #[must_use]
    pub const fn size(&self) -> TilePos {
        TilePos::new(self.width, self.height)
    }

    /// Tile class table.
    #[must_use]
    pub fn classes(&self) -> &TileClasses {
        &self.classes
    }

    fn index(&self, pos: TilePos) -> Option<usize> {
        if pos.x < 0 || pos.y < 0 || pos.x >= self.width || pos.y >= self.height {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    /// Tile at a grid coordinate, `None` outside the map.
    #[must_use]
    pub fn tile_at(&self, pos: TilePos) -> Option<&Tile> {
        self.index(pos).and_then(|i| self.tiles.get(i))
    }

    /// Tile coordinate under a map-space point.
    #[must_use]
    pub fn tile_of(&self, pos: Vec2Fixed) -> TilePos {
        TilePos::containing(pos)
    }

    /// Class of the tile at a grid coordinate.
    #[must_use]
    pub fn class_at(&self, pos: TilePos) -> Option<&TileClass> {
        self.tile_at(pos).and_then(|t| self.classes.get(t.class))
    }

    /// Whether projectiles collide with this tile. Outside the map counts as solid.
    #[must_use]
    pub fn is_shootable(&self, pos: TilePos) -> bool {
        self.class_at(pos).map_or(true, |c| c.shootable)
    }

    /// Whether the tile blocks sight. Outside the map counts as opaque.
    #[must_use]
    pub fn is_opaque(&self, pos: TilePos) -> bool {
        self.class_at(pos).map_or(true, |c| c.opaque)
    }

    /// Whether a map-space point lies inside the map.
    #[must_use]
    pub fn contains_point(&self, pos: Vec2Fixed) -> bool {
        pos.x >= Fixed::ZERO
            && pos.y >= Fixed::ZERO
            && pos.x < Fixed::from_num(self.width * TILE_WIDTH)
            && pos.y < Fixed::from_num(self.height * TILE_HEIGHT)
    }

    /// Whether a thing may be placed at `pos`.
    ///
    /// Things never leave the map; walls are handled by collision, not here.
    #[must_use]
    pub fn try_move(&self, pos: Vec2Fixed) -> bool {
        self.contains_point(pos)
    }

    /// Replace a tile's classes.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TileOutOfRange`] outside the map.
    pub fn set_tile(
        &mut self,
        pos: TilePos,
        class: TileClassId,
        class_alt: Option<TileClassId>,
    ) -> Result<()> {
        let index = self
            .index(pos)
            .ok_or(SimError::TileOutOfRange { x: pos.x, y: pos.y })?;
        let tile = &mut self.tiles[index];
        tile.class = class;
        tile.class_alt = class_alt;
        Ok(())
    }

    /// Mark a tile explored.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::TileOutOfRange`] outside the map.
    pub fn set_explored(&mut self, pos: TilePos) -> Result<()> {
        let index = self
            .index(pos)
            .ok_or(SimError::TileOutOfRange { x: pos.x, y: pos.y })?;
        self.tiles[index].explored = true;
        Ok(())
    }

    /// Iterate every tile coordinate intersecting an axis-aligned box.
    ///
    /// Coordinates outside the map are included so callers can treat them
    /// as solid.
    pub fn tiles_overlapping(&self, min: Vec2Fixed, max: Vec2Fixed) -> impl Iterator<Item = TilePos> {
        let lo = TilePos::containing(min);
        let hi = TilePos::containing(max);
        (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| TilePos::new(x, y)))
    }
}
