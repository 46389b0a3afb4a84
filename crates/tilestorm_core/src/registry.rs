//! Slot-based entity registries.
//!
//! Every networked thing (actor, map object, pickup, bullet) lives in a
//! [`Registry`]: a vector of slots plus a UID index. Events only ever carry
//! UIDs, never slot indices, so a slot can be recycled without any
//! in-flight event accidentally touching the newcomer.
//!
//! # Slot reuse
//!
//! Removing an entity drops its UID from the index *before* the slot goes
//! back on the free list. A stale UID therefore resolves to `None` even when
//! its old slot has already been handed to a different entity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Stable identifier of a networked entity.
///
/// Assigned by whoever produces the creating event (usually the host) and
/// independent of the slot the entity ends up in.
pub type Uid = u64;

/// Something that can be stored in a [`Registry`].
pub trait Tracked {
    /// Registry name used in error messages.
    const KIND: &'static str;

    /// The entity's stable identifier.
    fn uid(&self) -> Uid;
}

/// Slot storage with a UID index and a lowest-slot-first free list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registry<T> {
    slots: Vec<Option<T>>,
    free: BTreeSet<usize>,
    index: BTreeMap<Uid, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: BTreeSet::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<T: Tracked> Registry<T> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no entity is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of slots ever allocated (live plus free).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether `uid` refers to a live entity.
    #[must_use]
    pub fn contains(&self, uid: Uid) -> bool {
        self.index.contains_key(&uid)
    }

    /// Slot currently holding `uid`.
    #[must_use]
    pub fn slot_of(&self, uid: Uid) -> Option<usize> {
        self.index.get(&uid).copied()
    }

    /// Look up a live entity.
    #[must_use]
    pub fn get(&self, uid: Uid) -> Option<&T> {
        let slot = *self.index.get(&uid)?;
        self.slots.get(slot)?.as_ref()
    }

    /// Look up a live entity mutably.
    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut T> {
        let slot = *self.index.get(&uid)?;
        self.slots.get_mut(slot)?.as_mut()
    }

    /// Store a new entity, reusing the lowest free slot or growing.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::DuplicateUid`] if the UID is already live.
    pub fn insert(&mut self, value: T) -> Result<usize> {
        let uid = value.uid();
        if self.index.contains_key(&uid) {
            return Err(SimError::DuplicateUid { kind: T::KIND, uid });
        }

        let slot = match self.free.pop_first() {
            Some(slot) => {
                self.slots[slot] = Some(value);
                slot
            }
            None => {
                self.slots.push(Some(value));
                self.slots.len() - 1
            }
        };
        self.index.insert(uid, slot);
        Ok(slot)
    }

    /// Remove an entity, invalidating its UID and freeing its slot.
    pub fn remove(&mut self, uid: Uid) -> Option<T> {
        let slot = self.index.remove(&uid)?;
        let value = self.slots.get_mut(slot)?.take();
        self.free.insert(slot);
        value
    }

    /// Iterate live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate live entities mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// UIDs of live entities in slot order.
    ///
    /// Collected up front so callers can mutate the registry while walking it.
    #[must_use]
    pub fn uids(&self) -> Vec<Uid> {
        self.iter().map(Tracked::uid).collect()
    }

    /// Iterate live entities in ascending UID order, independent of slot layout.
    pub fn iter_by_uid(&self) -> impl Iterator<Item = &T> {
        self.index
            .values()
            .filter_map(|&slot| self.slots.get(slot).and_then(Option::as_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Thing {
        uid: Uid,
        hp: i32,
    }

    impl Tracked for Thing {
        const KIND: &'static str = "thing";

        fn uid(&self) -> Uid {
            self.uid
        }
    }

    fn thing(uid: Uid) -> Thing {
        Thing { uid, hp: 10 }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut reg = Registry::new();
        assert_eq!(reg.insert(thing(7)).unwrap(), 0);
        assert_eq!(reg.insert(thing(3)).unwrap(), 1);

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get(3).map(|t| t.hp), Some(10));
        assert_eq!(reg.slot_of(7), Some(0));
        assert!(reg.get(99).is_none());
    }

    #[test]
    fn test_duplicate_uid_rejected() {
        let mut reg = Registry::new();
        reg.insert(thing(1)).unwrap();
        assert!(matches!(
            reg.insert(thing(1)),
            Err(SimError::DuplicateUid { kind: "thing", uid: 1 })
        ));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_slot_reuse_invalidates_stale_uid() {
        let mut reg = Registry::new();
        reg.insert(thing(1)).unwrap();
        reg.insert(thing(2)).unwrap();

        assert!(reg.remove(1).is_some());
        // Newcomer takes the freed slot 0.
        assert_eq!(reg.insert(thing(5)).unwrap(), 0);

        assert!(reg.get(1).is_none());
        assert!(reg.get_mut(1).is_none());
        assert_eq!(reg.get(5).map(Tracked::uid), Some(5));
        assert_eq!(reg.capacity(), 2);
    }

    #[test]
    fn test_lowest_free_slot_first() {
        let mut reg = Registry::new();
        for uid in 0..4 {
            reg.insert(thing(uid)).unwrap();
        }
        reg.remove(3);
        reg.remove(1);

        assert_eq!(reg.insert(thing(10)).unwrap(), 1);
        assert_eq!(reg.insert(thing(11)).unwrap(), 3);
        assert_eq!(reg.insert(thing(12)).unwrap(), 4);
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut reg = Registry::new();
        for uid in [30, 10, 20] {
            reg.insert(thing(uid)).unwrap();
        }
        reg.remove(10);
        reg.insert(thing(40)).unwrap();

        assert_eq!(reg.uids(), vec![30, 40, 20]);
        let sorted: Vec<_> = reg.iter_by_uid().map(Tracked::uid).collect();
        assert_eq!(sorted, vec![20, 30, 40]);
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut reg: Registry<Thing> = Registry::new();
        assert!(reg.remove(42).is_none());
        assert!(reg.is_empty());
    }
}
