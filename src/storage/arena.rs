// ============================================================================
// Object Arena
// ============================================================================
//
// Slot storage with generation counters. Every occupant of a slot gets a fresh
// generation, so a key handed out for an earlier occupant stops resolving
// without having to find and clear each alias. Freed slots are reused.
//
// Slots live in persistent vectors: cloning an arena is O(1) and the clone
// shares structure with the original until either side is modified. All
// clones draw generations from one counter, so a slot reused after a rolled
// back write never hands out a generation a stale key still carries.
//
// ============================================================================

use super::table::ObjectRow;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Stable address of a persisted object: slot index plus generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    index: u32,
    generation: u32,
}

impl ObjectKey {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj_{}v{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone)]
struct ArenaSlot {
    generation: u32,
    row: Option<ObjectRow>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectArena {
    slots: im::Vector<ArenaSlot>,
    free: im::Vector<u32>,
    live: usize,
    generations: Arc<AtomicU32>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: ObjectRow) -> ObjectKey {
        self.live += 1;
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        if let Some(index) = self.free.pop_back() {
            let slot = &mut self.slots[index as usize];
            slot.generation = generation;
            slot.row = Some(row);
            return ObjectKey { index, generation };
        }

        let index = self.slots.len() as u32;
        self.slots.push_back(ArenaSlot {
            generation,
            row: Some(row),
        });
        ObjectKey { index, generation }
    }

    pub fn get(&self, key: ObjectKey) -> Option<&ObjectRow> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.row.as_ref())
    }

    pub fn get_mut(&mut self, key: ObjectKey) -> Option<&mut ObjectRow> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.row.as_mut())
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.get(key).is_some()
    }

    /// Remove the object and retire its key.
    pub fn remove(&mut self, key: ObjectKey) -> Option<ObjectRow> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let row = slot.row.take()?;
        self.free.push_back(key.index);
        self.live -= 1;
        Some(row)
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectKey, &ObjectRow)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.row.as_ref().map(|row| {
                (
                    ObjectKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    row,
                )
            })
        })
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        self.iter().map(|(key, _)| key).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, ObjectSchema, Property};
    use std::sync::Arc;

    fn row() -> ObjectRow {
        let schema = Arc::new(
            ObjectSchema::new("IntObject").property(Property::new("intCol", DataType::Int)),
        );
        ObjectRow::new(schema, None)
    }

    #[test]
    fn test_insert_and_get() {
        let mut arena = ObjectArena::new();
        let key = arena.insert(row());
        assert!(arena.contains(key));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(key).unwrap().class_name(), "IntObject");
    }

    #[test]
    fn test_removed_key_goes_stale() {
        let mut arena = ObjectArena::new();
        let key = arena.insert(row());
        assert!(arena.remove(key).is_some());
        assert!(!arena.contains(key));
        assert!(arena.remove(key).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena = ObjectArena::new();
        let first = arena.insert(row());
        arena.remove(first);
        let second = arena.insert(row());

        assert_eq!(first.index(), second.index());
        assert_ne!(first.generation(), second.generation());
        assert!(!arena.contains(first));
        assert!(arena.contains(second));
    }

    #[test]
    fn test_rolled_back_slot_never_reissues_generation() {
        let mut arena = ObjectArena::new();
        let base = arena.clone();
        let doomed = arena.insert(row());

        let mut restored = base;
        let fresh = restored.insert(row());
        assert_eq!(doomed.index(), fresh.index());
        assert!(!restored.contains(doomed));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut arena = ObjectArena::new();
        let key = arena.insert(row());
        let snapshot = arena.clone();
        arena.remove(key);

        assert!(snapshot.contains(key));
        assert!(!arena.contains(key));
        assert_eq!(snapshot.keys(), vec![key]);
    }
}
