#![forbid(unsafe_code)]

//! Identity-keyed item storage and the live-event reducer.
//!
//! Items live in insertion-ordered slots. Removal leaves a tombstone so the
//! slot numbers held by the filter index stay valid; [`ItemStore::compact`]
//! squeezes the tombstones out and reports [`StoreChange::Compacted`] so
//! dependents rebuild.

use std::fmt::Debug;
use std::hash::Hash;

use ahash::AHashMap;
use tracing::debug;

/// A record with a stable identity.
pub trait ListItem {
    type Id: Clone + Eq + Hash + Debug + Send + 'static;

    fn id(&self) -> Self::Id;
}

/// An out-of-band change pushed by a live source.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent<T: ListItem> {
    /// New items, appended in order.
    Added(Vec<T>),
    /// Replacement for an existing item (last write wins).
    Updated(T),
    /// Removal by id.
    Removed(T::Id),
}

/// What a single mutation did to the slot layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Inserted(usize),
    Replaced(usize),
    Removed(usize),
    /// Tombstones were squeezed out; every slot number changed.
    Compacted,
    Ignored,
}

/// Dead slots tolerated before an automatic compaction.
const COMPACT_MIN_TOMBSTONES: usize = 64;

/// Ordered items with O(1) lookup by id.
#[derive(Debug, Clone)]
pub struct ItemStore<T: ListItem> {
    slots: Vec<Option<T>>,
    index: AHashMap<T::Id, usize>,
    live: usize,
}

impl<T: ListItem> Default for ItemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ListItem> ItemStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: AHashMap::new(),
            live: 0,
        }
    }

    /// Build from initial items. Later duplicates of an id are dropped.
    #[must_use]
    pub fn from_items(items: Vec<T>) -> Self {
        let mut store = Self::new();
        for item in items {
            store.insert(item);
        }
        store
    }

    /// Live item count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slot count including tombstones.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn slot_of(&self, id: &T::Id) -> Option<usize> {
        self.index.get(id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: &T::Id) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn get_by_id(&self, id: &T::Id) -> Option<&T> {
        self.slot_of(id).and_then(|slot| self.get(slot))
    }

    /// Live `(slot, item)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| item.as_ref().map(|item| (slot, item)))
    }

    /// Append an item unless its id is already present.
    pub fn insert(&mut self, item: T) -> StoreChange {
        let id = item.id();
        if self.index.contains_key(&id) {
            debug!(?id, "duplicate id ignored");
            return StoreChange::Ignored;
        }
        let slot = self.slots.len();
        self.slots.push(Some(item));
        self.index.insert(id, slot);
        self.live += 1;
        StoreChange::Inserted(slot)
    }

    /// Replace the item with the same id. Unknown ids are ignored.
    pub fn replace(&mut self, item: T) -> StoreChange {
        let id = item.id();
        match self.index.get(&id) {
            Some(&slot) => {
                self.slots[slot] = Some(item);
                StoreChange::Replaced(slot)
            }
            None => {
                debug!(?id, "update for unknown id ignored");
                StoreChange::Ignored
            }
        }
    }

    /// Remove by id, leaving a tombstone.
    pub fn remove(&mut self, id: &T::Id) -> StoreChange {
        let Some(slot) = self.index.remove(id) else {
            debug!(?id, "removal of unknown id ignored");
            return StoreChange::Ignored;
        };
        self.slots[slot] = None;
        self.live -= 1;
        StoreChange::Removed(slot)
    }

    /// Whether tombstones outweigh live items enough to compact.
    #[must_use]
    pub fn needs_compaction(&self) -> bool {
        let dead = self.slots.len() - self.live;
        dead >= COMPACT_MIN_TOMBSTONES && dead > self.live
    }

    /// Drop tombstones and renumber slots.
    pub fn compact(&mut self) -> StoreChange {
        if self.slots.len() == self.live {
            return StoreChange::Ignored;
        }
        let mut slots = Vec::with_capacity(self.live);
        self.index.clear();
        for item in self.slots.drain(..).flatten() {
            self.index.insert(item.id(), slots.len());
            slots.push(Some(item));
        }
        self.slots = slots;
        debug!(live = self.live, "item store compacted");
        StoreChange::Compacted
    }

    /// Apply a live event, returning one change per affected item.
    pub fn apply(&mut self, event: LiveEvent<T>) -> Vec<StoreChange> {
        match event {
            LiveEvent::Added(items) => items.into_iter().map(|item| self.insert(item)).collect(),
            LiveEvent::Updated(item) => vec![self.replace(item)],
            LiveEvent::Removed(id) => {
                let mut changes = vec![self.remove(&id)];
                if self.needs_compaction() {
                    changes.push(self.compact());
                }
                changes
            }
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.live = 0;
    }
}
