//! Ordered listener registry with O(1) amortized insert and removal

use std::collections::HashMap;
use std::sync::Arc;

use super::EventListener;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Immutable view of the listeners at one point in time, in registration order
pub(crate) type Snapshot = Arc<[Arc<dyn EventListener>]>;

#[derive(Default)]
pub(crate) struct Registry {
    /// Registration order; removed entries leave a hole until compaction
    slots: Vec<Option<Arc<dyn EventListener>>>,
    index: HashMap<ListenerId, usize>,
    holes: usize,
    next_id: u64,
    cached: Option<Snapshot>,
}

impl Registry {
    pub(crate) fn insert(&mut self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        self.slots.push(Some(listener));
        self.index.insert(id, self.slots.len() - 1);
        self.cached = None;
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let Some(position) = self.index.remove(&id) else {
            return false;
        };

        self.slots[position] = None;
        self.holes += 1;
        self.cached = None;

        if self.holes * 2 > self.slots.len() {
            self.compact();
        }
        true
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.holes = 0;
        self.cached = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    /// Copy-on-write snapshot; rebuilt only after a mutation
    pub(crate) fn snapshot(&mut self) -> Snapshot {
        if let Some(snapshot) = &self.cached {
            return Arc::clone(snapshot);
        }

        let snapshot: Snapshot = self.slots.iter().flatten().cloned().collect();
        self.cached = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn compact(&mut self) {
        let mut positions: Vec<(ListenerId, usize)> = self.index.drain().collect();
        positions.sort_unstable_by_key(|(_, position)| *position);

        let mut slots = Vec::with_capacity(positions.len());
        for (id, position) in positions {
            if let Some(listener) = self.slots[position].take() {
                self.index.insert(id, slots.len());
                slots.push(Some(listener));
            }
        }

        self.slots = slots;
        self.holes = 0;
    }
}
