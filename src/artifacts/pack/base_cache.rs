//! Resolved delta bases, keyed by pack offset
//!
//! The cache holds at most `budget` bytes of object data and evicts the least
//! recently used base first. An object larger than the whole budget is never
//! cached.

use crate::artifacts::objects::object::RawObject;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct Slot {
    object: RawObject,
    depth: usize,
    last_used: u64,
}

#[derive(Debug)]
pub struct BaseCache {
    budget: usize,
    used: usize,
    clock: u64,
    slots: HashMap<u64, Slot>,
    /// Pack offsets by last use, oldest first
    recency: BTreeMap<u64, u64>,
}

impl BaseCache {
    pub fn new(budget: usize) -> Self {
        BaseCache {
            budget,
            used: 0,
            clock: 0,
            slots: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes of object data currently held
    pub fn used(&self) -> usize {
        self.used
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn get(&mut self, offset: u64) -> Option<(RawObject, usize)> {
        let now = self.tick();
        let slot = self.slots.get_mut(&offset)?;

        self.recency.remove(&slot.last_used);
        slot.last_used = now;
        self.recency.insert(now, offset);

        Some((slot.object.clone(), slot.depth))
    }

    pub fn insert(&mut self, offset: u64, object: &RawObject, depth: usize) {
        let size = object.size();
        if size > self.budget {
            return;
        }

        self.remove(offset);
        while self.used + size > self.budget {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            if let Some(slot) = self.slots.remove(&oldest) {
                self.used -= slot.object.size();
            }
        }

        let now = self.tick();
        self.slots.insert(
            offset,
            Slot {
                object: object.clone(),
                depth,
                last_used: now,
            },
        );
        self.recency.insert(now, offset);
        self.used += size;
    }

    fn remove(&mut self, offset: u64) {
        if let Some(slot) = self.slots.remove(&offset) {
            self.recency.remove(&slot.last_used);
            self.used -= slot.object.size();
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.recency.clear();
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::object_type::ObjectType;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn object(size: usize) -> RawObject {
        RawObject::new(ObjectType::Blob, Bytes::from(vec![b'x'; size]))
    }

    #[test]
    fn least_recently_used_base_is_evicted_first() {
        let mut cache = BaseCache::new(30);
        cache.insert(1, &object(10), 0);
        cache.insert(2, &object(10), 1);
        cache.insert(3, &object(10), 2);

        // touching 1 makes 2 the oldest
        assert!(cache.get(1).is_some());
        cache.insert(4, &object(10), 3);

        assert!(cache.get(2).is_none());
        assert_eq!(cache.get(1).map(|(_, depth)| depth), Some(0));
        assert!(cache.get(3).is_some());
        assert!(cache.get(4).is_some());
        assert_eq!(cache.used(), 30);
    }

    #[test]
    fn objects_larger_than_the_budget_are_skipped() {
        let mut cache = BaseCache::new(8);
        cache.insert(1, &object(4), 0);
        cache.insert(2, &object(9), 0);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used(), 4);
    }

    #[test]
    fn reinserting_an_offset_replaces_it() {
        let mut cache = BaseCache::new(100);
        cache.insert(1, &object(10), 0);
        cache.insert(1, &object(20), 1);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.used(), 20);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.used(), 0);
    }
}
