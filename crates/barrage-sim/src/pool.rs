//! Recyclable typed storage for high-churn entities.
//!
//! A pool slot holds values of exactly one type for its whole lifetime.
//! Freed slots are recycled through a free list; the registry layer above
//! bumps the boxed-handle generation on every release, so recycling a slot
//! can never resurrect a stale handle. Exceeding the nominal capacity is
//! not fatal: the pool grows on the heap and logs once.

enum PoolSlot<T> {
    Free,
    /// Temporarily removed by the update loop (take/put_back). The slot is
    /// still owned by its entity and must not be recycled.
    Taken,
    Occupied(T),
}

pub struct Pool<T> {
    slots: Vec<PoolSlot<T>>,
    free: Vec<u32>,
    capacity: usize,
    overflow_logged: bool,
}

impl<T> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
            overflow_logged: false,
        }
    }

    /// Store a value, reusing a freed slot if one exists.
    pub fn acquire(&mut self, value: T) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = PoolSlot::Occupied(value);
            return index;
        }
        if self.slots.len() >= self.capacity && !self.overflow_logged {
            tracing::warn!(
                "pool capacity {} exceeded, spilling to heap",
                self.capacity
            );
            self.overflow_logged = true;
        }
        let index = self.slots.len() as u32;
        self.slots.push(PoolSlot::Occupied(value));
        index
    }

    /// Return a slot to the free list. Releasing a taken slot frees it too;
    /// the pending `put_back` will then drop its value.
    pub fn release(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        match std::mem::replace(slot, PoolSlot::Free) {
            PoolSlot::Occupied(value) => {
                self.free.push(index);
                Some(value)
            }
            PoolSlot::Taken => {
                self.free.push(index);
                None
            }
            PoolSlot::Free => None,
        }
    }

    /// Move the value out for the duration of an update, leaving the slot
    /// reserved. Must be paired with [`put_back`](Self::put_back).
    pub fn take(&mut self, index: u32) -> Option<T> {
        let slot = self.slots.get_mut(index as usize)?;
        match std::mem::replace(slot, PoolSlot::Taken) {
            PoolSlot::Occupied(value) => Some(value),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Undo a [`take`](Self::take). If the entity was despawned while taken,
    /// the value is dropped.
    pub fn put_back(&mut self, index: u32, value: T) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            if matches!(slot, PoolSlot::Taken) {
                *slot = PoolSlot::Occupied(value);
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        match self.slots.get(index as usize) {
            Some(PoolSlot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        match self.slots.get_mut(index as usize) {
            Some(PoolSlot::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            PoolSlot::Occupied(value) => Some((i as u32, value)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                PoolSlot::Occupied(value) => Some((i as u32, value)),
                _ => None,
            })
    }

    /// Live entry count, including taken slots.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}
