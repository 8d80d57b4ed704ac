use crate::error::ContainerErrors;
use crate::handle::{Handle, HandleAllocator, INVALID_ID};

#[derive(Debug)]
struct ArenaSlot<T> {
    unique_id: u64,
    value: T,
}

impl<T: Default> Default for ArenaSlot<T> {
    fn default() -> Self {
        Self {
            unique_id: INVALID_ID,
            value: T::default(),
        }
    }
}

/// Index-addressed store whose slots are never moved or removed.
///
/// Freed slots are reset to `T::default()` and stamped with [`INVALID_ID`], which invalidates every
/// handle into them at once. Acquisition reuses the first free slot from the start of the store
/// before growing it.
#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<ArenaSlot<T>>,
    allocator: HandleAllocator,
    capacity: Option<usize>,
    live: usize,
}

impl<T: Default> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> SlotArena<T> {
    /// Unbounded arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            allocator: HandleAllocator::new(),
            capacity: None,
            live: 0,
        }
    }

    /// Arena which refuses to grow past `capacity` slots
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            allocator: HandleAllocator::new(),
            capacity: Some(capacity),
            live: 0,
        }
    }

    /// Claims the first free slot, growing the store if none is free
    pub fn acquire_slot(&mut self) -> Result<Handle<T>, ContainerErrors> {
        let index = match self
            .slots
            .iter()
            .position(|slot| slot.unique_id == INVALID_ID)
        {
            Some(index) => index,
            None => {
                if let Some(capacity) = self.capacity {
                    if self.slots.len() >= capacity {
                        return Err(ContainerErrors::CapacityExceeded { capacity });
                    }
                }
                self.slots.push(ArenaSlot::default());
                self.slots.len() - 1
            }
        };
        let handle = self.allocator.allocate(index as u32);
        self.slots[index].unique_id = handle.unique_id();
        self.live += 1;
        Ok(handle)
    }

    pub fn insert(&mut self, value: T) -> Result<Handle<T>, ContainerErrors> {
        let handle = self.acquire_slot()?;
        self.slots[handle.index() as usize].value = value;
        Ok(handle)
    }

    /// Runs `teardown` on the live payload, then resets the slot and stamps it free
    pub fn release_slot_with<R, F: FnOnce(&mut T) -> R>(
        &mut self,
        index: u32,
        teardown: F,
    ) -> Result<R, ContainerErrors> {
        let slot = self
            .slots
            .get_mut(index as usize)
            .filter(|slot| slot.unique_id != INVALID_ID)
            .ok_or(ContainerErrors::NonexistentSlot)?;
        let out = teardown(&mut slot.value);
        *slot = ArenaSlot::default();
        self.live -= 1;
        Ok(out)
    }

    pub fn release_slot(&mut self, index: u32) -> Result<(), ContainerErrors> {
        self.release_slot_with(index, |_| ())
    }

    /// Validates `handle` before releasing its slot through [`Self::release_slot_with`]
    pub fn remove_with<R, F: FnOnce(&mut T) -> R>(
        &mut self,
        handle: Handle<T>,
        teardown: F,
    ) -> Result<R, ContainerErrors> {
        self.validate(&handle)?;
        self.release_slot_with(handle.index(), teardown)
    }

    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, ContainerErrors> {
        self.remove_with(handle, std::mem::take)
    }

    /// Releases every live slot, running `teardown` on each first
    pub fn clear_with<F: FnMut(Handle<T>, &mut T)>(&mut self, mut teardown: F) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.unique_id == INVALID_ID {
                continue;
            }
            teardown(Handle::new(index as u32, slot.unique_id), &mut slot.value);
            *slot = ArenaSlot::default();
        }
        self.live = 0;
    }
}

impl<T> SlotArena<T> {
    fn validate(&self, handle: &Handle<T>) -> Result<(), ContainerErrors> {
        let slot = self
            .slots
            .get(handle.index() as usize)
            .ok_or(ContainerErrors::NonexistentSlot)?;
        if handle.is_stale(slot.unique_id) {
            return Err(ContainerErrors::StaleHandle);
        }
        Ok(())
    }

    /// Current stamp of the slot at `index`, [`INVALID_ID`] if free or out of range
    pub fn current_unique_id(&self, index: u32) -> u64 {
        self.slots
            .get(index as usize)
            .map_or(INVALID_ID, |slot| slot.unique_id)
    }

    pub fn is_stale(&self, handle: &Handle<T>) -> bool {
        handle.is_stale(self.current_unique_id(handle.index()))
    }

    /// Handle for the live occupant of `index`
    pub fn handle_at(&self, index: u32) -> Option<Handle<T>> {
        match self.current_unique_id(index) {
            INVALID_ID => None,
            unique_id => Some(Handle::new(index, unique_id)),
        }
    }

    pub fn get(&self, handle: &Handle<T>) -> Option<&T> {
        self.validate(handle).ok()?;
        Some(&self.slots[handle.index() as usize].value)
    }

    pub fn get_mut(&mut self, handle: &Handle<T>) -> Option<&mut T> {
        self.validate(handle).ok()?;
        Some(&mut self.slots[handle.index() as usize].value)
    }

    /// Live payload at `index` without a handle, used by owners that index by slot
    pub fn get_index(&self, index: u32) -> Option<&T> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.unique_id != INVALID_ID)
            .map(|slot| &slot.value)
    }

    pub fn get_index_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.unique_id != INVALID_ID)
            .map(|slot| &mut slot.value)
    }

    pub fn with_slot<R, F: FnOnce(&T) -> R>(
        &self,
        handle: &Handle<T>,
        func: F,
    ) -> Result<R, ContainerErrors> {
        self.validate(handle)?;
        Ok(func(&self.slots[handle.index() as usize].value))
    }

    pub fn with_slot_mut<R, F: FnOnce(&mut T) -> R>(
        &mut self,
        handle: &Handle<T>,
        func: F,
    ) -> Result<R, ContainerErrors> {
        self.validate(handle)?;
        Ok(func(&mut self.slots[handle.index() as usize].value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.unique_id != INVALID_ID)
            .map(|(index, slot)| (Handle::new(index as u32, slot.unique_id), &slot.value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, slot)| slot.unique_id != INVALID_ID)
            .map(|(index, slot)| (Handle::new(index as u32, slot.unique_id), &mut slot.value))
    }

    pub fn handles(&self) -> Vec<Handle<T>> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of slots in the backing store, live or free
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = SlotArena::new();
        let handle = arena.insert(42).unwrap();
        assert_eq!(arena.get(&handle), Some(&42));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut arena = SlotArena::new();
        let handle = arena.insert(42).unwrap();
        assert_eq!(arena.remove(handle).unwrap(), 42);
        assert_eq!(arena.get(&handle), None);
        assert!(arena.is_stale(&handle));
        assert!(arena.is_empty());
        // the slot itself is kept for reuse
        assert_eq!(arena.slot_count(), 1);
    }

    #[test]
    fn test_reuse_first_free_slot() {
        let mut arena = SlotArena::new();
        let a = arena.insert(1).unwrap();
        let b = arena.insert(2).unwrap();
        let c = arena.insert(3).unwrap();
        arena.remove(c).unwrap();
        arena.remove(a).unwrap();
        let d = arena.insert(4).unwrap();
        assert_eq!(d.index(), a.index());
        assert_ne!(d, a);
        assert!(arena.is_stale(&a));
        assert_eq!(arena.get(&b), Some(&2));
        assert_eq!(arena.get(&d), Some(&4));
        let e = arena.insert(5).unwrap();
        assert_eq!(e.index(), c.index());
        assert_eq!(arena.slot_count(), 3);
    }

    #[test]
    fn test_stale_after_reuse() {
        let mut arena = SlotArena::new();
        let old = arena.insert(String::from("old")).unwrap();
        arena.remove(old).unwrap();
        let new = arena.insert(String::from("new")).unwrap();
        assert_eq!(old.index(), new.index());
        assert!(arena.is_stale(&old));
        assert!(!arena.is_stale(&new));
        match arena.with_slot(&old, |value| value.clone()) {
            Err(ContainerErrors::StaleHandle) => {}
            _ => panic!("Expected StaleHandle error"),
        }
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut arena = SlotArena::with_capacity(2);
        let a = arena.insert(1u32).unwrap();
        arena.insert(2u32).unwrap();
        match arena.insert(3u32) {
            Err(ContainerErrors::CapacityExceeded { capacity: 2 }) => {}
            _ => panic!("Expected CapacityExceeded error"),
        }
        arena.remove(a).unwrap();
        let c = arena.insert(3u32).unwrap();
        assert_eq!(c.index(), a.index());
        assert_ne!(c.unique_id(), a.unique_id());
    }

    #[test]
    fn test_teardown_runs_before_reset() {
        let mut arena = SlotArena::new();
        let handle = arena.insert(vec![1, 2, 3]).unwrap();
        let seen = arena
            .remove_with(handle, |value| value.iter().sum::<i32>())
            .unwrap();
        assert_eq!(seen, 6);
        // payload was zeroed after teardown
        let reused = arena.acquire_slot().unwrap();
        assert_eq!(arena.get(&reused), Some(&Vec::new()));
    }

    #[test]
    fn test_nonexistent_slot() {
        let mut arena: SlotArena<i32> = SlotArena::new();
        match arena.release_slot(999) {
            Err(ContainerErrors::NonexistentSlot) => {}
            _ => panic!("Expected NonexistentSlot error"),
        }
        let handle = arena.insert(1).unwrap();
        arena.release_slot(handle.index()).unwrap();
        match arena.release_slot(handle.index()) {
            Err(ContainerErrors::NonexistentSlot) => {}
            _ => panic!("Expected NonexistentSlot error on double release"),
        }
    }

    #[test]
    fn test_with_slot_mut() {
        let mut arena = SlotArena::new();
        let handle = arena.insert(42).unwrap();
        arena.with_slot_mut(&handle, |value| *value = 100).unwrap();
        assert_eq!(arena.get(&handle), Some(&100));
        if let Some(value) = arena.get_mut(&handle) {
            *value += 1;
        }
        assert_eq!(arena.get_index(handle.index()), Some(&101));
    }

    #[test]
    fn test_iter_skips_free_slots() {
        let mut arena = SlotArena::new();
        let a = arena.insert(1).unwrap();
        arena.insert(2).unwrap();
        arena.insert(3).unwrap();
        arena.remove(a).unwrap();
        let collected: Vec<_> = arena.iter().map(|(_, value)| *value).collect();
        assert_eq!(collected, vec![2, 3]);
        for (_, value) in arena.iter_mut() {
            *value *= 10;
        }
        let collected: Vec<_> = arena.iter().map(|(_, value)| *value).collect();
        assert_eq!(collected, vec![20, 30]);
        assert_eq!(arena.handles().len(), 2);
    }

    #[test]
    fn test_clear_with() {
        let mut arena = SlotArena::new();
        let handles: Vec<_> = (0..4).map(|i| arena.insert(i).unwrap()).collect();
        let mut torn_down = Vec::new();
        arena.clear_with(|_, value| torn_down.push(*value));
        assert_eq!(torn_down, vec![0, 1, 2, 3]);
        assert!(arena.is_empty());
        assert!(handles.iter().all(|handle| arena.is_stale(handle)));
        assert_eq!(arena.handle_at(0), None);
    }
}
