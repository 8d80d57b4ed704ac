use derivative::Derivative;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sentinel unique id. A slot stamped with it is free, a handle carrying it is invalid.
pub const INVALID_ID: u64 = u64::MAX;
/// Sentinel slot index carried by [`Handle::invalid`].
pub const INVALID_INDEX: u32 = u32::MAX;

/// Generation-stamped reference into a slot arena.
///
/// A handle owns nothing. It is only meaningful while the slot it names is still stamped with the
/// same `unique_id`; once the slot is released or re-claimed the handle is stale forever.
#[derive(Derivative)]
#[derivative(
    Debug(bound = ""),
    PartialEq(bound = ""),
    Eq(bound = ""),
    Hash(bound = "")
)]
pub struct Handle<T> {
    index: u32,
    unique_id: u64,
    #[derivative(Debug = "ignore", PartialEq = "ignore", Hash = "ignore")]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

impl<T> Handle<T> {
    pub(crate) fn new(index: u32, unique_id: u64) -> Self {
        Self {
            index,
            unique_id,
            _marker: PhantomData,
        }
    }

    /// A handle that fails every staleness check
    pub const fn invalid() -> Self {
        Self {
            index: INVALID_INDEX,
            unique_id: INVALID_ID,
            _marker: PhantomData,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn is_invalid(&self) -> bool {
        self.unique_id == INVALID_ID
    }

    /// Pure comparison against the slot's current stamp. Invalid handles are always stale, even
    /// against a free slot.
    pub fn is_stale(&self, current_unique_id: u64) -> bool {
        self.is_invalid() || self.unique_id != current_unique_id
    }

    pub fn invalidate(&mut self) {
        *self = Self::invalid();
    }

    pub fn invalidated(self) -> Self {
        Self::invalid()
    }

    /// Reinterpret the handle for a different payload type
    pub fn cast<A>(self) -> Handle<A> {
        Handle::new(self.index, self.unique_id)
    }
}

/// Hands out unique ids from a monotonically advancing counter.
///
/// Safe to share between threads; the counter never yields [`INVALID_ID`].
#[derive(Debug)]
pub struct HandleAllocator {
    next_id: AtomicU64,
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_unique_id(&self) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != INVALID_ID {
                return id;
            }
        }
    }

    pub fn allocate<T>(&self, index: u32) -> Handle<T> {
        Handle::new(index, self.next_unique_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_unique() {
        let allocator = HandleAllocator::new();
        let a: Handle<u32> = allocator.allocate(0);
        let b: Handle<u32> = allocator.allocate(0);
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!a.is_invalid());
    }

    #[test]
    fn test_is_stale() {
        let allocator = HandleAllocator::new();
        let handle: Handle<u32> = allocator.allocate(3);
        assert!(!handle.is_stale(handle.unique_id()));
        assert!(handle.is_stale(handle.unique_id() + 1));
        assert!(handle.is_stale(INVALID_ID));
    }

    #[test]
    fn test_invalidate() {
        let allocator = HandleAllocator::new();
        let mut handle: Handle<u32> = allocator.allocate(1);
        let id = handle.unique_id();
        handle.invalidate();
        assert!(handle.is_invalid());
        assert!(handle.is_stale(id));
        // an invalid handle stays stale even when compared against a free slot
        assert!(handle.is_stale(INVALID_ID));
        assert_eq!(Handle::<u32>::default(), Handle::invalid());
    }

    #[test]
    fn test_shared_between_threads() {
        let allocator = std::sync::Arc::new(HandleAllocator::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let allocator = allocator.clone();
                std::thread::spawn(move || {
                    (0..256)
                        .map(|i| allocator.allocate::<()>(i).unique_id())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<u64> = workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4 * 256);
    }
}
