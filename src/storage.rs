//! L1: `FixedStorage<T, N>`, a fixed-capacity pool whose slots are claimed
//! lock-free via compare-and-swap on an in-use flag and validated against a
//! per-slot generation counter that only ever increases.

use crate::handle::Handle;
use crate::sync_cell::SyncUnsafeCell;
use std::convert::Infallible;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

struct Slot<T> {
    in_use: AtomicBool,
    generation: AtomicU8,
    value: SyncUnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            in_use: AtomicBool::new(false),
            generation: AtomicU8::new(0),
            value: SyncUnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

pub struct FixedStorage<T, const N: usize> {
    slots: [Slot<T>; N],
    next_hint: AtomicUsize,
    used: AtomicUsize,
}

impl<T, const N: usize> FixedStorage<T, N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::new()),
            next_hint: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
        }
    }

    /// Claim a free slot and construct `T` in place via `ctor`. Returns an
    /// invalid handle (not an error) when the storage is full. `ctor` failing
    /// rolls back the claim: generation is decremented and in-use is cleared
    /// so the slot can be claimed again with no trace of the failed attempt.
    pub fn try_allocate_with<E>(
        &self,
        ctor: impl FnOnce() -> Result<T, E>,
    ) -> Result<Handle<T>, E> {
        let start = self.next_hint.load(Ordering::Relaxed) % N.max(1);
        for offset in 0..N {
            let index = (start + offset) % N;
            let slot = &self.slots[index];
            if slot
                .in_use
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let generation = slot.generation.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
                return match ctor() {
                    Ok(value) => {
                        unsafe {
                            (*slot.value.get()).write(value);
                        }
                        self.used.fetch_add(1, Ordering::AcqRel);
                        self.next_hint.store((index + 1) % N, Ordering::Relaxed);
                        Ok(Handle::new(index as u32, generation))
                    }
                    Err(err) => {
                        slot.generation.fetch_sub(1, Ordering::AcqRel);
                        slot.in_use.store(false, Ordering::Release);
                        Err(err)
                    }
                };
            }
        }
        Ok(Handle::invalid())
    }

    pub fn allocate(&self, value: T) -> Handle<T> {
        match self.try_allocate_with(|| Ok::<T, Infallible>(value)) {
            Ok(handle) => handle,
            Err(never) => match never {},
        }
    }

    /// Validate the handle and, if live, drop the slot's value and clear in-use.
    /// Generation is left untouched; it is bumped lazily on the slot's next
    /// allocation, which is what gives stale handles their ABA protection.
    pub fn release(&self, handle: Handle<T>) -> bool {
        let index = handle.index();
        if index as usize >= N {
            return false;
        }
        let slot = &self.slots[index as usize];
        if slot.generation.load(Ordering::Acquire) != handle.generation() {
            return false;
        }
        if slot
            .in_use
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }
        unsafe {
            (*slot.value.get()).assume_init_drop();
        }
        self.used.fetch_sub(1, Ordering::AcqRel);
        true
    }

    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if !self.is_valid(handle) {
            return None;
        }
        let slot = &self.slots[handle.index() as usize];
        Some(unsafe { (*slot.value.get()).assume_init_ref() })
    }

    /// # Safety
    /// The storage arbitrates slot *metadata* (claim/release/generation) but not
    /// access to the slot's contents. The caller must guarantee no other thread
    /// holds a reference to this slot's value at the same time — in practice
    /// this means the value type manages its own interior mutability (as `Job`
    /// and `SyncPoint` do) rather than relying on this method for concurrent
    /// mutation.
    pub unsafe fn get_mut(&self, handle: Handle<T>) -> Option<&mut T> {
        if !self.is_valid(handle) {
            return None;
        }
        let slot = &self.slots[handle.index() as usize];
        Some((*slot.value.get()).assume_init_mut())
    }

    pub fn is_valid(&self, handle: Handle<T>) -> bool {
        let index = handle.index();
        if index as usize >= N {
            return false;
        }
        let slot = &self.slots[index as usize];
        slot.in_use.load(Ordering::Acquire) && slot.generation.load(Ordering::Acquire) == handle.generation()
    }

    pub fn is_used(&self, index: u32) -> bool {
        self.slots[index as usize].in_use.load(Ordering::Acquire)
    }

    pub fn generation(&self, index: u32) -> u8 {
        self.slots[index as usize].generation.load(Ordering::Acquire)
    }

    pub fn handle_for_slot(&self, index: u32) -> Handle<T> {
        Handle::new(index, self.generation(index))
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn available(&self) -> usize {
        N - self.used()
    }

    pub fn is_full(&self) -> bool {
        self.used() >= N
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    pub fn usage_fraction(&self) -> f64 {
        self.used() as f64 / N as f64
    }

    /// Indices currently in use, for callers that need to scan live slots (aging,
    /// eviction). Not cheap; not meant to be called on a hot path.
    pub fn used_indices(&self) -> Vec<u32> {
        (0..N as u32)
            .filter(|&index| self.slots[index as usize].in_use.load(Ordering::Acquire))
            .collect()
    }
}

impl<T, const N: usize> Default for FixedStorage<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for FixedStorage<T, N> {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            if *slot.in_use.get_mut() {
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
            }
        }
    }
}

unsafe impl<T: Send, const N: usize> Sync for FixedStorage<T, N> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn allocate_release_allocate_bumps_generation_and_invalidates_old_handle() {
        let storage: FixedStorage<u32, 4> = FixedStorage::new();
        let first = storage.allocate(10);
        assert!(storage.is_valid(first));

        assert!(storage.release(first));
        assert!(!storage.is_valid(first));

        let second = storage.allocate(20);
        assert_ne!(first, second);
        assert!(storage.is_valid(second));
        assert!(!storage.is_valid(first), "stale handle must stay invalid (ABA prevention)");
    }

    #[test]
    fn live_count_never_exceeds_capacity() {
        let storage: FixedStorage<u32, 3> = FixedStorage::new();
        let a = storage.allocate(1);
        let b = storage.allocate(2);
        let c = storage.allocate(3);
        assert!(a.is_valid() && b.is_valid() && c.is_valid());

        let d = storage.allocate(4);
        assert!(!d.is_valid(), "storage is full, allocate must return an invalid handle");
        assert_eq!(storage.used(), 3);
    }

    #[test]
    fn release_on_invalid_handle_is_a_no_op() {
        let storage: FixedStorage<u32, 4> = FixedStorage::new();
        assert!(!storage.release(Handle::invalid()));
        assert!(!storage.release(Handle::new(0, 5)));
    }

    #[test]
    fn construction_failure_rolls_back_the_claim() {
        let storage: FixedStorage<u32, 2> = FixedStorage::new();
        let result: Result<Handle<u32>, &'static str> =
            storage.try_allocate_with(|| Err("boom"));
        assert!(result.is_err());
        assert_eq!(storage.used(), 0);

        let handle = storage.allocate(99);
        assert!(handle.is_valid());
    }

    #[test]
    fn concurrent_allocations_never_share_index_and_generation() {
        let storage = Arc::new(FixedStorage::<u32, 256>::new());
        let total_live = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = storage.clone();
                let total_live = total_live.clone();
                thread::spawn(move || {
                    let mut local = vec![];
                    for i in 0..16u32 {
                        let h = storage.allocate(i);
                        if h.is_valid() {
                            total_live.fetch_add(1, Ordering::SeqCst);
                            local.push(h);
                        }
                    }
                    local
                })
            })
            .collect();

        let mut all_handles = vec![];
        for h in handles {
            all_handles.extend(h.join().unwrap());
        }

        assert_eq!(total_live.load(Ordering::SeqCst) as usize, all_handles.len());
        assert_eq!(storage.used(), all_handles.len());

        for (i, a) in all_handles.iter().enumerate() {
            for b in all_handles.iter().skip(i + 1) {
                assert_ne!(a, b, "no two live handles may share (index, generation)");
            }
        }
    }
}
