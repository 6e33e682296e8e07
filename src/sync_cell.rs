//! `UnsafeCell` but `Sync`, used by [`crate::storage::FixedStorage`] to hold slot
//! payloads that are mutated through a shared reference under the storage's own
//! atomic claim/release protocol rather than Rust's aliasing rules.

use std::cell::UnsafeCell;

#[repr(transparent)]
pub struct SyncUnsafeCell<T: ?Sized> {
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    #[inline]
    pub const fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
        }
    }

    #[inline]
    pub const fn get(&self) -> *mut T {
        self.value.get()
    }
}
