//! `Unique<T>`: a move-only owning handle with a pluggable backing
//! allocator (`spec.md` §4.5).
//!
//! Fills the role `std::boxed::Box` fills for the global allocator, but
//! against any `&dyn Allocator`, and generalized over `?Sized` so the same
//! type also represents a dynamically-sized array (`Unique<[T]>`), the way
//! `Box<[T]>` does.

use crate::allocator::Allocator;
use crate::error::OomError;
use crate::lifetime;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Sole owner of a `T` allocated from some `&dyn Allocator`. Move-only:
/// there is no `Clone`. Dropping runs `T`'s destructor and returns the
/// storage to the allocator that produced it (`spec.md` §4.5).
pub struct Unique<'a, T: ?Sized> {
    value: NonNull<T>,
    allocator: &'a dyn Allocator,
}

impl<'a, T> Unique<'a, T> {
    /// Allocates room for one `T` from `allocator` and moves `value` into
    /// it. Returns [`OomError`] on failure; `value` is dropped rather than
    /// leaked on that path.
    pub fn new(allocator: &'a dyn Allocator, value: T) -> Result<Self, OomError> {
        let ptr = lifetime::make(allocator, value)?;
        Ok(Self { value: ptr, allocator })
    }

    /// Releases the previous value (dropping it) and replaces it with a
    /// freshly allocated one (`spec.md` §4.5 "assign").
    pub fn assign(&mut self, value: T) -> Result<(), OomError> {
        let replacement = Self::new(self.allocator, value)?;
        *self = replacement;
        Ok(())
    }
}

impl<'a, T> Unique<'a, [T]>
where
    T: Default,
{
    /// Allocates room for `len` `T`s from `allocator`, each default-valued
    /// (`spec.md` §4.5's array flavor).
    pub fn new_array(allocator: &'a dyn Allocator, len: usize) -> Result<Self, OomError> {
        let slice = lifetime::make_array::<T>(allocator, len)?;
        Ok(Self { value: slice, allocator })
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.len() == 0
    }
}

impl<T: ?Sized> Unique<'_, T> {
    /// Raw access to the owned value, bypassing `Deref`.
    pub fn get(&self) -> &T {
        unsafe { self.value.as_ref() }
    }

    /// Raw mutable access to the owned value.
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { self.value.as_mut() }
    }
}

impl<'a, T: ?Sized> Unique<'a, T> {
    /// Yields the raw payload and the allocator it was drawn from, consuming
    /// the handle in the process (`spec.md` §4.5 "release" — "yields the raw
    /// payload and resets the handle to empty; the allocator is unchanged").
    /// `Unique` has no empty representation to reset into, so the handle
    /// itself is consumed instead, the same way `Box::into_raw`/
    /// `Vec::into_raw_parts` hand back ownership in the standard library:
    /// once released, there is no handle left to observe as "empty". The
    /// destructor that would otherwise dispose the payload is skipped; the
    /// caller takes over responsibility for it.
    pub fn release(self) -> (NonNull<T>, &'a dyn Allocator) {
        let this = ManuallyDrop::new(self);
        (this.value, this.allocator)
    }
}

impl<T: ?Sized> Deref for Unique<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T: ?Sized> DerefMut for Unique<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
    }
}

impl<T: ?Sized> Drop for Unique<'_, T> {
    fn drop(&mut self) {
        unsafe { lifetime::dispose(self.value, self.allocator) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::System;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn new_and_deref_roundtrip() {
        let sys = System;
        let handle = Unique::new(&sys, 99u32).unwrap();
        assert_eq!(*handle, 99);
    }

    #[test]
    fn deref_mut_writes_through() {
        let sys = System;
        let mut handle = Unique::new(&sys, String::from("a")).unwrap();
        handle.push('b');
        assert_eq!(*handle, "ab");
    }

    #[test]
    fn assign_drops_previous_value() {
        let sys = System;
        let drops = Rc::new(Cell::new(0));

        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut handle = Unique::new(&sys, Counted(drops.clone())).unwrap();
        handle.assign(Counted(drops.clone())).unwrap();
        assert_eq!(drops.get(), 1);

        drop(handle);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn new_array_defaults_every_slot_and_reports_len() {
        let sys = System;
        let handle = Unique::<u32>::new_array(&sys, 5).unwrap();
        assert_eq!(handle.len(), 5);
        assert!(!handle.is_empty());
        assert!(handle.iter().all(|&x| x == 0));
    }

    #[test]
    fn empty_array_is_empty() {
        let sys = System;
        let handle = Unique::<u8>::new_array(&sys, 0).unwrap();
        assert_eq!(handle.len(), 0);
        assert!(handle.is_empty());
    }

    #[test]
    fn drop_runs_destructor_exactly_once() {
        let sys = System;
        let drops = Rc::new(Cell::new(0));

        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let handle = Unique::new(&sys, Counted(drops.clone())).unwrap();
        drop(handle);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn release_skips_the_destructor_and_hands_back_the_payload() {
        let sys = System;
        let drops = Rc::new(Cell::new(0));

        struct Counted(Rc<Cell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let handle = Unique::new(&sys, Counted(drops.clone())).unwrap();
        let (ptr, allocator) = handle.release();
        assert_eq!(drops.get(), 0);

        unsafe {
            assert_eq!(ptr.as_ref().0.get(), 0);
            crate::lifetime::dispose(ptr, allocator);
        }
        assert_eq!(drops.get(), 1);
    }
}
