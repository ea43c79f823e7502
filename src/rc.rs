//! `RefCounted<T>`: a shared owning handle with a pluggable backing
//! allocator (`spec.md` §4.4).
//!
//! Modeled on `std::rc::Rc`'s documented internal layout (one allocation
//! holding the strong count alongside the value), generalized two ways:
//! the allocator is a runtime `&dyn Allocator` rather than the global
//! allocator, and a second "separate store" layout exists for values that
//! were already allocated elsewhere and merely need a count attached
//! (`spec.md` §4.4's two backing-store flavors).
//!
//! The handle also has an empty/detached state — `spec.md` §4.4 requires
//! `count()` to answer `0` "if uninitialized", a state reached via
//! "assignment from null" (§4.4) — mirrored here as [`RefCounted::detach`].
//! The allocator that produced a handle is retained across detachment (it's
//! a property of the handle, not of the store) the same way `Unique`
//! retains it across [`crate::unique::Unique::release`]; only the store
//! (`control`/`value`/`deleter`) has a null representation, matching
//! `spec.md` §4.4's invariant "if store is non-null then the allocator and
//! deleter are non-null" (the allocator half of that invariant is trivially
//! true in Rust, since `&dyn Allocator` has no null representation).

use crate::allocator::Allocator;
use crate::error::OomError;
use std::cell::Cell;
use std::mem;
use std::ptr::NonNull;

// `repr(C)` pins `count` at offset 0 in both layouts, which is what lets
// `Inner::count_cell` read it back through a bare `Cell<usize>` cast without
// knowing which of the two shapes `control` actually points to.
#[repr(C)]
struct Combined<T> {
    count: Cell<usize>,
    value: T,
}

#[repr(C)]
struct Separate {
    count: Cell<usize>,
}

type Deleter<T> = unsafe fn(control: NonNull<u8>, value: NonNull<T>, allocator: &dyn Allocator);

/// The live store backing a non-detached handle: a control block (combined
/// or separate, distinguished only by `deleter`) plus the value pointer.
/// Every field here is a bare pointer or function pointer, so `Inner<T>` is
/// `Copy` regardless of `T` — cloning a handle is copying this and bumping
/// the count, never touching `T` itself.
struct Inner<T> {
    control: NonNull<u8>,
    value: NonNull<T>,
    deleter: Deleter<T>,
}

impl<T> Clone for Inner<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Inner<T> {}

impl<T> Inner<T> {
    fn count_cell(&self) -> &Cell<usize> {
        unsafe { &*self.control.cast::<Cell<usize>>().as_ptr() }
    }
}

/// Decrements `inner`'s count; runs its deleter if that was the last
/// reference. Shared by [`RefCounted::detach`], [`Drop`] and the
/// shared-store branch of [`RefCounted::assign`].
fn release<T>(inner: Inner<T>, allocator: &dyn Allocator) {
    let remaining = inner.count_cell().get() - 1;
    if remaining == 0 {
        unsafe { (inner.deleter)(inner.control, inner.value, allocator) };
    } else {
        inner.count_cell().set(remaining);
    }
}

/// A reference-counted, shared owning handle to a `T` (`spec.md` §4.4).
/// Cloning bumps the count; dropping the last clone runs `T`'s destructor
/// and returns the backing memory to the allocator that produced it.
///
/// Not `Send`/`Sync`: the count is a plain [`Cell`], matching `spec.md`
/// §5's single-threaded contract — the same one documented on
/// `std::rc::Rc`.
pub struct RefCounted<'a, T> {
    inner: Option<Inner<T>>,
    allocator: &'a dyn Allocator,
}

unsafe fn delete_combined<T>(control: NonNull<u8>, _value: NonNull<T>, allocator: &dyn Allocator) {
    unsafe {
        let combined = control.cast::<Combined<T>>();
        std::ptr::drop_in_place(&raw mut (*combined.as_ptr()).value);
        let size = mem::size_of::<Combined<T>>();
        let bytes = NonNull::slice_from_raw_parts(control, size);
        allocator.deallocate(bytes);
    }
}

unsafe fn delete_separate<T>(control: NonNull<u8>, value: NonNull<T>, allocator: &dyn Allocator) {
    unsafe {
        std::ptr::drop_in_place(value.as_ptr());
        let value_size = mem::size_of::<T>();
        if value_size > 0 {
            allocator.deallocate(NonNull::slice_from_raw_parts(value.cast::<u8>(), value_size));
        }

        let control_size = mem::size_of::<Separate>();
        allocator.deallocate(NonNull::slice_from_raw_parts(control, control_size));
    }
}

/// Allocates a combined control block holding both the count and `value`
/// in one allocation (`spec.md` §4.4's default, single-allocation flavor).
/// Returns [`OomError`] if `allocator` can't satisfy the request; `value`
/// is dropped rather than leaked on that path.
pub fn ref_counted<T>(allocator: &dyn Allocator, value: T) -> Result<RefCounted<'_, T>, OomError> {
    let Some(bytes) = allocator.allocate(mem::size_of::<Combined<T>>()) else {
        drop(value);
        return Err(OomError);
    };

    let control = bytes.cast::<u8>();
    let combined = control.cast::<Combined<T>>();

    unsafe {
        combined.as_ptr().write(Combined { count: Cell::new(1), value });
        let value = NonNull::from(&mut (*combined.as_ptr()).value);

        Ok(RefCounted {
            inner: Some(Inner { control, value, deleter: delete_combined::<T> }),
            allocator,
        })
    }
}

impl<'a, T> RefCounted<'a, T> {
    /// Attaches a strong count to a value already owned elsewhere
    /// (`spec.md` §4.4's separate-store flavor): two allocations, but lets
    /// the value live at an address the control block doesn't dictate.
    ///
    /// # Safety
    ///
    /// `value` must have been allocated from `allocator` with exactly
    /// `size_of::<T>()` bytes (zero bytes if `T` is a ZST) and must not be
    /// freed or read through any other handle afterwards.
    pub unsafe fn from_raw(
        allocator: &'a dyn Allocator,
        value: NonNull<T>,
    ) -> Result<Self, OomError> {
        let Some(bytes) = allocator.allocate(mem::size_of::<Separate>()) else {
            return Err(OomError);
        };

        let control = bytes.cast::<u8>();
        unsafe { control.cast::<Separate>().as_ptr().write(Separate { count: Cell::new(1) }) };

        Ok(RefCounted {
            inner: Some(Inner { control, value, deleter: delete_separate::<T> }),
            allocator,
        })
    }

    /// Current strong count, or `0` if `self` is detached/uninitialized
    /// (`spec.md` §4.4: "returns the current counter or 0 if uninitialized").
    pub fn count(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.count_cell().get())
    }

    /// Direct access to the shared value.
    ///
    /// # Panics
    ///
    /// Panics if `self` is detached (`count() == 0`) — `spec.md` §4.4's
    /// precondition "counter > 0".
    pub fn get(&self) -> &T {
        let inner = self.inner.as_ref().expect("RefCounted::get on a detached handle");
        unsafe { inner.value.as_ref() }
    }

    /// "Assignment from a new payload" (`spec.md` §4.4): if this handle is
    /// currently shared (`count() > 1`), detaches from the shared store
    /// (decrementing its count, never freeing it, since a count above one
    /// can't reach zero from a single decrement) and allocates a fresh
    /// combined store for `value`. Otherwise — sole ownership, or already
    /// detached — the existing payload (if any) is destroyed in place and
    /// `value` takes its spot without a fresh allocation.
    pub fn assign(&mut self, value: T) -> Result<(), OomError> {
        match self.inner.take() {
            Some(inner) if inner.count_cell().get() > 1 => {
                release(inner, self.allocator);
                *self = ref_counted(self.allocator, value)?;
                Ok(())
            }
            Some(inner) => {
                unsafe {
                    std::ptr::drop_in_place(inner.value.as_ptr());
                    inner.value.as_ptr().write(value);
                }
                self.inner = Some(inner);
                Ok(())
            }
            None => {
                *self = ref_counted(self.allocator, value)?;
                Ok(())
            }
        }
    }

    /// "Assignment from null" (`spec.md` §4.4): detaches from the current
    /// store, decrementing its count and running the deleter if this was
    /// the last handle referencing it. Leaves `self` uninitialized —
    /// `count()` reads `0` afterward — without otherwise disturbing the
    /// allocator `self` was built from.
    pub fn detach(&mut self) {
        if let Some(inner) = self.inner.take() {
            release(inner, self.allocator);
        }
    }
}

impl<T> Clone for RefCounted<'_, T> {
    fn clone(&self) -> Self {
        if let Some(inner) = &self.inner {
            let count = inner.count_cell();
            count.set(count.get() + 1);
        }
        RefCounted { inner: self.inner, allocator: self.allocator }
    }
}

impl<T> Drop for RefCounted<'_, T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            release(inner, self.allocator);
        }
    }
}

impl<T> std::ops::Deref for RefCounted<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::System;
    use std::cell::Cell as StdCell;
    use std::rc::Rc as StdRc;

    #[test]
    fn single_handle_disposes_on_drop() {
        // spec.md §8 scenario 6.
        let sys = System;
        let drops = StdRc::new(StdCell::new(0));

        struct Counted(StdRc<StdCell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        {
            let handle = ref_counted(&sys, Counted(drops.clone())).unwrap();
            assert_eq!(handle.count(), 1);
        }

        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn clone_bumps_count_and_shares_storage() {
        let sys = System;
        let a = ref_counted(&sys, 10u32).unwrap();
        let b = a.clone();

        assert_eq!(a.count(), 2);
        assert_eq!(b.count(), 2);
        assert_eq!(*a.get(), *b.get());

        drop(a);
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn assign_reuses_store_when_sole_owner() {
        let sys = System;
        let mut a = ref_counted(&sys, 1u32).unwrap();
        let control_before = a.inner.unwrap().control;

        a.assign(2u32).unwrap();

        assert_eq!(*a.get(), 2);
        assert_eq!(a.count(), 1);
        assert_eq!(a.inner.unwrap().control, control_before);
    }

    #[test]
    fn assign_allocates_fresh_store_when_shared() {
        let sys = System;
        let mut a = ref_counted(&sys, 1u32).unwrap();
        let b = a.clone();
        let shared_control = a.inner.unwrap().control;

        a.assign(99u32).unwrap();

        assert_eq!(*a.get(), 99);
        assert_eq!(a.count(), 1);
        assert_ne!(a.inner.unwrap().control, shared_control);

        // `b` still observes the original value and a now-solitary count.
        assert_eq!(*b.get(), 1);
        assert_eq!(b.count(), 1);
    }

    #[test]
    fn assign_on_detached_handle_allocates_a_store() {
        let sys = System;
        let mut a = ref_counted(&sys, 1u32).unwrap();
        a.detach();
        assert_eq!(a.count(), 0);

        a.assign(7u32).unwrap();
        assert_eq!(a.count(), 1);
        assert_eq!(*a.get(), 7);
    }

    #[test]
    fn detach_frees_last_reference_and_zeroes_count() {
        let sys = System;
        let drops = StdRc::new(StdCell::new(0));

        struct Counted(StdRc<StdCell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let mut a = ref_counted(&sys, Counted(drops.clone())).unwrap();
        a.detach();

        assert_eq!(a.count(), 0);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn detach_shared_handle_only_decrements() {
        let sys = System;
        let mut a = ref_counted(&sys, 1u32).unwrap();
        let b = a.clone();

        a.detach();

        assert_eq!(a.count(), 0);
        assert_eq!(b.count(), 1);
        assert_eq!(*b.get(), 1);
    }

    #[test]
    #[should_panic(expected = "detached")]
    fn get_on_detached_handle_panics() {
        let sys = System;
        let mut a = ref_counted(&sys, 1u32).unwrap();
        a.detach();
        a.get();
    }

    #[test]
    fn last_drop_runs_destructor_exactly_once() {
        let sys = System;
        let drops = StdRc::new(StdCell::new(0));

        struct Counted(StdRc<StdCell<u32>>);
        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let a = ref_counted(&sys, Counted(drops.clone())).unwrap();
        let b = a.clone();
        let c = b.clone();

        drop(a);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 0);
        drop(c);
        assert_eq!(drops.get(), 1);
    }
}
