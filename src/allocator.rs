//! The `Allocator` abstraction every other component in this crate
//! programs against (`spec.md` §4.1), plus the two implementations
//! shipped here and the process-wide default-allocator slot (`spec.md` §6).

use crate::pool::{self, MmapPool};
use std::alloc::{GlobalAlloc, Layout};
use std::ptr::NonNull;
use std::sync::OnceLock;

/// Polymorphic over {allocate, deallocate, reallocate, reallocate_in_place,
/// alignment}. [`MmapPool`] is the default implementation; [`System`] is
/// the trivial wrapper over the platform allocator `spec.md` §4.1 names as
/// the other variant in this repository.
///
/// Every method signals failure through its return value rather than a
/// panic or an escalated error (`spec.md` §7): `allocate` returns `None` on
/// OOM, the boolean-returning methods signal failure as `false`.
pub trait Allocator {
    /// Requests a fresh block of `size` bytes. Returns an empty span (not
    /// `None`) when `size == 0`; returns `None` on OOM. Contents are
    /// uninitialized. The returned address is aligned to at least
    /// [`Allocator::alignment`].
    fn allocate(&self, size: usize) -> Option<NonNull<[u8]>>;

    /// Releases `bytes`, previously returned by [`Allocator::allocate`] (or
    /// grown/shrunk by [`Allocator::reallocate`]) on this same allocator.
    /// Releasing an empty span is a successful no-op. Returns whether the
    /// allocator recognised and freed the block.
    fn deallocate(&self, bytes: NonNull<[u8]>) -> bool;

    /// Grows or shrinks `bytes` to `new_size`, possibly moving it.
    /// `new_size == 0` is equivalent to [`Allocator::deallocate`]. On
    /// failure the original allocation and its contents are preserved.
    fn reallocate(&self, bytes: &mut NonNull<[u8]>, new_size: usize) -> bool;

    /// Attempts to resize `bytes` to `new_size` without moving it. Returns
    /// `false` if impossible. Never used to allocate or to free: an empty
    /// span in, or `new_size == 0`, both return `false`.
    fn reallocate_in_place(&self, bytes: &mut NonNull<[u8]>, new_size: usize) -> bool;

    /// Minimum alignment this allocator guarantees for every allocation.
    fn alignment(&self) -> usize;
}

/// The "trivial wrapper over the libc allocator" `spec.md` §4.1 names as
/// the non-default `Allocator` implementation. Backed by
/// `std::alloc::{alloc, dealloc, realloc}` — the idiomatic way to reach
/// "the platform allocator" without re-deriving `malloc`'s own block
/// header format by calling into `libc::malloc` directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct System;

impl System {
    const ALIGNMENT: usize = 8;

    fn layout_for(len: usize) -> Option<Layout> {
        Layout::from_size_align(len, Self::ALIGNMENT).ok()
    }
}

impl Allocator for System {
    fn allocate(&self, size: usize) -> Option<NonNull<[u8]>> {
        if size == 0 {
            return Some(NonNull::slice_from_raw_parts(NonNull::dangling(), 0));
        }

        let layout = Self::layout_for(size)?;
        let raw = unsafe { std::alloc::alloc(layout) };
        let ptr = NonNull::new(raw)?;
        Some(NonNull::slice_from_raw_parts(ptr, size))
    }

    fn deallocate(&self, bytes: NonNull<[u8]>) -> bool {
        if bytes.len() == 0 {
            return true;
        }

        let Some(layout) = Self::layout_for(bytes.len()) else {
            return false;
        };
        unsafe { std::alloc::dealloc(bytes.cast::<u8>().as_ptr(), layout) };
        true
    }

    fn reallocate_in_place(&self, _bytes: &mut NonNull<[u8]>, _new_size: usize) -> bool {
        // `std::alloc::realloc` cannot promise not to move, so this
        // "trivial" wrapper never supports in-place resize.
        false
    }

    fn reallocate(&self, bytes: &mut NonNull<[u8]>, new_size: usize) -> bool {
        if new_size == 0 {
            self.deallocate(*bytes);
            *bytes = NonNull::slice_from_raw_parts(NonNull::dangling(), 0);
            return true;
        }

        if bytes.len() == 0 {
            return match self.allocate(new_size) {
                Some(new_bytes) => {
                    *bytes = new_bytes;
                    true
                }
                None => false,
            };
        }

        let Some(old_layout) = Self::layout_for(bytes.len()) else {
            return false;
        };
        let raw = unsafe {
            std::alloc::realloc(bytes.cast::<u8>().as_ptr(), old_layout, new_size)
        };
        match NonNull::new(raw) {
            Some(ptr) => {
                *bytes = NonNull::slice_from_raw_parts(ptr, new_size);
                true
            }
            // `realloc` leaves the original block untouched on failure.
            None => false,
        }
    }

    fn alignment(&self) -> usize {
        Self::ALIGNMENT
    }
}

static DEFAULT_ALLOCATOR: OnceLock<&'static dyn Allocator> = OnceLock::new();

/// The process-wide default allocator (`spec.md` §6's `default_allocator`
/// knob). Settable once via [`set_default_allocator`]; defaults to
/// [`MmapPool`].
pub fn default_allocator() -> &'static dyn Allocator {
    *DEFAULT_ALLOCATOR.get_or_init(|| pool::pool() as &dyn Allocator)
}

/// Sets the process-wide default allocator. Returns `true` if this call
/// was the one to set it, `false` if a default was already established
/// (by an earlier call to this function, or by a prior call to
/// [`default_allocator`]).
pub fn set_default_allocator(allocator: &'static dyn Allocator) -> bool {
    DEFAULT_ALLOCATOR.set(allocator).is_ok()
}

impl Allocator for MmapPool {
    fn allocate(&self, size: usize) -> Option<NonNull<[u8]>> {
        MmapPool::allocate(self, size)
    }

    fn deallocate(&self, bytes: NonNull<[u8]>) -> bool {
        MmapPool::deallocate(self, bytes)
    }

    fn reallocate(&self, bytes: &mut NonNull<[u8]>, new_size: usize) -> bool {
        MmapPool::reallocate(self, bytes, new_size)
    }

    fn reallocate_in_place(&self, bytes: &mut NonNull<[u8]>, new_size: usize) -> bool {
        MmapPool::reallocate_in_place(self, bytes, new_size)
    }

    fn alignment(&self) -> usize {
        MmapPool::ALIGNMENT
    }
}

/// Lets an [`MmapPool`] sit behind `#[global_allocator]` (`spec.md` §4.7).
///
/// `MmapPool` only guarantees [`MmapPool::ALIGNMENT`]-byte alignment, so a
/// `Layout` asking for more than that cannot be honoured; those requests
/// report OOM rather than silently under-aligning the allocation, the same
/// failure mode `GlobalAlloc` callers already have to handle.
unsafe impl GlobalAlloc for MmapPool {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > MmapPool::ALIGNMENT {
            return std::ptr::null_mut();
        }

        match MmapPool::allocate(self, layout.size()) {
            Some(bytes) => bytes.cast::<u8>().as_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let Some(ptr) = NonNull::new(ptr) else { return };
        let bytes = NonNull::slice_from_raw_parts(ptr, layout.size());
        MmapPool::deallocate(self, bytes);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > MmapPool::ALIGNMENT {
            return std::ptr::null_mut();
        }

        let Some(ptr) = NonNull::new(ptr) else { return std::ptr::null_mut() };
        let mut bytes = NonNull::slice_from_raw_parts(ptr, layout.size());

        if MmapPool::reallocate(self, &mut bytes, new_size) {
            bytes.cast::<u8>().as_ptr()
        } else {
            std::ptr::null_mut()
        }
    }
}
