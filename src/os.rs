//! Thin wrapper around the OS page map/unmap primitives.
//!
//! Everything [`crate::pool::MmapPool`] knows about "asking the kernel for
//! memory" goes through here: `mmap`/`munmap` on Unix, `VirtualAlloc`/
//! `VirtualFree` on Windows, and a once-queried page size.

use std::ptr::NonNull;
use std::sync::OnceLock;

/// The real page size of the host, queried once and cached.
///
/// `spec.md` §9 notes the pool's 65 536-byte region quantum assumes a page
/// size no larger than that; on hosts where the true page size is bigger,
/// the quantum has to grow to match. We resolve that by always rounding a
/// region's length up to a multiple of this value as well as the nominal
/// quantum (see [`crate::pool::MmapPool::REGION_QUANTUM`]).
pub(crate) fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(OsPages::page_size)
}

trait PlatformMemory {
    /// Requests `len` fresh, zeroed, read-write bytes from the OS.
    /// Returns `None` if the OS refused.
    fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Returns `len` bytes previously obtained from [`request_memory`] back
    /// to the OS.
    ///
    /// # Safety
    ///
    /// `addr` must be a pointer previously returned by `request_memory`
    /// with the same `len`, and must not be used again afterwards.
    unsafe fn return_memory(addr: *mut u8, len: usize);

    fn page_size() -> usize;
}

/// The OS page-mapping primitive `spec.md` §6 describes: "map N bytes,
/// anonymous, readable+writable, private" and the matching unmap.
pub(crate) struct OsPages;

impl OsPages {
    #[inline]
    pub(crate) fn map(len: usize) -> Option<NonNull<u8>> {
        <OsPages as PlatformMemory>::request_memory(len)
    }

    /// # Safety
    ///
    /// `addr` must be a pointer previously returned by [`OsPages::map`]
    /// with the same `len`, and the caller must not touch it again.
    #[inline]
    pub(crate) unsafe fn unmap(addr: *mut u8, len: usize) {
        unsafe { <OsPages as PlatformMemory>::return_memory(addr, len) }
    }
}

#[cfg(unix)]
mod unix {
    use super::{OsPages, PlatformMemory};
    use libc::{mmap, munmap, off_t, size_t};
    use std::os::raw::{c_int, c_void};
    use std::ptr::{self, NonNull};

    impl PlatformMemory for OsPages {
        fn request_memory(len: usize) -> Option<NonNull<u8>> {
            const ADDR: *mut c_void = ptr::null_mut();
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                match mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET) {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{OsPages, PlatformMemory};
    use std::mem::MaybeUninit;
    use std::os::raw::c_void;
    use std::ptr::NonNull;
    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for OsPages {
        fn request_memory(len: usize) -> Option<NonNull<u8>> {
            let protection = Memory::PAGE_READWRITE;
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);
                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());
                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}
