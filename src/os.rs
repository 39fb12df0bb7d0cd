//! OS backing layer.
//!
//! Obtains and releases aligned, fixed-size regions, and standalone
//! large-block mappings, via the platform's anonymous memory mapping
//! facility. This module is the only place that talks to the kernel.

use std::ptr::NonNull;

/// Page size of the host, queried once and cached.
static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();

#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { Platform::query_page_size() })
}

trait PlatformMemory {
    unsafe fn map(len: usize) -> Option<NonNull<u8>>;
    unsafe fn unmap(addr: *mut u8, len: usize);
    unsafe fn query_page_size() -> usize;
}

struct Platform;

/// Requests a fresh, zero-initialized mapping of exactly `len` bytes from the OS.
#[inline]
unsafe fn map(len: usize) -> Option<NonNull<u8>> {
    unsafe { Platform::map(len) }
}

/// Returns a previously mapped range of `len` bytes back to the OS.
#[inline]
unsafe fn unmap(addr: *mut u8, len: usize) {
    unsafe { Platform::unmap(addr, len) }
}

/// Acquires a region of exactly `region_size` bytes whose base address is a
/// multiple of `region_size`.
///
/// The OS gives us page-aligned mappings, not `region_size`-aligned ones.
/// To guarantee self-alignment we over-map by `2 * region_size`, find the
/// unique `region_size`-aligned subrange inside it, and hand the leading
/// and trailing slack back to the OS.
pub(crate) unsafe fn acquire_region(region_size: usize) -> Option<NonNull<u8>> {
    debug_assert!(region_size.is_power_of_two());

    unsafe {
        let raw = map(region_size * 2)?;
        let raw_addr = raw.as_ptr() as usize;

        let aligned_addr = (raw_addr + region_size - 1) & !(region_size - 1);
        let lead = aligned_addr - raw_addr;
        let trail = (region_size * 2) - lead - region_size;

        if lead > 0 {
            unmap(raw.as_ptr(), lead);
        }
        if trail > 0 {
            unmap((aligned_addr + region_size) as *mut u8, trail);
        }

        NonNull::new(aligned_addr as *mut u8)
    }
}

/// Returns a region's memory to the OS.
pub(crate) unsafe fn release_region(base: NonNull<u8>, region_size: usize) {
    unsafe { unmap(base.as_ptr(), region_size) }
}

/// Maps a standalone large-block allocation of at least `total_size` bytes.
pub(crate) unsafe fn acquire_large(total_size: usize) -> Option<NonNull<u8>> {
    unsafe { map(total_size) }
}

/// Unmaps a standalone large-block allocation.
pub(crate) unsafe fn release_large(base: NonNull<u8>, total_size: usize) {
    unsafe { unmap(base.as_ptr(), total_size) }
}

#[cfg(unix)]
mod unix {
    use super::{Platform, PlatformMemory};
    use libc::{mmap, munmap, off_t, size_t};
    use std::{
        os::raw::{c_int, c_void},
        ptr::NonNull,
    };

    impl PlatformMemory for Platform {
        unsafe fn map(len: usize) -> Option<NonNull<u8>> {
            const ADDR: *mut c_void = std::ptr::null_mut::<c_void>();
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                match addr {
                    libc::MAP_FAILED => None,
                    addr => Some(NonNull::new_unchecked(addr).cast::<u8>()),
                }
            }
        }

        unsafe fn unmap(addr: *mut u8, len: usize) {
            unsafe {
                munmap(addr as *mut c_void, len as size_t);
            }
        }

        unsafe fn query_page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Platform, PlatformMemory};
    use std::{mem::MaybeUninit, os::raw::c_void, ptr::NonNull};
    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Platform {
        unsafe fn map(len: usize) -> Option<NonNull<u8>> {
            let protection = Memory::PAGE_READWRITE;
            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);
                NonNull::new(addr.cast())
            }
        }

        unsafe fn unmap(addr: *mut u8, _len: usize) {
            unsafe {
                let _ = Memory::VirtualFree(addr as *mut c_void, 0, Memory::MEM_RELEASE);
            }
        }

        unsafe fn query_page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());
                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane_and_cached() {
        let a = page_size();
        let b = page_size();
        assert_eq!(a, b);
        assert!(a.is_power_of_two());
        assert!(a >= 1024);
    }

    #[test]
    fn acquire_region_is_self_aligned() {
        let region_size = page_size();
        unsafe {
            let region = acquire_region(region_size).expect("mmap region");
            assert_eq!(region.as_ptr() as usize % region_size, 0);
            release_region(region, region_size);
        }
    }

    #[test]
    fn acquire_large_returns_usable_memory() {
        unsafe {
            let size = page_size() * 4;
            let block = acquire_large(size).expect("mmap large");
            block.as_ptr().write_bytes(0xAB, size);
            assert_eq!(*block.as_ptr(), 0xAB);
            release_large(block, size);
        }
    }
}
