//! The allocator core: region list, block/large-block dispatch, and the
//! public size-based operations built on top of [`crate::region`],
//! [`crate::freelist`], [`crate::block`], and [`crate::large`].
//!
//! Single-threaded by construction — callers (`lib.rs`) are responsible
//! for serializing access before driving this from behind a single
//! `#[global_allocator]` slot.

use crate::block;
use crate::config::Config;
use crate::freelist;
use crate::large;
use crate::os;
use crate::region::{self, RegionHeader};
use crate::stats::Stats;
use std::ptr::NonNull;

pub(crate) struct Allocator {
    root: Option<NonNull<RegionHeader>>,
    config: Config,
    stats: Stats,
}

// Raw pointers inside `Allocator` never escape without the owning `Mutex`
// serializing access (see `lib.rs`); there is no thread-local state here.
unsafe impl Send for Allocator {}

impl Allocator {
    pub(crate) fn new() -> Self {
        Allocator {
            root: None,
            config: Config::from_env(),
            stats: Stats::default(),
        }
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats
    }

    fn block_size_for(size: usize) -> usize {
        block::round_up(block::OVERHEAD + size, block::ALIGN).max(block::MIN_BLOCK_SIZE)
    }

    fn region_header_for(&self, block: *mut u8) -> NonNull<RegionHeader> {
        let base = block::region_of(block, self.config.region_size);
        unsafe { NonNull::new_unchecked(base as *mut RegionHeader) }
    }

    // --- region list bookkeeping ---

    fn link_region(&mut self, mut header: NonNull<RegionHeader>) {
        unsafe {
            let h = header.as_mut();
            h.next = self.root;
            h.prev = None;
            if let Some(mut old_root) = self.root {
                old_root.as_mut().prev = Some(header);
            }
            self.root = Some(header);
        }
    }

    fn unlink_region(&mut self, mut header: NonNull<RegionHeader>) {
        unsafe {
            let h = header.as_mut();
            match h.prev {
                Some(mut p) => p.as_mut().next = h.next,
                None => self.root = h.next,
            }
            if let Some(mut n) = h.next {
                n.as_mut().prev = h.prev;
            }
        }
    }

    fn allocate_region(&mut self) -> Option<NonNull<RegionHeader>> {
        unsafe {
            let base = os::acquire_region(self.config.region_size)?;
            let header = region::init(base, self.config.region_size);
            let free_block = header.as_ref().block_list.unwrap().as_ptr();
            let capacity = block::usable_size(free_block);

            self.link_region(header);
            self.stats.record_region_alloc(capacity);
            Some(header)
        }
    }

    fn reclaim_region(&mut self, header: NonNull<RegionHeader>) {
        unsafe {
            let free_block = header.as_ref().block_list.unwrap().as_ptr();
            let capacity = block::usable_size(free_block);

            self.unlink_region(header);
            self.stats.record_region_free(capacity);
            os::release_region(NonNull::new_unchecked(header.as_ptr() as *mut u8), self.config.region_size);
        }
    }

    /// Scans every region's free list for a fit, returning it along with how
    /// many free blocks were inspected in total along the way.
    fn find_fit_in_regions(&self, needed: usize) -> (Option<*mut u8>, u64) {
        let mut cur = self.root;
        let mut walked = 0u64;
        while let Some(r) = cur {
            unsafe {
                let region = r.as_ref();
                let (hit, region_walked) = region::find_fit(region, needed);
                walked += region_walked;
                if hit.is_some() {
                    return (hit, walked);
                }
                cur = region.next;
            }
        }
        (None, walked)
    }

    // --- small-block path ---

    fn allocate_small(&mut self, size: usize) -> Option<NonNull<u8>> {
        let needed = Self::block_size_for(size);
        if needed > self.config.region_size {
            return None;
        }

        let (first, mut walked) = self.find_fit_in_regions(needed);
        let block = match first {
            Some(block) => block,
            None => {
                self.allocate_region()?;
                let (retry, retry_walked) = self.find_fit_in_regions(needed);
                walked += retry_walked;
                match retry {
                    Some(block) => block,
                    None => {
                        self.stats.record_check(walked);
                        return None;
                    }
                }
            }
        };
        self.stats.record_check(walked);

        unsafe { Some(self.commit_allocation(block, needed)) }
    }

    unsafe fn commit_allocation(&mut self, block: *mut u8, needed: usize) -> NonNull<u8> {
        unsafe {
            let region_header = self.region_header_for(block);
            let region = &mut *region_header.as_ptr();
            let total = block::size_of_block(block);
            let remainder = total - needed;

            if remainder >= self.config.min_split_size + self.config.reserve_capacity {
                let trailing = region::split(block, needed).expect("remainder already checked");
                freelist::replace(&mut region.block_list, block, trailing);
            } else {
                freelist::unlink(&mut region.block_list, block);
                region.n_free -= 1;
            }

            block::mark_used(block, true);
            block::clear_fl_slots(block);
            region.n_used += 1;

            let payload = block::payload_of(block);
            if self.config.scribble_char != 0 {
                payload.as_ptr().write_bytes(self.config.scribble_char, block::usable_size(block));
            }

            self.stats.record_alloc(block::usable_size(block));
            payload
        }
    }

    fn release_small(&mut self, block: *mut u8) {
        unsafe {
            let usable = block::usable_size(block);
            let region_header = self.region_header_for(block);
            let region = &mut *region_header.as_ptr();

            block::mark_used(block, false);
            block::clear_fl_slots(block);
            let merged = region::coalesce(region, block);
            freelist::insert_head(&mut region.block_list, merged);
            region.n_free += 1;
            region.n_used -= 1;

            self.stats.record_free(usable);

            if region.n_used == 0 {
                self.reclaim_region(region_header);
            }
        }
    }

    /// `size(block) - 16 > new_size`: the block's current usable size already
    /// accommodates the request. This path never shrinks a small block.
    fn resize_small(&mut self, payload: NonNull<u8>, block: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        unsafe {
            if block::usable_size(block) > new_size {
                return Some(payload);
            }
            self.migrate(payload, block, new_size, false)
        }
    }

    // --- large-block path ---

    fn allocate_large(&mut self, size: usize) -> Option<NonNull<u8>> {
        unsafe {
            let payload = large::allocate(size)?;
            self.stats.record_large_alloc(large::usable_size(payload));
            Some(payload)
        }
    }

    fn release_large(&mut self, payload: NonNull<u8>) {
        unsafe {
            let usable = large::usable_size(payload);
            self.stats.record_large_free(usable);
            large::release(payload);
        }
    }

    /// Large blocks have no "already fits" shortcut — every resize of a
    /// large block, growing or shrinking, reallocates and copies.
    fn resize_large(&mut self, payload: NonNull<u8>, block: *mut u8, new_size: usize) -> Option<NonNull<u8>> {
        self.migrate(payload, block, new_size, true)
    }

    /// Allocates a fresh block for `new_size`, copies `min(old_usable, new_size)`
    /// bytes over, and releases the old one. On allocation failure the old
    /// block is left untouched and `None` is returned.
    fn migrate(&mut self, payload: NonNull<u8>, block: *mut u8, new_size: usize, old_is_large: bool) -> Option<NonNull<u8>> {
        unsafe {
            let old_usable = if old_is_large {
                large::usable_size(payload)
            } else {
                block::usable_size(block)
            };
            let new_payload = self.allocate(new_size)?;
            std::ptr::copy_nonoverlapping(payload.as_ptr(), new_payload.as_ptr(), old_usable.min(new_size));
            if old_is_large {
                self.release_large(payload);
            } else {
                self.release_small(block);
            }
            Some(new_payload)
        }
    }

    // --- public, size-based operations ---

    /// Size zero is a failure, per convention (and to keep every live block
    /// non-degenerate).
    pub(crate) fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if size > self.config.max_block_size {
            self.allocate_large(size)
        } else {
            self.allocate_small(size)
        }
    }

    pub(crate) fn allocate_zeroed(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        let total = match count.checked_mul(size) {
            Some(total) => total,
            None => {
                self.stats.out_of_memory = true;
                return None;
            }
        };
        let payload = self.allocate(total)?;
        unsafe { payload.as_ptr().write_bytes(0, total) };
        Some(payload)
    }

    /// **Safety**: `payload` must be a pointer previously returned by this
    /// allocator and not yet released.
    pub(crate) unsafe fn release(&mut self, payload: NonNull<u8>) {
        unsafe {
            let block = block::block_of(payload);
            if block::is_large(block) {
                self.release_large(payload);
            } else {
                self.release_small(block);
            }
        }
    }

    /// **Safety**: `payload` must be a pointer previously returned by this
    /// allocator and not yet released.
    pub(crate) unsafe fn resize(&mut self, payload: NonNull<u8>, new_size: usize) -> Option<NonNull<u8>> {
        unsafe {
            if new_size == 0 {
                self.release(payload);
                return None;
            }

            let block = block::block_of(payload);
            if block::is_large(block) {
                self.resize_large(payload, block, new_size)
            } else {
                self.resize_small(payload, block, new_size)
            }
        }
    }

    /// **Safety**: `payload` must be a pointer previously returned by this
    /// allocator and not yet released.
    pub(crate) unsafe fn resize_array(&mut self, payload: NonNull<u8>, count: usize, size: usize) -> Option<NonNull<u8>> {
        match count.checked_mul(size) {
            Some(total) => unsafe { self.resize(payload, total) },
            None => {
                self.stats.out_of_memory = true;
                None
            }
        }
    }
}

impl Drop for Allocator {
    /// Unmaps every outstanding region. Only reachable when the process-wide
    /// singleton itself is torn down (never, in practice, for a
    /// `#[global_allocator]`) or in tests that build their own `Allocator`.
    fn drop(&mut self) {
        let mut cur = self.root;
        while let Some(header) = cur {
            unsafe {
                cur = header.as_ref().next;
                os::release_region(NonNull::new_unchecked(header.as_ptr() as *mut u8), self.config.region_size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_small_block_roundtrips() {
        let mut alloc = Allocator::new();
        let payload = alloc.allocate(64).expect("alloc");
        unsafe {
            payload.as_ptr().write_bytes(0xab, 64);
            alloc.release(payload);
        }
        assert_eq!(alloc.stats().total_allocs, 1);
        assert_eq!(alloc.stats().total_frees, 1);
    }

    #[test]
    fn small_allocations_record_free_list_walks() {
        let mut alloc = Allocator::new();
        let a = alloc.allocate(32).expect("alloc a");
        let b = alloc.allocate(32).expect("alloc b");

        // Each search walked at least one free block, and counted once per
        // allocate call.
        assert_eq!(alloc.stats().check_amount, 2);
        assert!(alloc.stats().blocks_checked >= 2);

        unsafe {
            alloc.release(a);
            alloc.release(b);
        }
    }

    #[test]
    fn freeing_every_block_reclaims_the_region() {
        let mut alloc = Allocator::new();
        let a = alloc.allocate(64).unwrap();
        let b = alloc.allocate(64).unwrap();
        assert_eq!(alloc.stats().region_allocs, 1);

        unsafe {
            alloc.release(a);
            alloc.release(b);
        }
        assert_eq!(alloc.stats().region_frees, 1);
        assert_eq!(alloc.stats().bytes_used, 0);
        assert_eq!(alloc.stats().bytes_unused, 0);
    }

    #[test]
    fn oversized_request_takes_the_large_path() {
        let mut alloc = Allocator::new();
        let big = alloc.config.max_block_size + 1;
        let payload = alloc.allocate(big).expect("large alloc");
        assert_eq!(alloc.stats().large_block_allocs, 1);
        unsafe { alloc.release(payload) };
        assert_eq!(alloc.stats().large_block_frees, 1);
    }

    #[test]
    fn resize_grows_by_migration_and_shrink_request_is_a_no_op() {
        let mut alloc = Allocator::new();
        unsafe {
            let payload = alloc.allocate(16).unwrap();
            payload.as_ptr().write_bytes(0x7, 16);

            let grown = alloc.resize(payload, 200).expect("grow");
            assert_eq!(*grown.as_ptr(), 0x7);

            // The grown block's usable size already exceeds 8, so this
            // returns the same pointer unchanged rather than shrinking it.
            let same = alloc.resize(grown, 8).expect("already fits");
            assert_eq!(same, grown);
            assert_eq!(*same.as_ptr(), 0x7);

            alloc.release(same);
        }
    }

    #[test]
    fn resize_to_zero_releases_and_returns_none() {
        let mut alloc = Allocator::new();
        let payload = alloc.allocate(32).unwrap();
        unsafe {
            assert!(alloc.resize(payload, 0).is_none());
        }
        assert_eq!(alloc.stats().total_frees, 1);
    }

    #[test]
    fn allocate_zeroed_overflow_sets_out_of_memory() {
        let mut alloc = Allocator::new();
        assert!(alloc.allocate_zeroed(usize::MAX, 2).is_none());
        assert!(alloc.stats().out_of_memory);
    }

    #[test]
    fn allocate_zeroed_writes_zero_bytes() {
        let mut alloc = Allocator::new();
        let payload = alloc.allocate_zeroed(8, 4).expect("calloc");
        unsafe {
            let slice = std::slice::from_raw_parts(payload.as_ptr(), 32);
            assert!(slice.iter().all(|&b| b == 0));
            alloc.release(payload);
        }
    }
}
