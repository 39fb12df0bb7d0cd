//! Large-block path: allocations above `max_block_size`, each its own
//! standalone OS mapping.
//!
//! ```text
//! +----------------+----------------+------------------------------+
//! |    (unused)    | size_and_flags |            payload           |
//! +----------------+----------------+------------------------------+
//! ^ mapping base                    ^ payload, 16-byte aligned
//! |<----------- 16-byte prelude --->|
//! ```
//!
//! The trailing 4 bytes of the 16-byte prelude hold the size-and-flags word
//! (`large` set); `size` there is the *total mapped size*, enough to
//! `munmap` later. Large blocks never touch regions, free lists, or
//! coalescing.

use crate::block::{self, ALIGN};
use crate::os;
use std::ptr::NonNull;

const PRELUDE_SIZE: usize = 16;

/// Rounds `payload_size` up so the mapping (prelude + payload) lands on a
/// 16-byte multiple.
fn total_size_for(payload_size: usize) -> usize {
    block::round_up(PRELUDE_SIZE + payload_size, ALIGN)
}

/// Allocates a standalone mapping for `payload_size` bytes of payload.
/// Returns the payload pointer (16-byte aligned, since the mapping itself
/// is page-aligned and the prelude is 16 bytes).
pub(crate) unsafe fn allocate(payload_size: usize) -> Option<NonNull<u8>> {
    let total = total_size_for(payload_size);
    unsafe {
        let base = os::acquire_large(total)?;
        let payload = NonNull::new(base.as_ptr().add(PRELUDE_SIZE))?;
        // The prelude's trailing word sits exactly where a small block's
        // header would: `payload - WORD_SIZE`. `set_size_and_flags` wants a
        // block start, not a payload, so we write the tag directly here.
        (block::block_of(payload) as *mut usize).write(block::encode(total, true, true));
        Some(payload)
    }
}

/// Returns the mapping base for a large block given its payload pointer.
#[inline]
pub(crate) fn base_of(payload: NonNull<u8>) -> *mut u8 {
    unsafe { payload.as_ptr().sub(PRELUDE_SIZE) }
}

/// Reads the total mapped size recorded in a large block's prelude.
///
/// **Safety**: `payload` must point at a live large-block payload.
pub(crate) unsafe fn total_size(payload: NonNull<u8>) -> usize {
    unsafe { block::size_of_block(block::block_of(payload)) }
}

/// Payload capacity of a large block (total mapping minus the prelude).
///
/// **Safety**: `payload` must point at a live large-block payload.
pub(crate) unsafe fn usable_size(payload: NonNull<u8>) -> usize {
    unsafe { total_size(payload) - PRELUDE_SIZE }
}

/// Checks whether `payload`'s boundary word has the `large` flag set. Valid
/// to call on *any* live payload pointer (small or large) — both layouts
/// place their tag at `payload - WORD_SIZE`.
///
/// **Safety**: `payload` must point at the start of a live block's payload.
pub(crate) unsafe fn is_large_payload(payload: NonNull<u8>) -> bool {
    unsafe { block::is_large(block::block_of(payload)) }
}

/// Unmaps a large block.
///
/// **Safety**: `payload` must point at a live large-block payload, never
/// used again afterward.
pub(crate) unsafe fn release(payload: NonNull<u8>) {
    unsafe {
        let size = total_size(payload);
        let base = NonNull::new_unchecked(base_of(payload));
        os::release_large(base, size);
    }
}
