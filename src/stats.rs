//! Allocator-wide counters.
//!
//! Plain `usize`/`u64` fields behind the same `Mutex` that guards the
//! allocator core (see `lib.rs`) — no atomics needed, since every counter
//! update already happens under that lock.

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Stats {
    pub region_allocs: u64,
    pub region_frees: u64,
    pub total_allocs: u64,
    pub total_frees: u64,
    pub large_block_allocs: u64,
    pub large_block_frees: u64,
    pub blocks_checked: u64,
    pub check_amount: u64,
    pub bytes_used: usize,
    pub bytes_unused: usize,
    peak_bytes_used: usize,
    peak_bytes_total: usize,
    pub out_of_memory: bool,
}

impl Stats {
    pub(crate) fn record_region_alloc(&mut self, region_payload_capacity: usize) {
        self.region_allocs += 1;
        self.bytes_unused += region_payload_capacity;
    }

    pub(crate) fn record_region_free(&mut self, region_payload_capacity: usize) {
        self.region_frees += 1;
        self.bytes_unused -= region_payload_capacity;
    }

    pub(crate) fn record_alloc(&mut self, usable: usize) {
        self.total_allocs += 1;
        self.bytes_used += usable;
        self.bytes_unused -= usable;
        self.touch_peak();
    }

    pub(crate) fn record_free(&mut self, usable: usize) {
        self.total_frees += 1;
        self.bytes_used -= usable;
        self.bytes_unused += usable;
    }

    pub(crate) fn record_large_alloc(&mut self, usable: usize) {
        self.large_block_allocs += 1;
        self.bytes_used += usable;
        self.touch_peak();
    }

    pub(crate) fn record_large_free(&mut self, usable: usize) {
        self.large_block_frees += 1;
        self.bytes_used -= usable;
    }

    pub(crate) fn record_check(&mut self, blocks_walked: u64) {
        self.check_amount += 1;
        self.blocks_checked += blocks_walked;
    }

    fn touch_peak(&mut self) {
        let total = self.bytes_used + self.bytes_unused;
        if self.bytes_used > self.peak_bytes_used {
            self.peak_bytes_used = self.bytes_used;
            self.peak_bytes_total = total.max(self.bytes_used);
        }
    }

    /// Peak utilization as hundredths of a percent (`10_000` == 100.00%),
    /// avoiding floats entirely. `0` when nothing has ever been allocated
    /// (denominator would otherwise be zero).
    pub(crate) fn peak_utilization_bp(&self) -> u32 {
        if self.peak_bytes_total == 0 {
            return 0;
        }
        ((self.peak_bytes_used as u128 * 10_000) / self.peak_bytes_total as u128) as u32
    }
}
