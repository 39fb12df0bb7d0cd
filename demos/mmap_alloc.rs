// Exercises the small-block path and the large-block mmap escape hatch
// directly through `MemAlloc`, no `--features global` required.
use memalloc::MemAlloc;

fn main() {
    let allocator = MemAlloc::new();

    // Small requests are served out of a shared region.
    let small = allocator.allocate(64);
    println!("small block: {small:?}");

    // Large requests skip regions and get their own mapping.
    let big = allocator.allocate_zeroed(1, 1 << 20);
    println!("large block: {big:?}");

    let stats = allocator.stats();
    println!("region_allocs = {}", stats.region_allocs);
    println!("large_block_allocs = {}", stats.large_block_allocs);

    unsafe {
        allocator.release(small);
        allocator.release(big);
    }
}
