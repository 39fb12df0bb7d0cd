use memalloc::MemAlloc;

#[global_allocator]
static ALLOCATOR: MemAlloc = MemAlloc::new();

fn main() {
    let v: Vec<u64> = (0..1024).collect();
    println!("sum = {}", v.iter().sum::<u64>());
}
