use mmpool::MmapPool;

#[global_allocator]
static ALLOCATOR: MmapPool = MmapPool::new();

fn main() {
    let mut v = Vec::new();
    for i in 0..1024u32 {
        v.push(i);
    }
    println!("sum = {}", v.iter().sum::<u32>());
}
