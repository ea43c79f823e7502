use mmpool::MmapPool;

fn log_alloc(name: &str, bytes: std::ptr::NonNull<[u8]>) {
    println!("{name}: requested {} bytes, got {:?}", bytes.len(), bytes.cast::<u8>());
}

fn main() {
    let pool = MmapPool::new();

    let a = pool.allocate(8).unwrap();
    log_alloc("a", a);

    let b = pool.allocate(8).unwrap();
    log_alloc("b", b);

    let c = pool.allocate(16).unwrap();
    log_alloc("c", c);

    pool.deallocate(a);
    pool.deallocate(b);
    pool.deallocate(c);
}
