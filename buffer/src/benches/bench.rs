use criterion::criterion_main;
use netcore_buffer::Context;
use netcore_pool::{Alignment, Pool};

mod copy;

criterion_main!(copy::benches, cut_center::benches);

/// Size of the pool backing each benchmark.
const POOL_SIZE: usize = 256 * 1024;

/// Returns a context over a fresh pool.
fn context() -> Context {
    Context::new(Pool::init(vec![0u8; POOL_SIZE], Alignment::Unit16).unwrap())
}
