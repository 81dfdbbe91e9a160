use super::context;
use criterion::{criterion_group, Criterion};
use netcore_buffer::Chain;

/// Alias a window of a multi-segment packet, then release the alias.
fn bench_copy(c: &mut Criterion) {
    let ctx = context();
    for segments in [1, 8, 32] {
        let mut packet = Chain::default();
        for _ in 0..segments {
            packet.append(Chain::from_slice(&ctx, &[0xab; 256], false).unwrap());
        }
        let len = packet.len();
        c.bench_function(
            &format!("{}/segments={}", module_path!(), segments),
            |b| {
                b.iter(|| {
                    let alias = packet.copy(&ctx, 100, Some(len - 200), false).unwrap();
                    alias.free();
                });
            },
        );
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_copy
}
