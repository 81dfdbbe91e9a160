use netcore_buffer::{concat, Chain, Context, Error, Queue, Segment};
use netcore_macros::test_traced;
use netcore_pool::{Alignment, Pool};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

fn pool(size: usize) -> Pool {
    Pool::init(vec![0u8; size], Alignment::Unit16).unwrap()
}

fn random_chain(ctx: &Context, rng: &mut StdRng, segments: usize) -> (Chain, Vec<u8>) {
    let mut chain = Chain::default();
    let mut bytes = Vec::new();
    for _ in 0..segments {
        let part: Vec<u8> = (0..rng.gen_range(1..48)).map(|_| rng.gen()).collect();
        chain.append(Chain::from_slice(ctx, &part, false).unwrap());
        bytes.extend_from_slice(&part);
    }
    (chain, bytes)
}

fn assert_consistent(chain: &Chain) {
    let sum: usize = chain.segments().map(Segment::len).sum();
    assert_eq!(sum, chain.len());
}

#[test_traced]
fn test_trim_matches_cut_center() {
    let pool = pool(64 * 1024);
    let ctx = Context::new(pool.clone());
    let mut rng = StdRng::seed_from_u64(0);
    for _ in 0..200 {
        let segments = rng.gen_range(1..6);
        let (source, bytes) = random_chain(&ctx, &mut rng, segments);
        let total = bytes.len();
        let front = rng.gen_range(0..=total);
        let back = rng.gen_range(0..=total - front);

        let mut trimmed = source.copy(&ctx, 0, None, false).unwrap();
        trimmed.trim(front as isize).unwrap();
        trimmed.trim(-(back as isize)).unwrap();

        let mut cut = source.copy(&ctx, 0, None, false).unwrap();
        cut.cut_center(&ctx, 0, front, false).unwrap();
        cut.cut_center(&ctx, total - front - back, back, false).unwrap();

        let expected = &bytes[front..total - back];
        assert_eq!(trimmed.to_vec().unwrap(), expected);
        assert_eq!(cut.to_vec().unwrap(), expected);
        assert_consistent(&trimmed);
        assert_consistent(&cut);
    }
    assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
}

#[test_traced]
fn test_random_operations_preserve_bytes() {
    let pool = pool(1024 * 1024);
    let ctx = Context::new(pool.clone());
    let mut rng = StdRng::seed_from_u64(42);
    let (mut chain, mut model) = random_chain(&ctx, &mut rng, 8);
    let mut aliases = Vec::new();
    for _ in 0..500 {
        match rng.gen_range(0..6) {
            0 if !model.is_empty() => {
                let n = rng.gen_range(0..=model.len());
                chain.trim(n as isize).unwrap();
                model.drain(..n);
            }
            1 if !model.is_empty() => {
                let n = rng.gen_range(0..=model.len());
                chain.trim(-(n as isize)).unwrap();
                model.truncate(model.len() - n);
            }
            2 if !model.is_empty() => {
                let offset = rng.gen_range(0..model.len());
                let len = rng.gen_range(0..=model.len() - offset);
                chain.cut_center(&ctx, offset, len, false).unwrap();
                model.drain(offset..offset + len);
            }
            3 => {
                let len = rng.gen_range(0..=model.len());
                chain.pullup(&ctx, len, false).unwrap();
            }
            4 => {
                let offset = rng.gen_range(0..=model.len());
                let alias = chain.copy(&ctx, offset, None, false).unwrap();
                assert_eq!(alias.to_vec().unwrap(), model[offset..]);
                aliases.push((alias, model[offset..].to_vec()));
            }
            _ => {
                let segments = rng.gen_range(1..3);
                let (tail, bytes) = random_chain(&ctx, &mut rng, segments);
                chain.append(tail);
                model.extend_from_slice(&bytes);
            }
        }
        assert_eq!(chain.to_vec().unwrap(), model);
        assert_consistent(&chain);
    }

    // Mutating the original never disturbs earlier aliases
    drop(chain);
    for (alias, bytes) in aliases {
        assert_eq!(alias.to_vec().unwrap(), bytes);
    }
    assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
}

#[test_traced]
fn test_cut_center_scenario() {
    let ctx = Context::new(pool(1024));
    let bytes: Vec<u8> = (0..100).collect();
    let mut chain = Chain::from_slice(&ctx, &bytes, false).unwrap();
    chain.cut_center(&ctx, 40, 20, false).unwrap();
    assert_eq!(chain.len(), 80);

    let mut expected = bytes[..40].to_vec();
    expected.extend_from_slice(&bytes[60..]);
    assert_eq!(chain.to_vec().unwrap(), expected);
}

#[test_traced]
fn test_shared_data_released_once() {
    let pool = pool(2048);
    let ctx = Context::new(pool.clone());
    let original = Chain::from_slice(&ctx, b"shared payload", false).unwrap();
    let first = original.copy(&ctx, 0, None, false).unwrap();
    let second = original.copy(&ctx, 7, None, false).unwrap();
    drop(original);

    // Nodes take three 16-byte units each
    let data = pool.capacity() - pool.free_bytes().unwrap() - 2 * 48;
    assert_eq!(data, 32);
    first.free();
    assert_eq!(second.to_vec().unwrap(), b"payload");
    assert_eq!(pool.capacity() - pool.free_bytes().unwrap(), data + 48);
    second.free();
    assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
}

#[test_traced]
fn test_drain_reclaims_queue() {
    let pool = pool(1024);
    let queue = Arc::new(Mutex::new(Queue::new()));
    let drains = Arc::new(AtomicUsize::new(0));
    let ctx = Context::new(pool.clone()).with_drain({
        let queue = queue.clone();
        let drains = drains.clone();
        move || {
            drains.fetch_add(1, Ordering::SeqCst);
            let mut queue = queue.lock().unwrap();
            while queue.del_chain(0).is_ok() {}
        }
    });

    // Fill the pool with queued packets
    loop {
        match Chain::new(&ctx, 64, false) {
            Ok(chain) => queue.lock().unwrap().add_chain(chain),
            Err(Error::Pool(netcore_pool::Error::Exhausted(_))) => break,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert!(!queue.lock().unwrap().is_empty());

    let chain = Chain::new(&ctx, 64, true).unwrap();
    assert_eq!(drains.load(Ordering::SeqCst), 1);
    assert!(queue.lock().unwrap().is_empty());

    let merged = concat(Some(chain), None).unwrap();
    assert_eq!(merged.len(), 64);
}

#[test_traced]
fn test_drain_not_consulted_when_disallowed() {
    let pool = pool(256);
    let drains = Arc::new(AtomicUsize::new(0));
    let ctx = Context::new(pool).with_drain({
        let drains = drains.clone();
        move || {
            drains.fetch_add(1, Ordering::SeqCst);
        }
    });
    assert!(Chain::new(&ctx, 4096, false).is_err());
    assert_eq!(drains.load(Ordering::SeqCst), 0);
    assert!(Chain::new(&ctx, 4096, true).is_err());
    assert_eq!(drains.load(Ordering::SeqCst), 1);
}

#[test_traced]
fn test_chains_cross_threads() {
    let pool = pool(64 * 1024);
    let ctx = Context::new(pool.clone());
    let queue = Arc::new(Mutex::new(Queue::new()));
    let producers: Vec<_> = (0..4u8)
        .map(|id| {
            let ctx = ctx.clone();
            let queue = queue.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let chain = Chain::from_slice(&ctx, &[id; 32], false).unwrap();
                    queue.lock().unwrap().add_chain(chain);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let mut queue = queue.lock().unwrap();
    assert_eq!(queue.len(), 200);
    while let Some(chain) = queue.pop_chain() {
        let bytes = chain.to_vec().unwrap();
        assert!(bytes.iter().all(|byte| *byte == bytes[0]));
    }
    assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
}
