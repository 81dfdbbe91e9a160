#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use netcore_buffer::{Chain, Context, Error, Queue, Segment};
use netcore_pool::{Alignment, Error as PoolError, Pool};

const POOL_SIZE: usize = 16 * 1024;
const MAX_OPERATIONS: usize = 128;

#[derive(Arbitrary, Debug)]
enum Operation {
    Append { bytes: Vec<u8> },
    Trim { len: i16 },
    CutCenter { offset: u16, len: u16 },
    Pullup { len: u16 },
    Copy { offset: u16, len: Option<u16> },
    Read { offset: u16, len: u16 },
    Write { offset: u16, byte: u8, len: u8 },
    Enqueue,
    Dequeue { index: u8 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    mask: u8,
    operations: Vec<Operation>,
}

/// Accepts pool exhaustion (the pool is deliberately small) but nothing else.
fn tolerate<T>(result: Result<T, Error>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(Error::Pool(PoolError::Exhausted(_))) => None,
        Err(err) => panic!("unexpected error: {err}"),
    }
}

fn assert_matches(chain: &Chain, model: &[u8]) {
    let sum: usize = chain.segments().map(Segment::len).sum();
    assert_eq!(sum, chain.len());
    assert_eq!(chain.to_vec().unwrap(), model);
}

fn fuzz(input: FuzzInput) {
    let pool = Pool::init(vec![0u8; POOL_SIZE], Alignment::from_mask(input.mask as usize))
        .unwrap();
    let ctx = Context::new(pool.clone());
    let mut chain = Chain::default();
    let mut model: Vec<u8> = Vec::new();
    let mut aliases: Vec<(Chain, Vec<u8>)> = Vec::new();
    let mut queue = Queue::new();
    let mut queued: Vec<Vec<u8>> = Vec::new();

    for op in input.operations.into_iter().take(MAX_OPERATIONS) {
        match op {
            Operation::Append { bytes } => {
                if let Some(tail) = tolerate(Chain::from_slice(&ctx, &bytes, false)) {
                    chain.append(tail);
                    model.extend_from_slice(&bytes);
                }
            }
            Operation::Trim { len } => {
                let n = len.unsigned_abs() as usize;
                let result = chain.trim(len as isize);
                if n > model.len() {
                    assert!(matches!(result, Err(Error::OutOfRange { .. })));
                } else {
                    result.unwrap();
                    if len > 0 {
                        model.drain(..n);
                    } else {
                        model.truncate(model.len() - n);
                    }
                }
            }
            Operation::CutCenter { offset, len } => {
                let (offset, len) = (offset as usize, len as usize);
                let result = chain.cut_center(&ctx, offset, len, false);
                if offset + len > model.len() {
                    assert!(matches!(result, Err(Error::OutOfRange { .. })));
                } else if tolerate(result).is_some() {
                    model.drain(offset..offset + len);
                }
            }
            Operation::Pullup { len } => {
                let len = len as usize;
                let result = chain.pullup(&ctx, len, false);
                if len > model.len() {
                    assert!(matches!(result, Err(Error::OutOfRange { .. })));
                } else if tolerate(result).is_some() && len > 0 {
                    let head = chain.segments().next().unwrap();
                    assert!(head.len() >= len);
                    assert!(!head.is_shared());
                }
            }
            Operation::Copy { offset, len } => {
                let offset = offset as usize;
                let len = len.map(usize::from);
                let end = offset.checked_add(len.unwrap_or(0));
                let result = chain.copy(&ctx, offset, len, false);
                match end {
                    Some(end) if offset <= model.len() && end <= model.len() => {
                        if let Some(alias) = tolerate(result) {
                            let end = len.map_or(model.len(), |len| offset + len);
                            aliases.push((alias, model[offset..end].to_vec()));
                        }
                    }
                    _ => assert!(matches!(result, Err(Error::OutOfRange { .. }))),
                }
            }
            Operation::Read { offset, len } => {
                let (offset, len) = (offset as usize, len as usize);
                let mut out = Vec::<u8>::new();
                let result = chain.to_buf(offset, len, &mut out);
                if offset + len > model.len() {
                    assert!(matches!(result, Err(Error::OutOfRange { .. })));
                } else {
                    result.unwrap();
                    assert_eq!(out, model[offset..offset + len]);
                }
            }
            Operation::Write { offset, byte, len } => {
                // Aliases observe writes, so only write when none are outstanding
                let (offset, len) = (offset as usize, len as usize);
                if !aliases.is_empty() || offset + len > model.len() {
                    continue;
                }
                chain.write_slice(offset, &vec![byte; len]).unwrap();
                model[offset..offset + len].fill(byte);
            }
            Operation::Enqueue => {
                queue.add_chain(std::mem::take(&mut chain));
                queued.push(std::mem::take(&mut model));
            }
            Operation::Dequeue { index } => {
                let index = index as usize;
                let result = queue.del_chain(index);
                if index < queued.len() {
                    result.unwrap();
                    queued.remove(index);
                } else {
                    assert_eq!(result, Err(Error::NotQueued(index)));
                }
            }
        }
        assert_matches(&chain, &model);
    }

    for (alias, bytes) in &aliases {
        assert_matches(alias, bytes);
    }
    for (chain, bytes) in queue.iter().zip(&queued) {
        assert_matches(chain, bytes);
    }
    drop((chain, aliases, queue));
    assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
