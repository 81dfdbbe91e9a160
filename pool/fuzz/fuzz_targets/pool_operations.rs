#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use netcore_pool::{Alignment, Error, Pool, Ptr};

const MAX_OPERATIONS: usize = 256;
const MAX_REQUEST: usize = 2048;

#[derive(Arbitrary, Debug)]
enum Operation {
    Malloc { nbytes: u16 },
    Free { index: u8 },
    Write { index: u8, offset: u16, byte: u8 },
    FreeTwice { index: u8 },
    Stats,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    mask: u8,
    size: u16,
    operations: Vec<Operation>,
}

fn fuzz(input: FuzzInput) {
    let alignment = Alignment::from_mask(input.mask as usize);
    let pool = match Pool::init(vec![0u8; input.size as usize], alignment) {
        Ok(pool) => pool,
        Err(Error::TooSmall { .. }) => return,
        Err(err) => panic!("unexpected init error: {err}"),
    };
    let unit = pool.unit();
    let mut live: Vec<(Ptr, usize, Option<u8>)> = Vec::new();

    for op in input.operations.into_iter().take(MAX_OPERATIONS) {
        match op {
            Operation::Malloc { nbytes } => {
                let nbytes = nbytes as usize % MAX_REQUEST;
                let largest = pool.largest_free_chunk().unwrap();
                match pool.malloc(nbytes) {
                    Ok(ptr) => {
                        assert!(pool.size(ptr).unwrap() >= nbytes);
                        live.push((ptr, nbytes, None));
                    }
                    Err(Error::Exhausted(_)) => {
                        assert!(nbytes.div_ceil(unit) * unit + unit > largest);
                    }
                    Err(err) => panic!("unexpected malloc error: {err}"),
                }
            }
            Operation::Free { index } => {
                if live.is_empty() {
                    continue;
                }
                let (ptr, nbytes, byte) = live.swap_remove(index as usize % live.len());
                if let Some(byte) = byte {
                    let mut out = vec![0u8; nbytes];
                    pool.read(ptr, 0, &mut out).unwrap();
                    assert!(out.iter().all(|b| *b == byte));
                }
                pool.free(ptr).unwrap();
            }
            Operation::Write {
                index,
                offset,
                byte,
            } => {
                if live.is_empty() {
                    continue;
                }
                let slot = index as usize % live.len();
                let (ptr, nbytes, _) = live[slot];
                pool.write(ptr, 0, &vec![byte; nbytes]).unwrap();
                live[slot].2 = Some(byte);
                let offset = offset as usize;
                if offset > pool.size(ptr).unwrap() {
                    assert!(matches!(
                        pool.write(ptr, offset, &[byte]),
                        Err(Error::OutOfBounds { .. })
                    ));
                }
            }
            Operation::FreeTwice { index } => {
                if live.is_empty() {
                    continue;
                }
                let (ptr, _, _) = live.swap_remove(index as usize % live.len());
                pool.free(ptr).unwrap();
                assert!(pool.free(ptr).is_err());
            }
            Operation::Stats => {
                let stats = pool.stats().unwrap();
                assert!(stats.largest_free_chunk <= stats.free_bytes);
                assert!(stats.free_bytes <= stats.capacity);
            }
        }

        let used: usize = live
            .iter()
            .map(|(ptr, _, _)| pool.size(*ptr).unwrap() + unit)
            .sum();
        assert_eq!(pool.free_bytes().unwrap() + used, pool.capacity());
    }

    for (ptr, _, _) in live {
        pool.free(ptr).unwrap();
    }
    let stats = pool.stats().unwrap();
    assert_eq!(stats.free_bytes, stats.capacity);
    assert!(stats.free_blocks <= 1);
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
