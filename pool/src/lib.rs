//! Best-fit allocation inside a fixed-size arena carved at boot.
//!
//! A [Pool] manages one owned byte range as a sequence of same-size units. Free regions
//! are tracked by a circular free list whose headers live inside the free memory itself
//! (addressed by unit index rather than by raw pointer), and allocations are served with a
//! best-fit policy that carves from the high-address end of the chosen block. Freed blocks
//! are coalesced with both address-adjacent neighbours, so no two free blocks are ever
//! adjacent once [Pool::free] returns.
//!
//! # Layout
//!
//! ```text
//! | metadata | unit 0 | unit 1 | ... | unit n-1 |
//!            ^ rounded up to the unit boundary
//! ```
//!
//! Every allocated block starts with one header unit recording its size in units; the
//! [Ptr] handed out names the first byte after that header. A request for `n` bytes
//! therefore consumes `ceil(n / unit) + 1` units.
//!
//! # Concurrency
//!
//! Every public operation runs inside exactly one [critical] section, making it atomic with
//! respect to any other caller (main loop or interrupt handler alike). Sections are never held
//! across more than one operation.
//!
//! # Example
//!
//! ```rust
//! use netcore_pool::{Alignment, Pool};
//!
//! let pool = Pool::init(vec![0u8; 256], Alignment::Unit8).unwrap();
//! let ptr = pool.malloc(20).unwrap();
//! pool.write(ptr, 0, b"hello").unwrap();
//!
//! let mut out = [0u8; 5];
//! pool.read(ptr, 0, &mut out).unwrap();
//! assert_eq!(&out, b"hello");
//!
//! pool.free(ptr).unwrap();
//! assert_eq!(pool.free_bytes().unwrap(), pool.capacity());
//! ```

use std::{fmt, num::NonZeroUsize};
use thiserror::Error;

mod arena;
pub use arena::METADATA_SIZE;
pub mod critical;
mod handle;
pub use handle::Pool;
pub mod heap;

/// Errors that can occur when interacting with a [Pool].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("memory too small: {size} bytes (need at least {required})")]
    TooSmall { size: usize, required: usize },
    #[error("memory too large: {0} bytes")]
    TooLarge(usize),
    #[error("pool exhausted: cannot allocate {0} bytes")]
    Exhausted(usize),
    #[error("pool released")]
    Released,
    #[error("invalid pointer: {0}")]
    InvalidPointer(usize),
    #[error("double free: {0}")]
    DoubleFree(usize),
    #[error("out of bounds: offset={offset} len={len} size={size}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("free list corrupted")]
    Corrupted,
}

/// Unit size class of a [Pool].
///
/// Alignment is expressed as a power-of-two-minus-one mask in the C tradition (`7` for
/// 8-byte units and so on). Only four classes exist; the smallest (8 bytes) is the minimum
/// that can hold a free-block header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// 8-byte units (mask `7`).
    #[default]
    Unit8,
    /// 16-byte units (mask `15`).
    Unit16,
    /// 32-byte units (mask `31`).
    Unit32,
    /// 64-byte units (mask `63`).
    Unit64,
}

impl Alignment {
    /// Returns the smallest class whose mask covers `mask`.
    ///
    /// Masks below the minimum are clamped up to [Alignment::Unit8] and masks above the
    /// largest class are clamped down to [Alignment::Unit64].
    pub const fn from_mask(mask: usize) -> Self {
        match mask {
            0..=7 => Self::Unit8,
            8..=15 => Self::Unit16,
            16..=31 => Self::Unit32,
            _ => Self::Unit64,
        }
    }

    /// Returns the alignment mask (`unit - 1`).
    pub const fn mask(self) -> usize {
        self.unit() - 1
    }

    /// Returns the unit size in bytes.
    pub const fn unit(self) -> usize {
        match self {
            Self::Unit8 => 8,
            Self::Unit16 => 16,
            Self::Unit32 => 32,
            Self::Unit64 => 64,
        }
    }
}

/// Offset of the first usable byte of an allocated block.
///
/// A [Ptr] is only meaningful for the [Pool] that returned it. It is never zero because the
/// metadata reservation always precedes the first unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(NonZeroUsize);

impl Ptr {
    /// Wraps a raw arena offset, returning `None` for zero.
    pub const fn new(offset: usize) -> Option<Self> {
        match NonZeroUsize::new(offset) {
            Some(offset) => Some(Self(offset)),
            None => None,
        }
    }

    /// Returns the raw arena offset.
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for Ptr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0.get())
    }
}

/// Point-in-time view of a [Pool]'s free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stats {
    /// Unit size in bytes.
    pub unit: usize,
    /// Usable bytes (all units, headers included).
    pub capacity: usize,
    /// Bytes held by free blocks.
    pub free_bytes: usize,
    /// Size in bytes of the largest free block.
    pub largest_free_chunk: usize,
    /// Number of blocks on the free list.
    pub free_blocks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, Alignment::Unit8; "zero clamps up")]
    #[test_case(3, Alignment::Unit8; "below minimum clamps up")]
    #[test_case(7, Alignment::Unit8; "minimum")]
    #[test_case(8, Alignment::Unit16; "between classes rounds up")]
    #[test_case(15, Alignment::Unit16; "sixteen")]
    #[test_case(31, Alignment::Unit32; "thirty two")]
    #[test_case(63, Alignment::Unit64; "sixty four")]
    #[test_case(4095, Alignment::Unit64; "above maximum clamps down")]
    fn test_alignment_from_mask(mask: usize, expected: Alignment) {
        assert_eq!(Alignment::from_mask(mask), expected);
    }

    #[test]
    fn test_alignment_mask_roundtrip() {
        for alignment in [
            Alignment::Unit8,
            Alignment::Unit16,
            Alignment::Unit32,
            Alignment::Unit64,
        ] {
            assert_eq!(Alignment::from_mask(alignment.mask()), alignment);
            assert!(alignment.unit().is_power_of_two());
        }
    }

    #[test]
    fn test_ptr_rejects_zero() {
        assert!(Ptr::new(0).is_none());
        assert_eq!(Ptr::new(24).unwrap().get(), 24);
        assert_eq!(Ptr::new(24).unwrap().to_string(), "0x18");
    }
}
