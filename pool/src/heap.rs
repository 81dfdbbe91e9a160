//! Carve one or two pools from the memory region supplied at startup.
//!
//! Boards typically reserve a single statically sized region for dynamic memory. The heap
//! splits it into a primary pool and, optionally, a secondary pool taken from the end of the
//! region (for example a pool dedicated to packet buffers so that protocol traffic can never
//! starve other allocations).
//!
//! # Example
//!
//! ```rust
//! use netcore_pool::{heap::{Config, Heap}, Alignment};
//! use std::num::NonZeroUsize;
//!
//! let cfg = Config {
//!     alignment: Alignment::Unit16,
//!     secondary: NonZeroUsize::new(1024),
//! };
//! let heap = Heap::zeroed(4096, cfg).unwrap();
//! assert!(heap.secondary().is_some());
//! ```

use crate::{Alignment, Error, Pool};
use std::num::NonZeroUsize;
use tracing::debug;

/// Configuration for [Heap::bootstrap].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Config {
    /// Unit size class shared by both pools.
    pub alignment: Alignment,

    /// Bytes split off the end of the region into a secondary pool, if any.
    pub secondary: Option<NonZeroUsize>,
}

/// The pools carved from the startup region.
#[derive(Clone, Debug)]
pub struct Heap {
    primary: Pool,
    secondary: Option<Pool>,
}

impl Heap {
    /// Splits `memory` according to `cfg` and initializes each part as a [Pool].
    ///
    /// Returns [Error::TooSmall] if either part cannot hold a pool.
    pub fn bootstrap(memory: impl Into<Vec<u8>>, cfg: Config) -> Result<Self, Error> {
        let mut memory = memory.into();
        let size = memory.len();
        let secondary = match cfg.secondary {
            Some(bytes) => {
                let bytes = bytes.get();
                let Some(split) = size.checked_sub(bytes) else {
                    return Err(Error::TooSmall {
                        size,
                        required: bytes,
                    });
                };
                let tail = memory.split_off(split);
                Some(Pool::init(tail, cfg.alignment)?)
            }
            None => None,
        };
        let primary = Pool::init(memory, cfg.alignment)?;
        debug!(
            size,
            primary = primary.capacity(),
            secondary = secondary.as_ref().map_or(0, Pool::capacity),
            "bootstrapped heap"
        );

        Ok(Self { primary, secondary })
    }

    /// Bootstraps a heap over a freshly zeroed region of `size` bytes.
    pub fn zeroed(size: usize, cfg: Config) -> Result<Self, Error> {
        Self::bootstrap(vec![0u8; size], cfg)
    }

    /// The pool formed by the start of the region.
    pub fn primary(&self) -> &Pool {
        &self.primary
    }

    /// The pool formed by the end of the region, if one was requested.
    pub fn secondary(&self) -> Option<&Pool> {
        self.secondary.as_ref()
    }

    /// Releases every pool of the heap.
    pub fn release(&self) -> Result<(), Error> {
        self.primary.release()?;
        if let Some(secondary) = &self.secondary {
            secondary.release()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcore_macros::test_traced;

    #[test_traced]
    fn test_single_pool() {
        let heap = Heap::zeroed(1024, Config::default()).unwrap();
        assert!(heap.secondary().is_none());
        assert_eq!(heap.primary().unit(), 8);
        assert_eq!(heap.primary().capacity(), 1024 - 16);
    }

    #[test_traced]
    fn test_split_pools() {
        let cfg = Config {
            alignment: Alignment::Unit32,
            secondary: NonZeroUsize::new(512),
        };
        let heap = Heap::zeroed(2048, cfg).unwrap();
        let primary = heap.primary();
        let secondary = heap.secondary().unwrap();
        assert_eq!(primary.capacity(), 2048 - 512 - 32);
        assert_eq!(secondary.capacity(), 512 - 32);
        assert!(!primary.ptr_eq(secondary));

        // Exhausting one pool leaves the other untouched
        let ptr = secondary.malloc(512 - 64).unwrap();
        assert!(secondary.malloc(0).is_err());
        assert!(primary.malloc(512).is_ok());
        secondary.free(ptr).unwrap();

        heap.release().unwrap();
        assert_eq!(primary.malloc(1), Err(Error::Released));
        assert_eq!(secondary.malloc(1), Err(Error::Released));
    }

    #[test_traced]
    fn test_split_too_large() {
        let cfg = Config {
            alignment: Alignment::Unit8,
            secondary: NonZeroUsize::new(4096),
        };
        assert_eq!(
            Heap::zeroed(1024, cfg).unwrap_err(),
            Error::TooSmall {
                size: 1024,
                required: 4096
            }
        );

        // The primary pool needs room too
        let cfg = Config {
            alignment: Alignment::Unit8,
            secondary: NonZeroUsize::new(1020),
        };
        assert!(matches!(
            Heap::zeroed(1024, cfg),
            Err(Error::TooSmall { size: 4, .. })
        ));
    }
}
