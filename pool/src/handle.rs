use crate::{arena::Arena, critical, Alignment, Error, Ptr, Stats};
use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, trace};

struct Inner {
    unit: usize,
    capacity: usize,
    /// Only ever locked while the critical section is held, so it is never contended.
    arena: Mutex<Option<Arena>>,
}

/// Handle to a fixed-size arena managed by a best-fit allocator.
///
/// Handles are cheap to clone and may be shared with interrupt-context code: every
/// operation is bracketed by [critical::acquire] and completes (or fails) without waiting
/// on anything but the section itself.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("unit", &self.inner.unit)
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl Pool {
    /// Formats `memory` as a pool with units of the given [Alignment].
    ///
    /// The first [crate::METADATA_SIZE] bytes (rounded up to the unit) are reserved and
    /// any trailing bytes that do not form a whole unit are ignored.
    pub fn init(memory: impl Into<Box<[u8]>>, alignment: Alignment) -> Result<Self, Error> {
        let memory = memory.into();
        let size = memory.len();
        let arena = {
            let _section = critical::acquire();
            Arena::new(memory, alignment)?
        };
        let (unit, capacity) = (arena.unit(), arena.capacity());
        debug!(size, unit, capacity, "initialized pool");

        Ok(Self {
            inner: Arc::new(Inner {
                unit,
                capacity,
                arena: Mutex::new(Some(arena)),
            }),
        })
    }

    /// Runs `f` against the arena inside one critical section.
    fn with<R>(&self, f: impl FnOnce(&mut Arena) -> Result<R, Error>) -> Result<R, Error> {
        let _section = critical::acquire();
        let mut arena = self
            .inner
            .arena
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(arena.as_mut().ok_or(Error::Released)?)
    }

    /// Unit size in bytes.
    pub fn unit(&self) -> usize {
        self.inner.unit
    }

    /// Bytes available for allocation (headers included) when the pool is empty.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Returns true if both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Allocates at least `nbytes` usable bytes.
    ///
    /// The request consumes `ceil(nbytes / unit) + 1` units. Returns [Error::Exhausted] if
    /// no free block is large enough.
    pub fn malloc(&self, nbytes: usize) -> Result<Ptr, Error> {
        let result = self.with(|arena| arena.malloc(nbytes));
        match &result {
            Ok(ptr) => trace!(nbytes, %ptr, "allocated block"),
            Err(err) => debug!(nbytes, ?err, "allocation failed"),
        }
        result
    }

    /// Returns the block at `ptr` to the pool, coalescing it with adjacent free blocks.
    pub fn free(&self, ptr: Ptr) -> Result<(), Error> {
        self.with(|arena| arena.free(ptr))?;
        trace!(%ptr, "freed block");
        Ok(())
    }

    /// Marks the pool unusable. The memory is not scrubbed.
    ///
    /// Every later operation (on any clone of this handle) returns [Error::Released].
    pub fn release(&self) -> Result<(), Error> {
        let arena = {
            let _section = critical::acquire();
            self.inner
                .arena
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };
        arena.ok_or(Error::Released)?;
        debug!(capacity = self.inner.capacity, "released pool");
        Ok(())
    }

    /// Total bytes held by free blocks.
    pub fn free_bytes(&self) -> Result<usize, Error> {
        self.with(|arena| Ok(arena.free_bytes()))
    }

    /// Size in bytes of the largest free block (header unit included).
    pub fn largest_free_chunk(&self) -> Result<usize, Error> {
        self.with(|arena| Ok(arena.largest_free_chunk()))
    }

    /// Snapshot of the free list.
    pub fn stats(&self) -> Result<Stats, Error> {
        self.with(|arena| Ok(arena.stats()))
    }

    /// Usable bytes of the block at `ptr`.
    pub fn size(&self, ptr: Ptr) -> Result<usize, Error> {
        self.with(|arena| arena.size_of(ptr))
    }

    /// Copies `dst.len()` bytes starting at `offset` within the block at `ptr`.
    pub fn read(&self, ptr: Ptr, offset: usize, dst: &mut [u8]) -> Result<(), Error> {
        self.with(|arena| arena.read(ptr, offset, dst))
    }

    /// Copies `src` into the block at `ptr`, starting at `offset`.
    pub fn write(&self, ptr: Ptr, offset: usize, src: &[u8]) -> Result<(), Error> {
        self.with(|arena| arena.write(ptr, offset, src))
    }

    /// Moves `len` bytes from `src` to `dst` within the block at `ptr` (ranges may overlap).
    pub fn copy_within(&self, ptr: Ptr, src: usize, dst: usize, len: usize) -> Result<(), Error> {
        self.with(|arena| arena.copy((ptr, src), (ptr, dst), len))
    }

    /// Copies `len` bytes from one block of this pool to another.
    pub fn copy(
        &self,
        (src, src_offset): (Ptr, usize),
        (dst, dst_offset): (Ptr, usize),
        len: usize,
    ) -> Result<(), Error> {
        self.with(|arena| arena.copy((src, src_offset), (dst, dst_offset), len))
    }
}
