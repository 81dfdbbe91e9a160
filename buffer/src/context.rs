use crate::Error;
use netcore_pool::{Error as PoolError, Pool, Ptr};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// Hook invoked to reclaim memory before a failed allocation is retried.
pub type Drain = Arc<dyn Fn() + Send + Sync>;

/// Pool (and optional drain hook) that buffer operations allocate from.
///
/// Contexts are cheap to clone. The drain hook is called outside of any critical section,
/// so it may free chains (and therefore pool blocks) itself.
#[derive(Clone)]
pub struct Context {
    pool: Pool,
    drain: Option<Drain>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("pool", &self.pool)
            .field("drain", &self.drain.is_some())
            .finish()
    }
}

impl Context {
    /// Creates a context without a drain hook.
    pub fn new(pool: Pool) -> Self {
        Self { pool, drain: None }
    }

    /// Installs `drain` as the hook invoked when an allocation permitted to drain fails.
    pub fn with_drain(mut self, drain: impl Fn() + Send + Sync + 'static) -> Self {
        self.drain = Some(Arc::new(drain));
        self
    }

    /// The pool allocations are drawn from.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Allocates `nbytes` from the pool.
    ///
    /// If the pool is exhausted and `allow_drain` is set, the drain hook (if any) runs once
    /// and the allocation is retried exactly once, whatever the hook did.
    pub(crate) fn lease(&self, nbytes: usize, allow_drain: bool) -> Result<Lease, Error> {
        let ptr = match self.pool.malloc(nbytes) {
            Ok(ptr) => ptr,
            Err(PoolError::Exhausted(_)) if allow_drain => {
                if let Some(drain) = &self.drain {
                    debug!(nbytes, "draining before retry");
                    drain();
                }
                self.pool.malloc(nbytes)?
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Lease {
            pool: self.pool.clone(),
            ptr,
        })
    }
}

/// A pool block that is returned to its pool when dropped.
pub(crate) struct Lease {
    pool: Pool,
    ptr: Ptr,
}

impl Lease {
    pub(crate) fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), Error> {
        Ok(self.pool.read(self.ptr, offset, dst)?)
    }

    pub(crate) fn write(&self, offset: usize, src: &[u8]) -> Result<(), Error> {
        Ok(self.pool.write(self.ptr, offset, src)?)
    }

    pub(crate) fn copy_within(&self, src: usize, dst: usize, len: usize) -> Result<(), Error> {
        Ok(self.pool.copy_within(self.ptr, src, dst, len)?)
    }

    /// Copies `len` bytes at `offset` into `dst` (which may belong to another pool).
    pub(crate) fn copy_to(
        &self,
        offset: usize,
        dst: &Lease,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), Error> {
        if self.pool.ptr_eq(&dst.pool) {
            return Ok(self
                .pool
                .copy((self.ptr, offset), (dst.ptr, dst_offset), len)?);
        }
        let mut scratch = [0u8; 64];
        let mut copied = 0;
        while copied < len {
            let n = scratch.len().min(len - copied);
            self.read(offset + copied, &mut scratch[..n])?;
            dst.write(dst_offset + copied, &scratch[..n])?;
            copied += n;
        }
        Ok(())
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Err(err) = self.pool.free(self.ptr) {
            warn!(ptr = %self.ptr, ?err, "failed to release block");
        }
    }
}
