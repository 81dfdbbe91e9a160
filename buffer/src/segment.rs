use crate::{context::Lease, Context, Error, NODE_SIZE};
use std::sync::Arc;

/// Payload storage shared by every [Segment] that views it.
///
/// The reference count lives in the surrounding [Arc], outside the pool, so `block` holds
/// exactly `capacity` payload bytes with no counter word in front of them.
pub(crate) struct Data {
    pub(crate) block: Lease,
    pub(crate) capacity: usize,
}

/// One contiguous view into a data segment.
///
/// Several segments (in the same or different chains) may view the same data segment; it
/// is returned to its pool when the last of them is freed.
pub struct Segment {
    pub(crate) next: Option<Box<Segment>>,
    pub(crate) data: Arc<Data>,
    pub(crate) offset: usize,
    pub(crate) len: usize,
    _node: Lease,
}

impl Segment {
    /// Allocates a node and a fresh data segment of `len` bytes.
    ///
    /// The pool is charged [NODE_SIZE] bytes for the node and `len` bytes for the data.
    ///
    /// The node is allocated first. If the data allocation then fails, the node is released
    /// before the error is returned.
    pub(crate) fn alloc(ctx: &Context, len: usize, allow_drain: bool) -> Result<Self, Error> {
        let node = ctx.lease(NODE_SIZE, allow_drain)?;
        let block = ctx.lease(len, allow_drain)?;
        Ok(Self {
            next: None,
            data: Arc::new(Data {
                block,
                capacity: len,
            }),
            offset: 0,
            len,
            _node: node,
        })
    }

    /// Allocates a node viewing `len` bytes of `data` starting at `offset`.
    pub(crate) fn alias(
        ctx: &Context,
        data: &Arc<Data>,
        offset: usize,
        len: usize,
        allow_drain: bool,
    ) -> Result<Self, Error> {
        let node = ctx.lease(NODE_SIZE, allow_drain)?;
        Ok(Self {
            next: None,
            data: data.clone(),
            offset,
            len,
            _node: node,
        })
    }

    /// Releases this node (and its data segment, if this was the last view of it),
    /// returning the segment that followed it.
    pub(crate) fn free(mut self: Box<Self>) -> Option<Box<Segment>> {
        self.next.take()
    }

    /// Copies `dst.len()` bytes of this view, starting `offset` bytes into it.
    pub(crate) fn read(&self, offset: usize, dst: &mut [u8]) -> Result<(), Error> {
        self.data.block.read(self.offset + offset, dst)
    }

    /// Bytes visible through this segment.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the view within its data segment.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the underlying data segment.
    pub fn capacity(&self) -> usize {
        self.data.capacity
    }

    /// Returns true if another segment views the same data segment.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.data) > 1
    }

    /// Returns true if both segments view the same data segment.
    pub fn shares_data(&self, other: &Segment) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// The next segment of the chain.
    pub fn next(&self) -> Option<&Segment> {
        self.next.as_deref()
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Unlink iteratively so long chains cannot overflow the stack
        let mut next = self.next.take();
        while let Some(mut segment) = next {
            next = segment.next.take();
        }
    }
}
