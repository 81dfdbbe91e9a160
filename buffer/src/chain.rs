use crate::{segment::Segment, Context, Error};
use bytes::{BufMut, Bytes, BytesMut};
use std::{fmt, sync::Arc};
use tracing::trace;

/// One logical packet: a list of [Segment]s, possibly viewing several data segments.
///
/// The chain owns its segments exclusively. Dropping a chain (or calling [Chain::free])
/// releases every segment.
#[derive(Default)]
pub struct Chain {
    head: Option<Box<Segment>>,
    total_len: usize,
    flags: u32,
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.total_len)
            .field("segments", &self.segments().count())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Iterator over the segments of a [Chain].
pub struct Segments<'a> {
    next: Option<&'a Segment>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a Segment;

    fn next(&mut self) -> Option<Self::Item> {
        let segment = self.next?;
        self.next = segment.next();
        Some(segment)
    }
}

/// Appends `b` to `a`, returning whichever is present if the other is not.
pub fn concat(a: Option<Chain>, b: Option<Chain>) -> Option<Chain> {
    match (a, b) {
        (Some(mut a), Some(b)) => {
            a.append(b);
            Some(a)
        }
        (a, None) => a,
        (None, b) => b,
    }
}

impl Chain {
    fn single(segment: Segment) -> Self {
        Self {
            total_len: segment.len,
            head: Some(Box::new(segment)),
            flags: 0,
        }
    }

    /// Allocates a chain of one segment holding `len` (uninitialized) bytes.
    pub fn new(ctx: &Context, len: usize, allow_drain: bool) -> Result<Self, Error> {
        let chain = Self::single(Segment::alloc(ctx, len, allow_drain)?);
        trace!(len, "allocated chain");
        Ok(chain)
    }

    /// Allocates a chain of one segment holding a copy of `bytes`.
    pub fn from_slice(ctx: &Context, bytes: &[u8], allow_drain: bool) -> Result<Self, Error> {
        let chain = Self::new(ctx, bytes.len(), allow_drain)?;
        if let Some(head) = &chain.head {
            head.data.block.write(0, bytes)?;
        }
        Ok(chain)
    }

    /// Total bytes in the chain.
    pub fn len(&self) -> usize {
        self.total_len
    }

    /// Returns true if the chain holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    /// Caller-defined flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Replaces the caller-defined flags.
    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Iterates over the segments of the chain.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            next: self.head.as_deref(),
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.total_len => Ok(()),
            _ => Err(Error::OutOfRange {
                offset,
                len,
                total: self.total_len,
            }),
        }
    }

    /// Builds a new chain viewing `len` bytes starting at `offset` (or everything after
    /// `offset` if `len` is `None`). No payload bytes are copied.
    ///
    /// If a node allocation fails part way, every node built so far is released.
    pub fn copy(
        &self,
        ctx: &Context,
        offset: usize,
        len: Option<usize>,
        allow_drain: bool,
    ) -> Result<Self, Error> {
        let len = match len {
            Some(len) => len,
            None => self
                .total_len
                .checked_sub(offset)
                .ok_or(Error::OutOfRange {
                    offset,
                    len: 0,
                    total: self.total_len,
                })?,
        };
        self.check_range(offset, len)?;

        let mut parts = Vec::new();
        let mut skip = offset;
        let mut remaining = len;
        for segment in self.segments() {
            if remaining == 0 {
                break;
            }
            if skip >= segment.len {
                skip -= segment.len;
                continue;
            }
            let take = (segment.len - skip).min(remaining);
            parts.push(Segment::alias(
                ctx,
                &segment.data,
                segment.offset + skip,
                take,
                allow_drain,
            )?);
            skip = 0;
            remaining -= take;
        }
        let head = parts.into_iter().rev().fold(None, |next, mut segment| {
            segment.next = next;
            Some(Box::new(segment))
        });
        trace!(offset, len, "copied chain");

        Ok(Self {
            head,
            total_len: len,
            flags: self.flags,
        })
    }

    /// Copies `len` bytes starting at `offset` into `dst`.
    pub fn to_buf(&self, offset: usize, len: usize, dst: &mut impl BufMut) -> Result<(), Error> {
        self.check_range(offset, len)?;
        if dst.remaining_mut() < len {
            return Err(Error::DestinationTooSmall {
                needed: len,
                remaining: dst.remaining_mut(),
            });
        }

        let mut scratch = [0u8; 64];
        let mut skip = offset;
        let mut remaining = len;
        for segment in self.segments() {
            if remaining == 0 {
                break;
            }
            if skip >= segment.len {
                skip -= segment.len;
                continue;
            }
            let end = (skip + remaining).min(segment.len);
            remaining -= end - skip;
            while skip < end {
                let n = scratch.len().min(end - skip);
                segment.read(skip, &mut scratch[..n])?;
                dst.put_slice(&scratch[..n]);
                skip += n;
            }
            skip = 0;
        }
        Ok(())
    }

    /// Fills `dst` with the bytes starting at `offset`.
    pub fn to_slice(&self, offset: usize, mut dst: &mut [u8]) -> Result<(), Error> {
        self.to_buf(offset, dst.len(), &mut dst)
    }

    /// Copies the whole chain into a new vector.
    pub fn to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::with_capacity(self.total_len);
        self.to_buf(0, self.total_len, &mut out)?;
        Ok(out)
    }

    /// Copies the whole chain into a new [Bytes].
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut out = BytesMut::with_capacity(self.total_len);
        self.to_buf(0, self.total_len, &mut out)?;
        Ok(out.freeze())
    }

    /// Overwrites the bytes starting at `offset` with `src`.
    ///
    /// Data segments are written in place, so every chain viewing them observes the write.
    pub fn write_slice(&self, offset: usize, src: &[u8]) -> Result<(), Error> {
        self.check_range(offset, src.len())?;
        let mut skip = offset;
        let mut written = 0;
        for segment in self.segments() {
            if written == src.len() {
                break;
            }
            if skip >= segment.len {
                skip -= segment.len;
                continue;
            }
            let n = (segment.len - skip).min(src.len() - written);
            segment
                .data
                .block
                .write(segment.offset + skip, &src[written..written + n])?;
            written += n;
            skip = 0;
        }
        Ok(())
    }

    /// Releases the first segment, returning the number of bytes it held.
    pub fn free_segment(&mut self) -> usize {
        let Some(head) = self.head.take() else {
            return 0;
        };
        let len = head.len;
        self.head = head.free();
        self.total_len -= len;
        len
    }

    /// Releases every segment of the chain.
    pub fn free(self) {}

    /// Appends the segments of `other`, merging flags and lengths.
    pub fn append(&mut self, mut other: Chain) {
        let mut link = &mut self.head;
        while let Some(segment) = link {
            link = &mut segment.next;
        }
        *link = other.head.take();
        self.total_len += other.total_len;
        self.flags |= other.flags;
    }

    /// Makes the first `len` bytes contiguous in one exclusively owned data segment.
    ///
    /// The chain is left untouched if the allocation or the copy fails.
    pub fn pullup(&mut self, ctx: &Context, len: usize, allow_drain: bool) -> Result<(), Error> {
        self.check_range(0, len)?;
        if len == 0 {
            return Ok(());
        }
        if let Some(head) = &mut self.head {
            if head.len >= len && Arc::get_mut(&mut head.data).is_some() {
                return Ok(());
            }
        }

        let mut merged = Segment::alloc(ctx, len, allow_drain)?;
        let mut copied = 0;
        for segment in self.segments() {
            if copied == len {
                break;
            }
            let n = segment.len.min(len - copied);
            segment
                .data
                .block
                .copy_to(segment.offset, &merged.data.block, copied, n)?;
            copied += n;
        }
        self.trim_front(len);
        merged.next = self.head.take();
        self.head = Some(Box::new(merged));
        self.total_len += len;
        trace!(len, "pulled up chain");
        Ok(())
    }

    /// Removes `len` bytes from the front (if positive) or `|len|` bytes from the back
    /// (if negative) of the chain.
    pub fn trim(&mut self, len: isize) -> Result<(), Error> {
        let n = len.unsigned_abs();
        if n > self.total_len {
            return Err(Error::OutOfRange {
                offset: 0,
                len: n,
                total: self.total_len,
            });
        }
        if len > 0 {
            self.trim_front(n);
        } else if len < 0 {
            self.truncate(self.total_len - n);
        }
        Ok(())
    }

    /// Drops `len` leading bytes. `len` must not exceed the chain length.
    fn trim_front(&mut self, len: usize) {
        let mut remaining = len;
        while remaining > 0 {
            let Some(head) = self.head.as_mut() else {
                break;
            };
            if head.len > remaining {
                head.offset += remaining;
                head.len -= remaining;
                break;
            }
            remaining -= head.len;
            if let Some(head) = self.head.take() {
                self.head = head.free();
            }
        }
        self.total_len -= len;
    }

    /// Keeps only the first `keep` bytes. `keep` must not exceed the chain length.
    fn truncate(&mut self, keep: usize) {
        if keep == 0 {
            self.head = None;
        } else {
            let mut remaining = keep;
            let mut cursor = self.head.as_deref_mut();
            while let Some(segment) = cursor {
                if segment.len >= remaining {
                    segment.len = remaining;
                    segment.next = None;
                    break;
                }
                remaining -= segment.len;
                cursor = segment.next.as_deref_mut();
            }
        }
        self.total_len = keep;
    }

    /// Removes `len` bytes starting at `offset`.
    ///
    /// Cuts that touch either end of the chain are trims. A cut inside one data segment
    /// shifts the trailing bytes over the gap when the segment is exclusively owned and
    /// otherwise splits the view in two (allocating one node). If that allocation fails,
    /// the chain is left untouched.
    pub fn cut_center(
        &mut self,
        ctx: &Context,
        offset: usize,
        len: usize,
        allow_drain: bool,
    ) -> Result<(), Error> {
        self.check_range(offset, len)?;
        if len == 0 {
            return Ok(());
        }
        if offset == 0 {
            self.trim_front(len);
            return Ok(());
        }
        if offset + len == self.total_len {
            self.truncate(offset);
            return Ok(());
        }

        // Find the segment holding the last byte before the cut
        let total = self.total_len;
        let mut prefix = 0;
        let mut cursor = self.head.as_deref_mut();
        while let Some(segment) = cursor {
            if prefix + segment.len < offset {
                prefix += segment.len;
                cursor = segment.next.as_deref_mut();
                continue;
            }
            let start = offset - prefix;
            let end = start + len;
            if end < segment.len {
                let tail = segment.len - end;
                if Arc::get_mut(&mut segment.data).is_some() {
                    let base = segment.offset;
                    segment
                        .data
                        .block
                        .copy_within(base + end, base + start, tail)?;
                    segment.len -= len;
                } else {
                    let mut split = Segment::alias(
                        ctx,
                        &segment.data,
                        segment.offset + end,
                        tail,
                        allow_drain,
                    )?;
                    split.next = segment.next.take();
                    segment.len = start;
                    segment.next = Some(Box::new(split));
                }
            } else {
                // The cut runs past this segment: shorten it, then trim the rest
                let removed = segment.len - start;
                let mut rest = Chain {
                    head: segment.next.take(),
                    total_len: total - prefix - segment.len,
                    flags: 0,
                };
                rest.trim_front(len - removed);
                segment.len = start;
                segment.next = rest.head.take();
            }
            break;
        }
        self.total_len -= len;
        trace!(offset, len, "cut chain");
        Ok(())
    }
}
