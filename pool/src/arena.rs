//! Index-addressed free list over one owned byte arena.
//!
//! Headers are stored in the arena bytes themselves: a free block starts with its size in
//! units followed by the unit index of the next free block, and an allocated block starts
//! with its size in units. The free list is circular and, walked from any block, visits blocks
//! in ascending unit order except for exactly one wrap edge (highest to lowest).

use crate::{Alignment, Error, Ptr, Stats};
use std::ops::Range;

/// Bytes reserved at the start of every arena for pool metadata.
pub const METADATA_SIZE: usize = 16;

/// Offset of the size field within a header.
const SIZE_FIELD: usize = 0;

/// Offset of the next-block field within a free-block header.
const NEXT_FIELD: usize = 4;

/// A free block: `(unit index, size in units)`.
type Free = (u32, u32);

pub(crate) struct Arena {
    memory: Box<[u8]>,
    unit: usize,
    /// Byte offset of unit 0.
    base: usize,
    units: u32,
    /// Block from which the next scan starts (`None` when nothing is free).
    cursor: Option<u32>,
}

impl Arena {
    /// Formats `memory` as a single free block spanning every whole unit after the
    /// metadata reservation.
    pub fn new(memory: Box<[u8]>, alignment: Alignment) -> Result<Self, Error> {
        let unit = alignment.unit();
        let size = memory.len();
        let base = METADATA_SIZE.next_multiple_of(unit);
        let required = base + unit;
        if size < required {
            return Err(Error::TooSmall { size, required });
        }
        let units = u32::try_from((size - base) / unit).map_err(|_| Error::TooLarge(size))?;

        let mut arena = Self {
            memory,
            unit,
            base,
            units,
            cursor: Some(0),
        };
        arena.set_size(0, units);
        arena.set_next(0, 0);
        Ok(arena)
    }

    pub fn unit(&self) -> usize {
        self.unit
    }

    pub fn capacity(&self) -> usize {
        self.units as usize * self.unit
    }

    fn offset(&self, block: u32) -> usize {
        self.base + block as usize * self.unit
    }

    fn field(&self, block: u32, field: usize) -> u32 {
        let start = self.offset(block) + field;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.memory[start..start + 4]);
        u32::from_ne_bytes(raw)
    }

    fn set_field(&mut self, block: u32, field: usize, value: u32) {
        let start = self.offset(block) + field;
        self.memory[start..start + 4].copy_from_slice(&value.to_ne_bytes());
    }

    fn size(&self, block: u32) -> u32 {
        self.field(block, SIZE_FIELD)
    }

    fn set_size(&mut self, block: u32, size: u32) {
        self.set_field(block, SIZE_FIELD, size);
    }

    fn next(&self, block: u32) -> u32 {
        self.field(block, NEXT_FIELD)
    }

    fn set_next(&mut self, block: u32, next: u32) {
        self.set_field(block, NEXT_FIELD, next);
    }

    /// Returns the pointer handed out for an allocated block starting at `block`.
    fn ptr(&self, block: u32) -> Ptr {
        Ptr::new(self.offset(block) + self.unit).expect("metadata precedes every unit")
    }

    /// Returns the number of units (header included) needed to serve `nbytes`.
    fn units_for(&self, nbytes: usize) -> Option<u32> {
        let units = nbytes.div_ceil(self.unit).checked_add(1)?;
        u32::try_from(units).ok()
    }

    /// Serves `nbytes` from the smallest free block that fits.
    ///
    /// The scan starts after the cursor and visits every free block once. Ties go to the
    /// block found first. An exact fit is unlinked; a larger block shrinks in place and the
    /// allocation is carved from its high-address end.
    pub fn malloc(&mut self, nbytes: usize) -> Result<Ptr, Error> {
        let needed = self.units_for(nbytes).ok_or(Error::Exhausted(nbytes))?;
        let cursor = self.cursor.ok_or(Error::Exhausted(nbytes))?;

        // Find the best fit, remembering the block that precedes it
        let mut best: Option<(u32, Free)> = None;
        let mut prev = cursor;
        loop {
            let block = self.next(prev);
            let size = self.size(block);
            if size >= needed && best.map_or(true, |(_, (_, best_size))| size < best_size) {
                best = Some((prev, (block, size)));
                if size == needed {
                    break;
                }
            }
            prev = block;
            if prev == cursor {
                break;
            }
        }
        let (prev, (block, size)) = best.ok_or(Error::Exhausted(nbytes))?;

        let start = if size == needed {
            if prev == block {
                self.cursor = None;
            } else {
                let next = self.next(block);
                self.set_next(prev, next);
                self.cursor = Some(prev);
            }
            block
        } else {
            let remaining = size - needed;
            self.set_size(block, remaining);
            self.cursor = Some(prev);
            block + remaining
        };
        self.set_size(start, needed);
        Ok(self.ptr(start))
    }

    /// Resolves `ptr` to its block, validating alignment and the recorded header.
    fn block(&self, ptr: Ptr) -> Result<Free, Error> {
        let offset = ptr.get();
        if offset < self.base + self.unit || (offset - self.base) % self.unit != 0 {
            return Err(Error::InvalidPointer(offset));
        }
        let block = (offset - self.base) / self.unit - 1;
        if block >= self.units as usize {
            return Err(Error::InvalidPointer(offset));
        }
        let block = block as u32;
        let size = self.size(block);
        if size == 0 || block as usize + size as usize > self.units as usize {
            return Err(Error::InvalidPointer(offset));
        }
        Ok((block, size))
    }

    /// Returns true if free block `free` shares any unit with `(block, size)`.
    fn overlaps(&self, free: u32, (block, size): Free) -> bool {
        free < block + size && block < free + self.size(free)
    }

    /// Returns `ptr`'s block to the free list, merging it with the free blocks that
    /// immediately precede and follow it in address order.
    pub fn free(&mut self, ptr: Ptr) -> Result<(), Error> {
        let (block, size) = self.block(ptr)?;
        let Some(cursor) = self.cursor else {
            self.set_next(block, block);
            self.cursor = Some(block);
            return Ok(());
        };

        // Locate the free blocks straddling `block` (the wrap edge straddles everything
        // above the highest and below the lowest free block)
        let mut prev = cursor;
        let mut steps = 0u32;
        loop {
            if self.overlaps(prev, (block, size)) {
                return Err(Error::DoubleFree(ptr.get()));
            }
            let next = self.next(prev);
            if (prev < block && block < next) || (prev >= next && (block > prev || block < next))
            {
                break;
            }
            prev = next;
            steps += 1;
            if steps > self.units {
                return Err(Error::Corrupted);
            }
        }
        let next = self.next(prev);
        if self.overlaps(next, (block, size)) {
            return Err(Error::DoubleFree(ptr.get()));
        }

        let prev_size = self.size(prev);
        let next_size = self.size(next);
        let upper = block + size == next;
        let lower = prev + prev_size == block;
        match (lower, upper) {
            (true, true) => {
                let after = self.next(next);
                self.set_size(prev, prev_size + size + next_size);
                self.set_next(prev, after);
            }
            (true, false) => {
                self.set_size(prev, prev_size + size);
            }
            (false, true) if next == prev => {
                // The only free block follows us: the merged block is the whole list
                self.set_size(block, size + next_size);
                self.set_next(block, block);
                self.cursor = Some(block);
                return Ok(());
            }
            (false, true) => {
                let after = self.next(next);
                self.set_size(block, size + next_size);
                self.set_next(block, after);
                self.set_next(prev, block);
            }
            (false, false) => {
                self.set_size(block, size);
                self.set_next(block, next);
                self.set_next(prev, block);
            }
        }
        self.cursor = Some(prev);
        Ok(())
    }

    /// Iterates over the free list starting after the cursor.
    fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            arena: self,
            next: self.cursor.map(|cursor| self.next(cursor)),
        }
    }

    pub fn free_bytes(&self) -> usize {
        self.free_blocks()
            .map(|(_, size)| size as usize * self.unit)
            .sum()
    }

    pub fn largest_free_chunk(&self) -> usize {
        self.free_blocks()
            .map(|(_, size)| size as usize * self.unit)
            .max()
            .unwrap_or(0)
    }

    pub fn stats(&self) -> Stats {
        let mut stats = Stats {
            unit: self.unit,
            capacity: self.capacity(),
            free_bytes: 0,
            largest_free_chunk: 0,
            free_blocks: 0,
        };
        for (_, size) in self.free_blocks() {
            let bytes = size as usize * self.unit;
            stats.free_bytes += bytes;
            stats.largest_free_chunk = stats.largest_free_chunk.max(bytes);
            stats.free_blocks += 1;
        }
        stats
    }

    /// Returns the usable bytes of the block at `ptr`.
    pub fn size_of(&self, ptr: Ptr) -> Result<usize, Error> {
        let (_, size) = self.block(ptr)?;
        Ok((size as usize - 1) * self.unit)
    }

    /// Returns the arena range covering `len` bytes at `offset` within the block at `ptr`.
    fn span(&self, ptr: Ptr, offset: usize, len: usize) -> Result<Range<usize>, Error> {
        let size = self.size_of(ptr)?;
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(ptr.get() + offset..ptr.get() + end),
            _ => Err(Error::OutOfBounds { offset, len, size }),
        }
    }

    pub fn read(&self, ptr: Ptr, offset: usize, dst: &mut [u8]) -> Result<(), Error> {
        let range = self.span(ptr, offset, dst.len())?;
        dst.copy_from_slice(&self.memory[range]);
        Ok(())
    }

    pub fn write(&mut self, ptr: Ptr, offset: usize, src: &[u8]) -> Result<(), Error> {
        let range = self.span(ptr, offset, src.len())?;
        self.memory[range].copy_from_slice(src);
        Ok(())
    }

    /// Copies `len` bytes between (possibly overlapping) locations of two blocks.
    pub fn copy(
        &mut self,
        (src, src_offset): (Ptr, usize),
        (dst, dst_offset): (Ptr, usize),
        len: usize,
    ) -> Result<(), Error> {
        let from = self.span(src, src_offset, len)?;
        let to = self.span(dst, dst_offset, len)?;
        self.memory.copy_within(from, to.start);
        Ok(())
    }
}

struct FreeBlocks<'a> {
    arena: &'a Arena,
    next: Option<u32>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = Free;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.next?;
        self.next = match self.arena.cursor {
            Some(cursor) if block != cursor => Some(self.arena.next(block)),
            _ => None,
        };
        Some((block, self.arena.size(block)))
    }
}
