//! # Boot Arena
//!
//! A bump allocator over one firmware-reported usable memory region.
//!
//! Everything the pipeline allocates for itself (directory scratch buffers,
//! the kernel file, the configuration file, page tables, the boot info)
//! comes from here. Allocations are handed out as [`ArenaSlot`]s, which are
//! offsets into the region rather than pointers; the bytes are reached
//! through the arena, and the physical address is derived from the region's
//! physical base when something has to be handed to the CPU.
//!
//! ```text
//!  phys_base                                  top                  end
//!  ├──────────┬─────┬───────────────┬─────────┼────────────────────┤
//!  │ dir blk  │ pad │  kernel file  │ tables  │      remaining     │
//!  └──────────┴─────┴───────────────┴─────────┴────────────────────┘
//! ```
//!
//! There is no individual free. [`Arena::mark`] and [`Arena::release`] give
//! stack discipline: everything allocated after a mark is dropped at once.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::fmt;
use log::trace;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("The arena is exhausted: {requested} bytes requested, {remaining} bytes remaining")]
    OutOfMemory { requested: usize, remaining: usize },
    #[error("The alignment {0} is not a power of two")]
    InvalidAlignment(usize),
}

/// A region handed out by an [`Arena`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ArenaSlot {
    offset: usize,
    len: usize,
}

impl ArenaSlot {
    /// Offset of the slot from the start of the arena.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first `len` bytes of this slot.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            offset: self.offset,
            len: len.min(self.len),
        }
    }
}

/// Opaque bump position returned by [`Arena::mark`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ArenaMark(usize);

pub struct Arena<'m> {
    memory: &'m mut [u8],
    phys_base: u64,
    top: usize,
}

impl<'m> Arena<'m> {
    /// Manage `memory`, which the CPU sees at physical address `phys_base`.
    pub const fn new(memory: &'m mut [u8], phys_base: u64) -> Self {
        Self {
            memory,
            phys_base,
            top: 0,
        }
    }

    /// Manage an identity-mapped region handed over by the firmware.
    ///
    /// # Safety
    /// `[base, base + len)` must be usable RAM, identity mapped, and not
    /// referenced by anything else for the lifetime `'m`.
    pub unsafe fn from_identity_mapped(base: u64, len: usize) -> Self {
        let memory = unsafe { core::slice::from_raw_parts_mut(base as usize as *mut u8, len) };
        Self::new(memory, base)
    }

    #[must_use]
    pub const fn phys_base(&self) -> u64 {
        self.phys_base
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.memory.len()
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.top
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.memory.len() - self.top
    }

    /// Reserve `len` bytes whose *physical* address is a multiple of `align`.
    ///
    /// The contents are whatever the region held before.
    ///
    /// # Errors
    /// [`ArenaError::OutOfMemory`] if the region cannot fit the request, or
    /// [`ArenaError::InvalidAlignment`] for a non power-of-two alignment.
    pub fn alloc(&mut self, len: usize, align: usize) -> Result<ArenaSlot, ArenaError> {
        if !align.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment(align));
        }

        let out_of_memory = ArenaError::OutOfMemory {
            requested: len,
            remaining: self.remaining(),
        };

        let align = align as u64;
        let here = self.phys_base + self.top as u64;
        let padding = usize::try_from(here.next_multiple_of(align) - here)
            .map_err(|_| out_of_memory)?;
        let offset = self.top.checked_add(padding).ok_or(out_of_memory)?;
        let end = offset.checked_add(len).ok_or(out_of_memory)?;
        if end > self.memory.len() {
            return Err(out_of_memory);
        }

        self.top = end;
        trace!(
            "arena: {len} bytes at {:#x} ({} remaining)",
            self.phys_base + offset as u64,
            self.remaining()
        );
        Ok(ArenaSlot { offset, len })
    }

    /// Like [`alloc`](Self::alloc), with the slot cleared to zero.
    ///
    /// # Errors
    /// See [`alloc`](Self::alloc).
    pub fn alloc_zeroed(&mut self, len: usize, align: usize) -> Result<ArenaSlot, ArenaError> {
        let slot = self.alloc(len, align)?;
        self.bytes_mut(slot).fill(0);
        Ok(slot)
    }

    /// Copy `value` into a new slot aligned for `T`.
    ///
    /// # Errors
    /// See [`alloc`](Self::alloc).
    pub fn alloc_value<T: Copy>(&mut self, value: &T) -> Result<ArenaSlot, ArenaError> {
        let slot = self.alloc(size_of::<T>(), align_of::<T>())?;
        let dst = self.bytes_mut(slot).as_mut_ptr().cast::<T>();
        // SAFETY: the slot is `size_of::<T>()` bytes long. Only its physical
        // address is aligned, so the write through this view is unaligned.
        unsafe {
            dst.write_unaligned(*value);
        }
        Ok(slot)
    }

    #[must_use]
    pub fn bytes(&self, slot: ArenaSlot) -> &[u8] {
        &self.memory[slot.offset..slot.offset + slot.len]
    }

    #[must_use]
    pub fn bytes_mut(&mut self, slot: ArenaSlot) -> &mut [u8] {
        &mut self.memory[slot.offset..slot.offset + slot.len]
    }

    /// Physical address the CPU sees for the start of `slot`.
    #[must_use]
    pub const fn phys_addr(&self, slot: ArenaSlot) -> u64 {
        self.phys_base + slot.offset as u64
    }

    #[must_use]
    pub const fn mark(&self) -> ArenaMark {
        ArenaMark(self.top)
    }

    /// Drop every allocation made since `mark`.
    ///
    /// Slots handed out after the mark must not be used afterwards; their
    /// bytes will be handed out again.
    pub fn release(&mut self, mark: ArenaMark) {
        debug_assert!(mark.0 <= self.top, "arena mark is newer than the arena");
        if mark.0 <= self.top {
            self.top = mark.0;
        }
    }
}

impl fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("phys_base", &format_args!("{:#x}", self.phys_base))
            .field("capacity", &self.capacity())
            .field("used", &self.top)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_follows_physical_address() {
        let mut backing = vec![0u8; 0x4000];
        // Physical base is deliberately not page aligned.
        let mut arena = Arena::new(&mut backing, 0x10_0800);

        let first = arena.alloc(16, 1).unwrap();
        assert_eq!(arena.phys_addr(first), 0x10_0800);

        let page = arena.alloc(0x1000, 0x1000).unwrap();
        assert_eq!(arena.phys_addr(page), 0x10_1000);
        assert_eq!(page.offset(), 0x800);
        assert_eq!(arena.used(), 0x1800);
    }

    #[test]
    fn exhaustion_reports_remaining() {
        let mut backing = vec![0u8; 64];
        let mut arena = Arena::new(&mut backing, 0);
        arena.alloc(48, 8).unwrap();
        assert_eq!(
            arena.alloc(32, 8),
            Err(ArenaError::OutOfMemory {
                requested: 32,
                remaining: 16
            })
        );
        // A failed request does not move the top.
        assert_eq!(arena.used(), 48);
    }

    #[test]
    fn rejects_bad_alignment() {
        let mut backing = vec![0u8; 64];
        let mut arena = Arena::new(&mut backing, 0);
        assert_eq!(arena.alloc(8, 3), Err(ArenaError::InvalidAlignment(3)));
    }

    #[test]
    fn release_rewinds_to_mark() {
        let mut backing = vec![0xAAu8; 256];
        let mut arena = Arena::new(&mut backing, 0x1000);
        let keep = arena.alloc(32, 1).unwrap();
        let mark = arena.mark();
        arena.alloc(64, 1).unwrap();
        arena.alloc(64, 1).unwrap();
        arena.release(mark);
        assert_eq!(arena.used(), 32);

        let again = arena.alloc_zeroed(16, 1).unwrap();
        assert_eq!(again.offset(), 32);
        assert!(arena.bytes(again).iter().all(|&b| b == 0));
        assert!(arena.bytes(keep).iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn values_are_copied_in_place() {
        #[derive(Copy, Clone)]
        #[repr(C)]
        struct Pair {
            a: u32,
            b: u32,
            c: u64,
        }

        let mut backing = vec![0u8; 64];
        let mut arena = Arena::new(&mut backing, 0x2001);
        let slot = arena.alloc_value(&Pair { a: 7, b: 9, c: 0x1122 }).unwrap();
        assert_eq!(arena.phys_addr(slot) % 8, 0);
        let bytes = arena.bytes(slot);
        assert_eq!(&bytes[0..4], &7u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &9u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x1122u64.to_le_bytes());
    }
}
