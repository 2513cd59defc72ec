//! # ELF Segment Loader

use crate::{AllocationError, ElfError, ElfImage, PFlags};
use log::{debug, trace};

/// Granularity of [`PhysicalMemory`] requests.
pub const PAGE_SIZE: u64 = 4096;

/// Upper bound on loadable segments; [`LoadedImage`] is stack-allocated.
pub const MAX_SEGMENTS: usize = 16;

/// Supplier of physical pages at caller-chosen addresses.
pub trait PhysicalMemory {
    /// Reserve `pages` pages starting at the page-aligned address `phys`
    /// and expose them for writing.
    ///
    /// # Errors
    /// The range is not available.
    fn allocate_at(&mut self, phys: u64, pages: usize) -> Result<&mut [u8], AllocationError>;
}

impl<M: PhysicalMemory + ?Sized> PhysicalMemory for &mut M {
    fn allocate_at(&mut self, phys: u64, pages: usize) -> Result<&mut [u8], AllocationError> {
        (**self).allocate_at(phys, pages)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadOptions {
    /// Clear the bytes between a segment's file size and memory size.
    ///
    /// When `false` those bytes keep whatever the allocator handed back.
    pub zero_fill_bss: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            zero_fill_bss: true,
        }
    }
}

/// One segment after placement.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PlacedSegment {
    /// Physical address of the first segment byte.
    pub phys: u64,
    /// Bytes copied from the file.
    pub copied: u64,
    /// Declared in-memory size.
    pub mem_size: u64,
    pub flags: PFlags,
}

/// Result of [`ElfImage::load_segments`].
#[derive(Debug, Copy, Clone)]
pub struct LoadedImage {
    entry: u64,
    segments: [PlacedSegment; MAX_SEGMENTS],
    count: usize,
}

impl LoadedImage {
    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    #[must_use]
    pub fn segments(&self) -> &[PlacedSegment] {
        &self.segments[..self.count]
    }

    /// Lowest and highest physical address covered by any segment.
    #[must_use]
    pub fn phys_span(&self) -> Option<(u64, u64)> {
        let start = self.segments().iter().map(|s| s.phys).min()?;
        let end = self.segments().iter().map(|s| s.phys + s.mem_size).max()?;
        Some((start, end))
    }
}

impl ElfImage<'_> {
    /// Place every `PT_LOAD` segment at its physical address.
    ///
    /// Segments with an empty memory image are skipped. Everything else is
    /// ignored.
    ///
    /// # Errors
    /// [`ElfError::TooManySegments`] before any allocation if the image has
    /// more than [`MAX_SEGMENTS`] loadable segments, or
    /// [`ElfError::Allocation`] if the memory provider refuses a range, or
    /// [`ElfError::UnsupportedFormat`] if a segment's memory size does not
    /// fit the address space.
    pub fn load_segments<M: PhysicalMemory>(
        &self,
        memory: &mut M,
        options: LoadOptions,
    ) -> Result<LoadedImage, ElfError> {
        let loadable = self
            .program_headers()
            .filter(|ph| ph.is_loadable() && ph.memsz != 0)
            .count();
        if loadable > MAX_SEGMENTS {
            return Err(ElfError::TooManySegments(MAX_SEGMENTS));
        }

        let mut loaded = LoadedImage {
            entry: self.entry(),
            segments: [PlacedSegment::default(); MAX_SEGMENTS],
            count: 0,
        };

        for ph in self.program_headers() {
            if !ph.is_loadable() || ph.memsz == 0 {
                continue;
            }

            let data = self
                .segment_data(&ph)
                .ok_or(ElfError::UnsupportedFormat("segment data outside the file"))?;

            // Page-rounded allocation window (physical)
            let alloc_start = ph.paddr & !(PAGE_SIZE - 1);
            let in_page = usize::try_from(ph.paddr - alloc_start)
                .map_err(|_| ElfError::UnsupportedFormat("segment address"))?;
            let mem_len = usize::try_from(ph.memsz)
                .map_err(|_| ElfError::UnsupportedFormat("segment too large"))?;
            let end = in_page
                .checked_add(mem_len)
                .ok_or(ElfError::UnsupportedFormat("segment too large"))?;
            let pages = end.div_ceil(PAGE_SIZE as usize);

            let window = memory.allocate_at(alloc_start, pages)?;
            let dst = window
                .get_mut(in_page..end)
                .ok_or(ElfError::UnsupportedFormat("segment outside its allocation"))?;
            dst[..data.len()].copy_from_slice(data);
            if options.zero_fill_bss {
                dst[data.len()..].fill(0);
            }

            debug!(
                "ELF: placed {} segment at {:#x} ({:#x} file / {:#x} memory bytes, {pages} pages)",
                ph.flags, ph.paddr, ph.filesz, ph.memsz
            );

            loaded.segments[loaded.count] = PlacedSegment {
                phys: ph.paddr,
                copied: ph.filesz,
                mem_size: ph.memsz,
                flags: ph.flags,
            };
            loaded.count += 1;
        }

        trace!("ELF: {} segments placed", loaded.count);
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ElfBuilder, RamWindow};

    fn rw() -> PFlags {
        PFlags::new().with_read(true).with_write(true)
    }

    #[test]
    fn copies_file_bytes_to_physical_address() {
        let bytes = ElfBuilder::new(0x10_0010)
            .segment(0x10_0010, PFlags::new().with_execute(true), b"\x90\x90\xC3", 0)
            .segment(0x10_2000, rw(), &[0xAB; 100], 0)
            .build();
        let image = ElfImage::parse(&bytes).unwrap();
        let mut ram = RamWindow::new(0x10_0000, 0x1_0000);

        let loaded = image.load_segments(&mut ram, LoadOptions::default()).unwrap();
        assert_eq!(loaded.entry(), 0x10_0010);
        assert_eq!(loaded.segments().len(), 2);
        assert_eq!(ram.read(0x10_0010, 3), b"\x90\x90\xC3");
        assert_eq!(ram.read(0x10_2000, 100), [0xAB; 100]);
        assert_eq!(ram.allocations(), [(0x10_0000, 1), (0x10_2000, 1)]);
        assert_eq!(loaded.phys_span(), Some((0x10_0010, 0x10_2064)));
    }

    #[test]
    fn bss_is_zeroed_by_default() {
        let bytes = ElfBuilder::new(0x10_0000)
            .segment(0x10_0000, rw(), b"init", 0x2000)
            .build();
        let image = ElfImage::parse(&bytes).unwrap();

        let mut ram = RamWindow::filled(0x10_0000, 0x4000, 0xCC);
        let loaded = image.load_segments(&mut ram, LoadOptions::default()).unwrap();
        assert_eq!(loaded.segments()[0].copied, 4);
        assert_eq!(loaded.segments()[0].mem_size, 0x2004);
        assert_eq!(ram.read(0x10_0000, 4), b"init");
        assert!(ram.read(0x10_0004, 0x2000).iter().all(|&b| b == 0));
        // Three pages are reserved for 0x2004 bytes.
        assert_eq!(ram.allocations(), [(0x10_0000, 3)]);
    }

    #[test]
    fn bss_left_alone_when_asked() {
        let bytes = ElfBuilder::new(0x10_0000)
            .segment(0x10_0000, rw(), b"init", 0x10)
            .build();
        let image = ElfImage::parse(&bytes).unwrap();

        let mut ram = RamWindow::filled(0x10_0000, 0x1000, 0xCC);
        image
            .load_segments(&mut ram, LoadOptions { zero_fill_bss: false })
            .unwrap();
        assert_eq!(ram.read(0x10_0000, 4), b"init");
        assert!(ram.read(0x10_0004, 0x10).iter().all(|&b| b == 0xCC));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let bytes = ElfBuilder::new(0x40_0000)
            .segment(0x40_0000, rw(), b"x", 0)
            .build();
        let image = ElfImage::parse(&bytes).unwrap();
        let mut ram = RamWindow::new(0x10_0000, 0x1000);

        assert_eq!(
            image.load_segments(&mut ram, LoadOptions::default()).unwrap_err(),
            ElfError::Allocation(AllocationError {
                phys: 0x40_0000,
                pages: 1
            })
        );
    }

    #[test]
    fn too_many_segments_rejected_before_allocating() {
        let mut builder = ElfBuilder::new(0x10_0000);
        for i in 0..=MAX_SEGMENTS as u64 {
            builder = builder.segment(0x10_0000 + i * PAGE_SIZE, rw(), b"s", 0);
        }
        let bytes = builder.build();
        let image = ElfImage::parse(&bytes).unwrap();
        let mut ram = RamWindow::new(0x10_0000, 0x10_0000);

        assert_eq!(
            image.load_segments(&mut ram, LoadOptions::default()).unwrap_err(),
            ElfError::TooManySegments(MAX_SEGMENTS)
        );
        assert!(ram.allocations().is_empty());
    }
}
