//! # Test Fixtures
//!
//! [`ElfBuilder`] writes minimal executables; [`RamWindow`] is a
//! [`PhysicalMemory`] backed by a plain buffer at a fake physical base.

use crate::header::{EM_X86_64, ET_EXEC, Elf64Ehdr, Elf64Phdr};
use crate::{AllocationError, PAGE_SIZE, PFlags, PhysicalMemory, SegmentKind};
use alloc::vec;
use alloc::vec::Vec;

struct Segment {
    kind: SegmentKind,
    paddr: u64,
    flags: PFlags,
    data: Vec<u8>,
    memsz: u64,
}

/// Builder for little-endian x86-64 `ET_EXEC` images.
pub struct ElfBuilder {
    entry: u64,
    segments: Vec<Segment>,
}

impl ElfBuilder {
    #[must_use]
    pub const fn new(entry: u64) -> Self {
        Self {
            entry,
            segments: Vec::new(),
        }
    }

    /// Add a `PT_LOAD` segment identity-placed at `paddr`, with `bss` extra
    /// bytes of memory beyond `data`.
    #[must_use]
    pub fn segment(mut self, paddr: u64, flags: PFlags, data: &[u8], bss: u64) -> Self {
        self.segments.push(Segment {
            kind: SegmentKind::Load,
            paddr,
            flags,
            data: data.to_vec(),
            memsz: data.len() as u64 + bss,
        });
        self
    }

    /// Add a `PT_NOTE` segment, which the loader must skip.
    #[must_use]
    pub fn note(mut self, data: &[u8]) -> Self {
        self.segments.push(Segment {
            kind: SegmentKind::Note,
            paddr: 0,
            flags: PFlags::new().with_read(true),
            data: data.to_vec(),
            memsz: 0,
        });
        self
    }

    /// Force the memory size of segment `index`.
    #[must_use]
    pub fn memsz_override(mut self, index: usize, memsz: u64) -> Self {
        self.segments[index].memsz = memsz;
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let ehdr_len = size_of::<Elf64Ehdr>();
        let phdr_len = size_of::<Elf64Phdr>();
        let phnum = self.segments.len();
        let mut out = vec![0u8; ehdr_len + phnum * phdr_len];

        out[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        out[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        out[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        out[20..24].copy_from_slice(&1u32.to_le_bytes());
        out[24..32].copy_from_slice(&self.entry.to_le_bytes());
        out[32..40].copy_from_slice(&(ehdr_len as u64).to_le_bytes());
        out[52..54].copy_from_slice(&u16::try_from(ehdr_len).unwrap_or(64).to_le_bytes());
        out[54..56].copy_from_slice(&u16::try_from(phdr_len).unwrap_or(56).to_le_bytes());
        out[56..58].copy_from_slice(&u16::try_from(phnum).unwrap_or(u16::MAX).to_le_bytes());

        for (i, seg) in self.segments.iter().enumerate() {
            let offset = out.len() as u64;
            out.extend_from_slice(&seg.data);

            let ph = ehdr_len + i * phdr_len;
            let fields = &mut out[ph..ph + phdr_len];
            fields[0..4].copy_from_slice(&u32::from(seg.kind).to_le_bytes());
            fields[4..8].copy_from_slice(&seg.flags.into_bits().to_le_bytes());
            fields[8..16].copy_from_slice(&offset.to_le_bytes());
            fields[16..24].copy_from_slice(&seg.paddr.to_le_bytes());
            fields[24..32].copy_from_slice(&seg.paddr.to_le_bytes());
            fields[32..40].copy_from_slice(&(seg.data.len() as u64).to_le_bytes());
            fields[40..48].copy_from_slice(&seg.memsz.to_le_bytes());
            fields[48..56].copy_from_slice(&PAGE_SIZE.to_le_bytes());
        }
        out
    }
}

/// A stretch of "physical memory" starting at `base`.
pub struct RamWindow {
    base: u64,
    bytes: Vec<u8>,
    allocations: Vec<(u64, usize)>,
}

impl RamWindow {
    #[must_use]
    pub fn new(base: u64, len: usize) -> Self {
        Self::filled(base, len, 0)
    }

    /// A window whose bytes all start out as `fill`.
    #[must_use]
    pub fn filled(base: u64, len: usize, fill: u8) -> Self {
        Self {
            base,
            bytes: vec![fill; len],
            allocations: Vec::new(),
        }
    }

    /// # Panics
    /// If the range is outside the window.
    #[must_use]
    pub fn read(&self, phys: u64, len: usize) -> &[u8] {
        let start = usize::try_from(phys - self.base).unwrap_or(usize::MAX);
        &self.bytes[start..start + len]
    }

    /// Successful `allocate_at` calls as `(phys, pages)`.
    #[must_use]
    pub fn allocations(&self) -> &[(u64, usize)] {
        &self.allocations
    }
}

impl PhysicalMemory for RamWindow {
    fn allocate_at(&mut self, phys: u64, pages: usize) -> Result<&mut [u8], AllocationError> {
        let error = AllocationError { phys, pages };
        if phys % PAGE_SIZE != 0 || phys < self.base {
            return Err(error);
        }
        let start = usize::try_from(phys - self.base).map_err(|_| error)?;
        let end = pages
            .checked_mul(PAGE_SIZE as usize)
            .and_then(|len| len.checked_add(start))
            .filter(|&end| end <= self.bytes.len())
            .ok_or(error)?;
        self.allocations.push((phys, pages));
        Ok(&mut self.bytes[start..end])
    }
}
