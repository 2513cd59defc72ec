//! # ELF Header Validation

use crate::ElfError;
use crate::header::{
    EI_CLASS, EI_DATA, EI_VERSION, ELF_MAGIC, ELFCLASS64, ELFDATA2LSB, EM_X86_64, ET_EXEC,
    EV_CURRENT, Elf64Ehdr, Elf64Phdr, PFlags, SegmentKind,
};
use core::ptr::read_unaligned;
use log::debug;

/// One decoded program header.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgramHeader {
    pub kind: SegmentKind,
    pub flags: PFlags,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        self.kind == SegmentKind::Load
    }

    fn from_raw(ph: &Elf64Phdr) -> Self {
        Self {
            kind: SegmentKind::from(ph.p_type),
            flags: ph.p_flags,
            offset: ph.p_offset,
            vaddr: ph.p_vaddr,
            paddr: ph.p_paddr,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
            align: ph.p_align,
        }
    }
}

/// A validated executable image, borrowing the file bytes.
#[derive(Copy, Clone)]
pub struct ElfImage<'a> {
    bytes: &'a [u8],
    ehdr: Elf64Ehdr,
    phoff: usize,
}

impl<'a> ElfImage<'a> {
    /// Validate a 64-bit little-endian x86-64 executable.
    ///
    /// Besides the identification fields this checks that the program header
    /// table and every loadable segment's file range lie inside `bytes`, and
    /// that no loadable segment has more file bytes than memory bytes.
    ///
    /// # Errors
    /// [`ElfError::UnsupportedFormat`] naming the first failed check.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ElfError> {
        use ElfError::UnsupportedFormat;

        if bytes.len() < size_of::<Elf64Ehdr>() {
            return Err(UnsupportedFormat("file is smaller than the ELF header"));
        }

        // SAFETY: We just checked bounds; using read_unaligned to avoid alignment assumptions.
        let ehdr = unsafe { read_unaligned(bytes.as_ptr().cast::<Elf64Ehdr>()) };

        if ehdr.e_ident[0..4] != ELF_MAGIC {
            return Err(UnsupportedFormat("bad magic"));
        }
        if ehdr.e_ident[EI_CLASS] != ELFCLASS64 {
            return Err(UnsupportedFormat("not a 64-bit image"));
        }
        if ehdr.e_ident[EI_DATA] != ELFDATA2LSB {
            return Err(UnsupportedFormat("not little-endian"));
        }
        if ehdr.e_ident[EI_VERSION] != EV_CURRENT || ehdr.e_version != u32::from(EV_CURRENT) {
            return Err(UnsupportedFormat("unknown format version"));
        }
        if ehdr.e_type != ET_EXEC {
            return Err(UnsupportedFormat("not an executable"));
        }
        if ehdr.e_machine != EM_X86_64 {
            return Err(UnsupportedFormat("not an x86-64 image"));
        }
        if usize::from(ehdr.e_phentsize) != size_of::<Elf64Phdr>() {
            return Err(UnsupportedFormat("unexpected program header size"));
        }

        // Program header table bounds
        let table_len = usize::from(ehdr.e_phentsize) * usize::from(ehdr.e_phnum);
        let phoff = usize::try_from(ehdr.e_phoff)
            .ok()
            .filter(|off| off.checked_add(table_len).is_some_and(|end| end <= bytes.len()))
            .ok_or(UnsupportedFormat("program header table outside the file"))?;

        let image = Self { bytes, ehdr, phoff };
        for ph in image.program_headers().filter(ProgramHeader::is_loadable) {
            if ph.filesz > ph.memsz {
                return Err(UnsupportedFormat("segment file size exceeds memory size"));
            }
            if image.file_range(&ph).is_none() {
                return Err(UnsupportedFormat("segment data outside the file"));
            }
            if ph.paddr.checked_add(ph.memsz).is_none() {
                return Err(UnsupportedFormat("segment wraps the address space"));
            }
        }

        debug!(
            "ELF: entry {:#x}, {} program headers",
            ehdr.e_entry, ehdr.e_phnum
        );
        Ok(image)
    }

    /// Declared entry point (virtual address; identity mapped at handoff).
    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.ehdr.e_entry
    }

    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[must_use]
    pub fn program_headers(&self) -> ProgramHeaders<'a> {
        ProgramHeaders {
            bytes: self.bytes,
            offset: self.phoff,
            remaining: self.ehdr.e_phnum,
        }
    }

    /// The file bytes of a segment, if they lie inside the image.
    #[must_use]
    pub fn segment_data(&self, ph: &ProgramHeader) -> Option<&'a [u8]> {
        self.file_range(ph).map(|range| &self.bytes[range])
    }

    fn file_range(&self, ph: &ProgramHeader) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(ph.offset).ok()?;
        let end = start.checked_add(usize::try_from(ph.filesz).ok()?)?;
        (end <= self.bytes.len()).then_some(start..end)
    }
}

impl core::fmt::Debug for ElfImage<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElfImage")
            .field("len", &self.bytes.len())
            .field("entry", &format_args!("{:#x}", self.entry()))
            .field("phnum", &self.ehdr.e_phnum)
            .finish()
    }
}

/// Iterator over all program headers, in table order.
#[derive(Debug, Clone)]
pub struct ProgramHeaders<'a> {
    bytes: &'a [u8],
    offset: usize,
    remaining: u16,
}

impl Iterator for ProgramHeaders<'_> {
    type Item = ProgramHeader;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let raw = self.bytes.get(self.offset..self.offset + size_of::<Elf64Phdr>())?;
        // SAFETY: `raw` holds a whole header; read_unaligned copes with any alignment.
        let ph = unsafe { read_unaligned(raw.as_ptr().cast::<Elf64Phdr>()) };
        self.offset += size_of::<Elf64Phdr>();
        self.remaining -= 1;
        Some(ProgramHeader::from_raw(&ph))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::from(self.remaining);
        (0, Some(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ElfBuilder;

    fn kernel() -> Vec<u8> {
        ElfBuilder::new(0x10_0040)
            .segment(0x10_0000, PFlags::new().with_read(true).with_execute(true), b"code", 4)
            .segment(0x20_0000, PFlags::new().with_read(true).with_write(true), b"data!", 0x3000)
            .note(b"ignored")
            .build()
    }

    #[test]
    fn accepts_a_well_formed_executable() {
        let bytes = kernel();
        let image = ElfImage::parse(&bytes).unwrap();
        assert_eq!(image.entry(), 0x10_0040);

        let headers: Vec<_> = image.program_headers().collect();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers.iter().filter(|p| p.is_loadable()).count(), 2);
        assert_eq!(headers[2].kind, SegmentKind::Note);
        assert_eq!(image.segment_data(&headers[1]).unwrap(), b"data!");
    }

    /// Every single-field mutation of a good image is rejected.
    #[test]
    fn rejects_mutated_identification() {
        let good = kernel();
        let cases: [(usize, u8, &str); 7] = [
            (0, 0x7E, "bad magic"),
            (3, b'G', "bad magic"),
            (4, 1, "not a 64-bit image"),
            (5, 2, "not little-endian"),
            (6, 0, "unknown format version"),
            (16, 3, "not an executable"),
            (18, 3, "not an x86-64 image"),
        ];
        for (offset, value, reason) in cases {
            let mut bad = good.clone();
            bad[offset] = value;
            assert_eq!(
                ElfImage::parse(&bad).unwrap_err(),
                ElfError::UnsupportedFormat(reason),
                "byte {offset}"
            );
        }
    }

    #[test]
    fn rejects_truncation() {
        let good = ElfBuilder::new(0x10_0000)
            .segment(0x10_0000, PFlags::new().with_execute(true), b"code", 0)
            .build();
        assert!(ElfImage::parse(&good[..63]).is_err());

        // Cut into the last segment's data.
        let cut = &good[..good.len() - 1];
        assert_eq!(
            ElfImage::parse(cut).unwrap_err(),
            ElfError::UnsupportedFormat("segment data outside the file")
        );
    }

    #[test]
    fn rejects_file_size_above_memory_size() {
        let bytes = ElfBuilder::new(0)
            .segment(0x10_0000, PFlags::new(), b"12345678", 0)
            .memsz_override(0, 4)
            .build();
        assert_eq!(
            ElfImage::parse(&bytes).unwrap_err(),
            ElfError::UnsupportedFormat("segment file size exceeds memory size")
        );
    }

    #[test]
    fn rejects_header_table_past_end() {
        let mut bytes = kernel();
        // e_phnum
        bytes[56..58].copy_from_slice(&1000u16.to_le_bytes());
        assert_eq!(
            ElfImage::parse(&bytes).unwrap_err(),
            ElfError::UnsupportedFormat("program header table outside the file")
        );
    }
}
