//! # Raw ELF64 Structures

use core::fmt;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names)]
pub(crate) struct Elf64Ehdr {
    pub e_ident: [u8; 16],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names)]
pub(crate) struct Elf64Phdr {
    pub p_type: u32,
    pub p_flags: PFlags,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

const _: () = {
    assert!(size_of::<Elf64Ehdr>() == 64);
    assert!(size_of::<Elf64Phdr>() == 56);
};

pub(crate) const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub(crate) const ELFCLASS64: u8 = 2;
pub(crate) const ELFDATA2LSB: u8 = 1;
pub(crate) const EV_CURRENT: u8 = 1;
pub(crate) const ET_EXEC: u16 = 2;
pub(crate) const EM_X86_64: u16 = 62;

pub(crate) const EI_CLASS: usize = 4;
pub(crate) const EI_DATA: usize = 5;
pub(crate) const EI_VERSION: usize = 6;

/// Bitfield wrapper for `Elf64_Phdr.p_flags` (32-bit)
///
/// Layout (LSB→MSB):
/// - bit 0: execute
/// - bit 1: write
/// - bit 2: read
/// - bits 3..31: reserved (must be zero for standard flags)
#[bitfield_struct::bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

/// `Elf64_Phdr.p_type`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SegmentKind {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Phdr,
    Tls,
    Other(u32),
}

impl From<u32> for SegmentKind {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Load,
            2 => Self::Dynamic,
            3 => Self::Interp,
            4 => Self::Note,
            6 => Self::Phdr,
            7 => Self::Tls,
            other => Self::Other(other),
        }
    }
}

impl From<SegmentKind> for u32 {
    fn from(value: SegmentKind) -> Self {
        match value {
            SegmentKind::Null => 0,
            SegmentKind::Load => 1,
            SegmentKind::Dynamic => 2,
            SegmentKind::Interp => 3,
            SegmentKind::Note => 4,
            SegmentKind::Phdr => 6,
            SegmentKind::Tls => 7,
            SegmentKind::Other(other) => other,
        }
    }
}

impl fmt::Display for PFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            flag(self.read(), 'R'),
            flag(self.write(), 'W'),
            flag(self.execute(), 'X')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_kinds_roundtrip_through_u32() {
        for raw in [0, 1, 2, 3, 4, 6, 7, 0x6474_E551] {
            assert_eq!(u32::from(SegmentKind::from(raw)), raw);
        }
        assert_eq!(SegmentKind::from(1), SegmentKind::Load);
    }

    #[test]
    fn flags_display_like_readelf() {
        let rx = PFlags::new().with_read(true).with_execute(true);
        assert_eq!(rx.to_string(), "R-X");
        assert_eq!(PFlags::from_bits(0b110).to_string(), "RW-");
    }
}
