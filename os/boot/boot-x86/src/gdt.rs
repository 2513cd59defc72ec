//! # Boot Global Descriptor Table
//!
//! The loader switches between three operand sizes: 16-bit for real-mode
//! firmware calls, 32-bit for its own code, and 64-bit for the kernel. Each
//! needs its own code/data pair, all flat over the first 4 GiB:
//!
//! Index | Selector | Meaning
//! ------|----------|--------
//! 0     | 0x00     | Null
//! 1     | 0x08     | 16-bit code ([`Selector::REAL_CODE`])
//! 2     | 0x10     | 16-bit data ([`Selector::REAL_DATA`])
//! 3     | 0x18     | 32-bit code ([`Selector::PROTECTED_CODE`])
//! 4     | 0x20     | 32-bit data ([`Selector::PROTECTED_DATA`])
//! 5     | 0x28     | 64-bit code ([`Selector::LONG_CODE`])
//! 6     | 0x30     | 64-bit data ([`Selector::LONG_DATA`])

use bitfield_struct::bitfield;
use core::fmt;

/// Raw bit layout of a code/data segment descriptor.
#[bitfield(u64)]
pub struct DescriptorBits {
    pub limit_lo: u16, // [15:0]
    pub base_lo: u16,  // [31:16]
    pub base_mid: u8,  // [39:32]
    pub access: u8,    // [47:40] P | DPL | S | type
    #[bits(4)]
    pub limit_hi: u8, // [51:48]
    #[bits(4)]
    pub flags: u8, // [55:52] G | DB | L | AVL
    pub base_hi: u8, // [63:56]
}

/// Access byte values.
pub mod access {
    /// Present.
    pub const PRESENT: u8 = 1 << 7;
    /// Code or data (as opposed to a system descriptor).
    pub const CODE_DATA: u8 = 1 << 4;
    /// Executable.
    pub const EXECUTABLE: u8 = 1 << 3;
    /// Readable (code) or writable (data).
    pub const READ_WRITE: u8 = 1 << 1;

    /// Ring 0 execute/read code: `0x9A`.
    pub const CODE: u8 = PRESENT | CODE_DATA | EXECUTABLE | READ_WRITE;
    /// Ring 0 read/write data: `0x92`.
    pub const DATA: u8 = PRESENT | CODE_DATA | READ_WRITE;
}

/// Flag nibble values.
pub mod flags {
    /// Limit counts 4 KiB units.
    pub const GRANULARITY: u8 = 1 << 3;
    /// 32-bit default operand size.
    pub const SIZE_32: u8 = 1 << 2;
    /// 64-bit code.
    pub const LONG: u8 = 1 << 1;

    pub const REAL_MODE: u8 = 0;
    pub const PROTECTED_MODE: u8 = GRANULARITY | SIZE_32;
    pub const LONG_MODE: u8 = GRANULARITY | LONG;
}

/// One 8-byte GDT entry.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct SegmentDescriptor(u64);

impl SegmentDescriptor {
    pub const NULL: Self = Self(0);

    /// Pack a descriptor. `limit` keeps its low 20 bits, `flags` its low 4.
    #[must_use]
    pub const fn new(base: u32, limit: u32, access: u8, flags: u8) -> Self {
        let bits = DescriptorBits::new()
            .with_limit_lo((limit & 0xFFFF) as u16)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
            .with_base_lo((base & 0xFFFF) as u16)
            .with_base_mid(((base >> 16) & 0xFF) as u8)
            .with_base_hi((base >> 24) as u8)
            .with_access(access)
            .with_flags(flags & 0xF);
        Self(bits.into_bits())
    }

    /// Flat 4 GiB code segment for the given flag nibble.
    #[must_use]
    pub const fn flat_code(flags: u8) -> Self {
        Self::new(0, 0xF_FFFF, access::CODE, flags)
    }

    /// Flat 4 GiB data segment for the given flag nibble.
    #[must_use]
    pub const fn flat_data(flags: u8) -> Self {
        Self::new(0, 0xF_FFFF, access::DATA, flags)
    }

    #[must_use]
    pub const fn from_bits(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn into_bits(self) -> u64 {
        self.0
    }

    const fn bits(self) -> DescriptorBits {
        DescriptorBits::from_bits(self.0)
    }

    #[must_use]
    pub const fn base(self) -> u32 {
        let b = self.bits();
        (b.base_lo() as u32) | ((b.base_mid() as u32) << 16) | ((b.base_hi() as u32) << 24)
    }

    #[must_use]
    pub const fn limit(self) -> u32 {
        let b = self.bits();
        (b.limit_lo() as u32) | ((b.limit_hi() as u32) << 16)
    }

    #[must_use]
    pub const fn access(self) -> u8 {
        self.bits().access()
    }

    #[must_use]
    pub const fn flags(self) -> u8 {
        self.bits().flags()
    }

    #[must_use]
    pub const fn is_present(self) -> bool {
        self.access() & access::PRESENT != 0
    }

    #[must_use]
    pub const fn is_code(self) -> bool {
        self.access() & access::EXECUTABLE != 0
    }
}

impl fmt::Debug for SegmentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentDescriptor")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("limit", &format_args!("{:#x}", self.limit()))
            .field("access", &format_args!("{:#04x}", self.access()))
            .field("flags", &format_args!("{:#x}", self.flags()))
            .finish()
    }
}

/// A GDT selector: byte offset of the entry, TI = 0, RPL = 0.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Selector(u16);

impl Selector {
    pub const REAL_CODE: Self = Self::from_index(1);
    pub const REAL_DATA: Self = Self::from_index(2);
    pub const PROTECTED_CODE: Self = Self::from_index(3);
    pub const PROTECTED_DATA: Self = Self::from_index(4);
    pub const LONG_CODE: Self = Self::from_index(5);
    pub const LONG_DATA: Self = Self::from_index(6);

    #[must_use]
    pub const fn from_index(index: u16) -> Self {
        Self(index << 3)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 >> 3) as usize
    }

    #[must_use]
    pub const fn encode(self) -> u16 {
        self.0
    }
}

/// The descriptor table loaded on the BIOS path.
#[repr(C, align(8))]
#[derive(Debug, Copy, Clone)]
pub struct BootGdt(pub [SegmentDescriptor; 7]);

pub static BOOT_GDT: BootGdt = BootGdt([
    SegmentDescriptor::NULL,
    SegmentDescriptor::flat_code(flags::REAL_MODE),
    SegmentDescriptor::flat_data(flags::REAL_MODE),
    SegmentDescriptor::flat_code(flags::PROTECTED_MODE),
    SegmentDescriptor::flat_data(flags::PROTECTED_MODE),
    SegmentDescriptor::flat_code(flags::LONG_MODE),
    SegmentDescriptor::flat_data(flags::LONG_MODE),
]);

impl BootGdt {
    #[must_use]
    pub const fn entry(&self, selector: Selector) -> SegmentDescriptor {
        self.0[selector.index()]
    }

    /// `lgdt` operand for this table at its current (identity-mapped) address.
    #[must_use]
    pub fn pointer(&self) -> GdtPointer {
        GdtPointer::new(
            core::ptr::from_ref(self) as usize as u64,
            size_of::<[SegmentDescriptor; 7]>(),
        )
    }
}

/// Pointer format required by `lgdt`.
///
/// In 32-bit mode the CPU reads the limit and the low four base bytes; in
/// 64-bit mode all eight.
#[repr(C, packed)]
#[derive(Copy, Clone)]
pub struct GdtPointer {
    /// Size of the table **minus one** in bytes.
    pub limit: u16,
    /// Linear address of the table.
    pub base: u64,
}

impl GdtPointer {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(base: u64, table_len: usize) -> Self {
        Self {
            limit: (table_len - 1) as u16,
            base,
        }
    }
}

impl fmt::Debug for GdtPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (limit, base) = (self.limit, self.base);
        f.debug_struct("GdtPointer")
            .field("limit", &format_args!("{limit:#x}"))
            .field("base", &format_args!("{base:#x}"))
            .finish()
    }
}

const _: () = {
    assert!(size_of::<SegmentDescriptor>() == 8);
    assert!(size_of::<BootGdt>() == 7 * 8);
    assert!(size_of::<GdtPointer>() == 10);

    assert!(Selector::REAL_CODE.encode() == 0x08);
    assert!(Selector::PROTECTED_CODE.encode() == 0x18);
    assert!(Selector::PROTECTED_DATA.encode() == 0x20);
    assert!(Selector::LONG_CODE.encode() == 0x28);
    assert!(Selector::LONG_DATA.encode() == 0x30);

    assert!(access::CODE == 0x9A);
    assert!(access::DATA == 0x92);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_roundtrips_every_field() {
        let cases = [
            (0, 0, 0, 0),
            (0, 0xF_FFFF, access::CODE, flags::PROTECTED_MODE),
            (0x1234_5678, 0xA_BCDE, access::DATA, flags::GRANULARITY),
            (0xFFFF_FFFF, 0xF_FFFF, 0xFF, 0xF),
            (0x00C0_FFEE, 0x1, 0x89, flags::LONG_MODE),
        ];
        for (base, limit, access, flags) in cases {
            let d = SegmentDescriptor::new(base, limit, access, flags);
            assert_eq!(
                (d.base(), d.limit(), d.access(), d.flags()),
                (base, limit, access, flags),
                "{d:?}"
            );
        }
    }

    #[test]
    fn encoding_matches_the_manual() {
        // Flat 32-bit ring-0 code: the canonical 0x00CF9A000000FFFF.
        assert_eq!(
            SegmentDescriptor::flat_code(flags::PROTECTED_MODE).into_bits(),
            0x00CF_9A00_0000_FFFF
        );
        // Flat 64-bit code.
        assert_eq!(
            SegmentDescriptor::flat_code(flags::LONG_MODE).into_bits(),
            0x00AF_9A00_0000_FFFF
        );
        // 16-bit data, byte granular.
        assert_eq!(
            SegmentDescriptor::flat_data(flags::REAL_MODE).into_bits(),
            0x000F_9200_0000_FFFF
        );
    }

    #[test]
    fn limit_and_flags_are_masked() {
        let d = SegmentDescriptor::new(0, 0xFFF_FFFF, access::DATA, 0xFF);
        assert_eq!(d.limit(), 0xF_FFFF);
        assert_eq!(d.flags(), 0xF);
    }

    #[test]
    fn boot_gdt_has_a_pair_per_mode() {
        assert_eq!(BOOT_GDT.0[0], SegmentDescriptor::NULL);
        for (code, data, flags) in [
            (Selector::REAL_CODE, Selector::REAL_DATA, flags::REAL_MODE),
            (Selector::PROTECTED_CODE, Selector::PROTECTED_DATA, flags::PROTECTED_MODE),
            (Selector::LONG_CODE, Selector::LONG_DATA, flags::LONG_MODE),
        ] {
            let c = BOOT_GDT.entry(code);
            let d = BOOT_GDT.entry(data);
            assert!(c.is_present() && c.is_code());
            assert!(d.is_present() && !d.is_code());
            assert_eq!(c.flags(), flags);
            assert_eq!(d.flags(), flags);
            assert_eq!((c.base(), c.limit()), (0, 0xF_FFFF));
        }
    }

    #[test]
    fn pointer_covers_the_table() {
        let ptr = BOOT_GDT.pointer();
        let (limit, base) = (ptr.limit, ptr.base);
        assert_eq!(limit, 55);
        assert_eq!(base, core::ptr::from_ref(&BOOT_GDT) as u64);
    }

    #[test]
    fn table_has_no_padding() {
        assert_eq!(size_of::<BootGdt>(), BOOT_GDT.0.len() * 8);
        assert_eq!(align_of::<BootGdt>(), 8);
        assert_eq!(usize::from(BOOT_GDT.pointer().limit) + 1, size_of::<BootGdt>());
    }
}
