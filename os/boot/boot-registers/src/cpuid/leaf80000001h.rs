#[cfg(feature = "asm")]
use crate::cpuid::cpuid;
use crate::cpuid::{CpuidRanges, CpuidResult};
use bitfield_struct::bitfield;

pub const LEAF_8000_0001H: u32 = 0x8000_0001;

/// CPUID.80000001H: Extended Processor Signature and Feature Bits.
///
/// The boot pipeline needs two answers from this leaf: whether the CPU can
/// run 64-bit code at all, and whether it can map 1 GiB pages.
#[derive(Copy, Clone, Debug)]
pub struct Leaf80000001h {
    pub ecx: u32,
    pub edx: ExtendedFeatures,
}

impl Leaf80000001h {
    /// Query the leaf if `ranges` says it exists.
    ///
    /// # Safety
    /// The caller must ensure that the `cpuid` instruction is available.
    #[cfg(feature = "asm")]
    #[inline]
    pub unsafe fn read(ranges: &CpuidRanges) -> Option<Self> {
        if !ranges.has_ext(LEAF_8000_0001H) {
            return None;
        }

        let r = unsafe { cpuid(LEAF_8000_0001H, 0) };
        Some(Self::from(r))
    }

    /// Decode a raw result; absent leaves decode to "no features".
    #[must_use]
    pub const fn from_result(ranges: &CpuidRanges, r: CpuidResult) -> Self {
        if ranges.has_ext(LEAF_8000_0001H) {
            Self::from(r)
        } else {
            Self::from(CpuidResult {
                eax: 0,
                ebx: 0,
                ecx: 0,
                edx: 0,
            })
        }
    }

    #[must_use]
    pub const fn from(r: CpuidResult) -> Self {
        Self {
            ecx: r.ecx,
            edx: ExtendedFeatures::from_bits(r.edx),
        }
    }

    #[inline]
    #[must_use]
    pub const fn has_long_mode(&self) -> bool {
        self.edx.long_mode()
    }

    #[inline]
    #[must_use]
    pub const fn has_1gib_pages(&self) -> bool {
        self.edx.page_1gb()
    }
}

/// EDX of CPUID.80000001H.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct ExtendedFeatures {
    #[bits(11)]
    __: u16,
    /// Bit 11: SYSCALL/SYSRET available in 64-bit mode.
    pub syscall: bool,
    #[bits(8)]
    __: u8,
    /// Bit 20: Execute Disable bit.
    pub nx: bool,
    #[bits(5)]
    __: u8,
    /// Bit 26: 1 GiB pages.
    pub page_1gb: bool,
    /// Bit 27: RDTSCP.
    pub rdtscp: bool,
    #[bits(1)]
    __: u8,
    /// Bit 29: Intel 64 / AMD64 long mode.
    pub long_mode: bool,
    #[bits(2)]
    __: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_extended(max_extended: u32) -> CpuidRanges {
        CpuidRanges {
            max_basic: 0x0d,
            max_extended,
        }
    }

    #[test]
    fn decodes_long_mode_and_giant_pages() {
        let edx = (1 << 29) | (1 << 26) | (1 << 20) | (1 << 11);
        let leaf = Leaf80000001h::from_result(
            &with_extended(0x8000_0008),
            CpuidResult {
                edx,
                ..CpuidResult::default()
            },
        );
        assert!(leaf.has_long_mode());
        assert!(leaf.has_1gib_pages());
        assert!(leaf.edx.nx());
        assert!(leaf.edx.syscall());
        assert!(!leaf.edx.rdtscp());
    }

    #[test]
    fn giant_pages_are_not_implied_by_long_mode() {
        let leaf = Leaf80000001h::from(CpuidResult {
            edx: 1 << 29,
            ..CpuidResult::default()
        });
        assert!(leaf.has_long_mode());
        assert!(!leaf.has_1gib_pages());
    }

    #[test]
    fn missing_leaf_reports_nothing() {
        let leaf = Leaf80000001h::from_result(
            &with_extended(0x8000_0000),
            CpuidResult {
                edx: u32::MAX,
                ..CpuidResult::default()
            },
        );
        assert!(!leaf.has_long_mode());
        assert!(!leaf.has_1gib_pages());
    }
}
