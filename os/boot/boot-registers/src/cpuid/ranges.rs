#[cfg(feature = "asm")]
use crate::cpuid::cpuid;

#[cfg(feature = "asm")]
const LEAF_00H: u32 = 0x00;
const LEAF_MAX_EXTENDED: u32 = 0x8000_0000;

/// Highest basic and extended leaves the CPU answers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CpuidRanges {
    pub max_basic: u32,
    pub max_extended: u32,
}

impl CpuidRanges {
    /// # Safety
    /// The caller must ensure that the `cpuid` instruction is available.
    #[cfg(feature = "asm")]
    #[must_use]
    pub unsafe fn read() -> Self {
        let b0 = unsafe { cpuid(LEAF_00H, 0) };
        let e0 = unsafe { cpuid(LEAF_MAX_EXTENDED, 0) };
        Self {
            max_basic: b0.eax,
            max_extended: e0.eax,
        }
    }

    #[inline]
    #[must_use]
    pub const fn has_basic(&self, leaf: u32) -> bool {
        leaf <= self.max_basic
    }

    #[inline]
    #[must_use]
    pub const fn has_ext(&self, leaf: u32) -> bool {
        leaf >= LEAF_MAX_EXTENDED && leaf <= self.max_extended
    }
}
