use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR3: page-map base register (4-level paging, PCID disabled).
///
/// On the BIOS path this is written from 32-bit protected mode, so the
/// top-level table has to live below 4 GiB.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct Cr3 {
    /// Bits 0–2: Reserved.
    #[bits(3)]
    __: u8,

    /// Bit 3: PWT: write-through for top-level table accesses.
    pub pwt: bool,

    /// Bit 4: PCD: cache disable for top-level table accesses.
    pub pcd: bool,

    /// Bits 5–11: Reserved.
    #[bits(7)]
    __: u8,

    /// Bits 12–51: PML4 physical base >> 12.
    #[bits(40)]
    pml4_base_4k: u64,

    /// Bits 52–63: Reserved.
    #[bits(12)]
    __: u16,
}

impl Cr3 {
    /// Create a `Cr3` value pointing at a 4 KiB-aligned PML4.
    #[must_use]
    pub const fn from_pml4_phys(pml4_phys: u64) -> Self {
        debug_assert!(pml4_phys & 0xFFF == 0, "PML4 base must be 4K-aligned");
        Self::new().with_pml4_base_4k(pml4_phys >> 12)
    }

    /// Physical address of the PML4 table.
    #[must_use]
    pub const fn pml4_phys(&self) -> u64 {
        self.pml4_base_4k() << 12
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u64;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr3 {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr3 {
    unsafe fn load_unsafe() -> Self {
        let cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(u64::from(cr3))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr3 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        debug_assert!(self.into_bits() >> 32 == 0, "CR3 must point below 4 GiB");
        let cr3 = self.into_bits() as u32;
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}
