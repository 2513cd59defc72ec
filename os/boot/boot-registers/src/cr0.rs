use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR0: system control flags.
///
/// Only PE and PG matter during the mode switch; the other bits are kept as
/// the firmware left them.
#[bitfield(u64)]
#[derive(Eq, PartialEq)]
pub struct Cr0 {
    /// Bit 0: PE, protected mode.
    pub pe_protection_enable: bool,

    /// Bits 1..=30: MP, EM, TS, ET, NE, WP, AM, NW, CD. Passed through.
    #[bits(30)]
    pub other: u32,

    /// Bit 31: PG, paging. Requires PE; with EFER.LME set this activates
    /// long mode.
    pub pg_paging: bool,

    #[bits(32)]
    __: u32,
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let cr0: u64;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr0)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr0 {
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr0 {
    unsafe fn load_unsafe() -> Self {
        let cr0: u32;
        unsafe {
            core::arch::asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(u64::from(cr0))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr0 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let cr0 = self.into_bits() as u32;
        unsafe {
            core::arch::asm!("mov cr0, {}", in(reg) cr0, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrelated_bits_survive_the_switch() {
        let firmware = Cr0::from_bits(0x6000_0011);
        let cr0 = firmware.with_pe_protection_enable(true).with_pg_paging(true);
        assert_eq!(cr0.into_bits(), 0xE000_0011);
        assert!(!Cr0::from_bits(0x6000_0011).pg_paging());
    }

    #[test]
    fn paging_and_protection_bits() {
        let cr0 = Cr0::new()
            .with_pe_protection_enable(true)
            .with_pg_paging(true);
        assert_eq!(cr0.into_bits(), 0x8000_0001);
    }
}
