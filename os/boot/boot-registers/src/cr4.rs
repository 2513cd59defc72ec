use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// CR4, of which the loaders only ever set PAE.
#[bitfield(u64, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct Cr4 {
    /// Bits 0..=4: VME, PVI, TSD, DE, PSE.
    #[bits(5)]
    pub low: u8,

    /// Bit 5: PAE. Must be set before EFER.LME and CR0.PG to enter long
    /// mode.
    pub pae: bool,

    /// Bits 6..=63: preserved as read. LA57 (bit 12) is never set here, so
    /// the tables stay 4-level.
    #[bits(58)]
    pub high: u64,
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        let cr4: u64;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr4)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl StoreRegisterUnsafe for Cr4 {
    unsafe fn store_unsafe(self) {
        let cr4 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) cr4, options(nostack, preserves_flags));
        }
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl LoadRegisterUnsafe for Cr4 {
    unsafe fn load_unsafe() -> Self {
        let cr4: u32;
        unsafe {
            core::arch::asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(u64::from(cr4))
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl StoreRegisterUnsafe for Cr4 {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let cr4 = self.into_bits() as u32;
        unsafe {
            core::arch::asm!("mov cr4, {}", in(reg) cr4, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pae_is_bit_five() {
        assert_eq!(Cr4::new().with_pae(true).into_bits(), 1 << 5);
        assert!(Cr4::from_bits(0x20).pae());
    }

    #[test]
    fn setting_pae_keeps_the_rest() {
        let cr4 = Cr4::from_bits(0x0000_0690).with_pae(true);
        assert_eq!(cr4.into_bits(), 0x0000_06B0);
    }
}
