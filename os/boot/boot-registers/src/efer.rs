use crate::{LoadRegisterUnsafe, StoreRegisterUnsafe};
use bitfield_struct::bitfield;

/// The extended feature enable register, MSR `0xC000_0080`.
///
/// Read-modify-write only: bits other than LME are written back as read.
#[bitfield(u64, order = Lsb)]
#[derive(Eq, PartialEq)]
pub struct Efer {
    /// Bits 0..=7: SCE and reserved.
    #[bits(8)]
    pub low: u8,

    /// Bit 8: LME. Takes effect with the next write that sets CR0.PG.
    pub lme: bool,

    #[bits(1)]
    __: u8,

    /// Bit 10: LMA, set by the CPU once long mode is active.
    #[bits(access = RO)]
    pub lma: bool,

    /// Bit 11: NXE, enables the no-execute page bit.
    pub nxe: bool,

    #[bits(52)]
    pub high: u64,
}

impl Efer {
    pub const MSR_EFER: u32 = 0xC000_0080;
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl LoadRegisterUnsafe for Efer {
    unsafe fn load_unsafe() -> Self {
        let (lo, hi): (u32, u32);
        unsafe {
            core::arch::asm!(
                "rdmsr",
                in("ecx") Self::MSR_EFER,
                out("eax") lo,
                out("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
        Self::from_bits((u64::from(hi) << 32) | u64::from(lo))
    }
}

#[cfg(all(feature = "asm", any(target_arch = "x86", target_arch = "x86_64")))]
impl StoreRegisterUnsafe for Efer {
    #[allow(clippy::cast_possible_truncation)]
    unsafe fn store_unsafe(self) {
        let efer = self.into_bits();
        let lo = efer as u32;
        let hi = (efer >> 32) as u32;
        unsafe {
            core::arch::asm!(
                "wrmsr",
                in("ecx") Self::MSR_EFER,
                in("eax") lo,
                in("edx") hi,
                options(nomem, nostack, preserves_flags)
            );
        }
    }
}
