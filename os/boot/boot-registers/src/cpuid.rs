//! # CPUID

mod leaf80000001h;
mod ranges;

pub use leaf80000001h::{ExtendedFeatures, LEAF_8000_0001H, Leaf80000001h};
pub use ranges::CpuidRanges;

/// Result registers of a single `cpuid` execution.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
#[repr(C)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The CPU must support the `cpuid` instruction.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[inline(always)]
#[allow(clippy::inline_always)]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let (mut eax, ebx, mut ecx, edx): (u32, u32, u32, u32);
    eax = leaf;
    ecx = subleaf;
    unsafe {
        core::arch::asm!(
            "push rbx",
            "cpuid",
            "mov {ebx_out:e}, ebx",
            "pop rbx",
            ebx_out = lateout(reg) ebx,
            inlateout("eax") eax,
            inlateout("ecx") ecx,
            lateout("edx") edx,
            options(preserves_flags),
        );
    }
    CpuidResult { eax, ebx, ecx, edx }
}

/// Execute CPUID with the given leaf and subleaf.
///
/// # Safety
/// The CPU must support the `cpuid` instruction.
#[cfg(all(feature = "asm", target_arch = "x86"))]
#[inline(always)]
#[allow(clippy::inline_always, unused_unsafe)]
pub unsafe fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
    let r = unsafe { core::arch::x86::__cpuid_count(leaf, subleaf) };
    CpuidResult {
        eax: r.eax,
        ebx: r.ebx,
        ecx: r.ecx,
        edx: r.edx,
    }
}
