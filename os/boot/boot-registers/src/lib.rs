//! # Typed x86 Control Registers
//!
//! Bitfield models of the registers the boot pipeline touches while moving
//! from protected mode into long mode, plus CPUID feature decoding.
//!
//! The register *types* are plain values and can be built and inspected on
//! any host. The instructions that move them in and out of the CPU are only
//! compiled with the `asm` feature, for both `x86` (the BIOS loader runs in
//! 32-bit protected mode) and `x86_64` (the UEFI loader).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cpuid")]
pub mod cpuid;

#[cfg(feature = "cr0")]
pub mod cr0;

#[cfg(feature = "cr3")]
pub mod cr3;

#[cfg(feature = "cr4")]
pub mod cr4;

#[cfg(feature = "efer")]
pub mod efer;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require Ring 0.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// Writing a control register changes how every following instruction
    /// is fetched and translated.
    unsafe fn store_unsafe(self);
}
