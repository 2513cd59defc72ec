//! # Boot Pipeline
//!
//! The firmware-independent part of booting, in its fixed order:
//!
//! ```text
//! Firmware ─► Arena ─► mount ISO 9660 ─► /boot/boot.cfg ─► kernel file
//!     ─► validate ELF ─► place segments ─► video mode ─► BootInfo ─► Handoff
//! ```
//!
//! [`prepare`] runs all of it against any [`Firmware`]. What remains after
//! it returns depends on the firmware: the BIOS loader builds page tables
//! and walks the CPU into long mode, the UEFI loader exits boot services.
//! Both then call [`Handoff::entry`] with [`Handoff::boot_info_phys`].

#![cfg_attr(not(any(test, doctest)), no_std)]

mod error;
mod firmware;
mod pipeline;
pub mod video;

pub use error::BootError;
pub use firmware::Firmware;
pub use pipeline::{Handoff, prepare};
pub use video::{VideoMode, select_mode};
