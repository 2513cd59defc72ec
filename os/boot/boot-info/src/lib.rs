//! # Boot Information Handoff
//!
//! This crate defines the only contract between the boot pipeline and the
//! image it starts: the [`BootInfo`](boot::BootInfo) structure and the
//! signature of the entry point that receives it.
//!
//! ## Overview
//!
//! Both firmware paths (legacy BIOS and UEFI) converge on the same value:
//!
//! ```text
//!   BIOS path                         UEFI path
//!   ─────────                         ─────────
//!   VBE mode set (real mode)          GOP mode set (boot services)
//!          │                                 │
//!          └──────────────┬──────────────────┘
//!                         ▼
//!                ┌──────────────────┐
//!                │     BootInfo     │  firmware kind + framebuffer
//!                └────────┬─────────┘
//!                         ▼
//!              entry(&BootInfo) in RDI, never returns
//! ```
//!
//! ## Entry Point Convention
//! ```rust
//! # use boot_info::boot::BootInfo;
//! pub type BootEntryFn = extern "sysv64" fn(*const BootInfo) -> !;
//! ```
//!
//! * **Calling Convention**: System V AMD64 on both paths, so the pointer is
//!   always passed in `rdi`.
//! * **Parameter**: Single pointer to the boot information structure.
//! * **No Return**: The loaded image owns the machine from here on.
//!
//! ## ABI Compatibility
//!
//! * **`#[repr(C)]`**: Predictable layout, pinned by compile-time assertions.
//! * **Fixed-Size Types**: Explicit integer widths only.
//! * **No Payload Enums**: The firmware tag is a `#[repr(u32)]` discriminant.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
