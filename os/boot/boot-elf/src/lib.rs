//! # ELF64 Executable Loader
//!
//! Validates a position-dependent x86-64 executable and places its
//! `PT_LOAD` segments at their declared *physical* addresses.
//!
//! ```text
//!  file                                physical memory
//!  ┌────────────┐                      ┌──────────────────────┐ p_paddr
//!  │ Elf64_Ehdr │                      │ p_filesz bytes       │
//!  │ Elf64_Phdr │ ── p_offset ───────▶ │ copied from the file │
//!  │ ...        │                      ├──────────────────────┤
//!  │ segment    │                      │ p_memsz - p_filesz   │ zeroed unless
//!  └────────────┘                      └──────────────────────┘ disabled
//! ```
//!
//! [`ElfImage::parse`] performs every check up front, so a rejected image
//! never causes an allocation. [`ElfImage::load_segments`] then asks a
//! [`PhysicalMemory`] provider for the exact pages each segment names; there
//! is no relocation.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

#[cfg(any(test, feature = "builder"))]
pub mod builder;
mod error;
mod header;
mod image;
mod loader;

pub use error::{AllocationError, ElfError};
pub use header::{PFlags, SegmentKind};
pub use image::{ElfImage, ProgramHeader, ProgramHeaders};
pub use loader::{
    LoadOptions, LoadedImage, MAX_SEGMENTS, PAGE_SIZE, PhysicalMemory, PlacedSegment,
};
