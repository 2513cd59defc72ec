//! # ISO 9660 Read-Only Filesystem
//!
//! Resolves absolute paths on an optical-disc image to file bytes using
//! nothing but 2048-byte block reads from the firmware.
//!
//! ## On-Disk Layout
//!
//! ```text
//! LBA 0..15   system area (ignored)
//! LBA 16      primary volume descriptor  "\x01CD001\x01"
//!               +128  logical block size (u16 LE, must be 2048)
//!               +156  root directory record (34 bytes)
//! LBA n       directory extents: variable-length records, never crossing
//!             a block boundary; a zero length byte pads to the next block
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut fs = Iso9660::mount(device)?;
//! let kernel = fs.read_file(&mut arena, "/AmberOS/System/amberkrn.elf")?;
//! let bytes = kernel.bytes(&arena);
//! ```
//!
//! The mounted [`Iso9660`] value is the whole filesystem session; there is
//! no global state, and several sessions can coexist.
//!
//! ## Limitations
//!
//! * Files are assumed to be a single contiguous extent. Multi-extent files
//!   read the first extent's blocks and are logged, not rejected.
//! * Names compare byte-for-byte, including any `;1` version suffix.
//! * No Rock Ridge or Joliet extensions; path tables are not consulted.

#![cfg_attr(not(any(test, doctest)), no_std)]

#[cfg(any(test, feature = "builder"))]
extern crate alloc;

#[cfg(any(test, feature = "builder"))]
pub mod builder;
mod device;
mod error;
mod fs;
mod path;
mod record;
mod volume;

pub use device::{BLOCK_SIZE, BlockDevice, DeviceError, MemoryDevice};
pub use error::Iso9660Error;
pub use fs::{FileHandle, Iso9660};
pub use path::{Components, parse_path};
pub use record::{DirectoryEntry, DirectoryRecord, DirectoryRecords, FileFlags};
pub use volume::{PRIMARY_VOLUME_DESCRIPTOR_LBA, VolumeDescriptor};
