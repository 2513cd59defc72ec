//! # Directory Records
//!
//! A directory extent is a stream of variable-length records:
//!
//! ```text
//! +0   u8      record length (0 = padding until the next block)
//! +1   u8      extended attribute record length
//! +2   u32 LE  extent start block     +6  u32 BE (same)
//! +10  u32 LE  data length in bytes   +14 u32 BE (same)
//! +18  [u8;7]  recording date and time
//! +25  u8      file flags
//! +26  u8      file unit size         +27 u8 interleave gap
//! +28  u16 LE  volume sequence number +30 u16 BE (same)
//! +32  u8      name length
//! +33  [u8]    name, padded to an even record length
//! ```

use crate::{BLOCK_SIZE, Iso9660Error};
use bitfield_struct::bitfield;
use core::fmt;

/// Smallest valid record: the fixed part plus a one byte name.
const MIN_RECORD_LEN: usize = 34;
const NAME_OFFSET: usize = 33;

/// ISO 9660 file flags byte.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct FileFlags {
    /// Bit 0: existence: hidden from the user.
    pub hidden: bool,
    /// Bit 1: the record describes a directory.
    pub directory: bool,
    /// Bit 2: associated file.
    pub associated: bool,
    /// Bit 3: record format in extended attributes.
    pub record: bool,
    /// Bit 4: owner/group permissions in extended attributes.
    pub protection: bool,
    #[bits(2)]
    __: u8,
    /// Bit 7: more extents follow for this file.
    pub multi_extent: bool,
}

/// The location and kind of a file or directory, detached from its record.
///
/// The entry carries no name. Names stay in the directory buffer and are
/// read through [`DirectoryRecord::name`] while that buffer is alive.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DirectoryEntry {
    /// First logical block of the data.
    pub extent: u32,
    /// Exact data length in bytes.
    pub size: u32,
    pub flags: FileFlags,
}

impl DirectoryEntry {
    #[must_use]
    pub const fn is_directory(&self) -> bool {
        self.flags.directory()
    }

    /// Number of logical blocks covering the data.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        (self.size as usize).div_ceil(BLOCK_SIZE)
    }
}

/// Zero-copy view of one record inside a directory buffer.
#[derive(Copy, Clone)]
pub struct DirectoryRecord<'a> {
    raw: &'a [u8],
}

impl<'a> DirectoryRecord<'a> {
    /// # Errors
    /// [`Iso9660Error::CorruptedVolume`] if the record is too short for its
    /// fixed fields or its name.
    pub fn parse(raw: &'a [u8]) -> Result<Self, Iso9660Error> {
        if raw.len() < MIN_RECORD_LEN || usize::from(raw[0]) != raw.len() {
            return Err(Iso9660Error::CorruptedVolume("directory record length"));
        }
        if NAME_OFFSET + usize::from(raw[32]) > raw.len() {
            return Err(Iso9660Error::CorruptedVolume("directory record name length"));
        }
        Ok(Self { raw })
    }

    #[must_use]
    pub fn extent(&self) -> u32 {
        u32::from_le_bytes([self.raw[2], self.raw[3], self.raw[4], self.raw[5]])
    }

    #[must_use]
    pub fn data_len(&self) -> u32 {
        u32::from_le_bytes([self.raw[10], self.raw[11], self.raw[12], self.raw[13]])
    }

    #[must_use]
    pub fn flags(&self) -> FileFlags {
        FileFlags::from_bits(self.raw[25])
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.flags().directory()
    }

    /// The record's name; the special identifiers `\0` and `\x01` read as
    /// `.` and `..`.
    #[must_use]
    pub fn name(&self) -> &'a [u8] {
        let len = usize::from(self.raw[32]);
        let name = &self.raw[NAME_OFFSET..NAME_OFFSET + len];
        match name {
            [0] => &b"."[..],
            [1] => &b".."[..],
            _ => name,
        }
    }

    #[must_use]
    pub fn entry(&self) -> DirectoryEntry {
        DirectoryEntry {
            extent: self.extent(),
            size: self.data_len(),
            flags: self.flags(),
        }
    }
}

impl fmt::Debug for DirectoryRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryRecord")
            .field("name", &self.name().escape_ascii())
            .field("extent", &self.extent())
            .field("size", &self.data_len())
            .field("directory", &self.is_directory())
            .finish()
    }
}

/// Iterator over the records of one directory's data.
///
/// Stops after the first malformed record.
#[derive(Debug, Clone)]
pub struct DirectoryRecords<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DirectoryRecords<'a> {
    /// `data` is the directory's extent, truncated to its data length.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Find the record whose name is exactly `name`.
    ///
    /// # Errors
    /// [`Iso9660Error::CorruptedVolume`] if a malformed record is hit first.
    pub fn find_name(self, name: &[u8]) -> Result<Option<DirectoryRecord<'a>>, Iso9660Error> {
        for record in self {
            let record = record?;
            if record.name() == name {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

impl<'a> Iterator for DirectoryRecords<'a> {
    type Item = Result<DirectoryRecord<'a>, Iso9660Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let len = usize::from(*self.data.get(self.pos)?);
            if len == 0 {
                // Padding: the rest of this block carries no records.
                self.pos = (self.pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
                continue;
            }

            let end = self.pos + len;
            let block_end = (self.pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
            if end > self.data.len() || end > block_end {
                self.pos = self.data.len();
                return Some(Err(Iso9660Error::CorruptedVolume(
                    "directory record crosses a block boundary",
                )));
            }

            let raw = &self.data[self.pos..end];
            self.pos = end;
            return Some(match DirectoryRecord::parse(raw) {
                Ok(record) => Ok(record),
                Err(e) => {
                    self.pos = self.data.len();
                    Err(e)
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &[u8], extent: u32, size: u32, flags: u8) -> Vec<u8> {
        let len = 33 + name.len() + (name.len() + 1) % 2;
        let mut r = vec![0u8; len];
        r[0] = u8::try_from(len).unwrap();
        r[2..6].copy_from_slice(&extent.to_le_bytes());
        r[6..10].copy_from_slice(&extent.to_be_bytes());
        r[10..14].copy_from_slice(&size.to_le_bytes());
        r[14..18].copy_from_slice(&size.to_be_bytes());
        r[25] = flags;
        r[32] = u8::try_from(name.len()).unwrap();
        r[33..33 + name.len()].copy_from_slice(name);
        r
    }

    #[test]
    fn decodes_fields() {
        let raw = record(b"KERNEL.ELF", 42, 12345, 0);
        let rec = DirectoryRecord::parse(&raw).unwrap();
        assert_eq!(rec.name(), b"KERNEL.ELF");
        assert_eq!(rec.extent(), 42);
        assert_eq!(rec.data_len(), 12345);
        assert!(!rec.is_directory());
        assert_eq!(rec.entry().blocks(), 7);
    }

    #[test]
    fn synthesizes_dot_entries() {
        let mut data = record(&[0], 20, 2048, 0x02);
        data.extend(record(&[1], 18, 2048, 0x02));
        let names: Vec<_> = DirectoryRecords::new(&data)
            .map(|r| r.unwrap().name().to_vec())
            .collect();
        assert_eq!(names, [b".".to_vec(), b"..".to_vec()]);
    }

    #[test]
    fn zero_length_record_skips_to_next_block() {
        let mut data = vec![0u8; BLOCK_SIZE * 2];
        let a = record(b"A", 30, 1, 0);
        data[..a.len()].copy_from_slice(&a);
        let b = record(b"B", 31, 1, 0);
        data[BLOCK_SIZE..BLOCK_SIZE + b.len()].copy_from_slice(&b);

        let names: Vec<_> = DirectoryRecords::new(&data)
            .map(|r| r.unwrap().name().to_vec())
            .collect();
        assert_eq!(names, [b"A".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn name_match_is_exact() {
        let mut data = record(b"BOOT", 30, 1, 0x02);
        data.extend(record(b"BOOT.CFG", 31, 1, 0));
        let found = DirectoryRecords::new(&data)
            .find_name(b"BOOT.CFG")
            .unwrap()
            .unwrap();
        assert_eq!(found.extent(), 31);
        assert!(DirectoryRecords::new(&data).find_name(b"boot").unwrap().is_none());
        assert!(DirectoryRecords::new(&data).find_name(b"BOO").unwrap().is_none());
    }

    #[test]
    fn truncated_record_is_corruption() {
        let mut data = record(b"LONGNAME.TXT", 30, 1, 0);
        data.truncate(20);
        assert!(matches!(
            DirectoryRecords::new(&data).next(),
            Some(Err(Iso9660Error::CorruptedVolume(_)))
        ));
    }
}
