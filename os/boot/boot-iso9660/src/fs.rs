//! # Filesystem Session

use crate::path::{Components, parse_path};
use crate::record::{DirectoryEntry, DirectoryRecord, DirectoryRecords};
use crate::volume::{PRIMARY_VOLUME_DESCRIPTOR_LBA, VolumeDescriptor};
use crate::{BLOCK_SIZE, BlockDevice, Iso9660Error};
use boot_arena::{Arena, ArenaSlot};
use log::{debug, info, trace, warn};

const BUFFER_ALIGN: usize = 16;

/// The bytes of a file read by [`Iso9660::read_file`].
///
/// The backing slot is rounded up to whole blocks; [`len`](Self::len) is
/// the exact file length.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FileHandle {
    slot: ArenaSlot,
    len: usize,
}

impl FileHandle {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The block-rounded allocation holding the file.
    #[must_use]
    pub const fn slot(&self) -> ArenaSlot {
        self.slot
    }

    /// Exactly the file's bytes.
    #[must_use]
    pub fn bytes<'a>(&self, arena: &'a Arena<'_>) -> &'a [u8] {
        &arena.bytes(self.slot)[..self.len]
    }

    #[must_use]
    pub const fn phys_addr(&self, arena: &Arena<'_>) -> u64 {
        arena.phys_addr(self.slot)
    }
}

/// A mounted volume.
pub struct Iso9660<D> {
    device: D,
    volume: VolumeDescriptor,
}

impl<D: BlockDevice> Iso9660<D> {
    /// Read and validate the primary volume descriptor.
    ///
    /// # Errors
    /// [`Iso9660Error::CorruptedVolume`] if the descriptor is not valid, or
    /// [`Iso9660Error::ReadError`] if the device fails.
    pub fn mount(mut device: D) -> Result<Self, Iso9660Error> {
        let mut block = [0u8; BLOCK_SIZE];
        device.read_blocks(PRIMARY_VOLUME_DESCRIPTOR_LBA, &mut block)?;
        let volume = VolumeDescriptor::parse(&block)?;

        info!(
            "Mounted ISO 9660 volume \"{}\" ({} blocks, root at block {})",
            volume.volume_id(),
            volume.volume_blocks,
            volume.root.extent
        );
        Ok(Self { device, volume })
    }

    #[must_use]
    pub const fn volume(&self) -> &VolumeDescriptor {
        &self.volume
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Resolve `path` without reading file data. `/` resolves to the root.
    ///
    /// Directory buffers used on the way are released before returning.
    ///
    /// # Errors
    /// [`Iso9660Error::InvalidArgument`] for a malformed path,
    /// [`Iso9660Error::FileNotFound`] if a component is missing or an
    /// intermediate component is not a directory, and any read or
    /// allocation failure.
    pub fn lookup(
        &mut self,
        arena: &mut Arena<'_>,
        path: &str,
    ) -> Result<DirectoryEntry, Iso9660Error> {
        if path == "/" {
            return Ok(self.volume.root);
        }

        let components = parse_path(path)?;
        let mark = arena.mark();
        let result = self.walk(arena, components);
        arena.release(mark);
        result
    }

    fn walk(
        &mut self,
        arena: &mut Arena<'_>,
        components: Components<'_>,
    ) -> Result<DirectoryEntry, Iso9660Error> {
        let mut current = self.volume.root;
        for name in components {
            if !current.is_directory() {
                debug!("{name}: parent is not a directory");
                return Err(Iso9660Error::FileNotFound);
            }

            let mark = arena.mark();
            let listing = self
                .read_extent(arena, current)?
                .prefix(current.size as usize);
            let found = DirectoryRecords::new(arena.bytes(listing))
                .find_name(name.as_bytes())
                .map(|record| record.map(|r| r.entry()));
            arena.release(mark);

            current = found?.ok_or_else(|| {
                debug!("{name}: no such entry");
                Iso9660Error::FileNotFound
            })?;
            trace!("{name}: extent {} size {}", current.extent, current.size);
        }
        Ok(current)
    }

    /// Read a whole file into a block-rounded arena allocation.
    ///
    /// # Errors
    /// As [`lookup`](Self::lookup); also [`Iso9660Error::FileNotFound`] if
    /// the path names a directory. On error the arena is left as it was.
    pub fn read_file(
        &mut self,
        arena: &mut Arena<'_>,
        path: &str,
    ) -> Result<FileHandle, Iso9660Error> {
        let entry = self.lookup(arena, path)?;
        if entry.is_directory() {
            debug!("{path} is a directory");
            return Err(Iso9660Error::FileNotFound);
        }
        if entry.flags.multi_extent() {
            warn!("{path} spans several extents; only the first is read");
        }

        let slot = self.read_extent(arena, entry)?;
        debug!("Read {path} ({} bytes)", entry.size);
        Ok(FileHandle {
            slot,
            len: entry.size as usize,
        })
    }

    /// Call `visit` for each record of the directory at `path`, including
    /// the `.` and `..` entries.
    ///
    /// # Errors
    /// As [`lookup`](Self::lookup); also [`Iso9660Error::FileNotFound`] if
    /// the path names a file. The listing buffer is released afterwards.
    pub fn read_dir<F>(
        &mut self,
        arena: &mut Arena<'_>,
        path: &str,
        mut visit: F,
    ) -> Result<(), Iso9660Error>
    where
        F: FnMut(&DirectoryRecord<'_>),
    {
        let entry = self.lookup(arena, path)?;
        if !entry.is_directory() {
            return Err(Iso9660Error::FileNotFound);
        }

        let mark = arena.mark();
        let result = self.read_extent(arena, entry).and_then(|listing| {
            let listing = listing.prefix(entry.size as usize);
            for record in DirectoryRecords::new(arena.bytes(listing)) {
                visit(&record?);
            }
            Ok(())
        });
        arena.release(mark);
        result
    }

    /// Allocate a block-rounded buffer and read the extent into it with a
    /// single device request. Extents are contiguous on disc, so one
    /// `read_blocks` call covers the whole file. The returned slot spans
    /// every block read; callers trim it to the data length.
    fn read_extent(
        &mut self,
        arena: &mut Arena<'_>,
        entry: DirectoryEntry,
    ) -> Result<ArenaSlot, Iso9660Error> {
        let blocks = entry.blocks();
        let mark = arena.mark();
        let slot = arena.alloc(blocks * BLOCK_SIZE, BUFFER_ALIGN)?;
        let read = if blocks == 0 {
            Ok(())
        } else {
            self.device.read_blocks(entry.extent, arena.bytes_mut(slot))
        };
        if let Err(e) = read {
            arena.release(mark);
            return Err(e.into());
        }
        Ok(slot)
    }
}

impl<D> core::fmt::Debug for Iso9660<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Iso9660")
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::{DeviceError, MemoryDevice};

    fn image() -> Vec<u8> {
        ImageBuilder::new("AMBEROS")
            .file("/BOOT/BOOT.CFG", b"[Display]\n> Width: 1920;\n")
            .file("/AmberOS/System/amberkrn.elf", &[0x7F; 5000])
            .file("/EMPTY.TXT", b"")
            .dir("/AmberOS/Fonts")
            .build()
    }

    #[test]
    fn reads_nested_files_byte_exact() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0x10_0000);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let kernel = fs.read_file(&mut arena, "/AmberOS/System/amberkrn.elf").unwrap();
        assert_eq!(kernel.len(), 5000);
        assert_eq!(kernel.slot().len() % BLOCK_SIZE, 0);
        assert!(kernel.bytes(&arena).iter().all(|&b| b == 0x7F));

        let cfg = fs.read_file(&mut arena, "/BOOT/BOOT.CFG").unwrap();
        assert_eq!(cfg.bytes(&arena), b"[Display]\n> Width: 1920;\n");
    }

    #[test]
    fn directory_scratch_is_released() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let file = fs.read_file(&mut arena, "/AmberOS/System/amberkrn.elf").unwrap();
        // Only the file's own blocks remain allocated.
        assert_eq!(file.slot().offset(), 0);
        assert_eq!(arena.used(), 3 * BLOCK_SIZE);
    }

    #[test]
    fn missing_component_leaves_arena_untouched() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();
        arena.alloc(100, 1).unwrap();

        for path in [
            "/AmberOS/Kernel/amberkrn.elf",
            "/AmberOS/System/AMBERKRN.ELF",
            "/NOPE",
        ] {
            assert_eq!(
                fs.read_file(&mut arena, path),
                Err(Iso9660Error::FileNotFound),
                "{path}"
            );
            assert_eq!(arena.used(), 100);
        }
    }

    #[test]
    fn type_of_each_component_is_checked() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        assert_eq!(
            fs.read_file(&mut arena, "/AmberOS/System"),
            Err(Iso9660Error::FileNotFound)
        );
        assert_eq!(
            fs.read_file(&mut arena, "/EMPTY.TXT/x"),
            Err(Iso9660Error::FileNotFound)
        );
        assert_eq!(
            fs.read_file(&mut arena, "AmberOS"),
            Err(Iso9660Error::InvalidArgument)
        );
        assert_eq!(arena.used(), 0);
    }

    #[test]
    fn zero_length_file() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let file = fs.read_file(&mut arena, "/EMPTY.TXT").unwrap();
        assert!(file.is_empty());
        assert_eq!(file.bytes(&arena), b"");
    }

    #[test]
    fn slot_spans_whole_blocks_while_bytes_stay_exact() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let cfg = fs.read_file(&mut arena, "/BOOT/BOOT.CFG").unwrap();
        assert_eq!(cfg.slot().len(), BLOCK_SIZE);
        assert_eq!(cfg.len(), 25);
        assert_eq!(cfg.bytes(&arena).len(), 25);
        // Tail of the final block is the zero padding from the image.
        assert!(arena.bytes(cfg.slot())[25..].iter().all(|&b| b == 0));
    }

    #[test]
    fn lists_directories_spanning_blocks() {
        let mut builder = ImageBuilder::new("MANY");
        for i in 0..80 {
            builder = builder.file(&format!("/DATA/FILE{i:03}.BIN"), &[u8::try_from(i).unwrap()]);
        }
        let image = builder.build();

        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let data = fs.lookup(&mut arena, "/DATA").unwrap();
        assert!(data.size as usize > BLOCK_SIZE);

        let mut names = Vec::new();
        fs.read_dir(&mut arena, "/DATA", |r| names.push(r.name().to_vec()))
            .unwrap();
        assert_eq!(names.len(), 82);
        assert_eq!(names[0], b".");
        assert_eq!(names[1], b"..");
        assert_eq!(arena.used(), 0);

        let last = fs.read_file(&mut arena, "/DATA/FILE079.BIN").unwrap();
        assert_eq!(last.bytes(&arena), [79]);
    }

    #[test]
    fn root_listing() {
        let image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();

        let mut names = Vec::new();
        fs.read_dir(&mut arena, "/", |r| {
            names.push((String::from_utf8_lossy(r.name()).into_owned(), r.is_directory()));
        })
        .unwrap();
        assert_eq!(
            names,
            [
                (String::from("."), true),
                (String::from(".."), true),
                (String::from("AmberOS"), true),
                (String::from("BOOT"), true),
                (String::from("EMPTY.TXT"), false),
            ]
        );
    }

    #[test]
    fn mount_rejects_blank_media() {
        let blank = vec![0u8; 32 * BLOCK_SIZE];
        assert!(matches!(
            Iso9660::mount(MemoryDevice::new(&blank)),
            Err(Iso9660Error::CorruptedVolume(_))
        ));

        let short = vec![0u8; 4 * BLOCK_SIZE];
        assert_eq!(
            Iso9660::mount(MemoryDevice::new(&short)).unwrap_err(),
            Iso9660Error::ReadError(DeviceError::OutOfRange { block: 16 })
        );
    }

    #[test]
    fn out_of_memory_is_reported() {
        let image = image();
        let mut backing = vec![0u8; 4 * BLOCK_SIZE];
        let mut arena = Arena::new(&mut backing, 0);
        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();
        arena.alloc(2 * BLOCK_SIZE, 1).unwrap();

        assert!(matches!(
            fs.read_file(&mut arena, "/AmberOS/System/amberkrn.elf"),
            Err(Iso9660Error::OutOfMemory(_))
        ));
        assert_eq!(arena.used(), 2 * BLOCK_SIZE);
    }

    #[test]
    fn corrupted_directory_is_reported() {
        let mut image = image();
        let mut backing = vec![0u8; 64 * 1024];
        let mut arena = Arena::new(&mut backing, 0);
        let root = Iso9660::mount(MemoryDevice::new(&image)).unwrap().volume().root;

        // Overwrite everything after `.` and `..` with a record whose name
        // runs past its own length.
        let start = root.extent as usize * BLOCK_SIZE;
        image[start + 68..start + BLOCK_SIZE].fill(0xEE);

        let mut fs = Iso9660::mount(MemoryDevice::new(&image)).unwrap();
        assert!(matches!(
            fs.read_file(&mut arena, "/EMPTY.TXT"),
            Err(Iso9660Error::CorruptedVolume(_))
        ));
    }
}
