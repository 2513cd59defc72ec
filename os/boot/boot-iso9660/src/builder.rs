//! # In-Memory Image Builder
//!
//! Produces minimal but well-formed ISO 9660 images for tests: a primary
//! volume descriptor, a set terminator, directory extents laid out
//! breadth-first, then file data.

use crate::{BLOCK_SIZE, PRIMARY_VOLUME_DESCRIPTOR_LBA};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

const FLAG_DIRECTORY: u8 = 0x02;

#[derive(Debug)]
enum Node {
    File { data: Vec<u8> },
    Dir { children: Vec<(String, Node)> },
}

impl Node {
    const fn empty_dir() -> Self {
        Self::Dir {
            children: Vec::new(),
        }
    }
}

/// Builder for a synthetic disc image.
#[derive(Debug)]
pub struct ImageBuilder {
    volume_id: String,
    root: Node,
}

impl ImageBuilder {
    #[must_use]
    pub fn new(volume_id: &str) -> Self {
        Self {
            volume_id: volume_id.to_string(),
            root: Node::empty_dir(),
        }
    }

    /// Add a file, creating missing parent directories.
    ///
    /// # Panics
    /// If `path` is not absolute or a parent is already a file.
    #[must_use]
    pub fn file(mut self, path: &str, data: &[u8]) -> Self {
        let (parent, name) = split_parent(path);
        let dir = Self::dir_mut(&mut self.root, parent);
        dir.push((
            name.to_string(),
            Node::File {
                data: data.to_vec(),
            },
        ));
        self
    }

    /// Add an (empty) directory, creating missing parents.
    #[must_use]
    pub fn dir(mut self, path: &str) -> Self {
        let (parent, name) = split_parent(path);
        let dir = Self::dir_mut(&mut self.root, parent);
        if !dir.iter().any(|(n, _)| n == name) {
            dir.push((name.to_string(), Node::empty_dir()));
        }
        self
    }

    fn dir_mut<'n>(mut node: &'n mut Node, parent: &str) -> &'n mut Vec<(String, Node)> {
        for component in parent.split('/').filter(|c| !c.is_empty()) {
            let Node::Dir { children } = node else {
                panic!("{component} has a file as parent");
            };
            let index = match children.iter().position(|(n, _)| n == component) {
                Some(index) => index,
                None => {
                    children.push((component.to_string(), Node::empty_dir()));
                    children.len() - 1
                }
            };
            node = &mut children[index].1;
        }
        match node {
            Node::Dir { children } => children,
            Node::File { .. } => panic!("{parent} is a file"),
        }
    }

    /// Lay out and serialize the image.
    #[must_use]
    pub fn build(mut self) -> Vec<u8> {
        sort(&mut self.root);

        // Pass 1: directory sizes and extents, breadth-first from the root.
        let mut dirs: Vec<DirLayout> = Vec::new();
        let first_dir_block = PRIMARY_VOLUME_DESCRIPTOR_LBA + 2;
        let mut next_block = first_dir_block;

        let mut queue: Vec<(&Node, usize)> = vec![(&self.root, 0)];
        let mut head = 0;
        while head < queue.len() {
            let (node, parent) = queue[head];
            let index = head;
            head += 1;
            let Node::Dir { children } = node else {
                continue;
            };
            let size = directory_size(children);
            dirs.push(DirLayout {
                extent: next_block,
                size,
                parent,
                node,
            });
            next_block += blocks(size);
            for (_, child) in children {
                if matches!(child, Node::Dir { .. }) {
                    queue.push((child, index));
                }
            }
        }

        // Pass 2: file extents.
        let mut file_extents: Vec<(*const Node, u32)> = Vec::new();
        for dir in &dirs {
            let Node::Dir { children } = dir.node else {
                continue;
            };
            for (_, child) in children {
                if let Node::File { data } = child {
                    file_extents.push((core::ptr::from_ref(child), next_block));
                    next_block += blocks(data.len()).max(1);
                }
            }
        }

        let total_blocks = next_block as usize;
        let mut image = vec![0u8; total_blocks * BLOCK_SIZE];

        // Directory extents.
        for dir in &dirs {
            let Node::Dir { children } = dir.node else {
                continue;
            };
            let parent = &dirs[dir.parent];
            let mut records: Vec<Vec<u8>> = vec![
                record(&[0], dir.extent, dir.size, FLAG_DIRECTORY),
                record(&[1], parent.extent, parent.size, FLAG_DIRECTORY),
            ];
            for (name, child) in children {
                let r = match child {
                    Node::Dir { .. } => {
                        let layout = dirs
                            .iter()
                            .find(|d| core::ptr::eq(d.node, child))
                            .expect("laid out");
                        record(name.as_bytes(), layout.extent, layout.size, FLAG_DIRECTORY)
                    }
                    Node::File { data } => {
                        let extent = file_extents
                            .iter()
                            .find(|(p, _)| core::ptr::eq(*p, child))
                            .map(|(_, e)| *e)
                            .expect("laid out");
                        record(name.as_bytes(), extent, data.len(), 0)
                    }
                };
                records.push(r);
            }

            let mut pos = dir.extent as usize * BLOCK_SIZE;
            for r in records {
                let block_end = (pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
                if pos + r.len() > block_end {
                    pos = block_end;
                }
                image[pos..pos + r.len()].copy_from_slice(&r);
                pos += r.len();
            }
        }

        // File data.
        for dir in &dirs {
            let Node::Dir { children } = dir.node else {
                continue;
            };
            for (_, child) in children {
                if let Node::File { data } = child {
                    let extent = file_extents
                        .iter()
                        .find(|(p, _)| core::ptr::eq(*p, child))
                        .map(|(_, e)| *e)
                        .expect("laid out");
                    let start = extent as usize * BLOCK_SIZE;
                    image[start..start + data.len()].copy_from_slice(data);
                }
            }
        }

        // Primary volume descriptor and terminator.
        let root = &dirs[0];
        let pvd = PRIMARY_VOLUME_DESCRIPTOR_LBA as usize * BLOCK_SIZE;
        image[pvd] = 1;
        image[pvd + 1..pvd + 6].copy_from_slice(b"CD001");
        image[pvd + 6] = 1;
        let id = &mut image[pvd + 40..pvd + 72];
        id.fill(b' ');
        let id_len = self.volume_id.len().min(32);
        id[..id_len].copy_from_slice(&self.volume_id.as_bytes()[..id_len]);
        let total = u32::try_from(total_blocks).expect("image too large");
        image[pvd + 80..pvd + 84].copy_from_slice(&total.to_le_bytes());
        image[pvd + 84..pvd + 88].copy_from_slice(&total.to_be_bytes());
        let block_size = u16::try_from(BLOCK_SIZE).expect("block size");
        image[pvd + 128..pvd + 130].copy_from_slice(&block_size.to_le_bytes());
        image[pvd + 130..pvd + 132].copy_from_slice(&block_size.to_be_bytes());
        let root_record = record(&[0], root.extent, root.size, FLAG_DIRECTORY);
        image[pvd + 156..pvd + 156 + root_record.len()].copy_from_slice(&root_record);

        let terminator = pvd + BLOCK_SIZE;
        image[terminator] = 0xFF;
        image[terminator + 1..terminator + 6].copy_from_slice(b"CD001");
        image[terminator + 6] = 1;

        image
    }
}

struct DirLayout<'n> {
    extent: u32,
    size: usize,
    parent: usize,
    node: &'n Node,
}

fn split_parent(path: &str) -> (&str, &str) {
    assert!(path.starts_with('/'), "{path} is not absolute");
    path.rsplit_once('/').expect("absolute path")
}

fn sort(node: &mut Node) {
    if let Node::Dir { children } = node {
        children.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, child) in children {
            sort(child);
        }
    }
}

fn blocks(len: usize) -> u32 {
    u32::try_from(len.div_ceil(BLOCK_SIZE)).expect("image too large")
}

fn record_len(name_len: usize) -> usize {
    33 + name_len + (name_len + 1) % 2
}

/// Size of a directory extent in bytes: records never straddle a block, and
/// the extent is a whole number of blocks.
fn directory_size(children: &[(String, Node)]) -> usize {
    let mut pos = 0;
    let lens = [record_len(1), record_len(1)]
        .into_iter()
        .chain(children.iter().map(|(n, _)| record_len(n.len())));
    for len in lens {
        let block_end = (pos / BLOCK_SIZE + 1) * BLOCK_SIZE;
        if pos + len > block_end {
            pos = block_end;
        }
        pos += len;
    }
    pos.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

fn record(name: &[u8], extent: u32, size: usize, flags: u8) -> Vec<u8> {
    let len = record_len(name.len());
    let size = u32::try_from(size).expect("file too large");
    let mut r = vec![0u8; len];
    r[0] = u8::try_from(len).expect("name too long");
    r[2..6].copy_from_slice(&extent.to_le_bytes());
    r[6..10].copy_from_slice(&extent.to_be_bytes());
    r[10..14].copy_from_slice(&size.to_le_bytes());
    r[14..18].copy_from_slice(&size.to_be_bytes());
    r[25] = flags;
    r[28..30].copy_from_slice(&1u16.to_le_bytes());
    r[30..32].copy_from_slice(&1u16.to_be_bytes());
    r[32] = u8::try_from(name.len()).expect("name too long");
    r[33..33 + name.len()].copy_from_slice(name);
    r
}
