//! Reading and writing the resource section.
//!
//! Layout written by [`ResourceSection`] (offsets relative to the section):
//!
//! ```text
//! directory tables, breadth-first      16 + 8 * entries each
//! entry name strings                   u16 length + UTF-16 units
//! data entries (8-aligned)             16 bytes per leaf
//! leaf data                            each 8-aligned
//! ```

use std::collections::VecDeque;

use tracing::{debug, trace};

use super::directory::{DirectoryEntry, RawResource, ResourceDirectory, ResourceId, ResourceNode};
use crate::binary::{align_up, Bin, BinReader, BinWriter};
use crate::error::{Error, Result};

const DIRECTORY_HEADER_SIZE: u64 = 16;
const DIRECTORY_ENTRY_SIZE: u64 = 8;
const DATA_ENTRY_SIZE: u64 = 16;
const DATA_ALIGNMENT: u64 = 8;
const HIGH_BIT: u32 = 0x8000_0000;
/// Real trees are three levels deep; anything far deeper is a loop.
const MAX_DEPTH: usize = 16;

/// Parsed `.rsrc` content.
#[derive(Debug, Clone)]
pub struct ResourceSection {
    root: ResourceDirectory,
    /// RVA of the section; data entries store absolute RVAs.
    rva: u32,
}

impl ResourceSection {
    pub fn new(root: ResourceDirectory, rva: u32) -> Self {
        Self { root, rva }
    }

    /// Parse the tree rooted at the start of `section`, a section loaded at
    /// `rva`.
    pub fn parse(section: &[u8], rva: u32) -> Result<Self> {
        let mut reader = BinReader::new(section);
        let root = read_directory(&mut reader, 0, rva, 0)?;
        debug!(
            types = root.len(),
            leaves = root.leaf_count(),
            "parsed resource directory"
        );
        Ok(Self { root, rva })
    }

    pub fn root(&self) -> &ResourceDirectory {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut ResourceDirectory {
        &mut self.root
    }

    pub fn rva(&self) -> u32 {
        self.rva
    }

    /// Move the section; only the RVAs in the data entries change.
    pub fn set_rva(&mut self, rva: u32) {
        self.rva = rva;
    }

    /// Serialize into a fresh buffer after an offset reset.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.reset_offsets(0);
        let mut out = BinWriter::with_capacity(self.size_in_bytes() as usize);
        self.write(&mut out)?;
        Ok(out.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn read_directory(
    reader: &mut BinReader<'_>,
    offset: usize,
    rva: u32,
    depth: usize,
) -> Result<ResourceDirectory> {
    if depth > MAX_DEPTH {
        return Err(Error::malformed(
            "resource directory",
            format!("nesting deeper than {MAX_DEPTH} levels at offset 0x{offset:X}"),
        ));
    }
    reader.seek(offset, "resource directory")?;
    let characteristics = reader.read_u32("resource directory")?;
    let time_date_stamp = reader.read_u32("resource directory")?;
    let major_version = reader.read_u16("resource directory")?;
    let minor_version = reader.read_u16("resource directory")?;
    let named = reader.read_u16("resource directory")? as usize;
    let ids = reader.read_u16("resource directory")? as usize;

    let mut raw_entries = Vec::with_capacity(named + ids);
    for _ in 0..named + ids {
        let name = reader.read_u32("resource directory entry")?;
        let target = reader.read_u32("resource directory entry")?;
        raw_entries.push((name, target));
    }

    let mut entries = Vec::with_capacity(raw_entries.len());
    for (name, target) in raw_entries {
        let id = if name & HIGH_BIT != 0 {
            reader.seek((name & !HIGH_BIT) as usize, "resource name")?;
            let len = reader.read_u16("resource name")? as usize;
            ResourceId::Name(reader.read_utf16(len, "resource name")?)
        } else {
            ResourceId::Id((name & 0xFFFF) as u16)
        };

        let node = if target & HIGH_BIT != 0 {
            let child = (target & !HIGH_BIT) as usize;
            if child == offset {
                return Err(Error::malformed(
                    "resource directory",
                    format!("entry {id} points back at its own directory"),
                ));
            }
            ResourceNode::Directory(read_directory(reader, child, rva, depth + 1)?)
        } else {
            ResourceNode::Leaf(read_leaf(reader, target as usize, rva)?)
        };
        trace!(depth, %id, "resource entry");

        entries.push(DirectoryEntry {
            id,
            node,
            name_offset: 0,
        });
    }

    Ok(ResourceDirectory {
        characteristics,
        time_date_stamp,
        major_version,
        minor_version,
        entries,
        offset: 0,
    })
}

fn read_leaf(reader: &mut BinReader<'_>, offset: usize, rva: u32) -> Result<RawResource> {
    reader.seek(offset, "resource data entry")?;
    let data_rva = reader.read_u32("resource data entry")?;
    let size = reader.read_u32("resource data entry")? as usize;
    let code_page = reader.read_u32("resource data entry")?;
    let reserved = reader.read_u32("resource data entry")?;

    let start = data_rva.checked_sub(rva).ok_or_else(|| {
        Error::malformed(
            "resource data entry",
            format!("data RVA 0x{data_rva:X} lies before the section at 0x{rva:X}"),
        )
    })? as usize;
    reader.seek(start, "resource data")?;
    let data = reader.read_bytes(size, "resource data")?.to_vec();

    let mut leaf = RawResource::new(data, code_page);
    leaf.reserved = reserved;
    Ok(leaf)
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Sizes of the fixed-size regions, folded from the current tree.
struct Regions {
    tables: u64,
    strings: u64,
    leaves: u64,
}

fn measure(root: &ResourceDirectory) -> Regions {
    let mut regions = Regions {
        tables: 0,
        strings: 0,
        leaves: 0,
    };
    let mut queue = VecDeque::from([root]);
    while let Some(dir) = queue.pop_front() {
        regions.tables += DIRECTORY_HEADER_SIZE + DIRECTORY_ENTRY_SIZE * dir.entries.len() as u64;
        for entry in &dir.entries {
            if let ResourceId::Name(name) = &entry.id {
                regions.strings += name_size(name);
            }
            match &entry.node {
                ResourceNode::Directory(child) => queue.push_back(child),
                ResourceNode::Leaf(_) => regions.leaves += 1,
            }
        }
    }
    regions
}

fn name_size(name: &str) -> u64 {
    2 + 2 * name.encode_utf16().count() as u64
}

/// Visit leaves in the same breadth-first order the layout uses.
fn leaves_bfs(root: &ResourceDirectory) -> Vec<&RawResource> {
    let mut leaves = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(dir) = queue.pop_front() {
        for entry in &dir.entries {
            match &entry.node {
                ResourceNode::Directory(child) => queue.push_back(child),
                ResourceNode::Leaf(leaf) => leaves.push(leaf),
            }
        }
    }
    leaves
}

impl Bin for ResourceSection {
    fn size_in_bytes(&self) -> u64 {
        let regions = measure(&self.root);
        let entries_start = align_up(regions.tables + regions.strings, DATA_ALIGNMENT);
        let mut end = entries_start + DATA_ENTRY_SIZE * regions.leaves;
        for leaf in leaves_bfs(&self.root) {
            end = align_up(end, DATA_ALIGNMENT) + leaf.len() as u64;
        }
        end
    }

    fn reset_offsets(&mut self, base: u64) -> u64 {
        let regions = measure(&self.root);
        let mut table_cursor = base;
        let mut string_cursor = base + regions.tables;
        let mut entry_cursor = align_up(string_cursor + regions.strings, DATA_ALIGNMENT);
        let mut data_cursor = entry_cursor + DATA_ENTRY_SIZE * regions.leaves;

        let mut queue = VecDeque::from([&mut self.root]);
        while let Some(dir) = queue.pop_front() {
            dir.offset = table_cursor;
            table_cursor += DIRECTORY_HEADER_SIZE + DIRECTORY_ENTRY_SIZE * dir.entries.len() as u64;
            for entry in dir.entries.iter_mut() {
                if let ResourceId::Name(name) = &entry.id {
                    entry.name_offset = string_cursor;
                    string_cursor += name_size(name);
                }
                match &mut entry.node {
                    ResourceNode::Directory(child) => queue.push_back(child),
                    ResourceNode::Leaf(leaf) => {
                        leaf.entry_offset = entry_cursor;
                        entry_cursor += DATA_ENTRY_SIZE;
                        data_cursor = align_up(data_cursor, DATA_ALIGNMENT);
                        leaf.data_offset = data_cursor;
                        data_cursor += leaf.len() as u64;
                    }
                }
            }
        }
        data_cursor
    }

    fn write(&self, out: &mut BinWriter) -> Result<()> {
        // Directory tables.
        let mut queue = VecDeque::from([&self.root]);
        while let Some(dir) = queue.pop_front() {
            out.expect_position(dir.offset, "resource directory")?;
            out.write_u32(dir.characteristics);
            out.write_u32(dir.time_date_stamp);
            out.write_u16(dir.major_version);
            out.write_u16(dir.minor_version);
            out.write_u16(dir.named_count() as u16);
            out.write_u16(dir.id_count() as u16);
            for entry in &dir.entries {
                let name = match &entry.id {
                    ResourceId::Name(_) => HIGH_BIT | entry.name_offset as u32,
                    ResourceId::Id(id) => u32::from(*id),
                };
                let target = match &entry.node {
                    ResourceNode::Directory(child) => {
                        queue.push_back(child);
                        HIGH_BIT | child.offset as u32
                    }
                    ResourceNode::Leaf(leaf) => leaf.entry_offset as u32,
                };
                out.write_u32(name);
                out.write_u32(target);
            }
        }

        // Name strings, same breadth-first order.
        let mut queue = VecDeque::from([&self.root]);
        while let Some(dir) = queue.pop_front() {
            for entry in &dir.entries {
                if let ResourceId::Name(name) = &entry.id {
                    out.expect_position(entry.name_offset, "resource name")?;
                    out.write_u16(name.encode_utf16().count() as u16);
                    out.write_utf16(name);
                }
                if let ResourceNode::Directory(child) = &entry.node {
                    queue.push_back(child);
                }
            }
        }

        let leaves = leaves_bfs(&self.root);
        out.align(DATA_ALIGNMENT);
        for leaf in &leaves {
            out.expect_position(leaf.entry_offset, "resource data entry")?;
            out.write_u32(self.rva + leaf.data_offset as u32);
            out.write_u32(leaf.len() as u32);
            out.write_u32(leaf.code_page);
            out.write_u32(leaf.reserved);
        }
        for leaf in &leaves {
            out.pad_to(leaf.data_offset, "resource data")?;
            out.write_bytes(leaf.bytes());
        }
        Ok(())
    }
}
