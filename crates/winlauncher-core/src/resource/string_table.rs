//! RT_STRING resources.
//!
//! Strings live in blocks of sixteen: string `id` is slot `id % 16` of the
//! block whose resource name is `id / 16 + 1`.  Each slot is a `u16` length
//! followed by that many UTF-16 units, no terminator.

use std::collections::BTreeMap;

use tracing::debug;

use super::directory::{RawResource, ResourceDirectory, ResourceId, ResourceNode};
use super::ResourceType;
use crate::binary::{BinReader, BinWriter};
use crate::error::{Error, Result};

pub const STRINGS_PER_BLOCK: usize = 16;

/// One RT_STRING block for one language.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StringBlock {
    strings: [String; STRINGS_PER_BLOCK],
}

impl StringBlock {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = BinReader::new(bytes);
        let mut block = StringBlock::default();
        for slot in block.strings.iter_mut() {
            // Some resource compilers drop the empty tail of a block.
            if reader.remaining() == 0 {
                break;
            }
            let len = reader.read_u16("string table entry")? as usize;
            *slot = reader.read_utf16(len, "string table entry")?;
        }
        Ok(block)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = BinWriter::new();
        for s in &self.strings {
            out.write_u16(s.encode_utf16().count() as u16);
            out.write_utf16(s);
        }
        out.into_inner()
    }

    pub fn get(&self, slot: usize) -> &str {
        &self.strings[slot]
    }

    pub fn set(&mut self, slot: usize, value: &str) {
        self.strings[slot] = value.to_string();
    }
}

fn block_id(id: u16) -> u16 {
    id / STRINGS_PER_BLOCK as u16 + 1
}

fn slot(id: u16) -> usize {
    id as usize % STRINGS_PER_BLOCK
}

/// Editable view of every string block in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTableDirectory {
    /// Block ID → language → decoded block.
    blocks: BTreeMap<u16, Vec<(ResourceId, StringBlock)>>,
    /// Language and code page used for blocks that do not exist yet.
    default_language: ResourceId,
    default_code_page: u32,
}

impl StringTableDirectory {
    /// Decode the RT_STRING subtree of `root`.
    pub fn parse(root: &ResourceDirectory) -> Result<Self> {
        let strings = root
            .find_type(ResourceType::String)
            .ok_or(Error::StringTableNotFound)?;

        let mut blocks = BTreeMap::new();
        let mut defaults = None;
        for entry in strings.entries() {
            let id = entry.id().as_id().ok_or_else(|| {
                Error::malformed("string table", format!("block {} has a name, not an ID", entry.id()))
            })?;
            let languages = entry.node().as_directory().ok_or_else(|| {
                Error::malformed("string table", format!("block {id} has no language directory"))
            })?;

            let mut variants = Vec::new();
            for lang in languages.entries() {
                let leaf = lang.node().as_leaf().ok_or_else(|| {
                    Error::malformed("string table", format!("block {id} language {} is a directory", lang.id()))
                })?;
                if defaults.is_none() {
                    defaults = Some((lang.id().clone(), leaf.code_page));
                }
                variants.push((lang.id().clone(), StringBlock::parse(leaf.bytes())?));
            }
            blocks.insert(id, variants);
        }

        let (default_language, default_code_page) = defaults.unwrap_or((ResourceId::Id(0), 0));
        debug!(blocks = blocks.len(), "decoded string table");
        Ok(Self {
            blocks,
            default_language,
            default_code_page,
        })
    }

    /// String `id` in the first language that has its block.
    pub fn get(&self, id: u16) -> Option<&str> {
        let variants = self.blocks.get(&block_id(id))?;
        variants.first().map(|(_, block)| block.get(slot(id)))
    }

    /// Set string `id` in every language of its block, creating the block if
    /// the template does not have it.  Values must fit the `u16` length
    /// prefix of a slot.
    pub fn set(&mut self, id: u16, value: &str) -> Result<()> {
        let units = value.encode_utf16().count();
        if units > usize::from(u16::MAX) {
            return Err(Error::StringTooLong { id, units });
        }
        let language = self.default_language.clone();
        let variants = self
            .blocks
            .entry(block_id(id))
            .or_insert_with(|| vec![(language, StringBlock::default())]);
        for (_, block) in variants.iter_mut() {
            block.set(slot(id), value);
        }
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Re-encode every block into the RT_STRING subtree of `root`.
    pub fn store(&self, root: &mut ResourceDirectory) -> Result<()> {
        let strings = root
            .find_type_mut(ResourceType::String)
            .ok_or(Error::StringTableNotFound)?;

        for (&id, variants) in &self.blocks {
            if strings.find_sub_dir(id).is_none() {
                strings.insert(id, ResourceNode::Directory(ResourceDirectory::new()));
            }
            let languages = strings
                .find_sub_dir_mut(id)
                .ok_or_else(|| Error::malformed("string table", format!("block {id} is not a directory")))?;

            for (lang, block) in variants {
                let bytes = block.to_bytes();
                match languages.get_mut(lang) {
                    Some(ResourceNode::Leaf(leaf)) => leaf.set_bytes(bytes),
                    Some(ResourceNode::Directory(_)) => {
                        return Err(Error::malformed(
                            "string table",
                            format!("block {id} language {lang} is a directory"),
                        ))
                    }
                    None => {
                        languages.insert(
                            lang.clone(),
                            ResourceNode::Leaf(RawResource::new(bytes, self.default_code_page)),
                        );
                    }
                }
            }
        }
        Ok(())
    }
}
