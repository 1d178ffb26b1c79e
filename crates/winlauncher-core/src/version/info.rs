//! Typed view over a `VS_VERSIONINFO` block tree.

use tracing::{debug, trace};

use super::block::{VersionBlock, VALUE_BINARY, VALUE_TEXT};
use crate::binary::{BinReader, BinWriter};
use crate::error::{Error, Result};

pub const VS_VERSION_INFO_KEY: &str = "VS_VERSION_INFO";
pub const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
pub const VAR_FILE_INFO_KEY: &str = "VarFileInfo";
pub const TRANSLATION_KEY: &str = "Translation";

pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXED_FILE_INFO_SIZE: usize = 13 * 4;

// ---------------------------------------------------------------------------
// VS_FIXEDFILEINFO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixedFileInfo {
    pub signature: u32,
    pub struc_version: u32,
    pub file_version_ms: u32,
    pub file_version_ls: u32,
    pub product_version_ms: u32,
    pub product_version_ls: u32,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_ms: u32,
    pub file_date_ls: u32,
}

impl FixedFileInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FIXED_FILE_INFO_SIZE {
            return Err(Error::VersionInfo(format!(
                "fixed file info is {} bytes, expected {FIXED_FILE_INFO_SIZE}",
                bytes.len()
            )));
        }
        let mut r = BinReader::new(bytes);
        let mut next = || r.read_u32("VS_FIXEDFILEINFO");
        let info = Self {
            signature: next()?,
            struc_version: next()?,
            file_version_ms: next()?,
            file_version_ls: next()?,
            product_version_ms: next()?,
            product_version_ls: next()?,
            file_flags_mask: next()?,
            file_flags: next()?,
            file_os: next()?,
            file_type: next()?,
            file_subtype: next()?,
            file_date_ms: next()?,
            file_date_ls: next()?,
        };
        if info.signature != FIXED_FILE_INFO_SIGNATURE {
            return Err(Error::VersionInfo(format!(
                "fixed file info signature 0x{:08X} (expected 0x{FIXED_FILE_INFO_SIGNATURE:08X})",
                info.signature
            )));
        }
        Ok(info)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = BinWriter::with_capacity(FIXED_FILE_INFO_SIZE);
        for field in [
            self.signature,
            self.struc_version,
            self.file_version_ms,
            self.file_version_ls,
            self.product_version_ms,
            self.product_version_ls,
            self.file_flags_mask,
            self.file_flags,
            self.file_os,
            self.file_type,
            self.file_subtype,
            self.file_date_ms,
            self.file_date_ls,
        ] {
            out.write_u32(field);
        }
        out.into_inner()
    }

    /// `ms` holds major.minor, `ls` holds build.revision.
    pub fn set_file_version(&mut self, ms: u32, ls: u32) {
        self.file_version_ms = ms;
        self.file_version_ls = ls;
    }

    pub fn set_product_version(&mut self, ms: u32, ls: u32) {
        self.product_version_ms = ms;
        self.product_version_ls = ls;
    }

    pub fn file_version(&self) -> [u16; 4] {
        super::unpack_version(self.file_version_ms, self.file_version_ls)
    }

    pub fn product_version(&self) -> [u16; 4] {
        super::unpack_version(self.product_version_ms, self.product_version_ls)
    }
}

// ---------------------------------------------------------------------------
// StringFileInfo
// ---------------------------------------------------------------------------

/// One `String` block: a key and its text value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionString {
    pub key: String,
    pub value: String,
}

/// A `StringTable` block, keyed by language and code page (`040904b0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringTable {
    pub key: String,
    value_type: u16,
    entries: Vec<VersionString>,
}

impl StringTable {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value_type: VALUE_TEXT,
            entries: Vec::new(),
        }
    }

    fn from_block(block: VersionBlock) -> Result<Self> {
        let mut entries = Vec::with_capacity(block.children.len());
        for child in block.children {
            if !child.children.is_empty() {
                return Err(Error::VersionInfo(format!(
                    "string '{}' in table {} has nested blocks",
                    child.key, block.key
                )));
            }
            trace!(table = %block.key, key = %child.key, "version string");
            entries.push(VersionString {
                value: child.text(),
                key: child.key,
            });
        }
        Ok(Self {
            key: block.key,
            value_type: block.value_type,
            entries,
        })
    }

    fn to_block(&self) -> VersionBlock {
        let mut block = VersionBlock::new(self.key.clone(), self.value_type);
        block.children = self
            .entries
            .iter()
            .map(|entry| {
                let mut child = VersionBlock::new(entry.key.clone(), VALUE_TEXT);
                child.set_text(&entry.value);
                child
            })
            .collect();
        block
    }

    pub fn entries(&self) -> &[VersionString] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    /// Overwrite `key`, or append it after the existing entries.  Keys are
    /// NUL-terminated on disk, so they cannot contain NUL themselves.
    pub fn set_string_value(&mut self, key: &str, value: &str) -> Result<()> {
        if key.contains('\0') {
            return Err(Error::VersionInfo(format!(
                "invalid string key {key:?} in table {}",
                self.key
            )));
        }
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value.to_string(),
            None => self.entries.push(VersionString {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringFileInfo {
    value_type: u16,
    tables: Vec<StringTable>,
}

impl StringFileInfo {
    fn from_block(block: VersionBlock) -> Result<Self> {
        let tables = block
            .children
            .into_iter()
            .map(StringTable::from_block)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            value_type: block.value_type,
            tables,
        })
    }

    fn to_block(&self) -> VersionBlock {
        let mut block = VersionBlock::new(STRING_FILE_INFO_KEY, self.value_type);
        block.children = self.tables.iter().map(StringTable::to_block).collect();
        block
    }

    pub fn tables(&self) -> &[StringTable] {
        &self.tables
    }

    /// The only string table.  Launchers ship a single language; anything
    /// else is ambiguous about which table to stamp.
    pub fn sole_string_table(&self) -> Result<&StringTable> {
        match self.tables.as_slice() {
            [table] => Ok(table),
            tables => Err(Error::VersionInfo(format!(
                "expected exactly one string table, found {}",
                tables.len()
            ))),
        }
    }

    pub fn sole_string_table_mut(&mut self) -> Result<&mut StringTable> {
        match self.tables.as_mut_slice() {
            [table] => Ok(table),
            tables => Err(Error::VersionInfo(format!(
                "expected exactly one string table, found {}",
                tables.len()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// VarFileInfo
// ---------------------------------------------------------------------------

/// `VarFileInfo`, kept as its raw block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarFileInfo {
    block: VersionBlock,
}

impl VarFileInfo {
    /// `(language, code page)` pairs of the `Translation` value.
    pub fn translations(&self) -> Vec<(u16, u16)> {
        self.block
            .child(TRANSLATION_KEY)
            .map(|t| {
                t.value
                    .chunks_exact(4)
                    .map(|c| {
                        (
                            u16::from_le_bytes([c[0], c[1]]),
                            u16::from_le_bytes([c[2], c[3]]),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// VS_VERSIONINFO
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionChild {
    StringFileInfo(StringFileInfo),
    VarFileInfo(VarFileInfo),
    Other(VersionBlock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    key: String,
    value_type: u16,
    fixed: Option<FixedFileInfo>,
    children: Vec<VersionChild>,
}

impl VersionInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let root = VersionBlock::parse(bytes)?;
        if root.key != VS_VERSION_INFO_KEY {
            return Err(Error::VersionInfo(format!(
                "root block is '{}', expected {VS_VERSION_INFO_KEY}",
                root.key
            )));
        }
        let fixed = if root.value.is_empty() {
            None
        } else {
            Some(FixedFileInfo::parse(&root.value)?)
        };

        let mut children = Vec::with_capacity(root.children.len());
        for child in root.children {
            children.push(match child.key.as_str() {
                STRING_FILE_INFO_KEY => VersionChild::StringFileInfo(StringFileInfo::from_block(child)?),
                VAR_FILE_INFO_KEY => VersionChild::VarFileInfo(VarFileInfo { block: child }),
                _ => VersionChild::Other(child),
            });
        }
        debug!(
            fixed = fixed.is_some(),
            children = children.len(),
            "parsed version info"
        );
        Ok(Self {
            key: root.key,
            value_type: root.value_type,
            fixed,
            children,
        })
    }

    pub fn to_block(&self) -> VersionBlock {
        let mut root = VersionBlock::new(self.key.clone(), self.value_type);
        if let Some(fixed) = &self.fixed {
            root.value = fixed.to_bytes();
            root.value_type = VALUE_BINARY;
        }
        root.children = self
            .children
            .iter()
            .map(|child| match child {
                VersionChild::StringFileInfo(info) => info.to_block(),
                VersionChild::VarFileInfo(var) => var.block.clone(),
                VersionChild::Other(block) => block.clone(),
            })
            .collect();
        root
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_block().to_bytes()
    }

    pub fn fixed_file_info(&self) -> Option<&FixedFileInfo> {
        self.fixed.as_ref()
    }

    pub fn fixed_file_info_mut(&mut self) -> Result<&mut FixedFileInfo> {
        self.fixed
            .as_mut()
            .ok_or_else(|| Error::VersionInfo("no fixed file info".into()))
    }

    pub fn string_file_info(&self) -> Option<&StringFileInfo> {
        self.children.iter().find_map(|child| match child {
            VersionChild::StringFileInfo(info) => Some(info),
            _ => None,
        })
    }

    pub fn string_file_info_mut(&mut self) -> Result<&mut StringFileInfo> {
        self.children
            .iter_mut()
            .find_map(|child| match child {
                VersionChild::StringFileInfo(info) => Some(info),
                _ => None,
            })
            .ok_or_else(|| Error::VersionInfo("no StringFileInfo block".into()))
    }

    pub fn var_file_info(&self) -> Option<&VarFileInfo> {
        self.children.iter().find_map(|child| match child {
            VersionChild::VarFileInfo(var) => Some(var),
            _ => None,
        })
    }

    pub fn children(&self) -> &[VersionChild] {
        &self.children
    }
}
