//! The recursive block grammar shared by every node of `VS_VERSIONINFO`.
//!
//! ```text
//! WORD  wLength        bytes in this block, children included, trailing pad excluded
//! WORD  wValueLength   words for text values, bytes for binary values
//! WORD  wType          1 = text, 0 = binary
//! WCHAR szKey[]        NUL-terminated
//!       padding        to a 4-byte boundary
//!       Value
//!       padding        to a 4-byte boundary
//!       Children[]     each starting on a 4-byte boundary
//! ```
//!
//! Offsets are measured from the start of the resource, which is the first
//! block, so absolute alignment and block-relative alignment agree.

use crate::binary::{align_up, utf16_len, Bin, BinReader, BinWriter};
use crate::error::{Error, Result};

const BLOCK_HEADER_SIZE: usize = 6;

pub const VALUE_BINARY: u16 = 0;
pub const VALUE_TEXT: u16 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionBlock {
    pub key: String,
    pub value_type: u16,
    /// Raw value bytes.  Text values are UTF-16LE and usually end in NUL.
    pub value: Vec<u8>,
    pub children: Vec<VersionBlock>,
}

impl VersionBlock {
    pub fn new(key: impl Into<String>, value_type: u16) -> Self {
        Self {
            key: key.into(),
            value_type,
            ..Default::default()
        }
    }

    /// Parse the block starting at offset 0 of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (block, _) = Self::read_at(data, 0)?;
        Ok(block)
    }

    /// Parse the block at `start`; `data` ends where the parent block ends.
    /// Returns the block and the offset just past it (before padding).
    fn read_at(data: &[u8], start: usize) -> Result<(Self, usize)> {
        let mut reader = BinReader::new(data);
        reader.seek(start, "version block")?;
        let length = reader.read_u16("version block header")? as usize;
        let value_length = reader.read_u16("version block header")? as usize;
        let value_type = reader.read_u16("version block header")?;
        if length < BLOCK_HEADER_SIZE {
            return Err(Error::malformed(
                "version block",
                format!("length {length} at offset 0x{start:X} is shorter than its header"),
            ));
        }
        let end = start + length;
        if end > data.len() {
            return Err(Error::Truncated {
                what: "version block",
                offset: start,
                needed: length,
                available: data.len() - start,
            });
        }

        let mut reader = BinReader::new(&data[..end]);
        reader.seek(start + BLOCK_HEADER_SIZE, "version block")?;
        let key = reader.read_utf16z("version block key")?;
        reader.align(4);

        let value = if value_type == VALUE_TEXT {
            // Compilers disagree on whether wValueLength counts the NUL, or
            // even whether it counts words; take what the block can hold.
            let wanted = value_length.saturating_mul(2).min(reader.remaining()) & !1;
            reader.read_bytes(wanted, "version block value")?.to_vec()
        } else {
            if value_length > reader.remaining() {
                return Err(Error::malformed(
                    "version block",
                    format!(
                        "'{key}' declares a {value_length}-byte value but only {} bytes remain",
                        reader.remaining()
                    ),
                ));
            }
            reader.read_bytes(value_length, "version block value")?.to_vec()
        };

        let mut children = Vec::new();
        loop {
            reader.align(4);
            let pos = reader.position();
            if end - pos < BLOCK_HEADER_SIZE {
                break;
            }
            // Zero padding is not a block.
            if data[pos] == 0 && data[pos + 1] == 0 {
                break;
            }
            let (child, child_end) = Self::read_at(&data[..end], pos)?;
            children.push(child);
            reader.seek(child_end, "version block")?;
        }

        Ok((
            Self {
                key,
                value_type,
                value,
                children,
            },
            end,
        ))
    }

    /// `wValueLength` as it will be written.
    pub fn value_length(&self) -> usize {
        if self.value_type == VALUE_TEXT {
            self.value.len() / 2
        } else {
            self.value.len()
        }
    }

    /// Text value with trailing NULs removed.
    pub fn text(&self) -> String {
        crate::binary::decode_utf16le(&self.value)
            .trim_end_matches('\0')
            .to_string()
    }

    /// Store `text` as a NUL-terminated text value.
    pub fn set_text(&mut self, text: &str) {
        let mut out = BinWriter::with_capacity((utf16_len(text) + 1) * 2);
        out.write_utf16z(text);
        self.value = out.into_inner();
        self.value_type = VALUE_TEXT;
    }

    pub fn child(&self, key: &str) -> Option<&VersionBlock> {
        self.children.iter().find(|c| c.key == key)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = BinWriter::with_capacity(self.size_in_bytes() as usize);
        self.write(&mut out)?;
        Ok(out.into_inner())
    }
}

impl Bin for VersionBlock {
    fn size_in_bytes(&self) -> u64 {
        let header = (BLOCK_HEADER_SIZE + (utf16_len(&self.key) + 1) * 2) as u64;
        let mut size = align_up(header, 4) + self.value.len() as u64;
        for child in &self.children {
            size = align_up(size, 4) + child.size_in_bytes();
        }
        size
    }

    fn write(&self, out: &mut BinWriter) -> Result<()> {
        let start = out.position();
        let length = self.size_in_bytes();
        let length16 = u16::try_from(length).map_err(|_| {
            Error::VersionInfo(format!("block '{}' grew to {length} bytes", self.key))
        })?;
        let value_length = u16::try_from(self.value_length()).map_err(|_| {
            Error::VersionInfo(format!("value of '{}' is too long", self.key))
        })?;

        out.write_u16(length16);
        out.write_u16(value_length);
        out.write_u16(self.value_type);
        out.write_utf16z(&self.key);
        out.align(4);
        out.write_bytes(&self.value);
        for child in &self.children {
            out.align(4);
            child.write(out)?;
        }
        out.expect_position(start + length, "version block")
    }
}
