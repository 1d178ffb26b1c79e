//! Little-endian binary structure primitives.
//!
//! Every on-disk structure in this crate is read through a [`BinReader`]
//! cursor and written through a [`BinWriter`].  Composite structures implement
//! [`Bin`], whose size is always recomputed from the children rather than
//! cached, so a leaf that grows or shrinks is reflected in every ancestor the
//! next time anyone asks.

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Alignment helpers
// ---------------------------------------------------------------------------

/// Round `value` up to the nearest multiple of `alignment`.
/// An alignment of zero leaves the value untouched.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// `u32` flavour of [`align_up`] for header fields.
pub fn align_up_u32(value: u32, alignment: u32) -> u32 {
    align_up(u64::from(value), u64::from(alignment)) as u32
}

// ---------------------------------------------------------------------------
// Bin trait
// ---------------------------------------------------------------------------

/// A serializable binary structure node.
pub trait Bin {
    /// Exact number of bytes [`Bin::write`] will emit.  Must not have side
    /// effects and must not rely on state left by a previous layout pass.
    fn size_in_bytes(&self) -> u64;

    /// Assign offsets relative to `base` for this node and its children and
    /// return the offset just past the node.  Required before `write` for
    /// nodes that encode offsets of their children.
    fn reset_offsets(&mut self, base: u64) -> u64 {
        base + self.size_in_bytes()
    }

    /// Serialize the node.
    fn write(&self, out: &mut BinWriter) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Bounds-checked little-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct BinReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current offset from the start of the underlying slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the cursor to an absolute offset.  Seeking exactly to the end is
    /// allowed; seeking past it is not.
    pub fn seek(&mut self, pos: usize, what: &'static str) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::Truncated {
                what,
                offset: pos,
                needed: 0,
                available: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Skip forward to the next multiple of `alignment`.  Padding that runs
    /// off the end of the slice is tolerated; the cursor stops at the end.
    pub fn align(&mut self, alignment: usize) {
        let target = align_up(self.pos as u64, alignment as u64) as usize;
        self.pos = target.min(self.data.len());
    }

    pub fn read_bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::Truncated {
            what,
            offset: self.pos,
            needed: n,
            available: self.remaining(),
        })?;
        if end > self.data.len() {
            return Err(Error::Truncated {
                what,
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N, what)?);
        Ok(buf)
    }

    pub fn read_u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.read_array::<1>(what)?[0])
    }

    pub fn read_u16(&mut self, what: &'static str) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_u32(&mut self, what: &'static str) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array(what)?))
    }

    pub fn read_u64(&mut self, what: &'static str) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array(what)?))
    }

    /// Read a NUL-terminated UTF-16LE string, consuming the terminator.
    pub fn read_utf16z(&mut self, what: &'static str) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16(what)?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    /// Read `count` UTF-16LE code units.
    pub fn read_utf16(&mut self, count: usize, what: &'static str) -> Result<String> {
        let raw = self.read_bytes(count.saturating_mul(2), what)?;
        Ok(decode_utf16le(raw))
    }
}

/// Decode UTF-16LE bytes, ignoring a dangling odd byte.
pub fn decode_utf16le(raw: &[u8]) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Number of UTF-16 code units needed for `s`.
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Growable little-endian output buffer.
#[derive(Debug, Default, Clone)]
pub struct BinWriter {
    buf: Vec<u8>,
}

impl BinWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn position(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Write `s` as UTF-16LE without a terminator.
    pub fn write_utf16(&mut self, s: &str) {
        for unit in s.encode_utf16() {
            self.write_u16(unit);
        }
    }

    /// Write `s` as UTF-16LE followed by a NUL code unit.
    pub fn write_utf16z(&mut self, s: &str) {
        self.write_utf16(s);
        self.write_u16(0);
    }

    /// Zero-fill up to `offset`.  Fails if the writer is already past it,
    /// which means two structures claim overlapping ranges.
    pub fn pad_to(&mut self, offset: u64, what: &'static str) -> Result<()> {
        let pos = self.position();
        if pos > offset {
            return Err(Error::LayoutMismatch {
                what,
                expected: offset,
                actual: pos,
            });
        }
        self.buf.resize(offset as usize, 0);
        Ok(())
    }

    /// Zero-fill to the next multiple of `alignment`.
    pub fn align(&mut self, alignment: u64) {
        let target = align_up(self.position(), alignment);
        self.buf.resize(target as usize, 0);
    }

    /// Check that the cursor sits where the last layout pass said it would.
    pub fn expect_position(&self, expected: u64, what: &'static str) -> Result<()> {
        let actual = self.position();
        if actual != expected {
            return Err(Error::LayoutMismatch {
                what,
                expected,
                actual,
            });
        }
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_multiples() {
        assert_eq!(align_up(0, 0x200), 0);
        assert_eq!(align_up(1, 0x200), 0x200);
        assert_eq!(align_up(0x200, 0x200), 0x200);
        assert_eq!(align_up(0x201, 0x200), 0x400);
        assert_eq!(align_up(7, 0), 7);
        assert_eq!(align_up_u32(0x1001, 0x1000), 0x2000);
    }

    #[test]
    fn reader_reads_little_endian() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut r = BinReader::new(&data);
        assert_eq!(r.read_u16("test").unwrap(), 0x1234);
        assert_eq!(r.read_u32("test").unwrap(), 0x1234_5678);
        assert_eq!(r.position(), 6);
        assert_eq!(r.remaining(), 1);
        assert_eq!(r.read_u8("test").unwrap(), 0xFF);
    }

    #[test]
    fn truncated_read_names_the_structure() {
        let data = [0u8; 3];
        let mut r = BinReader::new(&data);
        r.read_u16("header").unwrap();
        match r.read_u32("COFF header") {
            Err(Error::Truncated {
                what,
                offset,
                needed,
                available,
            }) => {
                assert_eq!(what, "COFF header");
                assert_eq!(offset, 2);
                assert_eq!(needed, 4);
                assert_eq!(available, 1);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        // A failed read leaves the cursor alone.
        assert_eq!(r.position(), 2);
    }

    #[test]
    fn seek_past_end_fails() {
        let data = [0u8; 4];
        let mut r = BinReader::new(&data);
        assert!(r.seek(4, "x").is_ok());
        assert!(r.seek(5, "x").is_err());
    }

    #[test]
    fn utf16_round_trip_through_reader_and_writer() {
        let mut w = BinWriter::new();
        w.write_utf16z("Größe ✓");
        w.write_utf16("ab");
        let bytes = w.into_inner();
        let mut r = BinReader::new(&bytes);
        assert_eq!(r.read_utf16z("s").unwrap(), "Größe ✓");
        assert_eq!(r.read_utf16(2, "s").unwrap(), "ab");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn writer_padding_and_alignment() {
        let mut w = BinWriter::new();
        w.write_u8(1);
        w.align(4);
        assert_eq!(w.position(), 4);
        w.pad_to(10, "gap").unwrap();
        assert_eq!(w.position(), 10);
        assert!(matches!(
            w.pad_to(8, "gap"),
            Err(Error::LayoutMismatch { expected: 8, actual: 10, .. })
        ));
        assert!(w.expect_position(10, "x").is_ok());
        assert!(w.expect_position(11, "x").is_err());
    }

    #[test]
    fn reader_align_tolerates_missing_tail_padding() {
        let data = [1u8, 2, 3];
        let mut r = BinReader::new(&data);
        r.read_u8("b").unwrap();
        r.align(4);
        assert_eq!(r.position(), 3);
        assert_eq!(r.remaining(), 0);
    }
}
