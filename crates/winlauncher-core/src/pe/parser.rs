//! PE (Portable Executable) image model and reader.
//!
//! Everything needed to write the image back is kept: the DOS header and
//! stub verbatim, every COFF and optional-header field, the data directories,
//! the section table, padding between the headers and the first section, each
//! section's raw bytes and any overlay after the last section.  The resource
//! section is decoded into a [`ResourceSection`] tree; every other section
//! stays opaque.

use tracing::{debug, trace};

use crate::binary::{BinReader, BinWriter};
use crate::error::{Error, Result};
use crate::resource::ResourceSection;

// ---------------------------------------------------------------------------
// Well-known constants
// ---------------------------------------------------------------------------

/// `MZ` -- DOS header magic.
pub const DOS_MAGIC: u16 = 0x5A4D;
/// `PE\0\0` -- PE signature.
pub const PE_SIGNATURE: u32 = 0x0000_4550;

/// Optional-header magic for PE32 (32-bit).
pub const PE32_MAGIC: u16 = 0x010B;
/// Optional-header magic for PE32+ (64-bit).
pub const PE32PLUS_MAGIC: u16 = 0x020B;

// Data directory indices.
pub const IMAGE_DIRECTORY_ENTRY_RESOURCE: usize = 2;
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;

pub const RESOURCE_SECTION_NAME: &str = ".rsrc";
pub const RELOCATION_SECTION_NAME: &str = ".reloc";

const DOS_HEADER_SIZE: u32 = 0x40;
const E_LFANEW_OFFSET: usize = 0x3C;
pub(crate) const COFF_HEADER_SIZE: u64 = 20;
pub(crate) const SECTION_HEADER_SIZE: u64 = 40;
pub(crate) const DATA_DIRECTORY_SIZE: u64 = 8;

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// The DOS header and stub, kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DosHeader {
    /// Must be `0x5A4D` (`MZ`).
    pub e_magic: u16,
    /// File offset to the PE signature.
    pub e_lfanew: u32,
    /// Bytes `0..e_lfanew`: the header itself plus the real-mode stub.
    pub(crate) stub: Vec<u8>,
}

/// COFF file header (20 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbols: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    fn read(r: &mut BinReader<'_>) -> Result<Self> {
        const WHAT: &str = "COFF header";
        Ok(Self {
            machine: r.read_u16(WHAT)?,
            number_of_sections: r.read_u16(WHAT)?,
            time_date_stamp: r.read_u32(WHAT)?,
            pointer_to_symbol_table: r.read_u32(WHAT)?,
            number_of_symbols: r.read_u32(WHAT)?,
            size_of_optional_header: r.read_u16(WHAT)?,
            characteristics: r.read_u16(WHAT)?,
        })
    }

    pub(crate) fn write(&self, out: &mut BinWriter) {
        out.write_u16(self.machine);
        out.write_u16(self.number_of_sections);
        out.write_u32(self.time_date_stamp);
        out.write_u32(self.pointer_to_symbol_table);
        out.write_u32(self.number_of_symbols);
        out.write_u16(self.size_of_optional_header);
        out.write_u16(self.characteristics);
    }
}

/// Optional header for both PE32 and PE32+.  Fields that are 32-bit in PE32
/// and 64-bit in PE32+ are stored as `u64`; `base_of_data` only exists in
/// PE32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionalHeader {
    /// `0x010B` for PE32, `0x020B` for PE32+.
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: Option<u32>,
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl OptionalHeader {
    fn read(r: &mut BinReader<'_>) -> Result<Self> {
        const WHAT: &str = "optional header";
        let magic = r.read_u16(WHAT)?;
        let wide = match magic {
            PE32_MAGIC => false,
            PE32PLUS_MAGIC => true,
            other => return Err(Error::UnsupportedOptionalHeader(other)),
        };

        let major_linker_version = r.read_u8(WHAT)?;
        let minor_linker_version = r.read_u8(WHAT)?;
        let size_of_code = r.read_u32(WHAT)?;
        let size_of_initialized_data = r.read_u32(WHAT)?;
        let size_of_uninitialized_data = r.read_u32(WHAT)?;
        let address_of_entry_point = r.read_u32(WHAT)?;
        let base_of_code = r.read_u32(WHAT)?;
        let base_of_data = if wide { None } else { Some(r.read_u32(WHAT)?) };
        let image_base = read_word(r, wide)?;
        Ok(Self {
            magic,
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment: r.read_u32(WHAT)?,
            file_alignment: r.read_u32(WHAT)?,
            major_operating_system_version: r.read_u16(WHAT)?,
            minor_operating_system_version: r.read_u16(WHAT)?,
            major_image_version: r.read_u16(WHAT)?,
            minor_image_version: r.read_u16(WHAT)?,
            major_subsystem_version: r.read_u16(WHAT)?,
            minor_subsystem_version: r.read_u16(WHAT)?,
            win32_version_value: r.read_u32(WHAT)?,
            size_of_image: r.read_u32(WHAT)?,
            size_of_headers: r.read_u32(WHAT)?,
            check_sum: r.read_u32(WHAT)?,
            subsystem: r.read_u16(WHAT)?,
            dll_characteristics: r.read_u16(WHAT)?,
            size_of_stack_reserve: read_word(r, wide)?,
            size_of_stack_commit: read_word(r, wide)?,
            size_of_heap_reserve: read_word(r, wide)?,
            size_of_heap_commit: read_word(r, wide)?,
            loader_flags: r.read_u32(WHAT)?,
            number_of_rva_and_sizes: r.read_u32(WHAT)?,
        })
    }

    pub(crate) fn write(&self, out: &mut BinWriter) {
        let wide = self.is_64bit();
        let word = |out: &mut BinWriter, value: u64| {
            if wide {
                out.write_u64(value);
            } else {
                out.write_u32(value as u32);
            }
        };
        out.write_u16(self.magic);
        out.write_u8(self.major_linker_version);
        out.write_u8(self.minor_linker_version);
        out.write_u32(self.size_of_code);
        out.write_u32(self.size_of_initialized_data);
        out.write_u32(self.size_of_uninitialized_data);
        out.write_u32(self.address_of_entry_point);
        out.write_u32(self.base_of_code);
        if let (false, Some(base_of_data)) = (wide, self.base_of_data) {
            out.write_u32(base_of_data);
        }
        word(out, self.image_base);
        out.write_u32(self.section_alignment);
        out.write_u32(self.file_alignment);
        out.write_u16(self.major_operating_system_version);
        out.write_u16(self.minor_operating_system_version);
        out.write_u16(self.major_image_version);
        out.write_u16(self.minor_image_version);
        out.write_u16(self.major_subsystem_version);
        out.write_u16(self.minor_subsystem_version);
        out.write_u32(self.win32_version_value);
        out.write_u32(self.size_of_image);
        out.write_u32(self.size_of_headers);
        out.write_u32(self.check_sum);
        out.write_u16(self.subsystem);
        out.write_u16(self.dll_characteristics);
        word(out, self.size_of_stack_reserve);
        word(out, self.size_of_stack_commit);
        word(out, self.size_of_heap_reserve);
        word(out, self.size_of_heap_commit);
        out.write_u32(self.loader_flags);
        out.write_u32(self.number_of_rva_and_sizes);
    }

    pub fn is_64bit(&self) -> bool {
        self.magic == PE32PLUS_MAGIC
    }

    /// Bytes before the data directories: 96 for PE32, 112 for PE32+.
    pub fn fixed_size(&self) -> u64 {
        if self.is_64bit() {
            112
        } else {
            96
        }
    }
}

/// A field that is 32-bit in PE32 and 64-bit in PE32+.
fn read_word(r: &mut BinReader<'_>, wide: bool) -> Result<u64> {
    if wide {
        r.read_u64("optional header")
    } else {
        r.read_u32("optional header").map(u64::from)
    }
}

/// A single entry in the data-directory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

/// A single section header (40 bytes in the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    /// Raw 8-byte name (may or may not be null-terminated).
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_linenumbers: u32,
    pub number_of_relocations: u16,
    pub number_of_linenumbers: u16,
    pub characteristics: u32,
}

impl SectionHeader {
    fn read(r: &mut BinReader<'_>) -> Result<Self> {
        const WHAT: &str = "section header";
        Ok(Self {
            name: r.read_array(WHAT)?,
            virtual_size: r.read_u32(WHAT)?,
            virtual_address: r.read_u32(WHAT)?,
            size_of_raw_data: r.read_u32(WHAT)?,
            pointer_to_raw_data: r.read_u32(WHAT)?,
            pointer_to_relocations: r.read_u32(WHAT)?,
            pointer_to_linenumbers: r.read_u32(WHAT)?,
            number_of_relocations: r.read_u16(WHAT)?,
            number_of_linenumbers: r.read_u16(WHAT)?,
            characteristics: r.read_u32(WHAT)?,
        })
    }

    pub(crate) fn write(&self, out: &mut BinWriter) {
        out.write_bytes(&self.name);
        out.write_u32(self.virtual_size);
        out.write_u32(self.virtual_address);
        out.write_u32(self.size_of_raw_data);
        out.write_u32(self.pointer_to_raw_data);
        out.write_u32(self.pointer_to_relocations);
        out.write_u32(self.pointer_to_linenumbers);
        out.write_u16(self.number_of_relocations);
        out.write_u16(self.number_of_linenumbers);
        out.write_u32(self.characteristics);
    }

    /// Return the section name as a UTF-8 `&str`, trimming any trailing NUL
    /// bytes.  Invalid UTF-8 yields `"<invalid>"`.
    pub fn name_str(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..len]).unwrap_or("<invalid>")
    }

    /// Whether `rva` falls inside the section's virtual extent.
    pub fn contains_rva(&self, rva: u32) -> bool {
        let extent = self.virtual_size.max(self.size_of_raw_data);
        rva >= self.virtual_address && u64::from(rva) < u64::from(self.virtual_address) + u64::from(extent)
    }
}

/// Section content.
#[derive(Debug, Clone)]
pub enum SectionBody {
    /// Opaque bytes, written back untouched.
    Raw(Vec<u8>),
    /// The decoded resource tree.
    Resources(ResourceSection),
}

#[derive(Debug, Clone)]
pub struct Section {
    pub header: SectionHeader,
    pub body: SectionBody,
}

impl Section {
    pub fn name(&self) -> &str {
        self.header.name_str()
    }

    pub fn resources(&self) -> Option<&ResourceSection> {
        match &self.body {
            SectionBody::Resources(rsrc) => Some(rsrc),
            SectionBody::Raw(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PeFile
// ---------------------------------------------------------------------------

/// A parsed PE image held entirely in memory.
#[derive(Debug, Clone)]
pub struct PeFile {
    pub dos_header: DosHeader,
    pub coff_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub data_directories: Vec<DataDirectory>,
    /// Optional-header bytes declared by `size_of_optional_header` beyond the
    /// data directories.
    pub(crate) optional_tail: Vec<u8>,
    pub sections: Vec<Section>,
    /// Bytes between the section table and the first section's raw data.
    pub(crate) header_tail: Vec<u8>,
    /// Bytes after the last section (certificates, appended payloads).
    pub overlay: Vec<u8>,
}

impl PeFile {
    // -- construction -------------------------------------------------------

    /// Parse a PE image from a raw byte buffer.
    pub fn parse(data: &[u8]) -> Result<PeFile> {
        let mut r = BinReader::new(data);

        // --- DOS header ----------------------------------------------------
        let e_magic = r.read_u16("DOS header")?;
        if e_magic != DOS_MAGIC {
            return Err(Error::InvalidDosSignature(e_magic));
        }
        r.seek(E_LFANEW_OFFSET, "DOS header")?;
        let e_lfanew = r.read_u32("DOS header")?;
        if e_lfanew < DOS_HEADER_SIZE {
            return Err(Error::malformed(
                "DOS header",
                format!("e_lfanew 0x{e_lfanew:X} points inside the DOS header"),
            ));
        }
        r.seek(e_lfanew as usize, "PE signature")?;
        let dos_header = DosHeader {
            e_magic,
            e_lfanew,
            stub: data[..e_lfanew as usize].to_vec(),
        };

        // --- PE signature --------------------------------------------------
        let signature = r.read_u32("PE signature")?;
        if signature != PE_SIGNATURE {
            return Err(Error::InvalidPeSignature(signature));
        }

        // --- COFF header ---------------------------------------------------
        let coff_header = CoffHeader::read(&mut r)?;

        // --- Optional header -----------------------------------------------
        let optional_start = r.position();
        let optional_end = optional_start + coff_header.size_of_optional_header as usize;
        let optional_header = OptionalHeader::read(&mut r)?;

        let count = optional_header.number_of_rva_and_sizes as usize;
        if count <= IMAGE_DIRECTORY_ENTRY_BASERELOC {
            return Err(Error::MissingDataDirectory {
                index: IMAGE_DIRECTORY_ENTRY_BASERELOC,
                available: count,
            });
        }
        let directories_end = optional_header.fixed_size() as usize
            + count.saturating_mul(DATA_DIRECTORY_SIZE as usize);
        if directories_end > coff_header.size_of_optional_header as usize {
            return Err(Error::malformed(
                "optional header",
                format!(
                    "{count} data directories do not fit in {} bytes",
                    coff_header.size_of_optional_header
                ),
            ));
        }

        // --- Data directories ----------------------------------------------
        let mut data_directories = Vec::with_capacity(count);
        for _ in 0..count {
            data_directories.push(DataDirectory {
                virtual_address: r.read_u32("data directory")?,
                size: r.read_u32("data directory")?,
            });
        }
        let optional_tail = r
            .read_bytes(optional_end - r.position(), "optional header")?
            .to_vec();

        // --- Section headers -----------------------------------------------
        let mut headers = Vec::with_capacity(coff_header.number_of_sections as usize);
        for _ in 0..coff_header.number_of_sections {
            headers.push(SectionHeader::read(&mut r)?);
        }
        let table_end = r.position();

        let first_data = headers
            .iter()
            .filter(|h| h.size_of_raw_data != 0 && h.pointer_to_raw_data != 0)
            .map(|h| h.pointer_to_raw_data as usize)
            .min()
            .unwrap_or_else(|| (optional_header.size_of_headers as usize).max(table_end));
        if first_data < table_end {
            return Err(Error::malformed(
                "section table",
                format!("section data at 0x{first_data:X} overlaps the headers ending at 0x{table_end:X}"),
            ));
        }
        let header_tail = r.read_bytes(first_data - table_end, "header padding")?.to_vec();

        // --- Section bodies ------------------------------------------------
        let resource_rva = data_directories[IMAGE_DIRECTORY_ENTRY_RESOURCE].virtual_address;
        let resource_index = headers
            .iter()
            .position(|h| resource_rva != 0 && h.contains_rva(resource_rva))
            .or_else(|| headers.iter().position(|h| h.name_str() == RESOURCE_SECTION_NAME));

        let mut sections = Vec::with_capacity(headers.len());
        let mut data_end = first_data;
        for (index, header) in headers.into_iter().enumerate() {
            let raw = section_bytes(data, &header)?;
            data_end = data_end.max(header.pointer_to_raw_data as usize + raw.len());

            let body = if Some(index) == resource_index {
                if resource_rva != 0 && resource_rva != header.virtual_address {
                    return Err(Error::malformed(
                        "resource directory",
                        format!(
                            "directory at RVA 0x{resource_rva:X} does not start section {} at 0x{:X}",
                            header.name_str(),
                            header.virtual_address
                        ),
                    ));
                }
                SectionBody::Resources(ResourceSection::parse(raw, header.virtual_address)?)
            } else {
                SectionBody::Raw(raw.to_vec())
            };
            trace!(
                name = header.name_str(),
                va = header.virtual_address,
                ptr = header.pointer_to_raw_data,
                size = header.size_of_raw_data,
                "section"
            );
            sections.push(Section { header, body });
        }
        let overlay = data.get(data_end..).unwrap_or_default().to_vec();

        debug!(
            sections = sections.len(),
            pe32_plus = optional_header.is_64bit(),
            overlay = overlay.len(),
            "parsed PE image"
        );

        Ok(PeFile {
            dos_header,
            coff_header,
            optional_header,
            data_directories,
            optional_tail,
            sections,
            header_tail,
            overlay,
        })
    }

    // -- helpers ------------------------------------------------------------

    /// Look up a section by its (ASCII) name, e.g. `".text"`.
    pub fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name() == name)
    }

    pub fn find_section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.name() == name)
    }

    pub fn data_directory(&self, index: usize) -> Option<&DataDirectory> {
        self.data_directories.get(index)
    }

    pub(crate) fn resource_index(&self) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| matches!(s.body, SectionBody::Resources(_)))
    }

    /// The section named by the base-relocation directory, or `.reloc`.
    pub(crate) fn relocation_index(&self) -> Option<usize> {
        let rva = self
            .data_directories
            .get(IMAGE_DIRECTORY_ENTRY_BASERELOC)
            .map_or(0, |d| d.virtual_address);
        self.sections
            .iter()
            .position(|s| rva != 0 && s.header.contains_rva(rva))
            .or_else(|| {
                self.sections
                    .iter()
                    .position(|s| s.name() == RELOCATION_SECTION_NAME)
            })
    }

    pub fn resource_section(&self) -> Option<&Section> {
        self.resource_index().map(|i| &self.sections[i])
    }

    pub fn relocation_section(&self) -> Option<&Section> {
        self.relocation_index().map(|i| &self.sections[i])
    }

    /// The decoded resource tree, if the image has one.
    pub fn resources(&self) -> Option<&ResourceSection> {
        self.sections.iter().find_map(Section::resources)
    }

    pub fn resources_mut(&mut self) -> Option<&mut ResourceSection> {
        self.sections.iter_mut().find_map(|s| match &mut s.body {
            SectionBody::Resources(rsrc) => Some(rsrc),
            SectionBody::Raw(_) => None,
        })
    }

    /// Returns `true` when the optional header indicates a PE32+ (64-bit)
    /// image.
    pub fn is_64bit(&self) -> bool {
        self.optional_header.is_64bit()
    }
}

/// Raw bytes of `header`'s section.  Sections without file data yield an
/// empty slice; data past the end of the file is an error.
fn section_bytes<'a>(data: &'a [u8], header: &SectionHeader) -> Result<&'a [u8]> {
    if header.pointer_to_raw_data == 0 || header.size_of_raw_data == 0 {
        return Ok(&[]);
    }
    let start = header.pointer_to_raw_data as usize;
    let len = header.size_of_raw_data as usize;
    data.get(start..start + len).ok_or(Error::Truncated {
        what: "section data",
        offset: start,
        needed: len,
        available: data.len().saturating_sub(start),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- helpers to build minimal synthetic PE images -----------------------

    fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
        buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
        buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
        buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    const PE_OFFSET: usize = 0x80;

    /// Build a minimal image with `.text` at 0x200 and `.reloc` at 0x400,
    /// followed by a few overlay bytes.
    ///
    /// ```text
    /// 0x0000  DOS header, e_lfanew = 0x80
    /// 0x0080  PE signature, COFF header, optional header, 16 data dirs
    ///         section table (2 entries)
    /// 0x0200  .text  (0x200 bytes, VA 0x1000)
    /// 0x0400  .reloc (0x200 bytes, VA 0x2000)
    /// 0x0600  overlay "OVERLAY!"
    /// ```
    fn build_minimal_pe(wide: bool) -> Vec<u8> {
        let coff_offset = PE_OFFSET + 4;
        let opt_offset = coff_offset + 20;
        let fixed: usize = if wide { 112 } else { 96 };
        let opt_header_size = (fixed + 16 * 8) as u16;
        let table = opt_offset + opt_header_size as usize;

        let mut buf = vec![0u8; 0x600];
        put_u16(&mut buf, 0, DOS_MAGIC);
        buf[0x40..0x48].copy_from_slice(b"stub!!\r\n");
        put_u32(&mut buf, 0x3C, PE_OFFSET as u32);
        put_u32(&mut buf, PE_OFFSET, PE_SIGNATURE);

        put_u16(&mut buf, coff_offset, if wide { 0x8664 } else { 0x014C });
        put_u16(&mut buf, coff_offset + 2, 2);
        put_u32(&mut buf, coff_offset + 4, 0x5F00_0000);
        put_u16(&mut buf, coff_offset + 16, opt_header_size);
        put_u16(&mut buf, coff_offset + 18, 0x0022);

        put_u16(&mut buf, opt_offset, if wide { PE32PLUS_MAGIC } else { PE32_MAGIC });
        buf[opt_offset + 2] = 14;
        put_u32(&mut buf, opt_offset + 16, 0x1010);
        if wide {
            put_u64(&mut buf, opt_offset + 24, 0x0000_0001_4000_0000);
            put_u64(&mut buf, opt_offset + 72, 0x10_0000);
        } else {
            put_u32(&mut buf, opt_offset + 24, 0x2000);
            put_u32(&mut buf, opt_offset + 28, 0x0040_0000);
            put_u32(&mut buf, opt_offset + 72, 0x10_0000);
        }
        put_u32(&mut buf, opt_offset + 32, 0x1000);
        put_u32(&mut buf, opt_offset + 36, 0x200);
        put_u32(&mut buf, opt_offset + 56, 0x3000);
        put_u32(&mut buf, opt_offset + 60, 0x200);
        put_u16(&mut buf, opt_offset + 68, 2);
        put_u32(&mut buf, opt_offset + fixed - 4, 16);

        let dirs = opt_offset + fixed;
        put_u32(&mut buf, dirs + 5 * 8, 0x2000);
        put_u32(&mut buf, dirs + 5 * 8 + 4, 0x10);

        let sections: [(&[u8], u32, u32, u32); 2] = [
            (b".text", 0x1000, 0x200, 0x1E0),
            (b".reloc", 0x2000, 0x400, 0x10),
        ];
        for (i, (name, va, ptr, vs)) in sections.into_iter().enumerate() {
            let s = table + i * 40;
            buf[s..s + name.len()].copy_from_slice(name);
            put_u32(&mut buf, s + 8, vs);
            put_u32(&mut buf, s + 12, va);
            put_u32(&mut buf, s + 16, 0x200);
            put_u32(&mut buf, s + 20, ptr);
            put_u32(&mut buf, s + 36, 0x4000_0040);
        }
        buf[0x200] = 0xCC;
        buf[0x201] = 0xC3;
        buf.extend_from_slice(b"OVERLAY!");
        buf
    }

    // -- tests --------------------------------------------------------------

    #[test]
    fn parse_pe64_headers() {
        let pe = PeFile::parse(&build_minimal_pe(true)).expect("parse should succeed");
        assert_eq!(pe.dos_header.e_magic, DOS_MAGIC);
        assert_eq!(pe.dos_header.e_lfanew, 0x80);
        assert_eq!(pe.coff_header.machine, 0x8664);
        assert_eq!(pe.coff_header.number_of_sections, 2);
        assert_eq!(pe.coff_header.time_date_stamp, 0x5F00_0000);
        assert_eq!(pe.optional_header.magic, PE32PLUS_MAGIC);
        assert_eq!(pe.optional_header.major_linker_version, 14);
        assert_eq!(pe.optional_header.address_of_entry_point, 0x1010);
        assert_eq!(pe.optional_header.image_base, 0x0000_0001_4000_0000);
        assert_eq!(pe.optional_header.base_of_data, None);
        assert_eq!(pe.optional_header.size_of_stack_reserve, 0x10_0000);
        assert_eq!(pe.optional_header.subsystem, 2);
        assert_eq!(pe.optional_header.file_alignment, 0x200);
        assert!(pe.is_64bit());
    }

    #[test]
    fn parse_pe32_headers() {
        let pe = PeFile::parse(&build_minimal_pe(false)).expect("parse should succeed");
        assert_eq!(pe.optional_header.magic, PE32_MAGIC);
        assert_eq!(pe.optional_header.base_of_data, Some(0x2000));
        assert_eq!(pe.optional_header.image_base, 0x0040_0000);
        assert_eq!(pe.optional_header.size_of_stack_reserve, 0x10_0000);
        assert_eq!(pe.optional_header.subsystem, 2);
        assert!(!pe.is_64bit());
    }

    #[test]
    fn parse_sections_and_overlay() {
        let pe = PeFile::parse(&build_minimal_pe(true)).expect("parse should succeed");
        assert_eq!(pe.sections.len(), 2);
        let text = pe.find_section(".text").unwrap();
        assert_eq!(text.header.virtual_address, 0x1000);
        match &text.body {
            SectionBody::Raw(bytes) => assert_eq!(&bytes[..2], &[0xCC, 0xC3]),
            SectionBody::Resources(_) => panic!(".text decoded as resources"),
        }
        assert!(pe.find_section(".data").is_none());
        assert_eq!(pe.relocation_section().unwrap().name(), ".reloc");
        assert!(pe.resource_section().is_none());
        assert_eq!(pe.overlay, b"OVERLAY!");
        assert_eq!(pe.dos_header.stub.len(), 0x80);
        assert_eq!(pe.data_directories.len(), 16);
        assert_eq!(pe.data_directory(5).unwrap().size, 0x10);
    }

    #[test]
    fn invalid_dos_signature_rejected() {
        let mut data = build_minimal_pe(true);
        data[0] = 0x00;
        assert!(matches!(PeFile::parse(&data), Err(Error::InvalidDosSignature(0x5A00))));
    }

    #[test]
    fn invalid_pe_signature_rejected() {
        let mut data = build_minimal_pe(true);
        data[PE_OFFSET] = 0x00;
        assert!(matches!(PeFile::parse(&data), Err(Error::InvalidPeSignature(_))));
    }

    #[test]
    fn unknown_optional_header_magic_rejected() {
        let mut data = build_minimal_pe(true);
        put_u16(&mut data, PE_OFFSET + 24, 0x0107);
        assert!(matches!(
            PeFile::parse(&data),
            Err(Error::UnsupportedOptionalHeader(0x0107))
        ));
    }

    #[test]
    fn too_few_data_directories_rejected() {
        let mut data = build_minimal_pe(true);
        put_u32(&mut data, PE_OFFSET + 24 + 108, 5);
        assert!(matches!(
            PeFile::parse(&data),
            Err(Error::MissingDataDirectory { index: 5, available: 5 })
        ));
    }

    #[test]
    fn truncated_file_rejected() {
        assert!(matches!(
            PeFile::parse(&[0x4D, 0x5A]),
            Err(Error::Truncated { what: "DOS header", .. })
        ));
        let mut data = build_minimal_pe(true);
        data.truncate(0x500);
        assert!(matches!(
            PeFile::parse(&data),
            Err(Error::Truncated { what: "section data", .. })
        ));
    }

    #[test]
    fn section_name_with_full_8_bytes() {
        let header = SectionHeader {
            name: *b"longname",
            virtual_size: 0x10,
            virtual_address: 0x1000,
            size_of_raw_data: 0x200,
            pointer_to_raw_data: 0,
            pointer_to_relocations: 0,
            pointer_to_linenumbers: 0,
            number_of_relocations: 0,
            number_of_linenumbers: 0,
            characteristics: 0,
        };
        assert_eq!(header.name_str(), "longname");
        assert!(header.contains_rva(0x11FF));
        assert!(!header.contains_rva(0x1200));
    }
}
