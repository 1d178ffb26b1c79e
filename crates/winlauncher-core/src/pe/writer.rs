//! PE writer and section layout fixup.
//!
//! After the resource tree changes size, [`PeFile::section_virtual_address_fixup`]
//! re-derives the section table so every section sits on `FileAlignment` /
//! `SectionAlignment` boundaries without overlapping its predecessor, then
//! refreshes the resource and relocation data directories and `SizeOfImage`.
//! The [`Bin`] impl serializes the image in file order.

use tracing::{debug, warn};

use super::parser::{
    PeFile, SectionBody, COFF_HEADER_SIZE, IMAGE_DIRECTORY_ENTRY_BASERELOC,
    IMAGE_DIRECTORY_ENTRY_RESOURCE, PE_SIGNATURE, SECTION_HEADER_SIZE,
};
use crate::binary::{align_up, Bin, BinWriter};
use crate::error::{Error, Result};

impl PeFile {
    /// Offset just past the last header byte, including the padding kept
    /// between the section table and the first section.
    pub fn headers_size(&self) -> u64 {
        u64::from(self.dos_header.e_lfanew)
            + 4
            + COFF_HEADER_SIZE
            + u64::from(self.coff_header.size_of_optional_header)
            + SECTION_HEADER_SIZE * self.sections.len() as u64
            + self.header_tail.len() as u64
    }

    /// Number of file bytes `body` occupies once written.
    fn body_size(&self, body: &SectionBody) -> u64 {
        match body {
            SectionBody::Raw(bytes) => bytes.len() as u64,
            SectionBody::Resources(rsrc) => align_up(
                rsrc.size_in_bytes(),
                u64::from(self.optional_header.file_alignment),
            ),
        }
    }

    /// End of the last section's file data; the overlay starts here.
    fn sections_end(&self) -> u64 {
        self.sections
            .iter()
            .map(|s| {
                let size = self.body_size(&s.body);
                if size == 0 {
                    0
                } else {
                    u64::from(s.header.pointer_to_raw_data) + size
                }
            })
            .fold(self.headers_size(), u64::max)
    }

    /// Recompute the section table after the resource tree changed size.
    ///
    /// The resource section gets `SizeOfRawData = VirtualSize = align(tree,
    /// FileAlignment)`.  Sections keep their original file offset and address
    /// unless the previous section now overlaps them, in which case they move
    /// to the next aligned position.
    pub fn section_virtual_address_fixup(&mut self) -> Result<()> {
        let file_alignment = u64::from(self.optional_header.file_alignment);
        let section_alignment = u64::from(self.optional_header.section_alignment);
        if file_alignment == 0 || section_alignment == 0 {
            return Err(Error::malformed(
                "optional header",
                format!(
                    "zero alignment (file 0x{file_alignment:X}, section 0x{section_alignment:X})"
                ),
            ));
        }

        let resource_index = self.resource_index();
        let relocation_index = self.relocation_index();
        let movable = |i: usize| Some(i) == resource_index || Some(i) == relocation_index;

        let mut file_cursor = self.headers_size();
        let mut va_cursor = align_up(
            u64::from(self.optional_header.size_of_headers),
            section_alignment,
        );

        for index in 0..self.sections.len() {
            let raw_size = self.body_size(&self.sections[index].body);
            let section = &mut self.sections[index];
            let header = &mut section.header;

            if let SectionBody::Resources(_) = section.body {
                let size = to_u32(raw_size, "resource section size")?;
                header.size_of_raw_data = size;
                header.virtual_size = size;
            }

            let old = (header.pointer_to_raw_data, header.virtual_address);
            if raw_size != 0 {
                let ptr = align_up(u64::from(header.pointer_to_raw_data), file_alignment)
                    .max(align_up(file_cursor, file_alignment));
                header.pointer_to_raw_data = to_u32(ptr, "section file offset")?;
                file_cursor = ptr + raw_size;
            }
            let va = align_up(u64::from(header.virtual_address), section_alignment)
                .max(align_up(va_cursor, section_alignment));
            header.virtual_address = to_u32(va, "section address")?;
            va_cursor = va + u64::from(header.virtual_size.max(header.size_of_raw_data));

            let new = (header.pointer_to_raw_data, header.virtual_address);
            if new != old {
                if movable(index) {
                    debug!(
                        section = header.name_str(),
                        ptr = new.0,
                        va = new.1,
                        "moved section"
                    );
                } else {
                    warn!(
                        section = header.name_str(),
                        old_ptr = old.0,
                        old_va = old.1,
                        ptr = new.0,
                        va = new.1,
                        "section moved; code referring to it by address will break"
                    );
                }
            }

            let va = header.virtual_address;
            if let SectionBody::Resources(rsrc) = &mut section.body {
                rsrc.set_rva(va);
            }
        }

        self.optional_header.size_of_image =
            to_u32(align_up(va_cursor, section_alignment), "image size")?;

        for (index, directory) in [
            (resource_index, IMAGE_DIRECTORY_ENTRY_RESOURCE),
            (relocation_index, IMAGE_DIRECTORY_ENTRY_BASERELOC),
        ] {
            if let Some(index) = index {
                let header = self.sections[index].header;
                let entry = &mut self.data_directories[directory];
                entry.virtual_address = header.virtual_address;
                entry.size = header.virtual_size;
            }
        }

        debug!(
            size_of_image = self.optional_header.size_of_image,
            "section layout fixed up"
        );
        Ok(())
    }

    /// Serialize the whole image after an offset reset.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        self.reset_offsets(0);
        let mut out = BinWriter::with_capacity(self.size_in_bytes() as usize);
        self.write(&mut out)?;
        Ok(out.into_inner())
    }
}

fn to_u32(value: u64, what: &'static str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::malformed(what, format!("0x{value:X} exceeds 32 bits")))
}

impl Bin for PeFile {
    fn size_in_bytes(&self) -> u64 {
        self.sections_end() + self.overlay.len() as u64
    }

    /// Resource trees are laid out relative to their own section start.
    fn reset_offsets(&mut self, base: u64) -> u64 {
        for section in self.sections.iter_mut() {
            if let SectionBody::Resources(rsrc) = &mut section.body {
                rsrc.reset_offsets(0);
            }
        }
        base + self.size_in_bytes()
    }

    fn write(&self, out: &mut BinWriter) -> Result<()> {
        let start = out.position();
        out.write_bytes(&self.dos_header.stub);
        out.write_u32(PE_SIGNATURE);
        self.coff_header.write(out);
        self.optional_header.write(out);
        for directory in &self.data_directories {
            out.write_u32(directory.virtual_address);
            out.write_u32(directory.size);
        }
        out.write_bytes(&self.optional_tail);
        let optional_end = start
            + u64::from(self.dos_header.e_lfanew)
            + 4
            + COFF_HEADER_SIZE
            + u64::from(self.coff_header.size_of_optional_header);
        out.expect_position(optional_end, "optional header")?;

        for section in &self.sections {
            section.header.write(out);
        }
        out.write_bytes(&self.header_tail);

        let mut order: Vec<_> = self
            .sections
            .iter()
            .filter(|s| self.body_size(&s.body) != 0)
            .collect();
        order.sort_by_key(|s| s.header.pointer_to_raw_data);
        for section in order {
            let ptr = start + u64::from(section.header.pointer_to_raw_data);
            out.pad_to(ptr, "section data")?;
            match &section.body {
                SectionBody::Raw(bytes) => out.write_bytes(bytes),
                SectionBody::Resources(rsrc) => {
                    let mut tree = BinWriter::with_capacity(rsrc.size_in_bytes() as usize);
                    rsrc.write(&mut tree)?;
                    out.write_bytes(tree.as_slice());
                    out.pad_to(ptr + self.body_size(&section.body), "resource section")?;
                }
            }
        }

        out.pad_to(start + self.sections_end(), "overlay")?;
        out.write_bytes(&self.overlay);
        out.expect_position(start + self.size_in_bytes(), "image end")
    }
}
