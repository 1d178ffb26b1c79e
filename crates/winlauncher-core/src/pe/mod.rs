//! PE image model: header parsing, section layout and serialization.

pub mod parser;
pub mod writer;

pub use parser::{
    CoffHeader, DataDirectory, DosHeader, OptionalHeader, PeFile, Section, SectionBody,
    SectionHeader, IMAGE_DIRECTORY_ENTRY_BASERELOC, IMAGE_DIRECTORY_ENTRY_RESOURCE,
};
