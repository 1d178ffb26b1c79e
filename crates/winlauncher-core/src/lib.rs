//! Stamp per-product resources onto a prebuilt Windows launcher template.
//!
//! The template `.exe` is parsed into a [`pe::PeFile`] whose `.rsrc` section
//! is decoded into an editable tree.  [`LauncherGenerator`] applies string,
//! icon, bitmap and version-info edits, re-lays out the sections and writes a
//! verified image.

pub mod binary;
pub mod error;
pub mod generator;
pub mod pe;
pub mod resource;
pub mod version;

pub use error::{Error, Result};
pub use generator::{GenerationReport, LauncherGenerator};

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod fixtures;
