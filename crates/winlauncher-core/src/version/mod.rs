//! `VS_VERSIONINFO` resource: block grammar, typed view and version numbers.

pub mod block;
pub mod info;

pub use block::VersionBlock;
pub use info::{
    FixedFileInfo, StringFileInfo, StringTable, VarFileInfo, VersionChild, VersionInfo,
    VersionString,
};

use crate::error::{Error, Result};

/// Parse `major.minor.build.revision`.  Exactly four numeric components are
/// required; a missing component is an error, never an implicit zero.
pub fn split_version(text: &str) -> Result<[u16; 4]> {
    let invalid = || Error::InvalidVersion(text.to_string());
    let mut parts = [0u16; 4];
    let mut components = text.split('.');
    for part in parts.iter_mut() {
        let component = components.next().ok_or_else(invalid)?;
        if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *part = component.parse().map_err(|_| invalid())?;
    }
    if components.next().is_some() {
        return Err(invalid());
    }
    Ok(parts)
}

/// Pack four components into the `(ms, ls)` pair of `VS_FIXEDFILEINFO`.
pub fn pack_version(version: [u16; 4]) -> (u32, u32) {
    let [major, minor, build, revision] = version.map(u32::from);
    ((major << 16) | minor, (build << 16) | revision)
}

pub fn unpack_version(ms: u32, ls: u32) -> [u16; 4] {
    [
        (ms >> 16) as u16,
        (ms & 0xFFFF) as u16,
        (ls >> 16) as u16,
        (ls & 0xFFFF) as u16,
    ]
}
