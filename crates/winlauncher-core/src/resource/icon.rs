//! `.ico` container → RT_ICON / RT_GROUP_ICON conversion.
//!
//! An icon file is an `ICONDIR` header followed by `ICONDIRENTRY` records that
//! point at the image bytes.  Inside a PE image every image becomes its own
//! RT_ICON leaf and a `GRPICONDIR` in RT_GROUP_ICON lists them by resource ID.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::directory::{RawResource, ResourceDirectory, ResourceId, ResourceNode};
use super::ResourceType;
use crate::binary::{BinReader, BinWriter};
use crate::error::{Error, Result};

const ICON_TYPE: u16 = 1;
const ICONDIR_SIZE: usize = 6;
const ICONDIRENTRY_SIZE: usize = 16;
const GRPICONDIRENTRY_SIZE: usize = 14;

/// One image of an icon file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconImage {
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub reserved: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub data: Vec<u8>,
}

/// A parsed `.ico` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconFile {
    pub images: Vec<IconImage>,
}

impl IconFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = BinReader::new(bytes);
        let (reserved, kind, count) =
            read_icondir(&mut reader).map_err(|e| Error::InvalidIcon(e.to_string()))?;
        if reserved != 0 || kind != ICON_TYPE {
            return Err(Error::InvalidIcon(format!(
                "not an icon container (reserved {reserved}, type {kind})"
            )));
        }
        if count == 0 {
            return Err(Error::InvalidIcon("icon file contains no images".into()));
        }

        let table_end = ICONDIR_SIZE + count as usize * ICONDIRENTRY_SIZE;
        if table_end > bytes.len() {
            return Err(Error::InvalidIcon(format!(
                "{count} directory entries need {table_end} bytes, file has {}",
                bytes.len()
            )));
        }

        let mut images = Vec::with_capacity(count as usize);
        for index in 0..count {
            let image = read_entry(&mut reader, bytes)
                .map_err(|e| Error::InvalidIcon(format!("image {index}: {e}")))?;
            trace!(
                index,
                width = image.width,
                height = image.height,
                bits = image.bit_count,
                size = image.data.len(),
                "icon image"
            );
            images.push(image);
        }
        Ok(Self { images })
    }

    /// `GRPICONDIR` referencing the images under consecutive `ids`.
    pub fn group_bytes(&self, ids: &[u16]) -> Vec<u8> {
        let mut out =
            BinWriter::with_capacity(ICONDIR_SIZE + self.images.len() * GRPICONDIRENTRY_SIZE);
        out.write_u16(0);
        out.write_u16(ICON_TYPE);
        out.write_u16(self.images.len() as u16);
        for (image, &id) in self.images.iter().zip(ids) {
            out.write_u8(image.width);
            out.write_u8(image.height);
            out.write_u8(image.color_count);
            out.write_u8(image.reserved);
            out.write_u16(image.planes);
            out.write_u16(image.bit_count);
            out.write_u32(image.data.len() as u32);
            out.write_u16(id);
        }
        out.into_inner()
    }
}

fn read_icondir(reader: &mut BinReader<'_>) -> Result<(u16, u16, u16)> {
    Ok((
        reader.read_u16("ICONDIR")?,
        reader.read_u16("ICONDIR")?,
        reader.read_u16("ICONDIR")?,
    ))
}

fn read_entry(reader: &mut BinReader<'_>, file: &[u8]) -> Result<IconImage> {
    const WHAT: &str = "ICONDIRENTRY";
    let width = reader.read_u8(WHAT)?;
    let height = reader.read_u8(WHAT)?;
    let color_count = reader.read_u8(WHAT)?;
    let reserved = reader.read_u8(WHAT)?;
    let planes = reader.read_u16(WHAT)?;
    let bit_count = reader.read_u16(WHAT)?;
    let size = reader.read_u32(WHAT)? as usize;
    let offset = reader.read_u32(WHAT)? as usize;

    let data = offset
        .checked_add(size)
        .and_then(|end| file.get(offset..end))
        .ok_or_else(|| {
            Error::InvalidIcon(format!(
                "image data 0x{offset:X}+{size} lies outside the {}-byte file",
                file.len()
            ))
        })?;
    if data.is_empty() {
        return Err(Error::InvalidIcon("empty image".into()));
    }

    Ok(IconImage {
        width,
        height,
        color_count,
        reserved,
        planes,
        bit_count,
        data: data.to_vec(),
    })
}

/// Icon IDs listed in a `GRPICONDIR`.
fn group_icon_ids(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut reader = BinReader::new(bytes);
    reader.read_u16("GRPICONDIR")?;
    reader.read_u16("GRPICONDIR")?;
    let count = reader.read_u16("GRPICONDIR")?;
    let mut ids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        reader.read_bytes(GRPICONDIRENTRY_SIZE - 2, "GRPICONDIRENTRY")?;
        ids.push(reader.read_u16("GRPICONDIRENTRY")?);
    }
    Ok(ids)
}

/// RT_ICON IDs referenced by any icon group other than `group_id`.
fn ids_used_by_other_groups(root: &ResourceDirectory, group_id: u16) -> Result<BTreeSet<u16>> {
    let mut shared = BTreeSet::new();
    let Some(groups) = root.find_type(ResourceType::GroupIcon) else {
        return Ok(shared);
    };
    for entry in groups.entries() {
        if entry.id().as_id() == Some(group_id) {
            continue;
        }
        if let Some(languages) = entry.node().as_directory() {
            for leaf in languages.leaves() {
                shared.extend(group_icon_ids(leaf.bytes())?);
            }
        }
    }
    Ok(shared)
}

/// Replace icon group `group_id` with the images of `icon`.
///
/// RT_ICON leaves of the previous group are removed unless another group
/// still lists them; the new images get consecutive IDs above every
/// remaining RT_ICON ID and inherit the group's language and code page.
/// Returns the assigned IDs.
pub fn inject_icon(root: &mut ResourceDirectory, icon: &IconFile, group_id: u16) -> Result<Vec<u16>> {
    let group = root
        .find_type(ResourceType::GroupIcon)
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::GroupIcon.name(),
            id: None,
        })?
        .find_sub_dir(group_id)
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::GroupIcon.name(),
            id: Some(group_id),
        })?;

    let first = group.entries().first().ok_or_else(|| {
        Error::malformed("icon group", format!("group {group_id} has no language entry"))
    })?;
    let language = first.id().clone();
    let current = first.node().as_leaf().ok_or_else(|| {
        Error::malformed("icon group", format!("group {group_id} language {language} is a directory"))
    })?;
    let code_page = current.code_page;
    let old_ids = group_icon_ids(current.bytes())?;
    let shared = ids_used_by_other_groups(root, group_id)?;

    let icons = root
        .find_type_mut(ResourceType::Icon)
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::Icon.name(),
            id: None,
        })?;
    let removed: Vec<u16> = old_ids
        .iter()
        .copied()
        .filter(|id| !shared.contains(id))
        .collect();
    for id in &removed {
        icons.remove(&ResourceId::Id(*id));
    }

    let first_id = match icons.ids().max() {
        Some(max) => max.checked_add(1),
        None => Some(1),
    };
    let ids: Vec<u16> = first_id
        .and_then(|first| {
            (0..icon.images.len())
                .map(|i| u16::try_from(i).ok().and_then(|i| first.checked_add(i)))
                .collect()
        })
        .ok_or_else(|| Error::malformed("icon group", "ran out of RT_ICON IDs"))?;

    for (image, &id) in icon.images.iter().zip(&ids) {
        let mut languages = ResourceDirectory::new();
        languages.insert(
            language.clone(),
            ResourceNode::Leaf(RawResource::new(image.data.clone(), code_page)),
        );
        icons.insert(id, ResourceNode::Directory(languages));
    }

    let group_bytes = icon.group_bytes(&ids);
    let group = root
        .find_type_mut(ResourceType::GroupIcon)
        .and_then(|groups| groups.find_sub_dir_mut(group_id))
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::GroupIcon.name(),
            id: Some(group_id),
        })?;
    for entry in group.entries.iter_mut() {
        if let ResourceNode::Leaf(leaf) = entry.node_mut() {
            leaf.set_bytes(group_bytes.clone());
        }
    }

    debug!(group_id, ?removed, kept = old_ids.len() - removed.len(), added = ?ids, "injected icon");
    Ok(ids)
}
