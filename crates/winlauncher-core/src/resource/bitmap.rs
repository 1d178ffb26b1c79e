//! RT_BITMAP replacement for the splash screen.

use tracing::debug;

use super::directory::{ResourceDirectory, ResourceNode};
use super::ResourceType;
use crate::binary::BinReader;
use crate::error::{Error, Result};

const FILE_HEADER_SIZE: usize = 14;

/// Header sizes of `BITMAPCOREHEADER` through `BITMAPV5HEADER`.
const DIB_HEADER_SIZES: [u32; 6] = [12, 40, 52, 56, 108, 124];

/// Strip the `BITMAPFILEHEADER` of a `.bmp` file and check that what is left
/// starts with a DIB header.  Bytes without the `BM` prefix are taken as a
/// bare DIB already.
pub fn dib_from_bmp(bytes: &[u8]) -> Result<&[u8]> {
    let dib = if bytes.starts_with(b"BM") {
        bytes.get(FILE_HEADER_SIZE..).ok_or(Error::Truncated {
            what: "BITMAPFILEHEADER",
            offset: 0,
            needed: FILE_HEADER_SIZE,
            available: bytes.len(),
        })?
    } else {
        bytes
    };

    let header_size = BinReader::new(dib).read_u32("DIB header")?;
    if !DIB_HEADER_SIZES.contains(&header_size) {
        return Err(Error::malformed(
            "bitmap",
            format!("unknown DIB header size {header_size}"),
        ));
    }
    if (header_size as usize) > dib.len() {
        return Err(Error::Truncated {
            what: "DIB header",
            offset: 0,
            needed: header_size as usize,
            available: dib.len(),
        });
    }
    Ok(dib)
}

/// Replace every language variant of bitmap `id` with `bytes`.
pub fn inject_bitmap(root: &mut ResourceDirectory, id: u16, bytes: &[u8]) -> Result<()> {
    let dib = dib_from_bmp(bytes)?;
    let bitmap = root
        .find_type_mut(ResourceType::Bitmap)
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::Bitmap.name(),
            id: None,
        })?
        .find_sub_dir_mut(id)
        .ok_or(Error::ResourceNotFound {
            kind: ResourceType::Bitmap.name(),
            id: Some(id),
        })?;

    let mut replaced = 0usize;
    for entry in bitmap.entries.iter_mut() {
        if let ResourceNode::Leaf(leaf) = entry.node_mut() {
            leaf.set_bytes(dib.to_vec());
            replaced += 1;
        }
    }
    if replaced == 0 {
        return Err(Error::malformed(
            "bitmap",
            format!("bitmap {id} has no language entry"),
        ));
    }
    debug!(id, size = dib.len(), languages = replaced, "injected bitmap");
    Ok(())
}
