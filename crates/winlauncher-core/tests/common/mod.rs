//! Synthetic launcher templates for tests.
//!
//! Everything here is assembled byte by byte without going through the
//! library, so tests compare the library against an independent encoder.

#![allow(dead_code)]

pub const FILE_ALIGNMENT: u32 = 0x200;
pub const SECTION_ALIGNMENT: u32 = 0x1000;
pub const LANG_EN_US: u16 = 1033;
pub const CODE_PAGE: u32 = 1252;

pub const ICON_GROUP_ID: u16 = 101;
pub const BITMAP_ID: u16 = 102;

pub const RT_BITMAP: u16 = 2;
pub const RT_ICON: u16 = 3;
pub const RT_STRING: u16 = 6;
pub const RT_GROUP_ICON: u16 = 14;
pub const RT_VERSION: u16 = 16;

pub const TEXT_BYTES: &[u8] = b"\x55\x48\x89\xE5\x90\x90\xC9\xC3";
pub const RELOC_BYTES: &[u8] = b"\x00\x10\x00\x00\x0C\x00\x00\x00\x10\xA0\x00\x00";

const PE_OFFSET: usize = 0x80;

/// Knobs for [`build_template`].
#[derive(Debug, Clone)]
pub struct TemplateOptions {
    /// `None` leaves RT_STRING out entirely.
    pub strings: Option<Vec<(u16, String)>>,
    pub with_version: bool,
    pub with_icon_group: bool,
    pub with_bitmap: bool,
    pub overlay: Vec<u8>,
    pub pe32: bool,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            strings: Some(vec![
                (1, "Template".to_string()),
                (2, "template.exe".to_string()),
                (3, "-Xmx512m".to_string()),
                (17, "second block".to_string()),
            ]),
            with_version: true,
            with_icon_group: true,
            with_bitmap: true,
            overlay: Vec::new(),
            pe32: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Little-endian helpers
// ---------------------------------------------------------------------------

pub fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

pub fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn align(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

// ---------------------------------------------------------------------------
// Resource payloads
// ---------------------------------------------------------------------------

/// RT_STRING block with the given `(slot, text)` pairs, other slots empty.
pub fn string_block(strings: &[(usize, &str)]) -> Vec<u8> {
    let mut out = Vec::new();
    for slot in 0..16 {
        let text = strings
            .iter()
            .find(|(s, _)| *s == slot)
            .map_or("", |(_, t)| *t);
        out.extend_from_slice(&(text.encode_utf16().count() as u16).to_le_bytes());
        out.extend_from_slice(&utf16(text));
    }
    out
}

/// One `VS_VERSIONINFO`-style block.
pub fn version_block(key: &str, value_type: u16, value: &[u8], value_len: u16, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0u8; 6];
    put_u16(&mut out, 2, value_len);
    put_u16(&mut out, 4, value_type);
    out.extend_from_slice(&utf16(key));
    out.extend_from_slice(&[0, 0]);
    out.resize(align(out.len(), 4), 0);
    out.extend_from_slice(value);
    for child in children {
        out.resize(align(out.len(), 4), 0);
        out.extend_from_slice(child);
    }
    let len = out.len() as u16;
    put_u16(&mut out, 0, len);
    out
}

pub fn version_string(key: &str, value: &str) -> Vec<u8> {
    let mut text = utf16(value);
    text.extend_from_slice(&[0, 0]);
    let words = (text.len() / 2) as u16;
    version_block(key, 1, &text, words, &[])
}

/// `VS_FIXEDFILEINFO` with both versions set to `version`.
pub fn fixed_file_info(version: [u16; 4]) -> Vec<u8> {
    let ms = (u32::from(version[0]) << 16) | u32::from(version[1]);
    let ls = (u32::from(version[2]) << 16) | u32::from(version[3]);
    let fields = [
        0xFEEF_04BD,
        0x0001_0000,
        ms,
        ls,
        ms,
        ls,
        0x3F,
        0,
        0x0004_0004,
        1,
        0,
        0,
        0,
    ];
    fields.iter().flat_map(|f: &u32| f.to_le_bytes()).collect()
}

/// A complete `VS_VERSIONINFO` resource for version 1.0.0.0.
pub fn version_info(strings: &[(&str, &str)]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = strings.iter().map(|(k, v)| version_string(k, v)).collect();
    let table = version_block("040904b0", 1, &[], 0, &entries);
    let sfi = version_block("StringFileInfo", 1, &[], 0, &[table]);
    let translation = [0x0409u16.to_le_bytes(), 0x04B0u16.to_le_bytes()].concat();
    let var = version_block("Translation", 0, &translation, 4, &[]);
    let vfi = version_block("VarFileInfo", 1, &[], 0, &[var]);
    let fixed = fixed_file_info([1, 0, 0, 0]);
    version_block("VS_VERSION_INFO", 0, &fixed, fixed.len() as u16, &[sfi, vfi])
}

pub fn default_version_strings() -> Vec<(&'static str, &'static str)> {
    vec![
        ("CompanyName", "Template Co"),
        ("FileDescription", "Template launcher"),
        ("FileVersion", "1.0.0.0"),
        ("ProductName", "Template"),
        ("ProductVersion", "1.0.0.0"),
    ]
}

/// `.ico` container with one image per `(dimension, byte length)`; image `i`
/// is filled with `i + 1`.
pub fn build_ico(images: &[(u8, usize)]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(images.len() as u16).to_le_bytes());
    let mut offset = 6 + 16 * images.len();
    for &(dim, len) in images {
        out.extend_from_slice(&[dim, dim, 0, 0]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&(len as u32).to_le_bytes());
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        offset += len;
    }
    for (i, &(_, len)) in images.iter().enumerate() {
        out.extend(std::iter::repeat((i + 1) as u8).take(len));
    }
    out
}

/// `GRPICONDIR` for 16x16 and 32x32 images under `ids`.
pub fn group_icon(ids: &[u16], sizes: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(ids.len() as u16).to_le_bytes());
    for (i, (&id, &size)) in ids.iter().zip(sizes).enumerate() {
        let dim = 16 << i;
        out.extend_from_slice(&[dim as u8, dim as u8, 0, 0]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&32u16.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// `.bmp` file: 14-byte file header plus a 40-byte `BITMAPINFOHEADER` and
/// `width` 32-bit pixels of one row.
pub fn build_bmp(width: u32, fill: u8) -> Vec<u8> {
    let dib = build_dib(width, fill);
    let mut out = b"BM".to_vec();
    out.extend_from_slice(&((14 + dib.len()) as u32).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(14u32 + 40).to_le_bytes());
    out.extend_from_slice(&dib);
    out
}

pub fn build_dib(width: u32, fill: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&32u16.to_le_bytes());
    out.resize(40, 0);
    out.extend(std::iter::repeat(fill).take(4 * width as usize));
    out
}

// ---------------------------------------------------------------------------
// Resource section encoder
// ---------------------------------------------------------------------------

/// Numeric-ID resource tree.
pub enum Node {
    Dir(Vec<(u16, Node)>),
    Leaf(Vec<u8>),
}

fn type_lang_leaf(id: u16, data: Vec<u8>) -> (u16, Node) {
    (id, Node::Dir(vec![(LANG_EN_US, Node::Leaf(data))]))
}

/// Encode `root` the canonical way: directory tables breadth-first, data
/// entries from the next 8-byte boundary, then each leaf's bytes 8-aligned.
pub fn encode_resources(root: &Node, rva: u32) -> Vec<u8> {
    // Breadth-first list of directories.
    let mut dirs: Vec<&Vec<(u16, Node)>> = Vec::new();
    let mut leaves: Vec<&Vec<u8>> = Vec::new();
    if let Node::Dir(entries) = root {
        dirs.push(entries);
    }
    let mut next = 0;
    while next < dirs.len() {
        let entries = dirs[next];
        for (_, node) in entries {
            match node {
                Node::Dir(children) => dirs.push(children),
                Node::Leaf(data) => leaves.push(data),
            }
        }
        next += 1;
    }

    let mut dir_offsets = Vec::with_capacity(dirs.len());
    let mut cursor = 0;
    for entries in &dirs {
        dir_offsets.push(cursor);
        cursor += 16 + 8 * entries.len();
    }
    let entries_start = align(cursor, 8);
    let mut data_offsets = Vec::with_capacity(leaves.len());
    let mut data_cursor = entries_start + 16 * leaves.len();
    for data in &leaves {
        data_cursor = align(data_cursor, 8);
        data_offsets.push(data_cursor);
        data_cursor += data.len();
    }

    let mut out = vec![0u8; data_cursor];
    let mut next_dir = 1;
    let mut next_leaf = 0;
    for (index, entries) in dirs.iter().enumerate() {
        let base = dir_offsets[index];
        put_u16(&mut out, base + 14, entries.len() as u16);
        for (i, (id, node)) in entries.iter().enumerate() {
            let at = base + 16 + 8 * i;
            put_u32(&mut out, at, u32::from(*id));
            match node {
                Node::Dir(_) => {
                    put_u32(&mut out, at + 4, 0x8000_0000 | dir_offsets[next_dir] as u32);
                    next_dir += 1;
                }
                Node::Leaf(_) => {
                    put_u32(&mut out, at + 4, (entries_start + 16 * next_leaf) as u32);
                    next_leaf += 1;
                }
            }
        }
    }
    for (i, data) in leaves.iter().enumerate() {
        let entry = entries_start + 16 * i;
        put_u32(&mut out, entry, rva + data_offsets[i] as u32);
        put_u32(&mut out, entry + 4, data.len() as u32);
        put_u32(&mut out, entry + 8, CODE_PAGE);
        out[data_offsets[i]..data_offsets[i] + data.len()].copy_from_slice(data);
    }
    out
}

/// The resource tree `build_template` embeds.
pub fn template_resources(options: &TemplateOptions) -> Node {
    let mut types = Vec::new();
    if options.with_bitmap {
        types.push((RT_BITMAP, Node::Dir(vec![type_lang_leaf(BITMAP_ID, build_dib(2, 0x55))])));
    }
    if options.with_icon_group {
        types.push((
            RT_ICON,
            Node::Dir(vec![
                type_lang_leaf(1, vec![0x11; 40]),
                type_lang_leaf(2, vec![0x22; 72]),
            ]),
        ));
    }
    if let Some(strings) = &options.strings {
        let mut blocks: Vec<(u16, Vec<(usize, &str)>)> = Vec::new();
        for (id, text) in strings {
            let block = id / 16 + 1;
            let slot = (id % 16) as usize;
            match blocks.iter_mut().find(|(b, _)| *b == block) {
                Some((_, entries)) => entries.push((slot, text.as_str())),
                None => blocks.push((block, vec![(slot, text.as_str())])),
            }
        }
        blocks.sort_by_key(|(b, _)| *b);
        types.push((
            RT_STRING,
            Node::Dir(
                blocks
                    .into_iter()
                    .map(|(block, entries)| type_lang_leaf(block, string_block(&entries)))
                    .collect(),
            ),
        ));
    }
    if options.with_icon_group {
        types.push((
            RT_GROUP_ICON,
            Node::Dir(vec![type_lang_leaf(ICON_GROUP_ID, group_icon(&[1, 2], &[40, 72]))]),
        ));
    }
    if options.with_version {
        types.push((
            RT_VERSION,
            Node::Dir(vec![type_lang_leaf(1, version_info(&default_version_strings()))]),
        ));
    }
    Node::Dir(types)
}

// ---------------------------------------------------------------------------
// PE image
// ---------------------------------------------------------------------------

/// Section layout of a template built by [`build_template`].
#[derive(Debug, Clone, Copy)]
pub struct TemplateLayout {
    pub rsrc_ptr: u32,
    pub rsrc_raw: u32,
    pub rsrc_va: u32,
    pub rsrc_tree: u32,
    pub reloc_ptr: u32,
    pub reloc_va: u32,
}

pub fn template_layout(options: &TemplateOptions) -> TemplateLayout {
    let tree = encode_resources(&template_resources(options), 0x2000).len() as u32;
    let rsrc_raw = align(tree as usize, FILE_ALIGNMENT as usize) as u32;
    TemplateLayout {
        rsrc_ptr: 0x400,
        rsrc_raw,
        rsrc_va: 0x2000,
        rsrc_tree: tree,
        reloc_ptr: 0x400 + rsrc_raw,
        reloc_va: 0x2000 + align(tree as usize, SECTION_ALIGNMENT as usize) as u32,
    }
}

/// A launcher template: `.text` at 0x200 / VA 0x1000, `.rsrc` at 0x400 /
/// VA 0x2000, `.reloc` right after, then `options.overlay`.
pub fn build_template(options: &TemplateOptions) -> Vec<u8> {
    let layout = template_layout(options);
    let rsrc = encode_resources(&template_resources(options), layout.rsrc_va);

    let coff = PE_OFFSET + 4;
    let opt = coff + 20;
    let fixed = if options.pe32 { 96 } else { 112 };
    let opt_size = fixed + 16 * 8;
    let table = opt + opt_size;
    let end = (layout.reloc_ptr + FILE_ALIGNMENT) as usize;
    let mut buf = vec![0u8; end];

    // DOS header and stub
    put_u16(&mut buf, 0, 0x5A4D);
    put_u32(&mut buf, 0x3C, PE_OFFSET as u32);
    let stub = b"This program cannot be run in DOS mode.\r\r\n$";
    buf[0x4E..0x4E + stub.len()].copy_from_slice(stub);

    // PE signature and COFF header
    put_u32(&mut buf, PE_OFFSET, 0x0000_4550);
    put_u16(&mut buf, coff, if options.pe32 { 0x014C } else { 0x8664 });
    put_u16(&mut buf, coff + 2, 3);
    put_u32(&mut buf, coff + 4, 0x6500_0000);
    put_u16(&mut buf, coff + 16, opt_size as u16);
    put_u16(&mut buf, coff + 18, if options.pe32 { 0x0102 } else { 0x0022 });

    // Optional header
    put_u16(&mut buf, opt, if options.pe32 { 0x010B } else { 0x020B });
    buf[opt + 2] = 14;
    put_u32(&mut buf, opt + 4, FILE_ALIGNMENT);
    put_u32(&mut buf, opt + 8, layout.rsrc_raw + FILE_ALIGNMENT);
    put_u32(&mut buf, opt + 16, 0x1000);
    put_u32(&mut buf, opt + 20, 0x1000);
    if options.pe32 {
        put_u32(&mut buf, opt + 24, layout.rsrc_va);
        put_u32(&mut buf, opt + 28, 0x0040_0000);
    } else {
        put_u64(&mut buf, opt + 24, 0x0000_0001_4000_0000);
    }
    put_u32(&mut buf, opt + 32, SECTION_ALIGNMENT);
    put_u32(&mut buf, opt + 36, FILE_ALIGNMENT);
    put_u16(&mut buf, opt + 40, 6);
    put_u16(&mut buf, opt + 48, 6);
    put_u32(&mut buf, opt + 56, layout.reloc_va + SECTION_ALIGNMENT);
    put_u32(&mut buf, opt + 60, 0x200);
    put_u16(&mut buf, opt + 68, 2);
    put_u16(&mut buf, opt + 70, 0x8160);
    if options.pe32 {
        put_u32(&mut buf, opt + 72, 0x10_0000);
        put_u32(&mut buf, opt + 76, 0x1000);
        put_u32(&mut buf, opt + 80, 0x10_0000);
        put_u32(&mut buf, opt + 84, 0x1000);
    } else {
        put_u64(&mut buf, opt + 72, 0x10_0000);
        put_u64(&mut buf, opt + 80, 0x1000);
        put_u64(&mut buf, opt + 88, 0x10_0000);
        put_u64(&mut buf, opt + 96, 0x1000);
    }
    put_u32(&mut buf, opt + fixed - 4, 16);

    let dirs = opt + fixed;
    put_u32(&mut buf, dirs + 2 * 8, layout.rsrc_va);
    put_u32(&mut buf, dirs + 2 * 8 + 4, layout.rsrc_tree);
    put_u32(&mut buf, dirs + 5 * 8, layout.reloc_va);
    put_u32(&mut buf, dirs + 5 * 8 + 4, RELOC_BYTES.len() as u32);

    // Section table
    let sections: [(&[u8], u32, u32, u32, u32, u32); 3] = [
        (b".text", TEXT_BYTES.len() as u32, 0x1000, FILE_ALIGNMENT, 0x200, 0x6000_0020),
        (b".rsrc", layout.rsrc_tree, layout.rsrc_va, layout.rsrc_raw, layout.rsrc_ptr, 0x4000_0040),
        (
            b".reloc",
            RELOC_BYTES.len() as u32,
            layout.reloc_va,
            FILE_ALIGNMENT,
            layout.reloc_ptr,
            0x4200_0040,
        ),
    ];
    for (i, (name, vs, va, raw, ptr, characteristics)) in sections.into_iter().enumerate() {
        let s = table + 40 * i;
        buf[s..s + name.len()].copy_from_slice(name);
        put_u32(&mut buf, s + 8, vs);
        put_u32(&mut buf, s + 12, va);
        put_u32(&mut buf, s + 16, raw);
        put_u32(&mut buf, s + 20, ptr);
        put_u32(&mut buf, s + 36, characteristics);
    }

    // Section data
    buf[0x200..0x200 + TEXT_BYTES.len()].copy_from_slice(TEXT_BYTES);
    let rsrc_at = layout.rsrc_ptr as usize;
    buf[rsrc_at..rsrc_at + rsrc.len()].copy_from_slice(&rsrc);
    let reloc_at = layout.reloc_ptr as usize;
    buf[reloc_at..reloc_at + RELOC_BYTES.len()].copy_from_slice(RELOC_BYTES);

    buf.extend_from_slice(&options.overlay);
    buf
}

// ---------------------------------------------------------------------------
// Reading outputs back
// ---------------------------------------------------------------------------

/// Section header fields of a written image: `(name, vs, va, raw, ptr)`.
pub fn section_table(image: &[u8]) -> Vec<(String, u32, u32, u32, u32)> {
    let pe = u32_at(image, 0x3C) as usize;
    let count = u16_at(image, pe + 6) as usize;
    let opt_size = u16_at(image, pe + 20) as usize;
    let table = pe + 24 + opt_size;
    (0..count)
        .map(|i| {
            let s = table + 40 * i;
            let name_len = image[s..s + 8].iter().position(|&b| b == 0).unwrap_or(8);
            (
                String::from_utf8_lossy(&image[s..s + name_len]).into_owned(),
                u32_at(image, s + 8),
                u32_at(image, s + 12),
                u32_at(image, s + 16),
                u32_at(image, s + 20),
            )
        })
        .collect()
}

/// `(virtual_address, size)` of data directory `index`.
pub fn data_directory(image: &[u8], index: usize) -> (u32, u32) {
    let pe = u32_at(image, 0x3C) as usize;
    let opt = pe + 24;
    let fixed = if u16_at(image, opt) == 0x010B { 96 } else { 112 };
    let at = opt + fixed + 8 * index;
    (u32_at(image, at), u32_at(image, at + 4))
}

/// Raw bytes of the named section.
pub fn section_data<'a>(image: &'a [u8], name: &str) -> &'a [u8] {
    let (_, _, _, raw, ptr) = section_table(image)
        .into_iter()
        .find(|(n, ..)| n == name)
        .unwrap_or_else(|| panic!("no section {name}"));
    &image[ptr as usize..(ptr + raw) as usize]
}
