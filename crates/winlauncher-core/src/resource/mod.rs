//! The `.rsrc` section: directory tree, serializer and typed editors for
//! the resource kinds a launcher carries.
//!
//! The tree is always three levels deep in practice (type → name/ID →
//! language), but nothing here depends on that except the editors.

pub mod bitmap;
pub mod directory;
pub mod icon;
pub mod section;
pub mod string_table;

pub use bitmap::inject_bitmap;
pub use directory::{DirectoryEntry, RawResource, ResourceDirectory, ResourceId, ResourceNode};
pub use icon::{inject_icon, IconFile, IconImage};
pub use section::ResourceSection;
pub use string_table::StringTableDirectory;

/// Well-known resource types (`RT_*` in `winuser.h`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ResourceType {
    Cursor = 1,
    Bitmap = 2,
    Icon = 3,
    Menu = 4,
    Dialog = 5,
    String = 6,
    GroupCursor = 12,
    GroupIcon = 14,
    Version = 16,
    Manifest = 24,
}

impl ResourceType {
    pub fn id(self) -> u16 {
        self as u16
    }

    /// The `winuser.h` name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ResourceType::Cursor => "RT_CURSOR",
            ResourceType::Bitmap => "RT_BITMAP",
            ResourceType::Icon => "RT_ICON",
            ResourceType::Menu => "RT_MENU",
            ResourceType::Dialog => "RT_DIALOG",
            ResourceType::String => "RT_STRING",
            ResourceType::GroupCursor => "RT_GROUP_CURSOR",
            ResourceType::GroupIcon => "RT_GROUP_ICON",
            ResourceType::Version => "RT_VERSION",
            ResourceType::Manifest => "RT_MANIFEST",
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        Some(match id {
            1 => ResourceType::Cursor,
            2 => ResourceType::Bitmap,
            3 => ResourceType::Icon,
            4 => ResourceType::Menu,
            5 => ResourceType::Dialog,
            6 => ResourceType::String,
            12 => ResourceType::GroupCursor,
            14 => ResourceType::GroupIcon,
            16 => ResourceType::Version,
            24 => ResourceType::Manifest,
            _ => return None,
        })
    }
}
