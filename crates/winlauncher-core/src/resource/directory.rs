//! In-memory resource directory tree.

use std::cmp::Ordering;
use std::fmt;

use super::ResourceType;

/// Name of a directory entry: a numeric ID or a UTF-16 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Name(String),
    Id(u16),
}

impl ResourceId {
    pub fn as_id(&self) -> Option<u16> {
        match self {
            ResourceId::Id(id) => Some(*id),
            ResourceId::Name(_) => None,
        }
    }

    /// Sort order mandated by the PE format: named entries first, compared
    /// case-insensitively, then numeric IDs ascending.
    pub fn pe_cmp(&self, other: &ResourceId) -> Ordering {
        match (self, other) {
            (ResourceId::Name(a), ResourceId::Name(b)) => {
                let a = a.to_uppercase();
                let b = b.to_uppercase();
                a.encode_utf16().cmp(b.encode_utf16())
            }
            (ResourceId::Name(_), ResourceId::Id(_)) => Ordering::Less,
            (ResourceId::Id(_), ResourceId::Name(_)) => Ordering::Greater,
            (ResourceId::Id(a), ResourceId::Id(b)) => a.cmp(b),
        }
    }
}

impl From<u16> for ResourceId {
    fn from(id: u16) -> Self {
        ResourceId::Id(id)
    }
}

impl From<ResourceType> for ResourceId {
    fn from(kind: ResourceType) -> Self {
        ResourceId::Id(kind.id())
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Name(name) => write!(f, "\"{name}\""),
            ResourceId::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// Leaf of the tree: the resource bytes and their data-entry metadata.
#[derive(Debug, Clone, Default)]
pub struct RawResource {
    data: Vec<u8>,
    pub code_page: u32,
    pub reserved: u32,
    /// Offset of the 16-byte data entry, assigned by the layout pass.
    pub(crate) entry_offset: u64,
    /// Offset of the data bytes, assigned by the layout pass.
    pub(crate) data_offset: u64,
}

impl RawResource {
    pub fn new(data: Vec<u8>, code_page: u32) -> Self {
        Self {
            data,
            code_page,
            ..Default::default()
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Replace the content wholesale.  The new size is picked up by the next
    /// size computation of every ancestor.
    pub fn set_bytes(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Either a nested directory or a leaf.
#[derive(Debug, Clone)]
pub enum ResourceNode {
    Directory(ResourceDirectory),
    Leaf(RawResource),
}

impl ResourceNode {
    pub fn as_directory(&self) -> Option<&ResourceDirectory> {
        match self {
            ResourceNode::Directory(dir) => Some(dir),
            ResourceNode::Leaf(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut ResourceDirectory> {
        match self {
            ResourceNode::Directory(dir) => Some(dir),
            ResourceNode::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&RawResource> {
        match self {
            ResourceNode::Leaf(leaf) => Some(leaf),
            ResourceNode::Directory(_) => None,
        }
    }

    pub fn as_leaf_mut(&mut self) -> Option<&mut RawResource> {
        match self {
            ResourceNode::Leaf(leaf) => Some(leaf),
            ResourceNode::Directory(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub(crate) id: ResourceId,
    pub(crate) node: ResourceNode,
    /// Offset of the length-prefixed name string for named entries.
    pub(crate) name_offset: u64,
}

impl DirectoryEntry {
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn node(&self) -> &ResourceNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut ResourceNode {
        &mut self.node
    }
}

/// `IMAGE_RESOURCE_DIRECTORY` plus its entries.
#[derive(Debug, Clone, Default)]
pub struct ResourceDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub(crate) entries: Vec<DirectoryEntry>,
    /// Offset of the directory table, assigned by the layout pass.
    pub(crate) offset: u64,
}

impl ResourceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn named_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.id, ResourceId::Name(_)))
            .count()
    }

    pub fn id_count(&self) -> usize {
        self.entries.len() - self.named_count()
    }

    pub fn get(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.entries.iter().find(|e| &e.id == id).map(|e| &e.node)
    }

    pub fn get_mut(&mut self, id: &ResourceId) -> Option<&mut ResourceNode> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == id)
            .map(|e| &mut e.node)
    }

    /// Subdirectory registered under numeric `id`, if any.
    pub fn find_sub_dir(&self, id: u16) -> Option<&ResourceDirectory> {
        self.get(&ResourceId::Id(id))
            .and_then(ResourceNode::as_directory)
    }

    pub fn find_sub_dir_mut(&mut self, id: u16) -> Option<&mut ResourceDirectory> {
        self.get_mut(&ResourceId::Id(id))
            .and_then(ResourceNode::as_directory_mut)
    }

    /// Top-level lookup by well-known resource type.
    pub fn find_type(&self, kind: ResourceType) -> Option<&ResourceDirectory> {
        self.find_sub_dir(kind.id())
    }

    pub fn find_type_mut(&mut self, kind: ResourceType) -> Option<&mut ResourceDirectory> {
        self.find_sub_dir_mut(kind.id())
    }

    /// Insert or replace the entry for `id`, keeping the PE sort order.
    /// Returns the node previously stored under `id`.
    pub fn insert(&mut self, id: impl Into<ResourceId>, node: ResourceNode) -> Option<ResourceNode> {
        let id = id.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.id == id) {
            return Some(std::mem::replace(&mut existing.node, node));
        }
        let at = self
            .entries
            .iter()
            .position(|e| e.id.pe_cmp(&id) == Ordering::Greater)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            at,
            DirectoryEntry {
                id,
                node,
                name_offset: 0,
            },
        );
        None
    }

    pub fn remove(&mut self, id: &ResourceId) -> Option<ResourceNode> {
        let at = self.entries.iter().position(|e| &e.id == id)?;
        Some(self.entries.remove(at).node)
    }

    /// Numeric IDs of the direct entries.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries.iter().filter_map(|e| e.id.as_id())
    }

    /// First leaf reached by always descending into the first entry.
    pub fn first_leaf(&self) -> Option<&RawResource> {
        match &self.entries.first()?.node {
            ResourceNode::Leaf(leaf) => Some(leaf),
            ResourceNode::Directory(dir) => dir.first_leaf(),
        }
    }

    pub fn first_leaf_mut(&mut self) -> Option<&mut RawResource> {
        match &mut self.entries.first_mut()?.node {
            ResourceNode::Leaf(leaf) => Some(leaf),
            ResourceNode::Directory(dir) => dir.first_leaf_mut(),
        }
    }

    /// Every leaf of this subtree, depth-first in entry order.
    pub fn leaves(&self) -> Vec<&RawResource> {
        let mut out = Vec::new();
        for entry in &self.entries {
            match &entry.node {
                ResourceNode::Leaf(leaf) => out.push(leaf),
                ResourceNode::Directory(dir) => out.extend(dir.leaves()),
            }
        }
        out
    }

    /// Number of leaves in this subtree.
    pub fn leaf_count(&self) -> usize {
        self.entries
            .iter()
            .map(|e| match &e.node {
                ResourceNode::Leaf(_) => 1,
                ResourceNode::Directory(dir) => dir.leaf_count(),
            })
            .sum()
    }
}
