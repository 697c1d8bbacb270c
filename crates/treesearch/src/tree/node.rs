//! Node types for indexed filesystem entries.

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use bitflags::bitflags;
use chrono::{DateTime, Local, TimeZone};
use thin_vec::ThinVec;

use super::arena::NodeId;
use crate::normalize::TextNormalizer;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum NodeFileType {
    #[default]
    File = 0,
    Dir = 1,
    Symlink = 2,
    Unknown = 3,
}

impl From<std::fs::FileType> for NodeFileType {
    fn from(file_type: std::fs::FileType) -> Self {
        if file_type.is_file() {
            NodeFileType::File
        } else if file_type.is_dir() {
            NodeFileType::Dir
        } else if file_type.is_symlink() {
            NodeFileType::Symlink
        } else {
            NodeFileType::Unknown
        }
    }
}

/// Filesystem metadata captured at collect or refresh time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeMetadata {
    pub file_type: NodeFileType,
    pub size: u64,
    /// Last write time as Unix seconds. 0 means not available.
    pub mtime: i64,
    pub readonly: bool,
}

impl NodeMetadata {
    pub fn from_fs_metadata(metadata: &std::fs::Metadata) -> Self {
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            file_type: NodeFileType::from(metadata.file_type()),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mtime,
            readonly: metadata.permissions().readonly(),
        }
    }

    /// Reads metadata without following symlinks.
    pub fn of_path(path: &Path) -> Option<Self> {
        std::fs::symlink_metadata(path)
            .ok()
            .map(|m| Self::from_fs_metadata(&m))
    }

    pub fn directory() -> Self {
        Self {
            file_type: NodeFileType::Dir,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type == NodeFileType::Dir
    }

    pub fn modified(&self) -> Option<DateTime<Local>> {
        if self.mtime == 0 {
            return None;
        }
        Local.timestamp_opt(self.mtime, 0).single()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// Created by an incremental add and not yet observed by a search.
        const ADDED = 0b001;
        /// Detached from the tree; kept only so views can react.
        const REMOVED = 0b010;
        /// Pinned to the top of every result.
        const PIN_PERSIST = 0b100;
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One filesystem entry in the arena.
#[derive(Debug)]
pub struct Node {
    name: Box<str>,
    parent: Option<NodeId>,
    /// Directory the node sits in when it has no parent node.
    anchor: Option<Box<Path>>,
    pub(crate) children: ThinVec<NodeId>,
    pub metadata: NodeMetadata,
    pub flags: NodeFlags,
    fuzzy_name: Arc<str>,
    word_name: Arc<str>,
    path: OnceCell<PathBuf>,
}

impl Node {
    pub fn new(name: &str, metadata: NodeMetadata, normalizer: &TextNormalizer) -> Self {
        Self {
            name: name.into(),
            parent: None,
            anchor: None,
            children: ThinVec::new(),
            metadata,
            flags: NodeFlags::empty(),
            fuzzy_name: normalizer.fuzzy(name),
            word_name: normalizer.word(name),
            path: OnceCell::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the node and re-derives its normalized projections.
    pub fn set_name(&mut self, name: &str, normalizer: &TextNormalizer) {
        self.name = name.into();
        self.rederive(normalizer);
    }

    pub fn rederive(&mut self, normalizer: &TextNormalizer) {
        self.fuzzy_name = normalizer.fuzzy(&self.name);
        self.word_name = normalizer.word(&self.name);
        self.invalidate_path();
    }

    #[inline]
    pub fn fuzzy_name(&self) -> &Arc<str> {
        &self.fuzzy_name
    }

    #[inline]
    pub fn word_name(&self) -> &Arc<str> {
        &self.word_name
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn anchor(&self) -> Option<&Path> {
        self.anchor.as_deref()
    }

    pub fn set_anchor(&mut self, anchor: Option<&Path>) {
        self.anchor = anchor.map(Into::into);
        self.invalidate_path();
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn add_child(&mut self, child: NodeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub(crate) fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
    }

    /// Removes a child node index, returns true if it was present.
    pub fn remove_child(&mut self, child: NodeId) -> bool {
        if let Some(pos) = self.children.iter().position(|&c| c == child) {
            self.children.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn cached_path(&self) -> Option<&Path> {
        self.path.get().map(PathBuf::as_path)
    }

    pub(crate) fn cache_path(&self, path: &Path) {
        let _ = self.path.set(path.to_path_buf());
    }

    pub(crate) fn invalidate_path(&mut self) {
        self.path.take();
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Owned view of a node, detached from the arena so it can leave the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
    pub id: NodeId,
    pub name: Arc<str>,
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub readonly: bool,
    pub flags: NodeFlags,
    pub fuzzy_name: Arc<str>,
    pub word_name: Arc<str>,
}

impl NodeEntry {
    pub fn from_node(id: NodeId, node: &Node, path: PathBuf) -> Self {
        Self {
            id,
            name: Arc::from(node.name()),
            path,
            is_dir: node.is_dir(),
            size: node.metadata.size,
            modified: node.metadata.modified(),
            readonly: node.metadata.readonly,
            flags: node.flags,
            fuzzy_name: node.fuzzy_name.clone(),
            word_name: node.word_name.clone(),
        }
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.flags.contains(NodeFlags::PIN_PERSIST)
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.flags.contains(NodeFlags::REMOVED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_derives_projections_on_rename() {
        let normalizer = TextNormalizer::uncached();
        let mut node = Node::new("file01.txt", NodeMetadata::default(), &normalizer);
        assert_eq!(&**node.fuzzy_name(), "FILE01.TXT");
        assert_eq!(&**node.word_name(), "FILE1.TXT");

        node.set_name("ほん.txt", &normalizer);
        assert_eq!(node.name(), "ほん.txt");
        assert_eq!(&**node.fuzzy_name(), "ホン.TXT");
    }

    #[test]
    fn children_are_unique() {
        let normalizer = TextNormalizer::uncached();
        let mut node = Node::new("src", NodeMetadata::directory(), &normalizer);
        node.add_child(NodeId::new(1));
        node.add_child(NodeId::new(2));
        node.add_child(NodeId::new(1));
        assert_eq!(node.children().len(), 2);
        assert!(node.remove_child(NodeId::new(1)));
        assert!(!node.remove_child(NodeId::new(1)));
    }

    #[test]
    fn metadata_reads_files_and_dirs() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("a.bin");
        std::fs::write(&file, [0u8; 10]).unwrap();

        let file_meta = NodeMetadata::of_path(&file).unwrap();
        assert_eq!(file_meta.file_type, NodeFileType::File);
        assert_eq!(file_meta.size, 10);
        assert!(file_meta.modified().is_some());

        let dir_meta = NodeMetadata::of_path(temp.path()).unwrap();
        assert!(dir_meta.is_dir());
        assert_eq!(dir_meta.size, 0);
    }

    #[test]
    fn flags_combine() {
        let mut flags = NodeFlags::ADDED;
        flags.insert(NodeFlags::PIN_PERSIST);
        assert!(flags.contains(NodeFlags::PIN_PERSIST));
        flags.remove(NodeFlags::ADDED);
        assert_eq!(flags, NodeFlags::PIN_PERSIST);
    }
}
