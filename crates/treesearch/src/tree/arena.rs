//! Slot arena owning every indexed node.
//!
//! Nodes refer to each other by `NodeId`; the parent's child list is the only
//! owning edge, the parent link is a plain index.

use std::ops::{Index, IndexMut};
use std::path::PathBuf;

use super::node::Node;

/// A compact 32-bit handle to a node slot.
///
/// Handles stay valid until the node is released; a released slot may be
/// reused by a later insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// # Panics
    /// Panics if `index >= u32::MAX`.
    #[inline]
    pub fn new(index: usize) -> Self {
        assert!(
            index < u32::MAX as usize,
            "node index must be less than u32::MAX"
        );
        Self(index as u32)
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    live: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(id) = self.free.pop() {
            self.slots[id.get()] = Some(node);
            return id;
        }
        self.slots.push(Some(node));
        NodeId::new(self.slots.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.get()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.get()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    fn try_remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id.get())?.take()?;
        self.live -= 1;
        self.free.push(id);
        Some(node)
    }

    /// Links `child` under `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self[child].set_parent(Some(parent));
        self[parent].add_child(child);
        self.invalidate_paths(child);
    }

    /// Links a freshly inserted `child` as the last child of `parent`.
    ///
    /// Skips the duplicate check and path invalidation, so no node below
    /// `child` may have a cached path and `child` must not be linked yet.
    pub(crate) fn attach_new(&mut self, parent: NodeId, child: NodeId) {
        debug_assert!(self[child].parent().is_none());
        self[child].set_parent(Some(parent));
        self[parent].push_child(child);
    }

    /// Unlinks `child` from its parent, returning the former parent.
    pub fn detach(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.get(child)?.parent()?;
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.remove_child(child);
        }
        self[child].set_parent(None);
        self.invalidate_paths(child);
        Some(parent)
    }

    /// Releases `id` and every node below it.
    pub fn release_subtree(&mut self, id: NodeId) -> usize {
        let mut released = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.try_remove(current) {
                stack.extend(node.children.iter().copied());
                released += 1;
            }
        }
        released
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Preorder ids of `id` and all of its descendants.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Number of nodes strictly below `id`.
    pub fn descendant_count(&self, id: NodeId) -> usize {
        self.subtree(id).len().saturating_sub(1)
    }

    /// Computes the full path for a node by walking up the parent chain.
    ///
    /// The topmost node carries the directory it is anchored in.
    pub fn node_path(&self, id: NodeId) -> Option<PathBuf> {
        let node = self.get(id)?;
        if let Some(cached) = node.cached_path() {
            return Some(cached.to_path_buf());
        }

        let mut segments = Vec::new();
        let mut current = id;
        let anchor = loop {
            let node = self.get(current)?;
            segments.push(node.name());
            match node.parent() {
                Some(parent) => current = parent,
                None => break node.anchor().map(|anchor| anchor.to_path_buf()),
            }
        };

        let mut path = anchor.unwrap_or_default();
        for segment in segments.into_iter().rev() {
            path.push(segment);
        }
        node.cache_path(&path);
        Some(path)
    }

    /// Drops cached paths for `id` and its descendants.
    pub fn invalidate_paths(&mut self, id: NodeId) {
        for current in self.subtree(id) {
            if let Some(node) = self.get_mut(current) {
                node.invalidate_path();
            }
        }
    }
}

impl Index<NodeId> for NodeArena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Self::Output {
        self.get(id).expect("node id refers to a released slot")
    }
}

impl IndexMut<NodeId> for NodeArena {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        self.get_mut(id).expect("node id refers to a released slot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::TextNormalizer;
    use crate::tree::node::NodeMetadata;
    use std::path::Path;

    fn node(name: &str, dir: bool) -> Node {
        let metadata = if dir {
            NodeMetadata::directory()
        } else {
            NodeMetadata::default()
        };
        Node::new(name, metadata, &TextNormalizer::uncached())
    }

    #[test]
    fn insert_get_release() {
        let mut arena = NodeArena::new();
        let root = arena.insert(node("root", true));
        let child = arena.insert(node("a.txt", false));
        arena.attach(root, child);

        assert_eq!(arena.len(), 2);
        assert_eq!(arena[child].parent(), Some(root));
        assert_eq!(arena.descendant_count(root), 1);

        assert_eq!(arena.release_subtree(root), 2);
        assert!(arena.is_empty());
        assert!(!arena.contains(child));
    }

    #[test]
    fn attach_new_links_without_touching_cached_paths() {
        let mut arena = NodeArena::new();
        let mut root_node = node("root", true);
        root_node.set_anchor(Some(Path::new("/data")));
        let root = arena.insert(root_node);
        assert_eq!(arena.node_path(root).unwrap(), PathBuf::from("/data/root"));

        let sub = arena.insert(node("sub", true));
        let file = arena.insert(node("f.txt", false));
        arena.attach_new(sub, file);
        arena.attach_new(root, sub);

        assert_eq!(arena[root].children(), &[sub]);
        assert_eq!(arena[file].parent(), Some(sub));
        assert_eq!(arena[root].cached_path(), Some(Path::new("/data/root")));
        assert_eq!(
            arena.node_path(file).unwrap(),
            PathBuf::from("/data/root/sub/f.txt")
        );
    }

    #[test]
    fn released_slots_are_reused() {
        let mut arena = NodeArena::new();
        let first = arena.insert(node("a", false));
        arena.release_subtree(first);
        let second = arena.insert(node("b", false));
        assert_eq!(first, second);
        assert_eq!(arena[second].name(), "b");
    }

    #[test]
    fn node_path_joins_anchor_and_names() {
        let mut arena = NodeArena::new();
        let mut root_node = node("root", true);
        root_node.set_anchor(Some(Path::new("/data")));
        let root = arena.insert(root_node);
        let sub = arena.insert(node("sub", true));
        let file = arena.insert(node("f.txt", false));
        arena.attach(root, sub);
        arena.attach(sub, file);

        assert_eq!(
            arena.node_path(file).unwrap(),
            PathBuf::from("/data/root/sub/f.txt")
        );

        arena[sub].set_name("renamed", &TextNormalizer::uncached());
        arena.invalidate_paths(sub);
        assert_eq!(
            arena.node_path(file).unwrap(),
            PathBuf::from("/data/root/renamed/f.txt")
        );
    }
}
