//! One indexed area as a rooted node tree.
//!
//! Nodes live in a `NodeArena` shared by every tree of the coordinator, so a
//! tree only holds its root handle. All mutations take the arena explicitly;
//! they run on the command worker and never race.

mod arena;
mod collect;
mod node;

use std::path::{Component, Path};
use std::sync::atomic::Ordering;

pub use arena::{NodeArena, NodeId};
pub use collect::{collect, insert_collected, CollectOutcome, CollectedNode, WalkData};
pub use node::{Node, NodeEntry, NodeFileType, NodeFlags, NodeMetadata};

use crate::area::SearchArea;
use crate::cancel::CancellationToken;
use crate::normalize::TextNormalizer;
use crate::watcher::TreeWatcher;
use collect::entry_name;

pub struct NodeTree {
    area: SearchArea,
    root: Option<NodeId>,
    include_hidden: bool,
    watcher: Option<TreeWatcher>,
    /// Root has been re-parented under another tree's node.
    is_child: bool,
    /// Needs a rebuild at the next collect even if the area is unchanged.
    dirty: bool,
}

impl std::fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("area", &self.area)
            .field("root", &self.root)
            .field("watching", &self.watcher.is_some())
            .field("is_child", &self.is_child)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl NodeTree {
    /// Walks the area's root. Safe to run in parallel with other walks.
    pub fn walk(area: &SearchArea, include_hidden: bool, cancel: &CancellationToken) -> CollectOutcome {
        let walk_data = WalkData::new(cancel)
            .include_hidden(include_hidden)
            .recursive(area.include_subdirectories);
        let outcome = collect(&area.path, &walk_data);
        log::debug!(
            "tree walk root={} files={} dirs={}",
            area.path.display(),
            walk_data.num_files.load(Ordering::Relaxed),
            walk_data.num_dirs.load(Ordering::Relaxed)
        );
        outcome
    }

    /// Places a walk result into the arena. A missing root yields an empty tree.
    pub fn from_collected(
        area: SearchArea,
        collected: Option<CollectedNode>,
        include_hidden: bool,
        arena: &mut NodeArena,
        normalizer: &TextNormalizer,
    ) -> Self {
        let root = collected.map(|collected| {
            let root = insert_collected(arena, collected, normalizer);
            arena[root].set_anchor(area.path.parent());
            root
        });
        Self {
            area,
            root,
            include_hidden,
            watcher: None,
            is_child: false,
            dirty: false,
        }
    }

    /// Walks and inserts in one step. Returns `None` if canceled.
    pub fn collect(
        area: SearchArea,
        include_hidden: bool,
        cancel: &CancellationToken,
        arena: &mut NodeArena,
        normalizer: &TextNormalizer,
    ) -> Option<Self> {
        let collected = match Self::walk(&area, include_hidden, cancel) {
            CollectOutcome::Collected(node) => Some(node),
            CollectOutcome::Missing => None,
            CollectOutcome::Canceled => return None,
        };
        Some(Self::from_collected(
            area,
            collected,
            include_hidden,
            arena,
            normalizer,
        ))
    }

    pub fn area(&self) -> &SearchArea {
        &self.area
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_child(&self) -> bool {
        self.is_child
    }

    pub(crate) fn set_child(&mut self, is_child: bool) {
        self.is_child = is_child;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn set_watcher(&mut self, watcher: Option<TreeWatcher>) {
        self.watcher = watcher;
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Forgets the root without touching the arena.
    pub(crate) fn clear_root(&mut self) {
        self.root = None;
    }

    /// Drops the watcher and releases every node of this tree.
    pub fn release(&mut self, arena: &mut NodeArena) -> usize {
        self.watcher = None;
        let Some(root) = self.root.take() else {
            return 0;
        };
        arena.detach(root);
        self.is_child = false;
        arena.release_subtree(root)
    }

    fn relative<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        path.strip_prefix(&self.area.path).ok()
    }

    fn find_child(arena: &NodeArena, parent: NodeId, name: &str) -> Option<NodeId> {
        arena[parent]
            .children()
            .iter()
            .copied()
            .find(|&child| arena[child].name() == name)
    }

    /// Resolves `path` to its node.
    pub fn locate(&self, arena: &NodeArena, path: &Path) -> Option<NodeId> {
        let relative = self.relative(path)?;
        let mut current = self.root?;
        for component in relative.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            current = Self::find_child(arena, current, &name.to_string_lossy())?;
        }
        Some(current)
    }

    fn is_hidden_path(&self, relative: &Path) -> bool {
        !self.include_hidden
            && relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
    }

    /// Creates the node for `path` and any missing ancestors.
    ///
    /// Returns the topmost node created, or `None` if the node already
    /// existed, lies outside the area, or has vanished from disk.
    pub fn add(
        &mut self,
        arena: &mut NodeArena,
        normalizer: &TextNormalizer,
        path: &Path,
    ) -> Option<NodeId> {
        if !self.area.covers_path(path) {
            return None;
        }
        let relative = self.relative(path)?.to_path_buf();
        if self.is_hidden_path(&relative) {
            return None;
        }
        let metadata = NodeMetadata::of_path(path)?;

        let mut created = None;
        let mut current = match self.root {
            Some(root) => root,
            None => {
                let root = if relative.as_os_str().is_empty() {
                    self.create_node(arena, normalizer, path, metadata)
                } else {
                    let root_metadata = NodeMetadata::of_path(&self.area.path)
                        .unwrap_or_else(NodeMetadata::directory);
                    let name = entry_name(&self.area.path);
                    arena.insert(Node::new(&name, root_metadata, normalizer))
                };
                arena[root].set_anchor(self.area.path.parent());
                self.root = Some(root);
                created = Some(root);
                root
            }
        };

        let components: Vec<_> = relative.components().collect();
        let mut current_path = self.area.path.clone();
        for (i, component) in components.iter().enumerate() {
            let Component::Normal(name) = component else {
                return None;
            };
            current_path.push(name);
            let name = name.to_string_lossy();
            if let Some(child) = Self::find_child(arena, current, &name) {
                current = child;
                continue;
            }
            let child = if i + 1 == components.len() {
                self.create_node(arena, normalizer, path, metadata)
            } else {
                let dir_metadata =
                    NodeMetadata::of_path(&current_path).unwrap_or_else(NodeMetadata::directory);
                arena.insert(Node::new(&name, dir_metadata, normalizer))
            };
            arena.attach(current, child);
            created.get_or_insert(child);
            current = child;
        }

        if let Some(top) = created {
            for id in arena.subtree(top) {
                arena[id].flags.insert(NodeFlags::ADDED);
            }
        }
        created
    }

    fn create_node(
        &self,
        arena: &mut NodeArena,
        normalizer: &TextNormalizer,
        path: &Path,
        metadata: NodeMetadata,
    ) -> NodeId {
        let expand = metadata.is_dir()
            && (self.area.include_subdirectories || path == self.area.path);
        if expand {
            let cancel = CancellationToken::noop();
            let walk_data = WalkData::new(&cancel)
                .include_hidden(self.include_hidden)
                .recursive(self.area.include_subdirectories);
            if let CollectOutcome::Collected(collected) = collect(path, &walk_data) {
                return insert_collected(arena, collected, normalizer);
            }
        }
        arena.insert(Node::new(&entry_name(path), metadata, normalizer))
    }

    /// Unlinks the node for `path` and flags its subtree `REMOVED`.
    ///
    /// The detached subtree stays in the arena, anchored at its old parent
    /// directory, until the caller releases it.
    pub fn remove(&mut self, arena: &mut NodeArena, path: &Path) -> Option<NodeId> {
        let id = self.locate(arena, path)?;
        if Some(id) == self.root {
            self.root = None;
            self.is_child = false;
        }
        arena.detach(id);
        arena[id].set_anchor(path.parent());
        for node in arena.subtree(id) {
            arena[node].flags.insert(NodeFlags::REMOVED);
        }
        Some(id)
    }

    /// Renames a node in place, keeping its identity.
    ///
    /// # Panics
    /// Panics if `new` lives in a different directory than `old`. Moves must
    /// be expressed as a remove followed by an add.
    pub fn rename(
        &mut self,
        arena: &mut NodeArena,
        normalizer: &TextNormalizer,
        old: &Path,
        new: &Path,
    ) -> Option<NodeId> {
        assert_eq!(
            old.parent(),
            new.parent(),
            "rename must not move the node: {} -> {}",
            old.display(),
            new.display()
        );
        if old == self.area.path {
            log::debug!("tree rename of area root ignored path={}", old.display());
            return None;
        }
        let id = self.locate(arena, old)?;
        let new_name = entry_name(new);

        if let Some(parent) = arena[id].parent() {
            if let Some(existing) = Self::find_child(arena, parent, &new_name) {
                if existing != id {
                    arena.detach(existing);
                    arena.release_subtree(existing);
                }
            }
        }

        arena[id].set_name(&new_name, normalizer);
        arena.invalidate_paths(id);
        Some(id)
    }

    /// Re-reads filesystem metadata for `path` without changing the shape.
    pub fn refresh(&mut self, arena: &mut NodeArena, path: &Path) -> Option<NodeId> {
        let id = self.locate(arena, path)?;
        let metadata = NodeMetadata::of_path(path)?;
        arena[id].metadata = metadata;
        Some(id)
    }

    pub fn set_pinned(&mut self, arena: &mut NodeArena, path: &Path, pinned: bool) -> Option<NodeId> {
        let id = self.locate(arena, path)?;
        arena[id].flags.set(NodeFlags::PIN_PERSIST, pinned);
        Some(id)
    }

    /// Filesystem entries reachable under the area. A directory root is not
    /// counted itself; a single-file area counts as one.
    pub fn node_count(&self, arena: &NodeArena) -> usize {
        match self.root {
            None => 0,
            Some(root) if arena[root].is_dir() => arena.descendant_count(root),
            Some(_) => 1,
        }
    }

    /// Preorder ids of the searchable nodes, following the same rule as
    /// `node_count`.
    pub fn items(&self, arena: &NodeArena) -> Vec<NodeId> {
        match self.root {
            None => Vec::new(),
            Some(root) if arena[root].is_dir() => {
                let mut ids = arena.subtree(root);
                ids.remove(0);
                ids
            }
            Some(root) => vec![root],
        }
    }
}
