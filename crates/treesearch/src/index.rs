//! Index coordinator: one node tree per effective search area.
//!
//! The coordinator owns the node arena and every tree in it. It is moved into
//! the command worker and only ever touched from there, so none of its state
//! is locked. The node counter is the exception: it is shared with the
//! engine facade as an advisory progress value that may lag the trees.

mod change;

use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use rayon::prelude::*;

pub use change::{ChangeBus, IndexChange};

use crate::area::{dedup_areas, SearchArea};
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::filter::{CompiledQuery, SearchItem};
use crate::normalize::TextNormalizer;
use crate::tree::{CollectOutcome, NodeArena, NodeEntry, NodeFlags, NodeId, NodeTree};
use crate::watcher::{watch_area, PathChange, WatchEvent, WatchSink};

/// Borrowed view of a node for filter evaluation.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    arena: &'a NodeArena,
    id: NodeId,
}

impl<'a> NodeView<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn node(&self) -> &'a crate::tree::Node {
        &self.arena[self.id]
    }
}

impl SearchItem for NodeView<'_> {
    fn name(&self) -> &str {
        self.node().name()
    }

    fn fuzzy_name(&self) -> &str {
        self.node().fuzzy_name()
    }

    fn word_name(&self) -> &str {
        self.node().word_name()
    }

    fn is_dir(&self) -> bool {
        self.node().is_dir()
    }

    fn is_pinned(&self) -> bool {
        self.node().flags.contains(NodeFlags::PIN_PERSIST)
    }

    fn size(&self) -> u64 {
        self.node().metadata.size
    }

    fn modified(&self) -> Option<DateTime<Local>> {
        self.node().metadata.modified()
    }

    fn path(&self) -> Cow<'_, Path> {
        match self.node().cached_path() {
            Some(path) => Cow::Borrowed(path),
            None => Cow::Owned(self.arena.node_path(self.id).unwrap_or_default()),
        }
    }
}

impl SearchItem for NodeEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn fuzzy_name(&self) -> &str {
        &self.fuzzy_name
    }

    fn word_name(&self) -> &str {
        &self.word_name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn is_pinned(&self) -> bool {
        NodeEntry::is_pinned(self)
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn modified(&self) -> Option<DateTime<Local>> {
        self.modified
    }

    fn path(&self) -> Cow<'_, Path> {
        Cow::Borrowed(&self.path)
    }
}

pub struct IndexCoordinator {
    arena: NodeArena,
    trees: Vec<NodeTree>,
    normalizer: Arc<TextNormalizer>,
    include_hidden: bool,
    /// Searchable nodes, kept in step with every mutation.
    nodes: usize,
    node_count: Arc<AtomicUsize>,
    changes: ChangeBus,
    watch_sink: Option<WatchSink>,
}

impl IndexCoordinator {
    pub fn new(config: &EngineConfig, normalizer: Arc<TextNormalizer>) -> Self {
        Self {
            arena: NodeArena::new(),
            trees: Vec::new(),
            normalizer,
            include_hidden: config.include_hidden,
            nodes: 0,
            node_count: Arc::new(AtomicUsize::new(0)),
            changes: ChangeBus::new(),
            watch_sink: None,
        }
    }

    pub fn changes(&self) -> &ChangeBus {
        &self.changes
    }

    /// Shared handle to the advisory node counter.
    pub fn node_count_handle(&self) -> Arc<AtomicUsize> {
        self.node_count.clone()
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn trees(&self) -> &[NodeTree] {
        &self.trees
    }

    /// Installs the sink watchers forward to, watching every existing tree.
    pub fn set_watch_sink(&mut self, sink: Option<WatchSink>) {
        self.watch_sink = sink;
        let mut trees = std::mem::take(&mut self.trees);
        for tree in trees.iter_mut() {
            if self.watch_sink.is_none() {
                tree.set_watcher(None);
            } else if !tree.is_watching() {
                self.watch_tree(tree);
            }
        }
        self.trees = trees;
    }

    fn watch_tree(&self, tree: &mut NodeTree) {
        let Some(sink) = self.watch_sink.clone() else {
            return;
        };
        let Some(root) = tree.root() else {
            return;
        };
        let root_is_dir = self.arena[root].is_dir();
        match watch_area(tree.area(), root_is_dir, sink) {
            Ok(watcher) => tree.set_watcher(Some(watcher)),
            Err(err) => log::warn!(
                "index watcher unavailable root={} err={}",
                tree.area().path.display(),
                err
            ),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes
    }

    /// Sum over top-level trees; merged trees are counted by their parent.
    fn recount(&mut self) -> usize {
        self.nodes = self
            .trees
            .iter()
            .filter(|tree| !tree.is_child())
            .map(|tree| tree.node_count(&self.arena))
            .sum();
        self.publish_count()
    }

    fn adjust_count(&mut self, added: usize, removed: usize) {
        self.nodes = (self.nodes + added).saturating_sub(removed);
        self.publish_count();
    }

    fn publish_count(&self) -> usize {
        self.node_count.store(self.nodes, Ordering::Relaxed);
        self.nodes
    }

    /// A directory root of a top-level tree is not itself searchable.
    fn is_uncounted_root(&self, index: usize, id: NodeId) -> bool {
        let tree = &self.trees[index];
        tree.root() == Some(id) && !tree.is_child() && self.arena[id].is_dir()
    }

    // -----------------------------------------------------------------------
    // Collect
    // -----------------------------------------------------------------------

    /// Rebuilds the tree set for `areas`. Returns the node count, or `None`
    /// if canceled before the trees were installed.
    ///
    /// Subscribers get an `IndexChange::Reset` whenever a tree was disposed
    /// or built, since ids handed out before may have been released.
    pub fn collect(&mut self, areas: &[SearchArea], cancel: &CancellationToken) -> Option<usize> {
        let started = Instant::now();
        self.unmerge();
        let wanted = dedup_areas(areas);

        let mut kept = Vec::with_capacity(wanted.len());
        let mut disposed = 0;
        for mut tree in std::mem::take(&mut self.trees) {
            if !tree.is_dirty() && wanted.contains(tree.area()) {
                kept.push(tree);
            } else {
                disposed += 1;
                let released = tree.release(&mut self.arena);
                log::debug!(
                    "index dispose tree root={} released={}",
                    tree.area().path.display(),
                    released
                );
            }
        }

        let to_build: Vec<SearchArea> = wanted
            .iter()
            .filter(|area| !kept.iter().any(|tree: &NodeTree| tree.area() == *area))
            .cloned()
            .collect();
        let include_hidden = self.include_hidden;
        let walked: Vec<(SearchArea, CollectOutcome)> = to_build
            .into_par_iter()
            .map(|area| {
                let outcome = NodeTree::walk(&area, include_hidden, cancel);
                (area, outcome)
            })
            .collect();

        if walked
            .iter()
            .any(|(_, outcome)| matches!(outcome, CollectOutcome::Canceled))
        {
            self.trees = kept;
            self.recount();
            if disposed > 0 {
                self.changes.publish(IndexChange::Reset);
            }
            log::info!("index collect canceled areas={}", areas.len());
            return None;
        }
        let built = walked.len();

        for (area, outcome) in walked {
            let collected = match outcome {
                CollectOutcome::Collected(node) => Some(node),
                _ => {
                    log::info!("index collect root missing root={}", area.path.display());
                    None
                }
            };
            let mut tree = NodeTree::from_collected(
                area,
                collected,
                include_hidden,
                &mut self.arena,
                &self.normalizer,
            );
            log::debug!(
                "tree collect root={} nodes={}",
                tree.area().path.display(),
                tree.node_count(&self.arena)
            );
            self.watch_tree(&mut tree);
            kept.push(tree);
        }

        kept.sort_by_key(|tree| wanted.iter().position(|area| area == tree.area()));
        self.trees = kept;
        self.merge();

        let count = self.recount();
        if disposed + built > 0 {
            self.changes.publish(IndexChange::Reset);
        }
        log::info!(
            "index collect areas={} trees={} disposed={} built={} nodes={} elapsed_ms={}",
            areas.len(),
            self.trees.len(),
            disposed,
            built,
            count,
            started.elapsed().as_millis()
        );
        Some(count)
    }

    /// Detaches every merged tree from its parent and marks the parent for
    /// rebuild, since its shallow node for the child was released.
    fn unmerge(&mut self) {
        for i in 0..self.trees.len() {
            if !self.trees[i].is_child() {
                continue;
            }
            if let Some(root) = self.trees[i].root() {
                self.arena.detach(root);
            }
            self.trees[i].set_child(false);
            let child_area = self.trees[i].area().clone();
            for tree in self.trees.iter_mut() {
                if tree.area().is_parent_of(&child_area) {
                    tree.mark_dirty();
                }
            }
        }
    }

    /// Re-parents trees whose root is an immediate child of a shallow tree,
    /// replacing the shallow tree's own node for that entry.
    ///
    /// # Panics
    /// Panics if a root to re-parent already has a parent.
    fn merge(&mut self) {
        for p in 0..self.trees.len() {
            if self.trees[p].area().include_subdirectories {
                continue;
            }
            let Some(parent_root) = self.trees[p].root() else {
                continue;
            };
            for c in 0..self.trees.len() {
                if c == p || !self.trees[p].area().is_parent_of(self.trees[c].area()) {
                    continue;
                }
                let Some(child_root) = self.trees[c].root() else {
                    continue;
                };
                let name = self.arena[child_root].name();
                let Some(shallow) = self.arena[parent_root]
                    .children()
                    .iter()
                    .copied()
                    .find(|&id| self.arena[id].name() == name)
                else {
                    continue;
                };
                if shallow == child_root {
                    continue;
                }
                assert!(
                    self.arena[child_root].parent().is_none(),
                    "tree root {} is already merged under another tree",
                    self.trees[c].area().path.display()
                );
                self.arena.detach(shallow);
                self.arena.release_subtree(shallow);
                self.arena.attach(parent_root, child_root);
                self.trees[c].set_child(true);
                log::debug!(
                    "index merge child={} parent={}",
                    self.trees[c].area().path.display(),
                    self.trees[p].area().path.display()
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Finds the owning tree: the explicit root, else the longest prefix.
    fn tree_index(&self, root: Option<&Path>, path: &Path) -> Option<usize> {
        match root {
            Some(root) => self.trees.iter().position(|tree| tree.area().path == root),
            None => self
                .trees
                .iter()
                .enumerate()
                .filter(|(_, tree)| path.starts_with(&tree.area().path))
                .max_by_key(|(_, tree)| tree.area().path.components().count())
                .map(|(i, _)| i),
        }
    }

    pub fn snapshot(&self, id: NodeId) -> Option<NodeEntry> {
        let node = self.arena.get(id)?;
        let path = self.arena.node_path(id)?;
        Some(NodeEntry::from_node(id, node, path))
    }

    fn subtree_entries(&self, id: NodeId) -> Vec<NodeEntry> {
        self.arena
            .subtree(id)
            .into_iter()
            .filter_map(|node| self.snapshot(node))
            .collect()
    }

    pub fn add_path(&mut self, root: Option<&Path>, path: &Path) -> Option<NodeEntry> {
        let index = self.tree_index(root, path)?;
        let id = self.trees[index].add(&mut self.arena, &self.normalizer, path)?;
        let entries = self.subtree_entries(id);
        let uncounted = usize::from(self.is_uncounted_root(index, id));
        self.adjust_count(entries.len(), uncounted);
        let top = entries.first().cloned();
        self.changes.publish(IndexChange::Add(entries));
        top
    }

    pub fn remove_path(&mut self, root: Option<&Path>, path: &Path) -> Option<NodeEntry> {
        let index = self.tree_index(root, path)?;
        let uncounted = self.trees[index]
            .locate(&self.arena, path)
            .is_some_and(|id| self.is_uncounted_root(index, id));
        let id = self.trees[index].remove(&mut self.arena, path)?;
        let entries = self.subtree_entries(id);

        for tree in self.trees.iter_mut() {
            let Some(tree_root) = tree.root() else {
                continue;
            };
            if entries.iter().any(|entry| entry.id == tree_root) {
                tree.clear_root();
                tree.set_child(false);
            }
        }

        self.arena.release_subtree(id);
        self.adjust_count(usize::from(uncounted), entries.len());
        let top = entries.first().cloned();
        self.changes.publish(IndexChange::Remove(entries));
        top
    }

    /// Renames in place. A rename whose source is unknown is treated as an add
    /// of the destination. An entry already at `new` is replaced and reported
    /// as removed.
    ///
    /// # Panics
    /// Panics if `new` is in a different directory than `old`.
    pub fn rename_path(&mut self, root: Option<&Path>, old: &Path, new: &Path) -> Option<NodeEntry> {
        let index = self.tree_index(root, old)?;
        let source = self.trees[index].locate(&self.arena, old);
        let replaced = match self.trees[index].locate(&self.arena, new) {
            Some(existing) if source.is_some() && source != Some(existing) => {
                self.subtree_entries(existing)
            }
            _ => Vec::new(),
        };
        let Some(id) = self.trees[index].rename(&mut self.arena, &self.normalizer, old, new) else {
            return self.add_path(root, new);
        };
        if !replaced.is_empty() {
            self.adjust_count(0, replaced.len());
            self.changes.publish(IndexChange::Remove(replaced));
        }
        let entries = self.subtree_entries(id);
        let top = entries.first().cloned();
        self.changes.publish(IndexChange::Rename {
            entries,
            old_path: old.to_path_buf(),
        });
        top
    }

    pub fn refresh_path(&mut self, root: Option<&Path>, path: &Path) -> Option<NodeEntry> {
        let index = self.tree_index(root, path)?;
        let id = self.trees[index].refresh(&mut self.arena, path)?;
        self.publish_update(id)
    }

    /// Pinning changes which queries admit the node, so it is published
    /// like any other in-place update.
    pub fn set_pinned(&mut self, path: &Path, pinned: bool) -> Option<NodeEntry> {
        let index = self.tree_index(None, path)?;
        let id = self.trees[index].set_pinned(&mut self.arena, path, pinned)?;
        self.publish_update(id)
    }

    fn publish_update(&self, id: NodeId) -> Option<NodeEntry> {
        let entry = self.snapshot(id)?;
        self.changes.publish(IndexChange::Update(vec![entry.clone()]));
        Some(entry)
    }

    /// Applies a watcher event. Events for roots that are no longer
    /// configured are dropped.
    pub fn apply_watch_event(&mut self, event: &WatchEvent) {
        if self.tree_index(Some(event.root.as_path()), &event.root).is_none() {
            log::debug!("index drop watch event root={}", event.root.display());
            return;
        }
        let root = Some(event.root.as_path());
        match &event.change {
            PathChange::Created(path) => {
                if self.add_path(root, path).is_none() {
                    self.refresh_path(root, path);
                }
            }
            PathChange::Deleted(path) => {
                self.remove_path(root, path);
            }
            PathChange::Renamed { from, to } => {
                self.rename_path(root, from, to);
            }
            PathChange::Changed(path) => {
                if self.refresh_path(root, path).is_none() {
                    self.add_path(root, path);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------------

    /// Searchable nodes of every top-level tree, in tree order.
    pub fn views(&self) -> Vec<NodeView<'_>> {
        self.trees
            .iter()
            .filter(|tree| !tree.is_child())
            .flat_map(|tree| tree.items(&self.arena))
            .map(|id| NodeView {
                arena: &self.arena,
                id,
            })
            .collect()
    }

    /// Runs one query and snapshots the result.
    pub fn search(&mut self, query: &CompiledQuery, cancel: &CancellationToken) -> Option<Vec<NodeEntry>> {
        let mut results = self.multi_search(std::slice::from_ref(query), cancel)?;
        results.pop()
    }

    /// Runs several queries against one snapshot of the node sequence.
    pub fn multi_search(
        &mut self,
        queries: &[CompiledQuery],
        cancel: &CancellationToken,
    ) -> Option<Vec<Vec<NodeEntry>>> {
        let started = Instant::now();
        let results = {
            let views = self.views();
            let mut results = Vec::with_capacity(queries.len());
            for query in queries {
                let matched = query.evaluate(&views, cancel)?;
                let entries: Vec<NodeEntry> = matched
                    .into_iter()
                    .filter_map(|view| self.snapshot(view.id))
                    .collect();
                results.push(entries);
            }
            results
        };
        self.clear_added();
        log::debug!(
            "index search queries={} results={:?} elapsed_ms={}",
            queries.len(),
            results.iter().map(Vec::len).collect::<Vec<_>>(),
            started.elapsed().as_millis()
        );
        Some(results)
    }

    fn clear_added(&mut self) {
        let roots: Vec<NodeId> = self
            .trees
            .iter()
            .filter(|tree| !tree.is_child())
            .filter_map(NodeTree::root)
            .collect();
        for root in roots {
            for id in self.arena.subtree(root) {
                self.arena[id].flags.remove(NodeFlags::ADDED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::TempDir;

    use crate::filter::{FilterEngine, Property};

    // root/
    //   a.txt
    //   sub/b.txt
    //   sub/deep/c.txt
    //   other/x.txt
    fn fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("sub/deep")).unwrap();
        fs::create_dir(root.join("other")).unwrap();
        File::create(root.join("a.txt")).unwrap();
        File::create(root.join("sub/b.txt")).unwrap();
        File::create(root.join("sub/deep/c.txt")).unwrap();
        File::create(root.join("other/x.txt")).unwrap();
        temp
    }

    fn coordinator() -> IndexCoordinator {
        IndexCoordinator::new(&EngineConfig::default(), Arc::new(TextNormalizer::uncached()))
    }

    fn collect(coordinator: &mut IndexCoordinator, areas: &[SearchArea]) -> usize {
        coordinator
            .collect(areas, &CancellationToken::noop())
            .unwrap()
    }

    #[test]
    fn overlapping_areas_count_once() {
        let temp = fixture();
        let root = temp.path();

        let mut single = coordinator();
        let baseline = collect(&mut single, &[SearchArea::recursive(root)]);
        assert_eq!(baseline, 7);

        let mut doubled = coordinator();
        assert_eq!(
            collect(
                &mut doubled,
                &[SearchArea::recursive(root), SearchArea::recursive(root)]
            ),
            baseline
        );

        let mut nested = coordinator();
        assert_eq!(
            collect(
                &mut nested,
                &[SearchArea::recursive(root), SearchArea::recursive(root.join("sub"))]
            ),
            baseline
        );
        assert_eq!(nested.trees().len(), 1);
    }

    #[test]
    fn shallow_parent_merges_recursive_child() {
        let temp = fixture();
        let root = temp.path();
        let mut coordinator = coordinator();
        // a.txt, sub, other from the shallow root; b.txt, deep, c.txt from sub
        let count = collect(
            &mut coordinator,
            &[SearchArea::shallow(root), SearchArea::recursive(root.join("sub"))],
        );
        assert_eq!(count, 6);
        assert!(coordinator.trees()[1].is_child());
        assert_eq!(coordinator.views().len(), 6);

        let sub_root = coordinator.trees()[1].root().unwrap();
        assert_eq!(
            coordinator.arena()[sub_root].parent(),
            coordinator.trees()[0].root()
        );

        // collecting again unmerges, rebuilds the parent and merges again
        let again = collect(
            &mut coordinator,
            &[SearchArea::shallow(root), SearchArea::recursive(root.join("sub"))],
        );
        assert_eq!(again, 6);
        assert_eq!(coordinator.trees()[1].root(), Some(sub_root));
    }

    #[test]
    fn unchanged_trees_are_reused() {
        let temp = fixture();
        let mut coordinator = coordinator();
        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let root = coordinator.trees()[0].root();
        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        assert_eq!(coordinator.trees()[0].root(), root);

        collect(&mut coordinator, &[SearchArea::shallow(temp.path())]);
        assert_eq!(coordinator.node_count(), 3);
    }

    #[test]
    fn missing_area_yields_empty_tree() {
        let temp = fixture();
        let mut coordinator = coordinator();
        let count = collect(
            &mut coordinator,
            &[
                SearchArea::recursive(temp.path().join("missing")),
                SearchArea::recursive(temp.path().join("other")),
            ],
        );
        assert_eq!(count, 1);
    }

    #[test]
    fn canceled_collect_installs_nothing() {
        let temp = fixture();
        let mut coordinator = coordinator();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            coordinator.collect(&[SearchArea::recursive(temp.path())], &cancel),
            None
        );
        assert_eq!(coordinator.node_count(), 0);
    }

    #[test]
    fn add_then_remove_restores_count_and_notifies() {
        let temp = fixture();
        let mut coordinator = coordinator();
        let baseline = collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let changes = coordinator.changes().subscribe();

        let file = temp.path().join("sub/new.txt");
        File::create(&file).unwrap();
        let added = coordinator.add_path(None, &file).unwrap();
        assert_eq!(added.path, file);
        assert!(added.flags.contains(NodeFlags::ADDED));
        assert_eq!(coordinator.node_count_handle().load(Ordering::Relaxed), baseline + 1);
        assert!(coordinator.add_path(None, &file).is_none());

        let removed = coordinator.remove_path(None, &file).unwrap();
        assert!(removed.is_removed());
        assert_eq!(coordinator.node_count(), baseline);

        assert!(matches!(changes.try_recv().unwrap(), IndexChange::Add(_)));
        assert!(matches!(changes.try_recv().unwrap(), IndexChange::Remove(_)));
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn removing_a_parent_clears_merged_child_trees() {
        let temp = fixture();
        let root = temp.path();
        let mut coordinator = coordinator();
        collect(
            &mut coordinator,
            &[SearchArea::shallow(root), SearchArea::recursive(root.join("sub"))],
        );
        coordinator.remove_path(Some(root), &root.join("sub"));
        assert_eq!(coordinator.trees()[1].root(), None);
        assert_eq!(coordinator.node_count(), 2);
    }

    #[test]
    fn running_count_matches_full_recount() {
        let temp = fixture();
        let root = temp.path();
        let mut coordinator = coordinator();
        collect(&mut coordinator, &[SearchArea::recursive(root)]);

        fs::create_dir(root.join("newdir")).unwrap();
        File::create(root.join("newdir/one")).unwrap();
        File::create(root.join("newdir/two")).unwrap();
        coordinator.add_path(None, &root.join("newdir")).unwrap();
        assert_eq!(coordinator.node_count(), 10);
        assert_eq!(coordinator.recount(), 10);

        // the replaced sub/deep and its c.txt leave the index
        let changes = coordinator.changes().subscribe();
        coordinator
            .rename_path(None, &root.join("sub/b.txt"), &root.join("sub/deep"))
            .unwrap();
        assert_eq!(coordinator.node_count(), 8);
        assert_eq!(coordinator.recount(), 8);
        assert!(matches!(changes.try_recv().unwrap(), IndexChange::Remove(entries) if entries.len() == 2));
        assert!(matches!(changes.try_recv().unwrap(), IndexChange::Rename { .. }));

        coordinator.remove_path(None, &root.join("other")).unwrap();
        assert_eq!(coordinator.node_count(), 6);
        assert_eq!(coordinator.recount(), 6);

        coordinator.remove_path(None, root).unwrap();
        assert_eq!(coordinator.node_count(), 0);
        assert_eq!(coordinator.recount(), 0);
    }

    #[test]
    fn pin_and_refresh_publish_updates() {
        let temp = fixture();
        let mut coordinator = coordinator();
        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let changes = coordinator.changes().subscribe();
        let file = temp.path().join("a.txt");

        coordinator.set_pinned(&file, true).unwrap();
        coordinator.refresh_path(None, &file).unwrap();

        let received: Vec<IndexChange> = changes.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(&received[0], IndexChange::Update(entries) if entries[0].is_pinned()));
        assert!(matches!(&received[1], IndexChange::Update(entries) if entries[0].path == file));
    }

    #[test]
    fn collect_publishes_reset_only_when_trees_change() {
        let temp = fixture();
        let mut coordinator = coordinator();
        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let changes = coordinator.changes().subscribe();

        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        assert!(changes.try_recv().is_err());

        collect(&mut coordinator, &[SearchArea::shallow(temp.path())]);
        assert_eq!(changes.try_recv().unwrap(), IndexChange::Reset);
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn unknown_rename_source_becomes_add() {
        let temp = fixture();
        let mut coordinator = coordinator();
        let baseline = collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let to = temp.path().join("fresh.txt");
        File::create(&to).unwrap();
        let entry = coordinator
            .rename_path(None, &temp.path().join("ghost.txt"), &to)
            .unwrap();
        assert_eq!(&*entry.name, "fresh.txt");
        assert_eq!(coordinator.node_count(), baseline + 1);
    }

    #[test]
    fn watch_events_for_unknown_roots_are_dropped() {
        let temp = fixture();
        let mut coordinator = coordinator();
        let baseline = collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let file = temp.path().join("dropped.txt");
        File::create(&file).unwrap();
        coordinator.apply_watch_event(&WatchEvent {
            root: temp.path().join("elsewhere"),
            change: PathChange::Created(file.clone()),
        });
        assert_eq!(coordinator.node_count(), baseline);

        coordinator.apply_watch_event(&WatchEvent {
            root: temp.path().to_path_buf(),
            change: PathChange::Created(file),
        });
        assert_eq!(coordinator.node_count(), baseline + 1);
    }

    #[test]
    fn search_clears_added_flags_and_honors_pins() {
        let temp = fixture();
        let mut coordinator = coordinator();
        collect(&mut coordinator, &[SearchArea::recursive(temp.path())]);
        let file = temp.path().join("pinme.md");
        File::create(&file).unwrap();
        coordinator.add_path(None, &file).unwrap();
        coordinator.set_pinned(&file, true).unwrap();

        let filter = FilterEngine::new(
            Arc::new(TextNormalizer::uncached()),
            &Property::INDEX,
            '/',
        );
        let query = filter.compile_query("txt").unwrap();
        let results = coordinator
            .search(&query, &CancellationToken::noop())
            .unwrap();
        assert_eq!(&*results[0].name, "pinme.md");
        assert_eq!(results.len(), 5);

        let id = coordinator.trees()[0].locate(coordinator.arena(), &file).unwrap();
        assert!(!coordinator.arena()[id].flags.contains(NodeFlags::ADDED));
    }
}
