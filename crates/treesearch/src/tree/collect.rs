//! Parallel filesystem walk producing an owned node tree.
//!
//! The walk runs without touching the arena so subdirectories can be
//! expanded on the rayon pool; `insert_collected` then moves the result into
//! the arena on the calling thread.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use super::arena::{NodeArena, NodeId};
use super::node::{Node, NodeMetadata};
use crate::cancel::CancellationToken;
use crate::normalize::TextNormalizer;

/// A walked entry, before it is placed in the arena.
#[derive(Debug)]
pub struct CollectedNode {
    pub name: Box<str>,
    pub metadata: NodeMetadata,
    pub children: Vec<CollectedNode>,
}

impl CollectedNode {
    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CollectedNode::node_count).sum::<usize>()
    }
}

#[derive(Debug)]
pub enum CollectOutcome {
    Collected(CollectedNode),
    /// The root no longer exists or cannot be stat'ed.
    Missing,
    Canceled,
}

#[derive(Debug)]
pub struct WalkData<'a> {
    pub num_files: AtomicUsize,
    pub num_dirs: AtomicUsize,
    pub cancel: &'a CancellationToken,
    pub include_hidden: bool,
    pub recursive: bool,
}

impl<'a> WalkData<'a> {
    pub fn new(cancel: &'a CancellationToken) -> Self {
        Self {
            num_files: AtomicUsize::new(0),
            num_dirs: AtomicUsize::new(0),
            cancel,
            include_hidden: true,
            recursive: true,
        }
    }

    pub fn include_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn skip_name(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

/// Walks `root` and returns its subtree.
///
/// Directories that cannot be read are kept with an empty child list. A
/// cancellation observed anywhere in the walk discards the whole result.
pub fn collect(root: &Path, walk_data: &WalkData) -> CollectOutcome {
    if walk_data.cancel.cancel_requested() {
        return CollectOutcome::Canceled;
    }
    let Ok(metadata) = fs::symlink_metadata(root) else {
        return CollectOutcome::Missing;
    };
    let name = entry_name(root);
    let metadata = NodeMetadata::from_fs_metadata(&metadata);
    match walk(root, name, metadata, walk_data, 0) {
        Some(node) => CollectOutcome::Collected(node),
        None => CollectOutcome::Canceled,
    }
}

fn walk(
    path: &Path,
    name: Box<str>,
    metadata: NodeMetadata,
    walk_data: &WalkData,
    depth: usize,
) -> Option<CollectedNode> {
    walk_data.cancel.is_cancelled()?;

    if !metadata.is_dir() {
        walk_data.num_files.fetch_add(1, Ordering::Relaxed);
        return Some(CollectedNode {
            name,
            metadata,
            children: Vec::new(),
        });
    }

    walk_data.num_dirs.fetch_add(1, Ordering::Relaxed);
    let expand = depth == 0 || walk_data.recursive;
    if !expand {
        return Some(CollectedNode {
            name,
            metadata,
            children: Vec::new(),
        });
    }

    let entries: Vec<_> = match fs::read_dir(path) {
        Ok(iter) => iter.filter_map(|entry| entry.ok()).collect(),
        Err(err) => {
            log::warn!("tree collect read_dir failed path={} err={}", path.display(), err);
            Vec::new()
        }
    };

    let mut children: Vec<CollectedNode> = entries
        .into_par_iter()
        .map(|entry| {
            let child_name: Box<str> = entry.file_name().to_string_lossy().into();
            if walk_data.skip_name(&child_name) {
                return Some(None);
            }
            let Ok(child_metadata) = entry.metadata() else {
                return Some(None);
            };
            let child_metadata = NodeMetadata::from_fs_metadata(&child_metadata);
            walk(
                &entry.path(),
                child_name,
                child_metadata,
                walk_data,
                depth + 1,
            )
            .map(Some)
        })
        .collect::<Option<Vec<Option<CollectedNode>>>>()?
        .into_iter()
        .flatten()
        .collect();

    walk_data.cancel.is_cancelled()?;

    children.sort_unstable_by(|a, b| a.name.cmp(&b.name));

    Some(CollectedNode {
        name,
        metadata,
        children,
    })
}

pub(crate) fn entry_name(path: &Path) -> Box<str> {
    path.file_name()
        .map(|s| s.to_string_lossy().into())
        .unwrap_or_else(|| path.to_string_lossy().into())
}

/// Moves a collected subtree into the arena and returns its top node.
pub fn insert_collected(
    arena: &mut NodeArena,
    collected: CollectedNode,
    normalizer: &TextNormalizer,
) -> NodeId {
    let CollectedNode {
        name,
        metadata,
        children,
    } = collected;
    let id = arena.insert(Node::new(&name, metadata, normalizer));
    for child in children {
        let child_id = insert_collected(arena, child, normalizer);
        arena.attach_new(id, child_id);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn collected(outcome: CollectOutcome) -> CollectedNode {
        match outcome {
            CollectOutcome::Collected(node) => node,
            other => panic!("expected a collected tree, got {other:?}"),
        }
    }

    #[test]
    fn collect_with_subdirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("bbb")).unwrap();
        fs::create_dir(temp.path().join("aaa")).unwrap();
        File::create(temp.path().join("aaa/file.txt")).unwrap();
        File::create(temp.path().join("top.txt")).unwrap();

        let cancel = CancellationToken::new();
        let walk_data = WalkData::new(&cancel);
        let node = collected(collect(temp.path(), &walk_data));

        let names: Vec<_> = node.children.iter().map(|c| c.name.as_ref()).collect();
        assert_eq!(names, vec!["aaa", "bbb", "top.txt"]);
        assert_eq!(node.children[0].children.len(), 1);
        assert_eq!(node.node_count(), 5);
        assert_eq!(walk_data.num_files.load(Ordering::Relaxed), 2);
        assert_eq!(walk_data.num_dirs.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn non_recursive_keeps_immediate_children() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        File::create(temp.path().join("sub/deep.txt")).unwrap();
        File::create(temp.path().join("a.txt")).unwrap();

        let cancel = CancellationToken::new();
        let walk_data = WalkData::new(&cancel).recursive(false);
        let node = collected(collect(temp.path(), &walk_data));

        assert_eq!(node.children.len(), 2);
        assert!(node.children.iter().all(|c| c.children.is_empty()));
    }

    #[test]
    fn hidden_entries_can_be_skipped() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join(".hidden")).unwrap();
        File::create(temp.path().join("shown")).unwrap();

        let cancel = CancellationToken::new();
        let walk_data = WalkData::new(&cancel).include_hidden(false);
        let node = collected(collect(temp.path(), &walk_data));
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].name.as_ref(), "shown");
    }

    #[test]
    fn missing_root_and_cancellation() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let walk_data = WalkData::new(&cancel);
        assert!(matches!(
            collect(&temp.path().join("gone"), &walk_data),
            CollectOutcome::Missing
        ));

        cancel.cancel();
        assert!(matches!(
            collect(temp.path(), &walk_data),
            CollectOutcome::Canceled
        ));
    }

    #[test]
    fn unreadable_directory_keeps_an_empty_child_list() {
        let temp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let walk_data = WalkData::new(&cancel);

        let vanished = walk(
            &temp.path().join("vanished"),
            "vanished".into(),
            NodeMetadata::directory(),
            &walk_data,
            0,
        )
        .unwrap();
        assert_eq!(vanished.name.as_ref(), "vanished");
        assert!(vanished.children.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_does_not_abort_siblings() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        File::create(locked.join("inner.txt")).unwrap();
        fs::create_dir(temp.path().join("open")).unwrap();
        File::create(temp.path().join("open/a.txt")).unwrap();
        File::create(temp.path().join("open/b.txt")).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        // privileged users read through the mode bits
        let denied = fs::read_dir(&locked).is_err();

        let cancel = CancellationToken::new();
        let outcome = collect(temp.path(), &WalkData::new(&cancel));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        let node = collected(outcome);

        let names: Vec<_> = node.children.iter().map(|c| c.name.as_ref()).collect();
        assert_eq!(names, vec!["locked", "open"]);
        assert_eq!(node.children[1].children.len(), 2);
        if denied {
            assert!(node.children[0].children.is_empty());
        } else {
            assert_eq!(node.children[0].children.len(), 1);
        }
    }

    #[test]
    fn insert_preserves_shape() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        File::create(temp.path().join("sub/a.txt")).unwrap();

        let cancel = CancellationToken::new();
        let node = collected(collect(temp.path(), &WalkData::new(&cancel)));
        let mut arena = NodeArena::new();
        let root = insert_collected(&mut arena, node, &TextNormalizer::uncached());

        assert_eq!(arena.len(), 3);
        let sub = arena[root].children()[0];
        assert_eq!(arena[sub].name(), "sub");
        assert_eq!(arena[sub].parent(), Some(root));
        assert_eq!(arena.descendant_count(root), 2);
    }
}
