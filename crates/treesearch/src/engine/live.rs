use crossbeam_channel::Receiver;
use fnv::FnvHashSet;

use crate::filter::CompiledQuery;
use crate::index::IndexChange;
use crate::tree::{NodeEntry, NodeId};

/// A search result kept current by change notifications.
///
/// Pending changes are applied whenever the results are read. Only the
/// entries carried by a change are re-filtered, never the whole index.
#[derive(Debug)]
pub struct LiveResults {
    query: CompiledQuery,
    entries: Vec<NodeEntry>,
    changes: Receiver<IndexChange>,
    stale: bool,
}

impl LiveResults {
    pub(crate) fn new(
        query: CompiledQuery,
        entries: Vec<NodeEntry>,
        changes: Receiver<IndexChange>,
    ) -> Self {
        Self {
            query,
            entries,
            changes,
            stale: false,
        }
    }

    /// True once the areas were re-collected after this search ran. The
    /// entries are cleared at that point and the search has to be rerun.
    pub fn is_stale(&mut self) -> bool {
        self.refresh();
        self.stale
    }

    /// Applies pending changes. Returns true if any arrived.
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        while let Ok(change) = self.changes.try_recv() {
            self.apply(change);
            changed = true;
        }
        changed
    }

    pub fn entries(&mut self) -> &[NodeEntry] {
        self.refresh();
        &self.entries
    }

    pub fn len(&mut self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.entries().is_empty()
    }

    fn apply(&mut self, change: IndexChange) {
        match change {
            IndexChange::Add(entries) => {
                for entry in entries {
                    if !self.contains(entry.id) {
                        self.admit(entry);
                    }
                }
            }
            IndexChange::Remove(entries) => {
                let removed: FnvHashSet<NodeId> = entries.iter().map(|entry| entry.id).collect();
                self.entries.retain(|kept| !removed.contains(&kept.id));
            }
            IndexChange::Rename { entries, .. } | IndexChange::Update(entries) => {
                let touched: FnvHashSet<NodeId> = entries.iter().map(|entry| entry.id).collect();
                self.entries.retain(|kept| !touched.contains(&kept.id));
                for entry in entries {
                    self.admit(entry);
                }
            }
            IndexChange::Reset => {
                self.entries.clear();
                self.stale = true;
            }
        }
    }

    fn contains(&self, id: NodeId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    fn admit(&mut self, entry: NodeEntry) {
        if !self.query.admits(&entry) {
            return;
        }
        if entry.is_pinned() {
            let at = self
                .entries
                .iter()
                .position(|kept| !kept.is_pinned())
                .unwrap_or(self.entries.len());
            self.entries.insert(at, entry);
        } else {
            self.entries.push(entry);
        }
    }
}
