//! Change notifications published by the coordinator.

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::tree::{NodeEntry, NodeId};

/// A tree mutation, carrying snapshots of the affected subtree.
///
/// The first entry is always the node the change applies to; the rest are
/// its descendants in preorder.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexChange {
    Add(Vec<NodeEntry>),
    Remove(Vec<NodeEntry>),
    Rename {
        entries: Vec<NodeEntry>,
        old_path: PathBuf,
    },
    /// Flags or metadata of a single node changed in place.
    Update(Vec<NodeEntry>),
    /// The tree set was rebuilt; node ids seen before are no longer valid.
    Reset,
}

impl IndexChange {
    pub fn entries(&self) -> &[NodeEntry] {
        match self {
            IndexChange::Add(entries)
            | IndexChange::Remove(entries)
            | IndexChange::Update(entries) => entries,
            IndexChange::Rename { entries, .. } => entries,
            IndexChange::Reset => &[],
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.entries().first().map(|entry| entry.id)
    }
}

/// Fan-out of changes to any number of subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next send.
#[derive(Debug, Clone, Default)]
pub struct ChangeBus {
    subscribers: Arc<Mutex<Vec<Sender<IndexChange>>>>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<IndexChange> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn publish(&self, change: IndexChange) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = ChangeBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(IndexChange::Add(Vec::new()));
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), IndexChange::Add(Vec::new()));
    }
}
