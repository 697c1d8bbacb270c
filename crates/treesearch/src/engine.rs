//! Engine facade: index, filter and command worker behind one handle.
//!
//! Every operation is queued on the single command worker and returns a
//! `CommandHandle` the caller can block on (`wait`/`join`) or await
//! (`outcome`). Queries are parsed and compiled on the calling thread so
//! malformed input is reported before anything is queued.

mod live;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;

pub use live::LiveResults;

use crate::area::SearchArea;
use crate::cancel::CancellationToken;
use crate::command::{
    CommandEngine, CommandFault, CommandHandle, CommandKind, EngineState, MutateKind,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::{CompiledQuery, FilterEngine, Property};
use crate::index::{ChangeBus, IndexChange, IndexCoordinator};
use crate::normalize::TextNormalizer;
use crate::query::{Conjunction, OperatorKind, SearchKey};
use crate::tree::NodeEntry;
use crate::watcher::{WatchEvent, WatchSink};

pub struct Engine {
    commands: CommandEngine<IndexCoordinator>,
    filter: Arc<FilterEngine>,
    config: EngineConfig,
    node_count: Arc<AtomicUsize>,
    changes: ChangeBus,
    pending_collect: Mutex<Option<CancellationToken>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let normalizer = Arc::new(TextNormalizer::from_config(&config));
        let coordinator = IndexCoordinator::new(&config, normalizer.clone());
        let node_count = coordinator.node_count_handle();
        let changes = coordinator.changes().clone();
        let filter = Arc::new(FilterEngine::new(
            normalizer,
            &Property::INDEX,
            config.option_marker,
        ));
        let commands = CommandEngine::spawn("treesearch-index", coordinator)?;

        if config.watch {
            let sender = commands.sender();
            let sink: WatchSink = Arc::new(move |event: WatchEvent| {
                sender.enqueue(
                    CommandKind::Mutate(MutateKind::Watch),
                    CancellationToken::new(),
                    move |index: &mut IndexCoordinator, _| {
                        index.apply_watch_event(&event);
                        Some(())
                    },
                );
            });
            commands.enqueue(
                CommandKind::Mutate(MutateKind::Watch),
                CancellationToken::new(),
                move |index: &mut IndexCoordinator, _| {
                    index.set_watch_sink(Some(sink));
                    Some(())
                },
            );
        }

        log::info!(
            "engine started watch={} include_hidden={}",
            config.watch,
            config.include_hidden
        );
        Ok(Self {
            commands,
            filter,
            config,
            node_count,
            changes,
            pending_collect: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filter(&self) -> &FilterEngine {
        &self.filter
    }

    /// Replaces the configured areas. A collect that is still queued or
    /// running is canceled in favor of this one.
    pub fn set_areas(&self, areas: Vec<SearchArea>) -> CommandHandle<usize> {
        let cancel = CancellationToken::new();
        let mut pending = self.pending_collect.lock();
        if let Some(previous) = pending.replace(cancel.clone()) {
            previous.cancel();
        }
        let superseded = self.commands.sender().cancel_queued(CommandKind::Collect);
        log::debug!(
            "engine set areas count={} superseded={}",
            areas.len(),
            superseded
        );
        self.commands
            .enqueue(CommandKind::Collect, cancel, move |index, cancel| {
                index.collect(&areas, cancel)
            })
    }

    /// Searches with the configured directory exclusion.
    pub fn search(&self, query: &str) -> Result<CommandHandle<Vec<NodeEntry>>> {
        self.search_with(query, self.config.exclude_directories)
    }

    pub fn search_with(
        &self,
        query: &str,
        exclude_directories: bool,
    ) -> Result<CommandHandle<Vec<NodeEntry>>> {
        let compiled = self.compile(query, exclude_directories)?;
        Ok(self.commands.enqueue(
            CommandKind::Search,
            CancellationToken::new(),
            move |index, cancel| index.search(&compiled, cancel),
        ))
    }

    /// Evaluates several queries against one snapshot of the index.
    pub fn multi_search(&self, queries: &[&str]) -> Result<CommandHandle<Vec<Vec<NodeEntry>>>> {
        let compiled = queries
            .iter()
            .map(|query| self.compile(query, self.config.exclude_directories))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.commands.enqueue(
            CommandKind::MultiSearch,
            CancellationToken::new(),
            move |index, cancel| index.multi_search(&compiled, cancel),
        ))
    }

    /// Searches and keeps the result current as the index changes.
    pub fn live_search(&self, query: &str) -> Result<CommandHandle<LiveResults>> {
        let compiled = self.compile(query, self.config.exclude_directories)?;
        Ok(self.commands.enqueue(
            CommandKind::Search,
            CancellationToken::new(),
            move |index, cancel| {
                let entries = index.search(&compiled, cancel)?;
                // Subscribed on the worker, so no change can slip in between
                // the snapshot and the subscription.
                let changes = index.changes().subscribe();
                Some(LiveResults::new(compiled, entries, changes))
            },
        ))
    }

    fn compile(&self, query: &str, exclude_directories: bool) -> Result<CompiledQuery> {
        let compiled = self.filter.compile_query(query)?;
        if !exclude_directories {
            return Ok(compiled);
        }
        let key = SearchKey::new("true")
            .with_conjunction(Conjunction::Not)
            .with_property(Property::IsDirectory.name())
            .with_operator(OperatorKind::Eq)
            .excluded();
        Ok(compiled.with_trailing(self.filter.compile_key(&key)?))
    }

    pub fn add(&self, path: impl Into<PathBuf>) -> CommandHandle<Option<NodeEntry>> {
        let path = path.into();
        self.mutate(MutateKind::Add, move |index| index.add_path(None, &path))
    }

    pub fn remove(&self, path: impl Into<PathBuf>) -> CommandHandle<Option<NodeEntry>> {
        let path = path.into();
        self.mutate(MutateKind::Remove, move |index| index.remove_path(None, &path))
    }

    /// Renames within one directory. Moving across directories faults the
    /// command.
    pub fn rename(
        &self,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
    ) -> CommandHandle<Option<NodeEntry>> {
        let (from, to) = (from.into(), to.into());
        self.mutate(MutateKind::Rename, move |index| {
            index.rename_path(None, &from, &to)
        })
    }

    pub fn refresh(&self, path: impl Into<PathBuf>) -> CommandHandle<Option<NodeEntry>> {
        let path = path.into();
        self.mutate(MutateKind::Refresh, move |index| {
            index.refresh_path(None, &path)
        })
    }

    pub fn set_pinned(&self, path: &Path, pinned: bool) -> CommandHandle<Option<NodeEntry>> {
        let path = path.to_path_buf();
        self.mutate(MutateKind::Pin, move |index| index.set_pinned(&path, pinned))
    }

    fn mutate<F>(&self, kind: MutateKind, body: F) -> CommandHandle<Option<NodeEntry>>
    where
        F: FnOnce(&mut IndexCoordinator) -> Option<NodeEntry> + Send + 'static,
    {
        self.commands.enqueue(
            CommandKind::Mutate(kind),
            CancellationToken::new(),
            move |index, _| Some(body(index)),
        )
    }

    /// Settles once every command queued before it has finished.
    pub fn wait(&self) -> CommandHandle<()> {
        self.commands.wait()
    }

    pub fn subscribe(&self) -> Receiver<IndexChange> {
        self.changes.subscribe()
    }

    /// Advisory: may lag the index while commands are running.
    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> EngineState {
        self.commands.state()
    }

    pub fn faults(&self) -> Receiver<CommandFault> {
        self.commands.faults()
    }
}
