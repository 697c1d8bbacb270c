//! Filesystem watching for indexed areas.
//!
//! Watcher callbacks never touch the index. Raw `notify` events are handed to
//! a forwarding thread per watcher, which pairs rename halves, translates the
//! rest into `WatchEvent`s and hands them to a sink. The sink queues them as
//! mutation commands so they apply in order on the command worker.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::area::SearchArea;
use crate::error::{IndexError, Result};

/// How long the first half of a rename waits for its partner before it is
/// applied on its own.
const RENAME_PAIR_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathChange {
    Created(PathBuf),
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Changed(PathBuf),
}

/// A change reported for one watched area root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub root: PathBuf,
    pub change: PathChange,
}

pub type WatchSink = Arc<dyn Fn(WatchEvent) + Send + Sync>;

/// Keeps a `notify` subscription alive for as long as its tree exists.
///
/// Dropping it closes the event channel, which ends the forwarding thread.
pub struct TreeWatcher {
    _watcher: RecommendedWatcher,
}

/// Starts watching `area`, forwarding translated events to `sink`.
///
/// A file area is watched through its parent directory and events for
/// siblings are dropped.
pub fn watch_area(area: &SearchArea, root_is_dir: bool, sink: WatchSink) -> Result<TreeWatcher> {
    let root = area.path.clone();
    let (tx, rx) = unbounded::<notify::Result<Event>>();

    let mut watcher = recommended_watcher(move |event_result: notify::Result<Event>| {
        let _ = tx.send(event_result);
    })
    .map_err(|error| {
        IndexError::Watch(format!(
            "failed to create filesystem watcher for {}: {error}",
            root.display()
        ))
    })?;

    let (watch_target, mode) = if root_is_dir {
        let mode = if area.include_subdirectories {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        (root.clone(), mode)
    } else {
        (
            root.parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.clone()),
            RecursiveMode::NonRecursive,
        )
    };

    watcher.watch(&watch_target, mode).map_err(|error| {
        IndexError::Watch(format!("failed to watch {}: {error}", watch_target.display()))
    })?;

    let file_only = (!root_is_dir).then(|| root.clone());
    thread::Builder::new()
        .name("treesearch-watch".to_string())
        .spawn(move || forward_events(rx, root, file_only, sink))
        .map_err(|error| IndexError::Watch(format!("failed to start watch thread: {error}")))?;

    Ok(TreeWatcher { _watcher: watcher })
}

/// Drains raw events until the watcher is dropped.
fn forward_events(
    rx: Receiver<notify::Result<Event>>,
    root: PathBuf,
    file_only: Option<PathBuf>,
    sink: WatchSink,
) {
    let mut pairing = RenamePairing::default();
    loop {
        let received = if pairing.is_idle() {
            rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
        } else {
            rx.recv_timeout(RENAME_PAIR_TIMEOUT)
        };
        let mut changes = match received {
            Ok(Ok(event)) => pairing.push(event, Instant::now()),
            Ok(Err(error)) => {
                log::warn!("watch event error root={} err={}", root.display(), error);
                Vec::new()
            }
            Err(RecvTimeoutError::Timeout) => Vec::new(),
            Err(RecvTimeoutError::Disconnected) => break,
        };
        changes.extend(pairing.expire(Instant::now()));

        for change in changes {
            if let Some(file) = &file_only {
                if !change_touches(&change, file) {
                    continue;
                }
            }
            sink(WatchEvent {
                root: root.clone(),
                change,
            });
        }
    }
    log::debug!("watch forwarding stopped root={}", root.display());
}

fn change_touches(change: &PathChange, path: &Path) -> bool {
    match change {
        PathChange::Created(p) | PathChange::Deleted(p) | PathChange::Changed(p) => p == path,
        PathChange::Renamed { from, to } => from == path || to == path,
    }
}

struct PendingRename {
    tracker: Option<usize>,
    from: PathBuf,
    created_at: Instant,
}

/// Joins the `From` and `To` halves of a rename into one `Renamed` change.
///
/// Halves are matched by the event tracker; untracked halves pair in arrival
/// order. inotify follows a matched pair with a `Both` event carrying the same
/// tracker, which is dropped once the pair has been applied. A `From` that
/// finds no partner within `RENAME_PAIR_TIMEOUT`, or that is followed by an
/// unrelated event, becomes a delete; an unmatched `To` becomes a create.
#[derive(Default)]
struct RenamePairing {
    pending: VecDeque<PendingRename>,
    paired: VecDeque<(usize, Instant)>,
}

impl RenamePairing {
    fn push(&mut self, event: Event, now: Instant) -> Vec<PathChange> {
        let tracker = event.attrs.tracker();
        let mut changes = Vec::new();
        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for from in event.paths {
                    self.pending.push_back(PendingRename {
                        tracker,
                        from,
                        created_at: now,
                    });
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for to in event.paths {
                    match self.take_pending(tracker) {
                        Some(from) => {
                            if let Some(tracker) = tracker {
                                self.paired.push_back((tracker, now));
                            }
                            changes.extend(rename_change(from, to));
                        }
                        None => changes.push(PathChange::Created(to)),
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(tracker) = tracker {
                    if let Some(at) = self.paired.iter().position(|(t, _)| *t == tracker) {
                        self.paired.remove(at);
                        return changes;
                    }
                    self.take_pending(Some(tracker));
                }
                changes.extend(translate(event));
            }
            _ => {
                changes.extend(self.pending.drain(..).map(|p| PathChange::Deleted(p.from)));
                changes.extend(translate(event));
            }
        }
        changes
    }

    fn take_pending(&mut self, tracker: Option<usize>) -> Option<PathBuf> {
        let at = self.pending.iter().position(|p| p.tracker == tracker)?;
        self.pending.remove(at).map(|p| p.from)
    }

    fn expire(&mut self, now: Instant) -> Vec<PathChange> {
        let mut changes = Vec::new();
        while let Some(front) = self.pending.front() {
            if now.duration_since(front.created_at) < RENAME_PAIR_TIMEOUT {
                break;
            }
            if let Some(expired) = self.pending.pop_front() {
                changes.push(PathChange::Deleted(expired.from));
            }
        }
        self.paired
            .retain(|(_, at)| now.duration_since(*at) < RENAME_PAIR_TIMEOUT);
        changes
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.paired.is_empty()
    }
}

/// Maps one raw event onto index changes without rename pairing.
///
/// Renames that change directory become a delete followed by a create, since
/// the tree only renames in place.
pub fn translate(event: Event) -> Vec<PathChange> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Access(_) => Vec::new(),
        EventKind::Create(_) => paths.into_iter().map(PathChange::Created).collect(),
        EventKind::Remove(_) => paths.into_iter().map(PathChange::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            let mut paths = paths.into_iter();
            let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                return Vec::new();
            };
            rename_change(from, to)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.into_iter().map(PathChange::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.into_iter().map(PathChange::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|path| {
                if path.exists() {
                    PathChange::Created(path)
                } else {
                    PathChange::Deleted(path)
                }
            })
            .collect(),
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            paths.into_iter().map(PathChange::Changed).collect()
        }
    }
}

fn rename_change(from: PathBuf, to: PathBuf) -> Vec<PathChange> {
    if from.parent() == to.parent() {
        vec![PathChange::Renamed { from, to }]
    } else {
        vec![PathChange::Deleted(from), PathChange::Created(to)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(PathBuf::from(path));
        }
        event
    }

    #[test]
    fn create_and_remove_map_directly() {
        let changes = translate(event(EventKind::Create(CreateKind::File), &["/r/a"]));
        assert_eq!(changes, vec![PathChange::Created("/r/a".into())]);

        let changes = translate(event(EventKind::Remove(RemoveKind::Any), &["/r/a"]));
        assert_eq!(changes, vec![PathChange::Deleted("/r/a".into())]);
    }

    #[test]
    fn same_directory_rename_stays_a_rename() {
        let changes = translate(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/a", "/r/b"],
        ));
        assert_eq!(
            changes,
            vec![PathChange::Renamed {
                from: "/r/a".into(),
                to: "/r/b".into()
            }]
        );
    }

    #[test]
    fn cross_directory_rename_splits() {
        let changes = translate(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/a", "/r/sub/a"],
        ));
        assert_eq!(
            changes,
            vec![
                PathChange::Deleted("/r/a".into()),
                PathChange::Created("/r/sub/a".into())
            ]
        );
    }

    #[test]
    fn content_changes_refresh_and_access_is_ignored() {
        let changes = translate(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            &["/r/a"],
        ));
        assert_eq!(changes, vec![PathChange::Changed("/r/a".into())]);
        assert!(translate(event(EventKind::Access(notify::event::AccessKind::Any), &["/r/a"])).is_empty());
    }

    fn name_event(mode: RenameMode, paths: &[&str], tracker: usize) -> Event {
        event(EventKind::Modify(ModifyKind::Name(mode)), paths).set_tracker(tracker)
    }

    #[test]
    fn paired_halves_become_one_rename_and_both_is_dropped() {
        let mut pairing = RenamePairing::default();
        let now = Instant::now();
        assert!(pairing.push(name_event(RenameMode::From, &["/r/a"], 7), now).is_empty());
        assert_eq!(
            pairing.push(name_event(RenameMode::To, &["/r/b"], 7), now),
            vec![PathChange::Renamed {
                from: "/r/a".into(),
                to: "/r/b".into()
            }]
        );
        assert!(pairing
            .push(name_event(RenameMode::Both, &["/r/a", "/r/b"], 7), now)
            .is_empty());
        assert!(pairing.is_idle());
    }

    #[test]
    fn unmatched_halves_fall_back_to_delete_and_create() {
        let mut pairing = RenamePairing::default();
        let now = Instant::now();
        assert!(pairing.push(name_event(RenameMode::From, &["/r/out"], 1), now).is_empty());
        assert_eq!(
            pairing.push(name_event(RenameMode::To, &["/r/in"], 2), now),
            vec![PathChange::Created("/r/in".into())]
        );
        assert!(pairing.expire(now).is_empty());
        assert_eq!(
            pairing.expire(now + RENAME_PAIR_TIMEOUT),
            vec![PathChange::Deleted("/r/out".into())]
        );
        assert!(pairing.is_idle());
    }

    #[test]
    fn unrelated_event_flushes_pending_half_first() {
        let mut pairing = RenamePairing::default();
        let now = Instant::now();
        pairing.push(name_event(RenameMode::From, &["/r/a"], 3), now);
        let changes = pairing.push(event(EventKind::Create(CreateKind::File), &["/r/a"]), now);
        assert_eq!(
            changes,
            vec![
                PathChange::Deleted("/r/a".into()),
                PathChange::Created("/r/a".into())
            ]
        );
    }

    #[test]
    fn watch_area_reports_missing_root() {
        let temp = tempfile::TempDir::new().unwrap();
        let sink: WatchSink = Arc::new(|_| {});
        let area = SearchArea::recursive(temp.path().join("gone"));
        assert!(matches!(
            watch_area(&area, true, sink),
            Err(IndexError::Watch(_))
        ));
    }
}
