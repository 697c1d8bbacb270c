//! Serialized command execution.
//!
//! A single worker thread owns the state `S` and drains a FIFO queue. Callers
//! on any thread enqueue closures and get a `CommandHandle` back; enqueueing
//! only appends and wakes the worker. At most one command runs at a time, in
//! arrival order.
//!
//! Each command has its own `CancellationToken`. A command canceled before it
//! starts settles as `Canceled` without running; a body that observes the
//! token mid-run returns `None` and settles the same way. A panicking body is
//! caught, reported on the fault channel and settled as `Faulted`.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tokio::sync::oneshot;

use crate::cancel::CancellationToken;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutateKind {
    Add,
    Remove,
    Rename,
    Refresh,
    Pin,
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Collect,
    Search,
    MultiSearch,
    Mutate(MutateKind),
    Wait,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    Collecting = 1,
    Searching = 2,
    Other = 3,
}

impl EngineState {
    fn of(kind: CommandKind) -> Self {
        match kind {
            CommandKind::Collect => EngineState::Collecting,
            CommandKind::Search | CommandKind::MultiSearch => EngineState::Searching,
            _ => EngineState::Other,
        }
    }

    pub fn load(value: &AtomicU8) -> Self {
        match value.load(Ordering::Relaxed) {
            1 => EngineState::Collecting,
            2 => EngineState::Searching,
            3 => EngineState::Other,
            _ => EngineState::Idle,
        }
    }
}

/// How a command settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome<T> {
    Completed(T),
    Canceled,
    Faulted(String),
}

impl<T> CommandOutcome<T> {
    pub fn into_result(self) -> Result<T> {
        match self {
            CommandOutcome::Completed(value) => Ok(value),
            CommandOutcome::Canceled => Err(IndexError::Canceled),
            CommandOutcome::Faulted(message) => Err(IndexError::Faulted(message)),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CommandOutcome::Completed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, CommandOutcome::Canceled)
    }
}

/// A panic caught while running a command body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFault {
    pub kind: CommandKind,
    pub message: String,
}

/// Completion signal for one queued command.
pub struct CommandHandle<T> {
    rx: oneshot::Receiver<CommandOutcome<T>>,
    cancel: CancellationToken,
}

impl<T> fmt::Debug for CommandHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandle")
            .field("canceled", &self.cancel.cancel_requested())
            .finish()
    }
}

impl<T> CommandHandle<T> {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocks the calling thread until the command settles.
    ///
    /// Must not be called from inside an async runtime; use `outcome` there.
    pub fn wait(self) -> CommandOutcome<T> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| CommandOutcome::Faulted(IndexError::EngineStopped.to_string()))
    }

    pub async fn outcome(self) -> CommandOutcome<T> {
        self.rx
            .await
            .unwrap_or_else(|_| CommandOutcome::Faulted(IndexError::EngineStopped.to_string()))
    }

    /// Blocks and maps the outcome onto `Result`.
    pub fn join(self) -> Result<T> {
        self.wait().into_result()
    }
}

/// Runs the command and settles its handle; returns a fault message if the
/// body panicked.
type Job<S> = Box<dyn FnOnce(&mut S) -> Option<String> + Send>;

struct QueuedCommand<S> {
    kind: CommandKind,
    cancel: CancellationToken,
    job: Job<S>,
}

struct Queue<S> {
    commands: VecDeque<QueuedCommand<S>>,
    shutdown: bool,
}

struct Shared<S> {
    queue: Mutex<Queue<S>>,
    wake: Condvar,
    state: AtomicU8,
    faults: Sender<CommandFault>,
}

/// Cloneable producer side of the queue, usable from watcher callbacks.
pub struct CommandSender<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for CommandSender<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S: 'static> CommandSender<S> {
    /// Queues `body` behind every command already enqueued.
    ///
    /// The body returns `None` when it observed cancellation.
    pub fn enqueue<T, F>(&self, kind: CommandKind, cancel: CancellationToken, body: F) -> CommandHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S, &CancellationToken) -> Option<T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = cancel.clone();
        let job: Job<S> = Box::new(move |state: &mut S| {
            let outcome = if token.cancel_requested() {
                CommandOutcome::Canceled
            } else {
                match panic::catch_unwind(AssertUnwindSafe(|| body(state, &token))) {
                    Ok(Some(value)) => CommandOutcome::Completed(value),
                    Ok(None) => CommandOutcome::Canceled,
                    Err(payload) => CommandOutcome::Faulted(panic_message(payload.as_ref())),
                }
            };
            let fault = match &outcome {
                CommandOutcome::Faulted(message) => Some(message.clone()),
                _ => None,
            };
            let _ = tx.send(outcome);
            fault
        });

        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            drop(queue);
            // Dropping the job drops `tx`, which settles the handle as stopped.
            drop(job);
        } else {
            queue.commands.push_back(QueuedCommand {
                kind,
                cancel: cancel.clone(),
                job,
            });
            drop(queue);
            self.shared.wake.notify_one();
        }
        CommandHandle { rx, cancel }
    }

    /// Cancels every queued command of `kind` that has not started yet.
    pub fn cancel_queued(&self, kind: CommandKind) -> usize {
        let queue = self.shared.queue.lock();
        let mut canceled = 0;
        for command in queue.commands.iter().filter(|c| c.kind == kind) {
            command.cancel.cancel();
            canceled += 1;
        }
        canceled
    }

    pub fn state(&self) -> EngineState {
        EngineState::load(&self.shared.state)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "command panicked".to_string()
    }
}

/// Owns the worker thread. Dropping the engine stops the worker after the
/// command in progress; commands still queued settle as faulted.
pub struct CommandEngine<S> {
    sender: CommandSender<S>,
    faults: Receiver<CommandFault>,
    worker: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> CommandEngine<S> {
    pub fn spawn(name: &str, state: S) -> Result<Self> {
        let (fault_tx, fault_rx) = unbounded();
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                commands: VecDeque::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            state: AtomicU8::new(EngineState::Idle as u8),
            faults: fault_tx,
        });
        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(worker_shared, state))?;
        Ok(Self {
            sender: CommandSender { shared },
            faults: fault_rx,
            worker: Some(worker),
        })
    }
}

impl<S: 'static> CommandEngine<S> {
    pub fn sender(&self) -> CommandSender<S> {
        self.sender.clone()
    }

    pub fn enqueue<T, F>(&self, kind: CommandKind, cancel: CancellationToken, body: F) -> CommandHandle<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S, &CancellationToken) -> Option<T> + Send + 'static,
    {
        self.sender.enqueue(kind, cancel, body)
    }

    /// Queues a no-op that settles once everything queued before it has run.
    pub fn wait(&self) -> CommandHandle<()> {
        self.enqueue(CommandKind::Wait, CancellationToken::new(), |_, _| Some(()))
    }

    pub fn state(&self) -> EngineState {
        self.sender.state()
    }

    pub fn faults(&self) -> Receiver<CommandFault> {
        self.faults.clone()
    }
}

impl<S> Drop for CommandEngine<S> {
    fn drop(&mut self) {
        {
            let mut queue = self.sender.shared.queue.lock();
            queue.shutdown = true;
            queue.commands.clear();
        }
        self.sender.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("command worker exited with a panic");
            }
        }
    }
}

fn run_worker<S>(shared: Arc<Shared<S>>, mut state: S) {
    loop {
        let command = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    shared.state.store(EngineState::Idle as u8, Ordering::Relaxed);
                    return;
                }
                if let Some(command) = queue.commands.pop_front() {
                    shared
                        .state
                        .store(EngineState::of(command.kind) as u8, Ordering::Relaxed);
                    break command;
                }
                shared.state.store(EngineState::Idle as u8, Ordering::Relaxed);
                shared.wake.wait(&mut queue);
            }
        };

        let QueuedCommand { kind, job, .. } = command;
        if let Some(message) = job(&mut state) {
            log::error!("command faulted kind={:?} message={}", kind, message);
            let _ = shared.faults.send(CommandFault { kind, message });
        }
    }
}
