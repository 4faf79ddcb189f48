use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use chrono::{DateTime, Local};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, EventHandler, RecommendedWatcher, RecursiveMode, Watcher};
use crate::error::{WatchError, WatchResult};
use crate::{ChangeEntry, ChangeKind, EventFilter, ExtensionFilter, SessionEvent};

/// How long the first half of a rename waits for its second half before it
/// is recorded as the file leaving the directory.
const MOVE_PAIR_WINDOW: Duration = Duration::from_millis(50);

const QUEUE_OVERFLOW: &str = "event queue overflowed; notifications were dropped";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
    Stopped,
}

type SharedSender = Arc<Mutex<Option<Sender<SessionEvent>>>>;

fn lock_sender(sender: &SharedSender) -> MutexGuard<'_, Option<Sender<SessionEvent>>> {
    sender.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The old-name half of a rename, waiting for the new-name half.
struct PendingMove {
    entry: Option<ChangeEntry>,
    tracker: Option<usize>,
    since: Instant,
}

/// One watch over one directory, from start to stop.
///
/// The notify backend calls into [`NotificationHandler`] on its own thread.
/// The handler filters, stamps and sends entries over a channel, and the
/// owner of the session drains that channel with [`WatchSession::dispatch`],
/// so the callback only ever runs on the consumer's thread.
///
/// Handlers must return quickly: a stalled notify thread lets the kernel
/// queue overflow and drop notifications. Slow work such as writing to the
/// database belongs to an explicit flush, never to the handler.
pub struct WatchSession {
    state: SessionState,
    filter: EventFilter,
    extension: ExtensionFilter,
    root: Option<PathBuf>,
    watcher: Option<RecommendedWatcher>,
    sender: SharedSender,
    event_rx: Option<Receiver<SessionEvent>>,
    pending_move: Option<PendingMove>,
}

impl WatchSession {
    pub fn new(filter: EventFilter, extension: ExtensionFilter) -> Self {
        Self {
            state: SessionState::Idle,
            filter,
            extension,
            root: None,
            watcher: None,
            sender: Arc::new(Mutex::new(None)),
            event_rx: None,
            pending_move: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_watching(&self) -> bool {
        self.state == SessionState::Watching
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn extension(&self) -> &ExtensionFilter {
        &self.extension
    }

    /// Begins watching `dir` (non-recursively).
    ///
    /// On error nothing is left open and the session stays idle.
    pub fn start<P: AsRef<Path>>(&mut self, dir: P) -> WatchResult<()> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Watching => return Err(WatchError::AlreadyStarted),
            SessionState::Stopped => return Err(WatchError::SessionStopped),
        }

        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(WatchError::InvalidPath(dir.to_path_buf()));
        }

        let (tx, rx) = mpsc::channel::<SessionEvent>();
        *lock_sender(&self.sender) = Some(tx);

        let handler = NotificationHandler::new(
            self.filter.clone(),
            self.extension.clone(),
            Arc::clone(&self.sender),
        );

        let watcher = notify::recommended_watcher(handler).and_then(|mut watcher| {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            Ok(watcher)
        });

        let watcher = match watcher {
            Ok(watcher) => watcher,
            Err(err) => {
                lock_sender(&self.sender).take();
                return Err(WatchError::NotifierFailure(err.to_string()));
            }
        };

        self.watcher = Some(watcher);
        self.event_rx = Some(rx);
        self.root = Some(dir.to_path_buf());
        self.state = SessionState::Watching;

        tracing::debug!("Watch armed on {} for {} files", dir.display(), self.extension);
        Ok(())
    }

    /// Hands pending entries to `on_accepted` on the calling thread.
    ///
    /// Waits up to `wait` for the first message, then drains whatever else is
    /// already queued. Returns how many entries were delivered. A notifier
    /// failure stops the session; entries queued before the failure remain
    /// available to the next call.
    ///
    /// The halves of a rename are paired here. A new name with no old name
    /// is a file moving in and is delivered as `Created`; an old name whose
    /// new name never shows up is a file moving out and is delivered as
    /// `Deleted` once [`MOVE_PAIR_WINDOW`] passes or the session stops.
    pub fn dispatch<F>(&mut self, wait: Duration, mut on_accepted: F) -> WatchResult<usize>
    where
        F: FnMut(ChangeEntry),
    {
        let mut wait = Some(wait);
        let mut delivered = 0;

        loop {
            let next = match self.event_rx.as_ref() {
                Some(rx) => match wait.take() {
                    Some(timeout) => rx.recv_timeout(timeout).ok(),
                    None => rx.try_recv().ok(),
                },
                None => None,
            };

            let next = match next {
                Some(next) => next,
                None => {
                    if self.move_expired() {
                        delivered += self.release_move(&mut on_accepted);
                    }
                    return Ok(delivered);
                }
            };

            match next {
                SessionEvent::Accepted(entry) => {
                    delivered += self.release_move(&mut on_accepted);
                    delivered += emit(Some(entry), &mut on_accepted);
                }
                SessionEvent::MovedFrom { entry, tracker } => {
                    delivered += self.release_move(&mut on_accepted);
                    self.pending_move = Some(PendingMove {
                        entry,
                        tracker,
                        since: Instant::now(),
                    });
                }
                SessionEvent::MovedTo { entry, tracker } => {
                    let paired = self
                        .pending_move
                        .as_ref()
                        .map_or(false, |held| trackers_match(held.tracker, tracker));
                    if paired {
                        self.pending_move = None;
                    } else {
                        delivered += self.release_move(&mut on_accepted);
                    }

                    let entry = entry.map(|mut entry| {
                        if !paired {
                            entry.kind = ChangeKind::Created;
                        }
                        entry
                    });
                    delivered += emit(entry, &mut on_accepted);
                }
                SessionEvent::Failed(message) => {
                    tracing::error!("File watcher error: {}", message);
                    self.stop();
                    return Err(WatchError::NotifierFailure(message));
                }
            }
        }
    }

    /// Stops delivery and releases the OS watch. Safe to call repeatedly.
    ///
    /// Once this returns no further entries are queued; entries queued
    /// before it remain available to [`WatchSession::dispatch`].
    pub fn stop(&mut self) {
        if self.state != SessionState::Watching {
            return;
        }

        // Waits out any handler that is mid-send
        lock_sender(&self.sender).take();

        if let Some(mut watcher) = self.watcher.take() {
            if let Some(root) = self.root.as_deref() {
                if let Err(err) = watcher.unwatch(root) {
                    tracing::debug!("unwatch {} failed: {}", root.display(), err);
                }
            }
        }

        self.state = SessionState::Stopped;
        if let Some(root) = self.root.as_deref() {
            tracing::debug!("Watch released on {}", root.display());
        }
    }

    // Nothing can pair with a held old name once the session has stopped.
    fn move_expired(&self) -> bool {
        self.pending_move
            .as_ref()
            .map_or(false, |held| !self.is_watching() || held.since.elapsed() >= MOVE_PAIR_WINDOW)
    }

    fn release_move<F: FnMut(ChangeEntry)>(&mut self, on_accepted: &mut F) -> usize {
        match self.pending_move.take() {
            Some(held) => emit(held.entry, on_accepted),
            None => 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn test_sender(&self) -> Option<Sender<SessionEvent>> {
        lock_sender(&self.sender).clone()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn emit<F: FnMut(ChangeEntry)>(entry: Option<ChangeEntry>, on_accepted: &mut F) -> usize {
    match entry {
        Some(entry) => {
            on_accepted(entry);
            1
        }
        None => 0,
    }
}

// Backends that do not tag renames pair adjacent halves.
fn trackers_match(from: Option<usize>, to: Option<usize>) -> bool {
    match (from, to) {
        (Some(from), Some(to)) => from == to,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveSide {
    From,
    To,
}

/// Which half of a rename `path` is, if `kind` is a rename at all.
///
/// FSEvents and the polling backend report both names as `Any`, so the
/// side is read off whether the path still exists.
fn move_side(kind: &EventKind, path: &Path) -> Option<MoveSide> {
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(MoveSide::From),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(MoveSide::To),
        EventKind::Modify(ModifyKind::Name(RenameMode::Any | RenameMode::Other)) => {
            if path.exists() {
                Some(MoveSide::To)
            } else {
                Some(MoveSide::From)
            }
        }
        _ => None,
    }
}

/// Runs on the notify thread for every raw notification.
pub(crate) struct NotificationHandler {
    filter: EventFilter,
    extension: ExtensionFilter,
    sender: SharedSender,
    last_stamp: Option<DateTime<Local>>,
}

impl NotificationHandler {
    pub(crate) fn new(filter: EventFilter, extension: ExtensionFilter, sender: SharedSender) -> Self {
        Self {
            filter,
            extension,
            sender,
            last_stamp: None,
        }
    }

    // Wall clock may step backwards; entries must not.
    fn next_stamp(&mut self) -> DateTime<Local> {
        let now = Local::now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

impl EventHandler for NotificationHandler {
    fn handle_event(&mut self, event: notify::Result<Event>) {
        let sender = Arc::clone(&self.sender);
        let guard = lock_sender(&sender);
        let tx = match guard.as_ref() {
            Some(tx) => tx,
            None => return,
        };

        let event = match event {
            Ok(event) => event,
            Err(err) => {
                let _ = tx.send(SessionEvent::Failed(err.to_string()));
                return;
            }
        };

        // The kernel dropped notifications; the log would silently miss them
        if event.need_rescan() {
            let _ = tx.send(SessionEvent::Failed(QUEUE_OVERFLOW.to_string()));
            return;
        }

        let raw_kind = event.kind;
        let kind = match classify(&raw_kind) {
            Some(kind) => kind,
            None => return,
        };
        let tracker = event.tracker();

        for path in event.paths {
            let side = move_side(&raw_kind, &path);
            let kind = match side {
                Some(MoveSide::From) => ChangeKind::Deleted,
                Some(MoveSide::To) => ChangeKind::Renamed,
                None => kind,
            };

            let entry = if self.filter.accept(&path, &self.extension) {
                let entry = ChangeEntry::at(path, kind, self.next_stamp());
                tracing::debug!("{}", entry.display_line());
                Some(entry)
            } else {
                tracing::debug!("Skipping {} ({})", path.display(), kind);
                None
            };

            let message = match (side, entry) {
                (Some(MoveSide::From), entry) => SessionEvent::MovedFrom { entry, tracker },
                (Some(MoveSide::To), entry) => SessionEvent::MovedTo { entry, tracker },
                (None, Some(entry)) => SessionEvent::Accepted(entry),
                (None, None) => continue,
            };
            if tx.send(message).is_err() {
                break; // Session dropped its receiver
            }
        }
    }
}

/// Maps a notify event kind onto the recorded kind, or `None` to ignore it.
///
/// The old-name half of a rename maps to `Deleted` and the new-name half to
/// `Renamed`; [`WatchSession::dispatch`] pairs them into one entry. `Both`
/// repeats what the two halves already delivered.
pub fn classify(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => Some(ChangeKind::Deleted),
            RenameMode::To | RenameMode::Any | RenameMode::Other => Some(ChangeKind::Renamed),
            RenameMode::Both => None,
        },
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}
