//! The consumer side of a watch.
//!
//! A [`Recorder`] owns the entry buffer, the store and at most one live
//! [`WatchSession`]. Everything it does happens on the caller's thread, so
//! the buffer needs no locking.

use std::path::Path;
use std::time::Duration;
use chrono::Local;
use crate::error::{StoreResult, WatchError, WatchResult};
use crate::store::ChangeStore;
use crate::{ChangeEntry, EntryBuffer, EventFilter, ExtensionFilter, WatchSession};

pub struct Recorder<S: ChangeStore> {
    store: S,
    filter: EventFilter,
    buffer: EntryBuffer,
    session: Option<WatchSession>,
}

impl<S: ChangeStore> Recorder<S> {
    pub fn new(store: S, filter: EventFilter) -> Self {
        Self {
            store,
            filter,
            buffer: EntryBuffer::new(),
            session: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn buffer(&self) -> &EntryBuffer {
        &self.buffer
    }

    pub fn is_watching(&self) -> bool {
        self.session.as_ref().map_or(false, WatchSession::is_watching)
    }

    /// Starts a fresh session on `dir` and returns the status line.
    ///
    /// Buffered entries from earlier sessions are kept.
    pub fn start<P: AsRef<Path>>(&mut self, dir: P, extension: ExtensionFilter) -> WatchResult<String> {
        if self.is_watching() {
            return Err(WatchError::AlreadyStarted);
        }

        let dir = dir.as_ref();
        let mut session = WatchSession::new(self.filter.clone(), extension);
        session.start(dir)?;

        let status = format!(
            "Started watching {} files in {} at {}",
            session.extension(),
            dir.display(),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.session = Some(session);
        Ok(status)
    }

    /// Moves newly accepted entries into the buffer, showing each to
    /// `on_accepted` first.
    ///
    /// On a notifier failure the session is torn down (after draining what it
    /// had already queued) and the error is returned.
    pub fn pump<F>(&mut self, wait: Duration, mut on_accepted: F) -> WatchResult<usize>
    where
        F: FnMut(&ChangeEntry),
    {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return Ok(0),
        };

        let buffer = &mut self.buffer;
        let result = session.dispatch(wait, |entry| {
            on_accepted(&entry);
            buffer.append(entry);
        });

        if result.is_err() {
            self.finish_session(&mut on_accepted);
        }
        result
    }

    /// Stops the current session and returns the status line, or `None`
    /// when nothing was being watched. Buffered entries survive.
    pub fn stop<F>(&mut self, mut on_accepted: F) -> Option<String>
    where
        F: FnMut(&ChangeEntry),
    {
        self.finish_session(&mut on_accepted)
    }

    fn finish_session<F>(&mut self, on_accepted: &mut F) -> Option<String>
    where
        F: FnMut(&ChangeEntry),
    {
        let mut session = self.session.take()?;
        session.stop();

        // Whatever reached the channel before stop() returned still counts
        let buffer = &mut self.buffer;
        if let Err(err) = session.dispatch(Duration::ZERO, |entry| {
            on_accepted(&entry);
            buffer.append(entry);
        }) {
            tracing::warn!("Discarding watcher error after stop: {}", err);
        }

        session.root().map(|root| {
            format!("Stopped watching {} files in {}", session.extension(), root.display())
        })
    }

    /// Writes every buffered entry to the store and empties the buffer.
    ///
    /// Nothing is written when the buffer is empty. If the store rejects
    /// the batch the entries go back into the buffer ahead of anything that
    /// arrived meanwhile, ready for a retry.
    pub fn flush(&mut self) -> StoreResult<usize> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = self.buffer.snapshot_and_clear();
        match self.store.append_all(&batch) {
            Ok(written) => {
                tracing::debug!("Wrote {} entries", written);
                Ok(written)
            }
            Err(err) => {
                tracing::error!("Write failed, keeping {} entries buffered: {}", batch.len(), err);
                self.buffer.restore(batch);
                Err(err)
            }
        }
    }

    /// Drops buffered entries without writing them.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn list(&self, filter: &ExtensionFilter) -> StoreResult<Vec<ChangeEntry>> {
        self.store.list(filter)
    }

    /// Deletes every stored row. Confirmation is the caller's job.
    pub fn clear_all(&self) -> StoreResult<usize> {
        self.store.delete_all()
    }
}
