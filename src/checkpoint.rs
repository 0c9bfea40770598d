//! Checkpoint handles: the capability to mark a stream record as durably consumed.
//!
//! A [`Checkpoint`] travels with the data derived from its record (call state,
//! audio chunks, pending uploads) and is released once that data is either
//! stored or deliberately dropped. Releasing is idempotent: the underlying
//! action runs at most once no matter how often the handle is invoked.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

type Action = Box<dyn FnOnce() + Send>;

/// Cheaply clonable, release-at-most-once handle.
#[derive(Clone)]
pub struct Checkpoint {
    action: Arc<Mutex<Option<Action>>>,
}

impl Checkpoint {
    /// Wrap the action that advances the source position for one record.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// A handle with nothing behind it.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Release the record. Only the first call has an effect.
    pub fn checkpoint(&self) {
        let action = self
            .action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether this handle (or a clone of it) has been released.
    pub fn is_released(&self) -> bool {
        self.action
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkpoint")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Release every handle in order.
pub fn release_all<'a>(checkpoints: impl IntoIterator<Item = &'a Checkpoint>) {
    for checkpoint in checkpoints {
        checkpoint.checkpoint();
    }
}

#[derive(Debug)]
struct TrackerState {
    /// First sequence number this tracker was handed.
    start: u64,
    /// Lowest sequence number not yet released.
    next: u64,
    /// Released sequence numbers above `next`, waiting for the gap to close.
    pending: BTreeSet<u64>,
}

/// Turns out-of-order record releases into a durable low-watermark.
///
/// Records are identified by a monotonically increasing sequence number. The
/// committed position only moves past a record once it and every record before
/// it have been released, so a restart resumes after the last position at which
/// nothing earlier was still outstanding.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    state: Arc<Mutex<TrackerState>>,
    persist_path: Option<PathBuf>,
    max_held: Option<usize>,
}

impl CheckpointTracker {
    /// Tracker whose first record carries sequence number `start`.
    pub fn new(start: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(TrackerState {
                start,
                next: start,
                pending: BTreeSet::new(),
            })),
            persist_path: None,
            max_held: None,
        }
    }

    /// Write the committed position to `path` every time it advances.
    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }

    /// Bound the number of released records held behind an outstanding one.
    ///
    /// Past the bound [`check_backlog`](Self::check_backlog) fails, so a record
    /// that is never released stops the consumer instead of growing the held
    /// set without limit.
    pub fn with_max_held(mut self, limit: usize) -> Self {
        self.max_held = Some(limit);
        self
    }

    /// Read a position written by a previous run. Missing file means no position.
    pub fn restore(path: &Path) -> crate::error::Result<Option<u64>> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let position = contents.trim().parse::<u64>().map_err(|e| {
                    crate::error::CallError::Other(format!(
                        "invalid checkpoint file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Some(position))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Handle that releases record `sequence`.
    pub fn handle(&self, sequence: u64) -> Checkpoint {
        let tracker = self.clone();
        Checkpoint::new(move || tracker.release(sequence))
    }

    /// Highest sequence number below which everything has been released.
    pub fn committed(&self) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.next > state.start).then(|| state.next - 1)
    }

    /// Number of records released but held back by an earlier outstanding one.
    pub fn held(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    /// Fail once more records are held than the configured bound allows.
    pub fn check_backlog(&self) -> crate::error::Result<()> {
        let Some(limit) = self.max_held else {
            return Ok(());
        };
        let held = self.held();
        if held > limit {
            return Err(crate::error::CallError::CheckpointBacklog { held, limit });
        }
        Ok(())
    }

    fn release(&self, sequence: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if sequence < state.next {
            return;
        }
        state.pending.insert(sequence);
        let before = state.next;
        while state.pending.first() == Some(&state.next) {
            state.pending.pop_first();
            state.next += 1;
        }
        if state.next == before {
            if self.max_held.is_some_and(|limit| state.pending.len() == limit + 1) {
                tracing::warn!(
                    outstanding = state.next,
                    held = state.pending.len(),
                    "released records piling up behind an unreleased one"
                );
            }
            return;
        }

        // Written under the lock so concurrent releases cannot persist out of order.
        if let Some(path) = &self.persist_path
            && let Err(e) = fs::write(path, (state.next - 1).to_string())
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to persist checkpoint");
        }
    }
}
